use crate::constants::BLOCK_SIZE;

/// Derived, read-only facts about the attached card. Zero-valued until
/// initialization completes; the block-transfer range checks treat it
/// as immutable afterwards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CardDescriptor {
    /// SDHC/SDXC: commands carry a block number rather than a byte
    /// offset.
    pub high_capacity: bool,
    /// CSD_STRUCTURE field: 0 for the original layout, 1 for the
    /// high-capacity layout.
    pub csd_version: u8,
    /// Raw C_SIZE field from the CSD.
    pub c_size: u32,
    pub block_count: u32,
    pub byte_size: u32,
}

impl CardDescriptor {
    /// Fills the capacity fields from the 16-byte CSD register.
    /// An unknown CSD_STRUCTURE value leaves the counts zeroed, which
    /// makes every later transfer fail its range check.
    pub(crate) fn fill_from_csd(&mut self, csd: &[u8; 16]) {
        self.csd_version = (csd[0] >> 6) & 0x03;
        match self.csd_version {
            1 => {
                // 22-bit C_SIZE in units of 512 KiB.
                self.c_size = ((csd[7] & 0x3f) as u32) << 16
                    | (csd[8] as u32) << 8
                    | csd[9] as u32;
                self.block_count = (self.c_size + 1).saturating_mul(1024);
                self.byte_size = self.block_count.saturating_mul(BLOCK_SIZE as u32);
            },
            0 => {
                // Original layout: capacity is
                // (C_SIZE + 1) * 2^(C_SIZE_MULT + 2) * 2^READ_BL_LEN.
                let read_bl_len = (csd[5] & 0x0f) as u32;
                let c_size = ((csd[6] & 0x03) as u32) << 10
                    | (csd[7] as u32) << 2
                    | (csd[8] >> 6) as u32;
                let c_size_mult = ((csd[9] & 0x03) as u32) << 1 | (csd[10] >> 7) as u32;
                let bytes = (c_size as u64 + 1) << (c_size_mult + 2 + read_bl_len);
                self.c_size = c_size;
                self.block_count = (bytes / BLOCK_SIZE as u64) as u32;
                self.byte_size = bytes.min(u32::MAX as u64) as u32;
            },
            v => {
                log::warn!("unknown CSD structure {}", v);
            },
        }
    }
}
