/// Data blocks are always 512 bytes in SPI mode.
pub const BLOCK_SIZE: usize = 512;

pub(crate) const FILL: u8 = 0xff;
pub(crate) const CMD_MARKER: u8 = 0x40;
pub(crate) const DATA_START_TOKEN: u8 = 0xfe;
pub(crate) const DATA_RESPONSE_MASK: u8 = 0x1f;
pub(crate) const DATA_ACCEPTED: u8 = 0x05;
pub(crate) const CSD_SIZE: usize = 16;
