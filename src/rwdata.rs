use crate::bus::{
    ChipSelect,
    SdSpi,
};
use crate::card::SdCard;
use crate::cmd::{
    encode_command,
    SdCommand,
};
use crate::constants::{
    BLOCK_SIZE,
    DATA_ACCEPTED,
    DATA_RESPONSE_MASK,
    DATA_START_TOKEN,
    FILL,
};
use crate::crc::crc16;
use crate::SdError;

impl<SPI: SdSpi, CS: ChipSelect> SdCard<SPI, CS> {
    /// Reads one 512-byte block. The wire CRC16 is recomputed over the
    /// payload and enforced before the data is considered valid; the
    /// verified CRC is returned.
    pub fn read_block(&mut self, block: u32, buf: &mut [u8; BLOCK_SIZE]) -> Result<u16, SdError> {
        for byte in buf.iter_mut() {
            *byte = 0;
        }
        self.check_range(SdCommand::ReadSingleBlock, block)?;
        let frame = encode_command(SdCommand::ReadSingleBlock.opcode(), self.block_arg(block));
        let timeout = self.config.limits.ready_timeout_ms;

        let mut session = self.session();
        if !session.wait_ready(timeout) {
            log::warn!("CMD17 card ready timeout");
            return Err(SdError::BusyTimeout);
        }
        let r1 = session.issue(&frame);
        if r1 != 0x00 {
            log::warn!("CMD17 failed, R1 0x{:02x}", r1);
            return Err(SdError::CommandRejected);
        }
        let token = session.wait_token();
        if token != DATA_START_TOKEN {
            log::warn!("CMD17 failed, token 0x{:02x}", token);
            return Err(SdError::TokenTimeout);
        }

        let received = session.spi.read(buf);
        let mut trailer = [0u8; 2];
        session.spi.read(&mut trailer);
        drop(session);

        if received != BLOCK_SIZE {
            log::warn!("CMD17 failed, {} bytes received", received);
            return Err(SdError::Inconsistent);
        }
        let wire_crc = u16::from_be_bytes(trailer);
        let calc_crc = crc16(buf);
        if wire_crc != calc_crc {
            log::warn!("CMD17 failed, CRC 0x{:04x} != 0x{:04x}", wire_crc, calc_crc);
            return Err(SdError::CrcMismatch);
        }
        Ok(wire_crc)
    }

    /// Writes one 512-byte block and waits out the card's programming
    /// cycle.
    pub fn write_block(&mut self, block: u32, buf: &[u8; BLOCK_SIZE]) -> Result<(), SdError> {
        self.check_range(SdCommand::WriteBlock, block)?;
        let frame = encode_command(SdCommand::WriteBlock.opcode(), self.block_arg(block));
        let limits = self.config.limits;

        let mut session = self.session();
        if !session.wait_ready(limits.ready_timeout_ms) {
            log::warn!("CMD24 card ready timeout");
            return Err(SdError::BusyTimeout);
        }
        let r1 = session.issue(&frame);
        if r1 != 0x00 {
            log::warn!("CMD24 failed, R1 0x{:02x}", r1);
            return Err(SdError::CommandRejected);
        }

        session.transfer(DATA_START_TOKEN);
        let written = session.spi.write(buf);
        session.spi.write(&crc16(buf).to_be_bytes());
        if written != BLOCK_SIZE {
            log::warn!("CMD24 failed, {} bytes written", written);
            return Err(SdError::Inconsistent);
        }

        let response = session.transfer(FILL) & DATA_RESPONSE_MASK;
        if response != DATA_ACCEPTED {
            log::warn!("CMD24 failed, data response 0x{:02x}", response);
            return Err(SdError::WriteRejected);
        }

        // Flash programming is slow; the card holds its output low
        // until done.
        for _ in 0..limits.busy_polls {
            if session.transfer(FILL) == FILL {
                return Ok(());
            }
        }
        log::warn!("CMD24 timeout waiting for busy release");
        Err(SdError::BusyTimeout)
    }

    fn check_range(&self, cmd: SdCommand, block: u32) -> Result<(), SdError> {
        if block >= self.descriptor.block_count {
            log::warn!(
                "CMD{} failed, range error {} >= {}",
                cmd.opcode(),
                block,
                self.descriptor.block_count
            );
            return Err(SdError::RangeError);
        }
        Ok(())
    }

    // High-capacity cards address in blocks; older cards take a byte
    // offset.
    fn block_arg(&self, block: u32) -> u32 {
        if self.descriptor.high_capacity {
            block
        } else {
            block.saturating_mul(BLOCK_SIZE as u32)
        }
    }
}
