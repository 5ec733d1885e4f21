use crate::bus::{
    ChipSelect,
    SdSpi,
};
use crate::card::SdCard;
use crate::cardinfo::CardDescriptor;
use crate::cmd::{
    encode_command,
    SdCommand,
};
use crate::constants::{
    BLOCK_SIZE,
    CSD_SIZE,
    DATA_START_TOKEN,
    FILL,
};
use crate::SdError;

impl<SPI: SdSpi, CS: ChipSelect> SdCard<SPI, CS> {
    /// Runs the fixed power-up handshake: bus synchronization, reset to
    /// idle, interface condition, the ACMD41 operating-condition loop,
    /// OCR capacity mode, and the CSD capacity read. On success the
    /// descriptor is populated and the bus runs at the configured
    /// operating rate. The ACMD41 loop is the only step that retries;
    /// every other failure aborts the sequence.
    pub fn init(&mut self) -> Result<CardDescriptor, SdError> {
        self.descriptor = CardDescriptor::default();
        self.spi.set_baud_rate(self.config.limits.init_baud);

        // The card needs at least 74 clocks with chip select deasserted
        // to enter SPI mode; ten fill bytes cover it.
        self.cs.deassert();
        for _ in 0..10 {
            self.transfer(FILL);
        }

        self.reset_to_idle()?;
        self.negotiate_operating_condition()?;
        self.read_capacity()?;

        if !self.descriptor.high_capacity {
            self.command(SdCommand::SetBlockLen, BLOCK_SIZE as u32, &mut [])?;
        }

        self.spi.set_baud_rate(self.config.baud);
        Ok(self.descriptor)
    }

    fn reset_to_idle(&mut self) -> Result<(), SdError> {
        // R1 is ignored for both reset commands: a v1 card answers CMD8
        // with "illegal command" and still initializes. The voltage
        // echo is captured for diagnostics only.
        self.command(SdCommand::GoIdleState, 0, &mut [])?;
        let mut echo = [0u8; 4];
        self.command(SdCommand::SendIfCond, 0x1aa, &mut echo)?;
        log::debug!("CMD8 echo {:02x?}", echo);
        Ok(())
    }

    fn negotiate_operating_condition(&mut self) -> Result<(), SdError> {
        // ACMD41 with the host-capacity bit set; the card answers 0x01
        // until its internal init finishes.
        let start = (self.millis)();
        loop {
            self.command(SdCommand::AppCommand, 0, &mut [])?;
            let r1 = self.command(SdCommand::SendOpCondition, 0x4000_0000, &mut [])?;
            if r1 == 0x00 {
                break;
            }
            if (self.millis)().wrapping_sub(start) > self.config.limits.init_timeout_ms {
                log::warn!("ACMD41 handshake timeout, last R1 0x{:02x}", r1);
                return Err(SdError::Timeout);
            }
        }

        let mut ocr = [0u8; 4];
        self.command(SdCommand::ReadOcr, 0, &mut ocr)?;
        self.descriptor.high_capacity = ocr[0] & 0x40 != 0;
        Ok(())
    }

    fn read_capacity(&mut self) -> Result<(), SdError> {
        let csd = self.read_csd()?;
        self.descriptor.fill_from_csd(&csd);
        Ok(())
    }

    // CMD9 runs its own data-block phase: the CSD arrives behind a
    // data-start token with a trailing CRC16 that is read off the wire
    // but not enforced, unlike block reads.
    fn read_csd(&mut self) -> Result<[u8; CSD_SIZE], SdError> {
        let frame = encode_command(SdCommand::SendCsd.opcode(), 0);
        let timeout = self.config.limits.ready_timeout_ms;

        let mut session = self.session();
        if !session.wait_ready(timeout) {
            log::warn!("CMD9 card ready timeout");
            return Err(SdError::BusyTimeout);
        }
        let r1 = session.issue(&frame);
        if r1 != 0x00 {
            log::warn!("CMD9 failed, R1 0x{:02x}", r1);
            return Err(SdError::CommandRejected);
        }
        if session.wait_token() != DATA_START_TOKEN {
            log::warn!("CMD9 data token never arrived");
            return Err(SdError::TokenTimeout);
        }

        let mut csd = [0u8; CSD_SIZE];
        let received = session.spi.read(&mut csd);
        let mut crc = [0u8; 2];
        session.spi.read(&mut crc);
        if received != CSD_SIZE {
            log::warn!("CMD9 short read, {} bytes", received);
            return Err(SdError::Inconsistent);
        }
        Ok(csd)
    }
}
