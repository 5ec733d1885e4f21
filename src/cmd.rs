use crate::bus::{
    ChipSelect,
    SdSpi,
};
use crate::card::SdCard;
use crate::constants::{
    CMD_MARKER,
    DATA_START_TOKEN,
    FILL,
};
use crate::crc::crc7;
use crate::SdError;

/// The SPI-mode command set this driver issues.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SdCommand {
    GoIdleState = 0,
    SendIfCond = 8,
    SendCsd = 9,
    SetBlockLen = 16,
    ReadSingleBlock = 17,
    WriteBlock = 24,
    SendOpCondition = 41,
    AppCommand = 55,
    ReadOcr = 58,
}

impl SdCommand {
    pub(crate) fn opcode(self) -> u8 {
        self as u8
    }

    // The two reset-handshake commands run before the card has any
    // notion of "ready", so the pre-command busy poll is skipped.
    fn skips_ready_wait(self) -> bool {
        matches!(self, SdCommand::GoIdleState | SdCommand::SendIfCond)
    }
}

/// Builds the 6-byte command frame: marker bits on the opcode,
/// big-endian argument, and a CRC7 where the protocol mandates one
/// (CMD0 and CMD8) or the fill value everywhere else.
pub(crate) fn encode_command(opcode: u8, arg: u32) -> [u8; 6] {
    let mut frame = [
        CMD_MARKER | (opcode & 0x3f),
        (arg >> 24) as u8,
        (arg >> 16) as u8,
        (arg >> 8) as u8,
        arg as u8,
        FILL,
    ];
    if opcode == 0 || opcode == 8 {
        frame[5] = crc7(&frame[..5]);
    }
    frame
}

impl<SPI: SdSpi, CS: ChipSelect> SdCard<SPI, CS> {
    /// Clocks the bus until the card reports not-busy or the wall-clock
    /// budget runs out.
    pub(crate) fn wait_ready(&mut self, timeout_ms: u32) -> bool {
        let start = (self.millis)();
        loop {
            if self.transfer(FILL) == FILL {
                return true;
            }
            if (self.millis)().wrapping_sub(start) > timeout_ms {
                return false;
            }
        }
    }

    /// Polls for an R1 response (high bit clear). On exhaustion the
    /// last byte observed comes back; its set high bit marks the
    /// failure for the caller.
    pub(crate) fn wait_r1(&mut self) -> u8 {
        let mut last = FILL;
        for _ in 0..self.config.limits.r1_polls {
            last = self.transfer(FILL);
            if last & 0x80 == 0 {
                return last;
            }
        }
        log::warn!("R1 timeout, last byte 0x{:02x}", last);
        last
    }

    /// Polls for the data-start token, returning the last byte seen.
    pub(crate) fn wait_token(&mut self) -> u8 {
        let mut last = FILL;
        for _ in 0..self.config.limits.token_polls {
            last = self.transfer(FILL);
            if last == DATA_START_TOKEN {
                return last;
            }
        }
        log::warn!("data token timeout, last byte 0x{:02x}", last);
        last
    }

    /// Writes a command frame and polls for its R1 response. Runs
    /// inside an open session; the trailing fill byte covers the card's
    /// minimum turnaround clocks.
    pub(crate) fn issue(&mut self, frame: &[u8; 6]) -> u8 {
        self.spi.write(frame);
        self.transfer(FILL);
        self.wait_r1()
    }

    /// Runs one command transaction: chip-select framing, ready wait,
    /// frame write, R1 poll and an optional reply payload. Returns the
    /// R1 byte; callers decide what a nonzero value means for their
    /// command.
    pub(crate) fn command(
        &mut self,
        cmd: SdCommand,
        arg: u32,
        reply: &mut [u8],
    ) -> Result<u8, SdError> {
        let frame = encode_command(cmd.opcode(), arg);
        let timeout = self.config.limits.ready_timeout_ms;

        let mut session = self.session();
        if !cmd.skips_ready_wait() && !session.wait_ready(timeout) {
            log::warn!("CMD{} card ready timeout", cmd.opcode());
            return Err(SdError::BusyTimeout);
        }

        let r1 = session.issue(&frame);
        if !reply.is_empty() {
            session.spi.read(reply);
        }
        Ok(r1)
    }
}
