use crate::cardinfo::CardDescriptor;
use crate::config::SdConfig;
use crate::SdError;
use ufmt::{
    uDebug,
    uWrite,
    Formatter,
};

impl uDebug for SdError {
    fn fmt<W>(&self, out: &mut Formatter<W>) -> Result<(), W::Error>
    where
        W: uWrite + ?Sized,
    {
        out.write_str(match self {
            SdError::CommandRejected => "command rejected (R1)",
            SdError::TokenTimeout => "data token timeout",
            SdError::Inconsistent => "inconsistent transfer length",
            SdError::CrcMismatch => "CRC mismatch",
            SdError::RangeError => "block address out of range",
            SdError::WriteRejected => "write rejected by card",
            SdError::BusyTimeout => "busy timeout",
            SdError::Timeout => "initialization timeout",
        })
    }
}

impl uDebug for CardDescriptor {
    fn fmt<W>(&self, out: &mut Formatter<W>) -> Result<(), W::Error>
    where
        W: uWrite + ?Sized,
    {
        out.write_str(if self.high_capacity { "SDHC" } else { "SDSC" })?;
        ufmt::uwrite!(
            out,
            " csd v{}, {} blocks, {} bytes",
            self.csd_version,
            self.block_count,
            self.byte_size
        )
    }
}

impl uDebug for SdConfig {
    fn fmt<W>(&self, out: &mut Formatter<W>) -> Result<(), W::Error>
    where
        W: uWrite + ?Sized,
    {
        ufmt::uwrite!(
            out,
            "spi{} rx={} cs={} clk={} tx={} baud={}",
            self.bus_index(),
            self.rx_pin,
            self.cs_pin,
            self.clk_pin,
            self.tx_pin,
            self.baud
        )
    }
}
