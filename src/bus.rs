//! The transport seam. The protocol layer never touches a peripheral
//! directly; it talks to an [`SdSpi`] byte-exchange capability and a
//! [`ChipSelect`] line. Adapters for `embedded-hal` 0.2 peripherals are
//! provided for hardware use; tests drive the same traits with a
//! simulated card.

use crate::constants::FILL;
use embedded_hal::digital::v2::OutputPin;
use embedded_hal::spi::FullDuplex;
use void::{
    ResultVoidExt,
    Void,
};

/// Byte-level SPI capability: exchange, bulk write, fill-clocked read
/// and clock-rate control. All calls block until the bytes have moved.
pub trait SdSpi {
    /// Exchange one byte on the bus.
    fn transfer(&mut self, byte: u8) -> u8;

    /// Change the bus clock rate.
    fn set_baud_rate(&mut self, hz: u32);

    /// Write a run of bytes, returning how many went out.
    fn write(&mut self, bytes: &[u8]) -> usize {
        for &byte in bytes {
            self.transfer(byte);
        }
        bytes.len()
    }

    /// Clock fill bytes and collect what comes back, returning how many
    /// bytes were read.
    fn read(&mut self, buf: &mut [u8]) -> usize {
        for slot in buf.iter_mut() {
            *slot = self.transfer(FILL);
        }
        buf.len()
    }
}

/// Active-low chip-select line framing each transaction.
pub trait ChipSelect {
    fn assert(&mut self);
    fn deassert(&mut self);
}

/// Adapter over an `embedded-hal` full-duplex SPI peripheral. Rate
/// switching has no portable trait in embedded-hal 0.2, so it is
/// supplied as a hook taking the peripheral and the target rate.
pub struct HalSpi<SPI> {
    spi: SPI,
    set_baud: fn(&mut SPI, u32),
}

impl<SPI> HalSpi<SPI>
where
    SPI: FullDuplex<u8, Error = Void>,
{
    pub fn new(spi: SPI, set_baud: fn(&mut SPI, u32)) -> HalSpi<SPI> {
        HalSpi { spi, set_baud }
    }

    pub fn release(self) -> SPI {
        self.spi
    }
}

impl<SPI> SdSpi for HalSpi<SPI>
where
    SPI: FullDuplex<u8, Error = Void>,
{
    fn transfer(&mut self, byte: u8) -> u8 {
        nb::block!(self.spi.send(byte)).void_unwrap();
        nb::block!(self.spi.read()).void_unwrap()
    }

    fn set_baud_rate(&mut self, hz: u32) {
        (self.set_baud)(&mut self.spi, hz);
    }
}

/// Chip-select line driven through an `embedded-hal` output pin.
pub struct CsPin<P>(pub P);

impl<P> ChipSelect for CsPin<P>
where
    P: OutputPin<Error = Void>,
{
    fn assert(&mut self) {
        self.0.set_low().void_unwrap();
    }

    fn deassert(&mut self) {
        self.0.set_high().void_unwrap();
    }
}
