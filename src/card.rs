use crate::bus::{
    ChipSelect,
    SdSpi,
};
use crate::cardinfo::CardDescriptor;
use crate::config::SdConfig;
use crate::constants::FILL;
use core::ops::{
    Deref,
    DerefMut,
};

/// One SPI-attached SD card. Owns the bus and chip-select line for its
/// lifetime; the driver is single-caller and transactions never
/// overlap.
pub struct SdCard<SPI: SdSpi, CS: ChipSelect> {
    pub(crate) spi: SPI,
    pub(crate) cs: CS,
    pub(crate) config: SdConfig,
    pub(crate) descriptor: CardDescriptor,
    pub(crate) millis: fn() -> u32,
}

impl<SPI: SdSpi, CS: ChipSelect> SdCard<SPI, CS> {
    /// Wraps the transport. The card is not usable until
    /// [`init`](SdCard::init) has run. `millis` is a monotonic
    /// millisecond clock for the wall-clock waits.
    pub fn new(spi: SPI, cs: CS, config: SdConfig, millis: fn() -> u32) -> SdCard<SPI, CS> {
        let mut card = SdCard {
            spi,
            cs,
            config,
            descriptor: CardDescriptor::default(),
            millis,
        };
        card.cs.deassert();
        card
    }

    /// Facts learned from the card during initialization; zeroed before
    /// then.
    pub fn descriptor(&self) -> &CardDescriptor {
        &self.descriptor
    }

    pub fn config(&self) -> &SdConfig {
        &self.config
    }

    pub fn release(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }

    pub(crate) fn transfer(&mut self, byte: u8) -> u8 {
        self.spi.transfer(byte)
    }

    /// Asserts chip select for one transaction. Dropping the session
    /// deasserts the line and clocks one trailing fill byte so the card
    /// releases its output line, on every exit path.
    pub(crate) fn session(&mut self) -> Session<'_, SPI, CS> {
        self.cs.assert();
        Session { card: self }
    }
}

pub(crate) struct Session<'a, SPI: SdSpi, CS: ChipSelect> {
    card: &'a mut SdCard<SPI, CS>,
}

impl<'a, SPI: SdSpi, CS: ChipSelect> Deref for Session<'a, SPI, CS> {
    type Target = SdCard<SPI, CS>;

    fn deref(&self) -> &SdCard<SPI, CS> {
        self.card
    }
}

impl<'a, SPI: SdSpi, CS: ChipSelect> DerefMut for Session<'a, SPI, CS> {
    fn deref_mut(&mut self) -> &mut SdCard<SPI, CS> {
        self.card
    }
}

impl<'a, SPI: SdSpi, CS: ChipSelect> Drop for Session<'a, SPI, CS> {
    fn drop(&mut self) {
        self.card.cs.deassert();
        self.card.spi.transfer(FILL);
    }
}
