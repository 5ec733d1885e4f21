//! SPI-mode SD card driver.
//!
//! Brings a card from power-up into an addressable state and performs
//! CRC-verified single-block reads and writes over a synchronous serial
//! bus. The bus and chip-select line sit behind the [`SdSpi`] and
//! [`ChipSelect`] capabilities, so the driver is independent of any
//! particular HAL; adapters for `embedded-hal` 0.2 peripherals live in
//! [`bus`](crate::bus).

#![cfg_attr(not(test), no_std)]

mod bus;
mod card;
mod cardinfo;
mod cmd;
mod config;
mod constants;
mod crc;
mod debug;
mod init;
mod rwdata;

pub use bus::{
    ChipSelect,
    CsPin,
    HalSpi,
    SdSpi,
};
pub use card::SdCard;
pub use cardinfo::CardDescriptor;
pub use cmd::SdCommand;
pub use config::{
    ConfigError,
    SdConfig,
    WaitLimits,
    VALID_RX_PINS,
};
pub use constants::BLOCK_SIZE;
pub use crc::{
    crc16,
    crc7,
};

/// One variant per failure cause. Every transaction returns its outcome
/// through this type; nothing is wrapped or nested.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SdError {
    /// Card's R1 response was nonzero after a command.
    CommandRejected,
    /// Data-start token never arrived within its poll bound.
    TokenTimeout,
    /// Transferred byte count did not match the block size.
    Inconsistent,
    /// Computed CRC16 over the payload differs from the wire CRC.
    CrcMismatch,
    /// Requested block address at or beyond the card's block count.
    RangeError,
    /// Card's data-response token rejected the written block.
    WriteRejected,
    /// Card stayed busy past the programming-wait bound.
    BusyTimeout,
    /// Initialization handshake exceeded its overall time budget.
    Timeout,
}
