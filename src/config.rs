/// Data-in pins that start a valid SPI pin group.
pub const VALID_RX_PINS: [u8; 5] = [0, 4, 8, 12, 16];

/// The stock wiring: data-in on pin 16 (the board default SPI RX).
const STD_RX_PIN: u8 = 16;
const STD_BAUD: u32 = 10_000_000;

const BAUD_MIN: u32 = 100_000;
const BAUD_MAX: u32 = 10_000_000;

/// Hard preconditions on the pin set. Baud range and chip-select pin
/// placement are advisory only (logged, never rejected).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Data-in pin is not one of [`VALID_RX_PINS`].
    InvalidRxPin(u8),
    /// Clock or data-out pin breaks the fixed +2/+3 grouping.
    PinGroupMismatch,
}

/// Named bounds for every polled wait in the protocol. The bus has no
/// out-of-band ready signal, so liveness is inferred entirely from
/// polled byte values and each wait carries its own bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaitLimits {
    /// Wall-clock budget for the card-ready poll before each command.
    pub ready_timeout_ms: u32,
    /// Exchanges to attempt while polling for an R1 response.
    pub r1_polls: u32,
    /// Exchanges to attempt while polling for the data-start token.
    pub token_polls: u32,
    /// Exchanges to attempt while waiting out flash programming.
    pub busy_polls: u32,
    /// Wall-clock budget for the ACMD41 handshake loop.
    pub init_timeout_ms: u32,
    /// Fixed bus rate for the initialization handshake; capacity
    /// negotiation is unreliable at operating speed.
    pub init_baud: u32,
}

impl Default for WaitLimits {
    fn default() -> WaitLimits {
        WaitLimits {
            ready_timeout_ms: 500,
            r1_polls: 1_000,
            token_polls: 100_000,
            busy_polls: 500_000,
            init_timeout_ms: 1_000,
            init_baud: 400_000,
        }
    }
}

/// Bus assignment for one card: the four SPI pins and the operating
/// baud rate. Constructed once before initialization, immutable after.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SdConfig {
    pub rx_pin: u8,
    pub cs_pin: u8,
    pub clk_pin: u8,
    pub tx_pin: u8,
    pub baud: u32,
    pub limits: WaitLimits,
}

impl SdConfig {
    /// Derives the chip-select, clock and data-out pins from the data-in
    /// pin by the fixed SPI pin grouping (+1, +2, +3).
    pub fn new(rx_pin: u8, baud: u32) -> Result<SdConfig, ConfigError> {
        SdConfig::with_pins(
            rx_pin,
            rx_pin.wrapping_add(1),
            rx_pin.wrapping_add(2),
            rx_pin.wrapping_add(3),
            baud,
        )
    }

    /// The default wiring at the full 10 MHz operating rate.
    pub fn std_config() -> Result<SdConfig, ConfigError> {
        SdConfig::new(STD_RX_PIN, STD_BAUD)
    }

    /// Validates an externally chosen pin set. A misplaced chip-select
    /// pin only warns; clock and data-out placement are hard errors.
    pub fn with_pins(
        rx_pin: u8,
        cs_pin: u8,
        clk_pin: u8,
        tx_pin: u8,
        baud: u32,
    ) -> Result<SdConfig, ConfigError> {
        if !VALID_RX_PINS.contains(&rx_pin) {
            log::warn!("SPI rx pin {} is invalid", rx_pin);
            return Err(ConfigError::InvalidRxPin(rx_pin));
        }
        if cs_pin != rx_pin + 1 {
            log::warn!("SPI cs pin {} is not {}", cs_pin, rx_pin + 1);
        }
        if clk_pin != rx_pin + 2 {
            log::warn!("SPI clk pin {} is not {}", clk_pin, rx_pin + 2);
            return Err(ConfigError::PinGroupMismatch);
        }
        if tx_pin != rx_pin + 3 {
            log::warn!("SPI tx pin {} is not {}", tx_pin, rx_pin + 3);
            return Err(ConfigError::PinGroupMismatch);
        }
        if baud < BAUD_MIN || baud > BAUD_MAX {
            log::warn!("SPI baud {} is outside 100 kHz - 10 MHz", baud);
        }
        Ok(SdConfig {
            rx_pin,
            cs_pin,
            clk_pin,
            tx_pin,
            baud,
            limits: WaitLimits::default(),
        })
    }

    /// Which SPI peripheral the pin group belongs to (0 or 1).
    pub fn bus_index(&self) -> u8 {
        (self.rx_pin >> 3) & 0x01
    }
}
