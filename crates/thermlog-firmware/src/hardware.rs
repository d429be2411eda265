//! Hardware initialization and bindings for the logger board
//!
//! Everything here is rebuilt on every boot: deep sleep powers down the
//! digital domain, so peripherals are configured from scratch each time.
//! Only [`RtcRetained`] carries state from one boot to the next.

use core::cell::RefCell;

use esp_hal::Blocking;
use esp_hal::analog::adc::{Adc, AdcChannel, AdcPin};
use esp_hal::gpio::interconnect::{PeripheralInput, PeripheralOutput};
use esp_hal::i2c::master::{Config as I2cConfig, ConfigError as I2cConfigError, I2c};
use esp_hal::peripherals::{ADC1, I2C0, SPI2};
use esp_hal::rtc_cntl::SocResetReason;
use esp_hal::spi::master::{Config as SpiConfig, ConfigError as SpiConfigError, Spi};
use esp_hal::time::Rate;
use log::{error, warn};

use thermlog_core::power::{RETAINED_BYTES, ResetCause, SleepMemory};
use thermlog_core::sensors::AnalogInput;

use crate::board_config::{I2C_KHZ, SD_SPI_KHZ};

pub type SharedAdc = RefCell<Adc<'static, ADC1<'static>, Blocking>>;

/// One ADC1 input; the converter itself is shared with the other inputs.
///
/// A failed conversion reads as `fault_code`, which each input picks so the
/// fault lands on its safe side.
pub struct SharedAdcInput<'a, PIN> {
    adc: &'a SharedAdc,
    pin: AdcPin<PIN, ADC1<'static>>,
    fault_code: u16,
}

impl<'a, PIN> SharedAdcInput<'a, PIN> {
    pub fn new(adc: &'a SharedAdc, pin: AdcPin<PIN, ADC1<'static>>, fault_code: u16) -> Self {
        Self {
            adc,
            pin,
            fault_code,
        }
    }
}

impl<PIN: AdcChannel> AnalogInput for SharedAdcInput<'_, PIN> {
    fn read_raw(&mut self) -> u16 {
        let mut adc = self.adc.borrow_mut();
        match nb::block!(adc.read_oneshot(&mut self.pin)) {
            Ok(code) => code,
            Err(e) => {
                error!("ADC conversion failed: {:?}", e);
                self.fault_code
            }
        }
    }
}

/// Only a power-on reset starts a new deployment. Brownout, watchdog and
/// software resets resume the current one.
pub fn reset_cause(reason: Option<SocResetReason>) -> ResetCause {
    match reason {
        Some(SocResetReason::ChipPowerOn) => ResetCause::Cold,
        Some(SocResetReason::CoreDeepSleep) => ResetCause::Warm,
        other => {
            warn!("Reset by {:?}, resuming deployment", other);
            ResetCause::Warm
        }
    }
}

#[esp_hal::ram(unstable(rtc_fast, persistent))]
static mut RETAINED: [u8; RETAINED_BYTES] = [0; RETAINED_BYTES];

/// RTC fast memory block that keeps its contents through deep sleep.
///
/// After power-on the block holds whatever the RAM powered up with; the
/// decoder's magic check rejects it.
pub struct RtcRetained {
    _private: (),
}

impl RtcRetained {
    /// Only one handle may exist; call once per boot.
    pub fn take() -> Self {
        Self { _private: () }
    }
}

impl SleepMemory for RtcRetained {
    fn read(&mut self) -> [u8; RETAINED_BYTES] {
        // SAFETY: single core, no interrupts touch RETAINED, one handle
        unsafe { (&raw const RETAINED).read_volatile() }
    }

    fn write(&mut self, bytes: &[u8; RETAINED_BYTES]) {
        // SAFETY: as above
        unsafe { (&raw mut RETAINED).write_volatile(*bytes) }
    }
}

/// Fixed FAT timestamp for files the logger creates; row times come from
/// the time base
pub struct FixedTimeSource;

impl embedded_sdmmc::TimeSource for FixedTimeSource {
    fn get_timestamp(&self) -> embedded_sdmmc::Timestamp {
        embedded_sdmmc::Timestamp {
            year_since_1970: 56,
            zero_indexed_month: 0,
            zero_indexed_day: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }
}

/// Initialize the blocking I2C bus the RTC sits on
pub fn create_i2c_bus(
    i2c0: I2C0<'static>,
    sda: impl PeripheralOutput<'static>,
    scl: impl PeripheralOutput<'static>,
) -> Result<I2c<'static, Blocking>, I2cConfigError> {
    Ok(I2c::new(
        i2c0,
        I2cConfig::default().with_frequency(Rate::from_khz(I2C_KHZ)),
    )?
    .with_sda(sda)
    .with_scl(scl))
}

/// Initialize the SPI bus for the SD card, at the card's init-safe rate
pub fn create_sd_spi_bus(
    spi2: SPI2<'static>,
    sck: impl PeripheralOutput<'static>,
    mosi: impl PeripheralOutput<'static>,
    miso: impl PeripheralInput<'static>,
) -> Result<Spi<'static, Blocking>, SpiConfigError> {
    Ok(Spi::new(
        spi2,
        SpiConfig::default().with_frequency(Rate::from_khz(SD_SPI_KHZ)),
    )?
    .with_sck(sck)
    .with_mosi(mosi)
    .with_miso(miso))
}

/// Wrap an SPI device and a delay into an SD card driver
pub fn init_spi_hardware<S, D>(sd_card_spi: S, delay: D) -> embedded_sdmmc::SdCard<S, D>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
{
    embedded_sdmmc::SdCard::new(sd_card_spi, delay)
}
