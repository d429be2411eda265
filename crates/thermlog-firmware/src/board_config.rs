//! Constants of the production board
//!
//! | Signal              | GPIO |
//! |---------------------|------|
//! | Mux common (ADC1)   | 1    |
//! | Battery sense (ADC1)| 2    |
//! | Mux S0, S1, S2      | 4, 5, 6 |
//! | Start input         | 7 (pull-down, active high) |
//! | RTC SDA, SCL        | 8, 9 |
//! | SD CS, MOSI, SCK, MISO | 10, 11, 12, 13 |
//! | Indicator LED       | 21   |

use thermlog_core::config::{BatteryParams, ConfigError, LoggerConfig, ThermistorParams, TimeMode};

/// ADC1 at 11 dB attenuation, 12-bit oneshot
pub const ADC_FULL_SCALE: u16 = 4095;

/// Code substituted for a failed conversion on a thermistor input: a
/// saturated divider, logged as ERR
pub const THERMISTOR_FAULT_CODE: u16 = ADC_FULL_SCALE;
/// Code substituted for a failed conversion on the battery input: an empty
/// cell, so a fault can never mask a low battery
pub const BATTERY_FAULT_CODE: u16 = 0;

pub const I2C_KHZ: u32 = 100;
pub const SD_SPI_KHZ: u32 = 400;

/// Per-channel offsets from the last bench calibration (°C)
pub const CALIBRATION_OFFSETS: [f64; 6] = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0];

pub fn logger_config() -> Result<LoggerConfig, ConfigError> {
    LoggerConfig {
        thermistor: ThermistorParams {
            full_scale: ADC_FULL_SCALE,
            ..ThermistorParams::DEFAULT
        },
        battery: BatteryParams {
            full_scale: ADC_FULL_SCALE,
            ..BatteryParams::DEFAULT
        },
        time_mode: TimeMode::Elapsed,
        ..LoggerConfig::default()
    }
    .with_offsets(&CALIBRATION_OFFSETS)
}
