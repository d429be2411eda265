//! Deployment-time configuration
//!
//! Everything in here is fixed when a logger is deployed: the channel count
//! and per-channel calibration, the analog front-end constants, timing of the
//! user-facing signals and which timekeeping strategy produces the first
//! column of every row. Nothing is reconfigured at runtime.

use heapless::Vec;
use serde::Deserialize;
use thiserror_no_std::Error;

/// Number of inputs addressable through the 3-bit analog multiplexer
pub const MAX_CHANNELS: usize = 8;
/// Channels populated on the standard board
pub const DEFAULT_CHANNELS: usize = 6;

/// Errors raised while validating a [`LoggerConfig`]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("channel count {0} is outside 1..=8")]
    ChannelCount(usize),
    #[error("expected {expected} calibration offsets, found {found}")]
    OffsetCount { expected: usize, found: usize },
    #[error("invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// Which strategy produces the time column of each row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeMode {
    /// Calendar timestamp read from the real-time clock
    Absolute,
    /// Duration since a baseline captured at the first cold start
    Elapsed,
    /// Duration inferred from the completed cycle count (no RTC fitted)
    CycleCounter,
}

/// Column set written to the record sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowLayout {
    /// Time, one temperature per channel, battery percentage
    Compact,
    /// Time, raw/volts/ohms/celsius per channel, full battery breakdown
    Detailed,
}

/// Constants of the thermistor divider and its Steinhart–Hart model
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ThermistorParams {
    /// Supply/reference voltage across the divider (V)
    pub v_ref: f64,
    /// Largest code the converter reports
    pub full_scale: u16,
    /// Fixed resistor on the supply side of the divider (Ω)
    pub pullup_ohms: f64,
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl ThermistorParams {
    /// 10 kΩ NTC on a 10 kΩ pull-up, 16-bit converter at 3.3 V
    pub const DEFAULT: Self = Self {
        v_ref: 3.3,
        full_scale: 65535,
        pullup_ohms: 10_000.0,
        a: 1.129148e-3,
        b: 2.34125e-4,
        c: 8.76741e-8,
    };
}

impl Default for ThermistorParams {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Constants of the battery sense divider and the SOC mapping
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct BatteryParams {
    pub v_ref: f64,
    pub full_scale: u16,
    /// Resistor between the battery and the sense node (Ω)
    pub r_top_ohms: f64,
    /// Resistor between the sense node and ground (Ω)
    pub r_bottom_ohms: f64,
    /// Battery voltage reported as 0 %
    pub empty_volts: f64,
    /// Battery voltage reported as 100 %
    pub full_volts: f64,
}

impl BatteryParams {
    /// Single Li-ion cell behind an equal-value divider
    pub const DEFAULT: Self = Self {
        v_ref: 3.3,
        full_scale: 65535,
        r_top_ohms: 10_000.0,
        r_bottom_ohms: 10_000.0,
        empty_volts: 3.0,
        full_volts: 4.2,
    };
}

impl Default for BatteryParams {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Physical delays and indicator patterns, all in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Multiplexer output settle plus coupling-capacitor charge time
    pub settle_ms: u32,
    /// Pause between the dummy and the real conversion
    pub self_heat_ms: u32,
    /// Start-input polling period while awaiting deployment
    pub start_poll_ms: u32,
    pub start_blinks: u8,
    pub blink_ms: u32,
    /// Indicator pulse after every appended row
    pub ack_pulse_ms: u32,
    /// Sustained indicator before the low-battery shutdown
    pub low_battery_warning_ms: u32,
    pub error_blinks: u8,
    pub error_blink_ms: u32,
    pub storage_retries: u8,
    pub storage_retry_ms: u32,
}

impl TimingConfig {
    pub const DEFAULT: Self = Self {
        settle_ms: 30,
        self_heat_ms: 5,
        start_poll_ms: 100,
        start_blinks: 3,
        blink_ms: 200,
        ack_pulse_ms: 100,
        low_battery_warning_ms: 5_000,
        error_blinks: 5,
        error_blink_ms: 80,
        storage_retries: 3,
        storage_retry_ms: 2_000,
    };
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Complete deployment configuration of one logger
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Deep-sleep duration between measurement cycles
    pub log_interval_secs: u32,
    /// Shut down once state of charge is at or below this percentage
    pub low_battery_threshold_pct: f64,
    pub channel_count: u8,
    /// One offset (°C) per channel, indexed by channel number
    pub calibration_offsets: Vec<f64, MAX_CHANNELS>,
    pub thermistor: ThermistorParams,
    pub battery: BatteryParams,
    pub timing: TimingConfig,
    pub time_mode: TimeMode,
    pub row_layout: RowLayout,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_interval_secs: 300,
            low_battery_threshold_pct: 10.0,
            channel_count: DEFAULT_CHANNELS as u8,
            calibration_offsets: Vec::from_array([0.0; DEFAULT_CHANNELS]),
            thermistor: ThermistorParams::DEFAULT,
            battery: BatteryParams::DEFAULT,
            timing: TimingConfig::DEFAULT,
            time_mode: TimeMode::Elapsed,
            row_layout: RowLayout::Compact,
        }
    }
}

impl LoggerConfig {
    /// Replace the channel set with one channel per offset
    pub fn with_offsets(mut self, offsets: &[f64]) -> Result<Self, ConfigError> {
        if offsets.is_empty() || offsets.len() > MAX_CHANNELS {
            return Err(ConfigError::ChannelCount(offsets.len()));
        }
        self.calibration_offsets.clear();
        for &offset in offsets {
            self.calibration_offsets
                .push(offset)
                .map_err(|_| ConfigError::ChannelCount(offsets.len()))?;
        }
        self.channel_count = offsets.len() as u8;
        Ok(self)
    }

    /// Check every constant and build the channel table
    pub fn validate(&self) -> Result<ChannelTable, ConfigError> {
        if self.log_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "log_interval_secs",
                reason: "must be at least one second",
            });
        }
        if !(0.0..100.0).contains(&self.low_battery_threshold_pct) {
            return Err(ConfigError::Invalid {
                field: "low_battery_threshold_pct",
                reason: "must be within 0..100",
            });
        }

        let t = &self.thermistor;
        if !(t.v_ref > 0.0) || t.full_scale == 0 || !(t.pullup_ohms > 0.0) {
            return Err(ConfigError::Invalid {
                field: "thermistor",
                reason: "reference, full scale and pull-up must be positive",
            });
        }
        if !(t.a.is_finite() && t.b.is_finite() && t.c.is_finite()) {
            return Err(ConfigError::Invalid {
                field: "thermistor",
                reason: "Steinhart-Hart coefficients must be finite",
            });
        }

        let b = &self.battery;
        if !(b.v_ref > 0.0) || b.full_scale == 0 || !(b.r_bottom_ohms > 0.0) || b.r_top_ohms < 0.0 {
            return Err(ConfigError::Invalid {
                field: "battery",
                reason: "reference, full scale and divider must be positive",
            });
        }
        if !(b.full_volts > b.empty_volts) {
            return Err(ConfigError::Invalid {
                field: "battery",
                reason: "full voltage must exceed empty voltage",
            });
        }

        let table = ChannelTable::from_offsets(&self.calibration_offsets)?;
        if table.len() != self.channel_count as usize {
            return Err(ConfigError::OffsetCount {
                expected: self.channel_count as usize,
                found: table.len(),
            });
        }
        Ok(table)
    }
}

/// One physical thermistor input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelConfig {
    pub index: u8,
    pub calibration_offset: f64,
}

/// Calibration table indexed by channel number, exhaustive over 0..N-1
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelTable {
    channels: Vec<ChannelConfig, MAX_CHANNELS>,
}

impl ChannelTable {
    pub fn from_offsets(offsets: &[f64]) -> Result<Self, ConfigError> {
        if offsets.is_empty() || offsets.len() > MAX_CHANNELS {
            return Err(ConfigError::ChannelCount(offsets.len()));
        }

        let mut channels = Vec::new();
        for (index, &calibration_offset) in offsets.iter().enumerate() {
            if !calibration_offset.is_finite() {
                return Err(ConfigError::Invalid {
                    field: "calibration_offsets",
                    reason: "offsets must be finite",
                });
            }
            channels
                .push(ChannelConfig {
                    index: index as u8,
                    calibration_offset,
                })
                .map_err(|_| ConfigError::ChannelCount(offsets.len()))?;
        }
        Ok(Self { channels })
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn get(&self, channel: u8) -> Option<&ChannelConfig> {
        self.channels.get(channel as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelConfig> {
        self.channels.iter()
    }
}
