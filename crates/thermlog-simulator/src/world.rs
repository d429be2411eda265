//! Simulated environment and peripherals
//!
//! One shared [`World`] holds simulated time, the multiplexer address, the
//! battery and the sleep-retained block. Every peripheral handle is a thin
//! view into it, so a fresh [`Board`] can be built on each boot the way the
//! firmware rebuilds its peripherals after deep sleep.

use std::cell::RefCell;
use std::convert::Infallible;
use std::f64::consts::TAU;
use std::rc::Rc;

use chrono::{DateTime, NaiveDateTime};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, InputPin, OutputPin};
use log::{debug, trace};
use serde::Deserialize;

use thermlog_core::board::Indicator;
use thermlog_core::config::{BatteryParams, ConfigError, ThermistorParams};
use thermlog_core::power::RETAINED_BYTES;
use thermlog_core::sensors::{AnalogInput, BatteryMonitor, ChannelSelector, ThermistorSampler};
use thermlog_core::time::{Clock, TimeError};
use thermlog_core::{Board, LoggerConfig, SleepMemory};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Environment the simulated logger is deployed into
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Wall-clock time at power-on, seconds since the Unix epoch
    pub start_epoch: i64,
    /// Mean temperature (°C)
    pub ambient_c: f64,
    /// Amplitude of the daily temperature swing (°C)
    pub daily_swing_c: f64,
    /// Added per channel index, so channels are distinguishable (°C)
    pub channel_step_c: f64,
    /// Channels wired as an open circuit
    pub failed_channels: Vec<u8>,
    pub battery_start_volts: f64,
    /// Drop in battery voltage over each sleep
    pub battery_drain_volts: f64,
    /// Start-input polls before the operator presses start
    pub start_after_polls: u32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            // 2026-01-01T00:00:00Z
            start_epoch: 1_767_225_600,
            ambient_c: 21.0,
            daily_swing_c: 4.0,
            channel_step_c: 0.5,
            failed_channels: Vec::new(),
            battery_start_volts: 4.1,
            battery_drain_volts: 0.002,
            start_after_polls: 5,
        }
    }
}

struct World {
    config: WorldConfig,
    elapsed_ns: u64,
    address: u8,
    battery_volts: f64,
    start_polls: u32,
    led_on: bool,
    led_pulses: u32,
    retained: [u8; RETAINED_BYTES],
}

impl World {
    fn elapsed_secs(&self) -> f64 {
        self.elapsed_ns as f64 / 1e9
    }

    fn temperature(&self, channel: u8) -> f64 {
        let phase = TAU * self.elapsed_secs() / SECONDS_PER_DAY;
        self.config.ambient_c
            + self.config.daily_swing_c * phase.sin()
            + self.config.channel_step_c * channel as f64
    }
}

/// Handle on the shared simulation state
#[derive(Clone)]
pub struct SimWorld {
    inner: Rc<RefCell<World>>,
    thermistor: ThermistorParams,
    battery: BatteryParams,
}

pub type SimBoard = Board<MuxCommon, BatteryTap, MuxLine, Led, StartButton, SimDelay>;

impl SimWorld {
    pub fn new(config: WorldConfig, logger: &LoggerConfig) -> Self {
        let battery_volts = config.battery_start_volts;
        Self {
            inner: Rc::new(RefCell::new(World {
                config,
                elapsed_ns: 0,
                address: 0,
                battery_volts,
                start_polls: 0,
                led_on: false,
                led_pulses: 0,
                // Power-on contents of RTC RAM are arbitrary
                retained: [0xFF; RETAINED_BYTES],
            })),
            thermistor: logger.thermistor,
            battery: logger.battery,
        }
    }

    /// Peripherals as the firmware would assemble them after a reset
    pub fn board(&self, logger: &LoggerConfig) -> Result<SimBoard, ConfigError> {
        let channels = logger.validate()?;
        let lines = [0, 1, 2].map(|bit| MuxLine {
            world: self.inner.clone(),
            bit,
        });

        Ok(Board {
            thermistors: ThermistorSampler::new(
                MuxCommon {
                    world: self.inner.clone(),
                    params: self.thermistor,
                },
                ChannelSelector::new(lines),
                self.thermistor,
                channels,
                logger.timing.settle_ms,
                logger.timing.self_heat_ms,
            ),
            battery: BatteryMonitor::new(
                BatteryTap {
                    world: self.inner.clone(),
                    params: self.battery,
                },
                self.battery,
            ),
            indicator: Indicator::new(Led {
                world: self.inner.clone(),
            }),
            start: StartButton {
                world: self.inner.clone(),
            },
            delay: SimDelay {
                world: self.inner.clone(),
            },
        })
    }

    pub fn clock(&self) -> SimRtc {
        SimRtc {
            world: self.inner.clone(),
        }
    }

    pub fn memory(&self) -> SimMemory {
        SimMemory {
            world: self.inner.clone(),
        }
    }

    /// Deep sleep: time passes and the battery drains
    pub fn sleep(&self, seconds: u32) {
        let mut world = self.inner.borrow_mut();
        world.elapsed_ns += seconds as u64 * 1_000_000_000;
        world.battery_volts -= world.config.battery_drain_volts;
        world.start_polls = 0;
        debug!(
            "Slept {} s, battery now {:.3} V",
            seconds, world.battery_volts
        );
    }

    pub fn now(&self) -> Option<NaiveDateTime> {
        let world = self.inner.borrow();
        let secs = world.config.start_epoch + (world.elapsed_ns / 1_000_000_000) as i64;
        DateTime::from_timestamp(secs, 0).map(|t| t.naive_utc())
    }

    pub fn battery_volts(&self) -> f64 {
        self.inner.borrow().battery_volts
    }

    /// Indicator turn-ons since power-on
    pub fn led_pulses(&self) -> u32 {
        self.inner.borrow().led_pulses
    }
}

/// One multiplexer address line
pub struct MuxLine {
    world: Rc<RefCell<World>>,
    bit: u8,
}

impl digital::ErrorType for MuxLine {
    type Error = Infallible;
}

impl OutputPin for MuxLine {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.world.borrow_mut().address &= !(1 << self.bit);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.world.borrow_mut().address |= 1 << self.bit;
        Ok(())
    }
}

/// Converter input on the multiplexer's common output
pub struct MuxCommon {
    world: Rc<RefCell<World>>,
    params: ThermistorParams,
}

impl AnalogInput for MuxCommon {
    fn read_raw(&mut self) -> u16 {
        let world = self.world.borrow();
        let channel = world.address;
        if world.config.failed_channels.contains(&channel) {
            // Open thermistor pulls the node to the reference
            return self.params.full_scale;
        }
        let celsius = world.temperature(channel);
        let code = self.params.code_at(celsius).unwrap_or(self.params.full_scale);
        trace!("ch{} at {:.2} °C -> {}", channel, celsius, code);
        code
    }
}

/// Converter input on the battery sense divider
pub struct BatteryTap {
    world: Rc<RefCell<World>>,
    params: BatteryParams,
}

impl AnalogInput for BatteryTap {
    fn read_raw(&mut self) -> u16 {
        let volts = self.world.borrow().battery_volts / self.params.scale();
        let code = (volts / self.params.v_ref * self.params.full_scale as f64).round();
        code.clamp(0.0, self.params.full_scale as f64) as u16
    }
}

pub struct Led {
    world: Rc<RefCell<World>>,
}

impl digital::ErrorType for Led {
    type Error = Infallible;
}

impl OutputPin for Led {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.world.borrow_mut().led_on = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        let mut world = self.world.borrow_mut();
        if !world.led_on {
            world.led_pulses += 1;
        }
        world.led_on = true;
        Ok(())
    }
}

/// Start button, pressed after a configured number of polls
pub struct StartButton {
    world: Rc<RefCell<World>>,
}

impl digital::ErrorType for StartButton {
    type Error = Infallible;
}

impl InputPin for StartButton {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        let mut world = self.world.borrow_mut();
        world.start_polls += 1;
        Ok(world.start_polls > world.config.start_after_polls)
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        self.is_high().map(|high| !high)
    }
}

/// Busy-wait stand-in that advances simulated time instead
pub struct SimDelay {
    world: Rc<RefCell<World>>,
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.world.borrow_mut().elapsed_ns += ns as u64;
    }
}

/// Battery-backed RTC that keeps running through sleep
pub struct SimRtc {
    world: Rc<RefCell<World>>,
}

impl Clock for SimRtc {
    fn now(&mut self) -> Result<NaiveDateTime, TimeError> {
        let world = self.world.borrow();
        let secs = world.config.start_epoch + (world.elapsed_ns / 1_000_000_000) as i64;
        DateTime::from_timestamp(secs, 0)
            .map(|t| t.naive_utc())
            .ok_or(TimeError::InvalidDate)
    }
}

/// RTC RAM block kept across simulated deep sleep
pub struct SimMemory {
    world: Rc<RefCell<World>>,
}

impl SleepMemory for SimMemory {
    fn read(&mut self) -> [u8; RETAINED_BYTES] {
        self.world.borrow().retained
    }

    fn write(&mut self, bytes: &[u8; RETAINED_BYTES]) {
        self.world.borrow_mut().retained = *bytes;
    }
}
