//! Power/lifecycle controller
//!
//! Every wake from deep sleep re-enters [`Logger::boot`] from the top. A boot
//! pass restores what survived the sleep, opens storage, waits for the start
//! gesture on a cold start, runs exactly one measurement cycle and returns the
//! sleep the platform should enter next. Nothing here blocks except the
//! start-input poll and the indicator timings.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use log::{debug, error, info, warn};
use thiserror_no_std::Error;

use crate::board::Hardware;
use crate::config::{ConfigError, LoggerConfig, TimingConfig};
use crate::power::{PowerState, ResetCause, RetainedState, SleepMemory, SleepRequest};
use crate::sensors::{BatteryReading, ThermistorReading};
use crate::storage::{LogRow, RecordSink, StorageError};
use crate::time::Timekeeper;

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("invalid configuration: {0}")]
    Config(ConfigError),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(StorageError),
}

impl From<ConfigError> for LoggerError {
    fn from(error: ConfigError) -> Self {
        Self::Config(error)
    }
}

/// Sequences start-up, measurement and shutdown across deep-sleep cycles.
///
/// `T` produces the time column, `S` receives CSV lines and `M` holds the
/// [`RetainedState`] through sleep.
pub struct Logger<T, S, M> {
    config: LoggerConfig,
    channel_count: usize,
    header: String,
    timebase: T,
    sink: S,
    memory: M,
    state: PowerState,
    retained: RetainedState,
}

impl<T, S, M> Logger<T, S, M>
where
    T: Timekeeper,
    S: RecordSink,
    M: SleepMemory,
{
    pub fn new(config: LoggerConfig, timebase: T, sink: S, memory: M) -> Result<Self, LoggerError> {
        let channels = config.validate()?;
        let header =
            LogRow::header(config.row_layout, timebase.column(), channels.len()).to_string();

        Ok(Self {
            config,
            channel_count: channels.len(),
            header,
            timebase,
            sink,
            memory,
            state: PowerState::AwaitingStart,
            retained: RetainedState::default(),
        })
    }

    pub fn state(&self) -> PowerState {
        self.state
    }

    pub fn retained(&self) -> RetainedState {
        self.retained
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    /// One pass from the boot entry point to the next sleep
    pub fn boot<H: Hardware>(&mut self, hw: &mut H, cause: ResetCause) -> SleepRequest {
        if hw.channel_count() != self.channel_count {
            warn!(
                "Board has {} channels, configuration expects {}",
                hw.channel_count(),
                self.channel_count
            );
        }

        match cause {
            ResetCause::Cold => {
                info!("Cold start, awaiting deployment");
                self.retained = RetainedState::default();
                self.persist();
                self.state = PowerState::AwaitingStart;
            }
            ResetCause::Warm => {
                self.retained = self.restore();
                if self.retained.latched {
                    info!("Low-battery latch set, returning to sleep");
                    self.state = PowerState::LowBatteryShutdown;
                    return SleepRequest::Indefinite;
                }
                debug!("Warm start after {} cycles", self.retained.completed_cycles);
                self.state = PowerState::Measuring;
            }
        }

        let storage_ready = match self.open_storage(hw) {
            Ok(()) => true,
            Err(e) if cause == ResetCause::Cold => {
                error!("Halting: {}", e);
                return SleepRequest::Indefinite;
            }
            Err(e) => {
                // Already deployed, keep cycling
                error!("{}, row will not be written this cycle", e);
                false
            }
        };

        if self.state == PowerState::AwaitingStart {
            self.deploy(hw);
        }

        self.measure(hw, storage_ready)
    }

    fn restore(&mut self) -> RetainedState {
        RetainedState::decode(&self.memory.read()).unwrap_or_else(|| {
            warn!("Retained state lost across sleep, counting from zero");
            RetainedState::default()
        })
    }

    fn persist(&mut self) {
        self.memory.write(&self.retained.encode());
    }

    fn open_storage<H: Hardware>(&mut self, hw: &mut H) -> Result<(), LoggerError> {
        let timing = self.config.timing;
        let mut attempt = 0;

        loop {
            let error = match self.sink.ensure_header(&self.header) {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            signal_error(hw, &timing);
            if attempt >= timing.storage_retries {
                return Err(LoggerError::StorageUnavailable(error));
            }
            attempt += 1;
            warn!(
                "Storage not ready ({}), retry {}/{}",
                error, attempt, timing.storage_retries
            );
            hw.delay_ms(timing.storage_retry_ms);
        }
    }

    /// Wait for the start gesture, acknowledge it and fix the time base
    fn deploy<H: Hardware>(&mut self, hw: &mut H) {
        let timing = self.config.timing;

        while !hw.start_asserted() {
            hw.delay_ms(timing.start_poll_ms);
        }
        info!("Start asserted");
        hw.blink(timing.start_blinks, timing.blink_ms, timing.blink_ms);

        if let Err(e) = self.timebase.deploy() {
            // Rows still get written, with the time column as a sentinel
            error!("Time base not established: {}", e);
            signal_error(hw, &timing);
        }
        self.state = PowerState::Measuring;
    }

    fn measure<H: Hardware>(&mut self, hw: &mut H, storage_ready: bool) -> SleepRequest {
        let battery = hw.sample_battery();
        if battery.state_of_charge <= self.config.low_battery_threshold_pct {
            return self.shut_down(hw, &battery);
        }

        let timestamp = self
            .timebase
            .stamp(self.retained.completed_cycles)
            .map_err(|e| warn!("No timestamp this cycle: {}", e))
            .ok();

        let readings: Vec<ThermistorReading> = (0..self.channel_count as u8)
            .map(|channel| hw.sample_thermistor(channel))
            .collect();

        let row = LogRow::from_cycle(
            self.config.row_layout,
            timestamp.as_ref().map(|t| t.as_str()),
            &readings,
            &battery,
        )
        .to_string();
        if !storage_ready {
            warn!("Row skipped: {}", row);
        } else {
            match self.sink.append(&row) {
                Ok(()) => debug!("Logged: {}", row),
                Err(e) => error!("Row lost: {}", e),
            }
        }

        self.retained.completed_cycles = self.retained.completed_cycles.saturating_add(1);
        self.persist();
        hw.pulse(self.config.timing.ack_pulse_ms);

        SleepRequest::Timed {
            seconds: self.config.log_interval_secs,
        }
    }

    fn shut_down<H: Hardware>(&mut self, hw: &mut H, battery: &BatteryReading) -> SleepRequest {
        warn!(
            "Battery at {:.0} % ({:.2} V), threshold {:.0} %: shutting down",
            battery.state_of_charge,
            battery.battery_voltage,
            self.config.low_battery_threshold_pct
        );
        hw.pulse(self.config.timing.low_battery_warning_ms);

        self.retained.latched = true;
        self.persist();
        self.state = PowerState::LowBatteryShutdown;
        SleepRequest::Indefinite
    }
}

fn signal_error<H: Hardware>(hw: &mut H, timing: &TimingConfig) {
    hw.blink(
        timing.error_blinks,
        timing.error_blink_ms,
        timing.error_blink_ms,
    );
}
