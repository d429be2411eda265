//! Timekeeping strategies for the first column of every row
//!
//! Three strategies are selected at deployment time:
//!
//! - [`AbsoluteTime`] formats the calendar time read from the RTC.
//! - [`ElapsedTime`] subtracts a baseline, persisted at the first cold start,
//!   from the current RTC reading.
//! - [`CycleCountTime`] multiplies the completed cycle count by the log
//!   interval. It needs no RTC but drifts whenever a sleep is inexact or a
//!   cycle is skipped.

mod ds3231;

use core::fmt::Write;

use chrono::{Datelike, NaiveDateTime, Timelike};
use log::{info, warn};
use thiserror_no_std::Error;

pub use ds3231::*;

use crate::config::TimeMode;
use crate::storage::{BaselineStore, StorageError};

/// Formatted time column
pub type Timestamp = heapless::String<24>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeError {
    #[error("clock bus transaction failed")]
    Bus,
    #[error("clock register {register} holds non-BCD value {value}")]
    InvalidRegister { register: u8, value: u8 },
    #[error("clock reports an impossible calendar date")]
    InvalidDate,
    #[error("no elapsed-time baseline has been stored")]
    BaselineMissing,
    #[error("clock epoch {now} precedes baseline {baseline}")]
    BeforeBaseline { now: i64, baseline: i64 },
    #[error("baseline store: {0}")]
    Store(StorageError),
    #[error("timestamp does not fit its buffer")]
    Format,
}

impl From<StorageError> for TimeError {
    fn from(error: StorageError) -> Self {
        Self::Store(error)
    }
}

/// A source of calendar time, typically a battery-backed RTC
pub trait Clock {
    fn now(&mut self) -> Result<NaiveDateTime, TimeError>;
}

impl<T: Clock + ?Sized> Clock for &mut T {
    fn now(&mut self) -> Result<NaiveDateTime, TimeError> {
        (**self).now()
    }
}

/// Produces the time column of each row
pub trait Timekeeper {
    /// Header name of the time column
    fn column(&self) -> &'static str;

    /// Called once per deployment, on the cold start after the start gesture
    fn deploy(&mut self) -> Result<(), TimeError>;

    /// Time column for the cycle that follows `completed_cycles` earlier ones
    fn stamp(&mut self, completed_cycles: u32) -> Result<Timestamp, TimeError>;
}

/// Seconds since the Unix epoch, the clock being kept in UTC
pub fn epoch_seconds(time: &NaiveDateTime) -> i64 {
    time.and_utc().timestamp()
}

/// `YYYY-MM-DD HH:MM:SS`
pub fn format_datetime(time: &NaiveDateTime) -> Result<Timestamp, TimeError> {
    let mut out = Timestamp::new();
    write!(
        out,
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        time.year(),
        time.month(),
        time.day(),
        time.hour(),
        time.minute(),
        time.second()
    )
    .map_err(|_| TimeError::Format)?;
    Ok(out)
}

/// `HHHh:MMm`, hours padded to at least three digits
pub fn format_elapsed(seconds: u64) -> Result<Timestamp, TimeError> {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let mut out = Timestamp::new();
    write!(out, "{:03}h:{:02}m", hours, minutes).map_err(|_| TimeError::Format)?;
    Ok(out)
}

/// Calendar timestamps straight from the RTC
pub struct AbsoluteTime<C> {
    clock: C,
}

impl<C: Clock> AbsoluteTime<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> Timekeeper for AbsoluteTime<C> {
    fn column(&self) -> &'static str {
        "timestamp"
    }

    fn deploy(&mut self) -> Result<(), TimeError> {
        Ok(())
    }

    fn stamp(&mut self, _completed_cycles: u32) -> Result<Timestamp, TimeError> {
        format_datetime(&self.clock.now()?)
    }
}

/// Elapsed time against a baseline persisted once per deployment
pub struct ElapsedTime<C, B> {
    clock: C,
    store: B,
}

impl<C: Clock, B: BaselineStore> ElapsedTime<C, B> {
    pub fn new(clock: C, store: B) -> Self {
        Self { clock, store }
    }

    pub fn baseline(&mut self) -> Result<Option<i64>, TimeError> {
        Ok(self.store.load()?)
    }
}

impl<C: Clock, B: BaselineStore> Timekeeper for ElapsedTime<C, B> {
    fn column(&self) -> &'static str {
        "elapsed"
    }

    fn deploy(&mut self) -> Result<(), TimeError> {
        let baseline = epoch_seconds(&self.clock.now()?);
        self.store.store(baseline)?;
        info!("Elapsed-time baseline captured at epoch {}", baseline);
        Ok(())
    }

    fn stamp(&mut self, _completed_cycles: u32) -> Result<Timestamp, TimeError> {
        let baseline = self.store.load()?.ok_or(TimeError::BaselineMissing)?;
        let now = epoch_seconds(&self.clock.now()?);
        if now < baseline {
            return Err(TimeError::BeforeBaseline { now, baseline });
        }
        format_elapsed((now - baseline) as u64)
    }
}

/// Elapsed time inferred from the number of completed cycles
pub struct CycleCountTime {
    interval_secs: u32,
}

impl CycleCountTime {
    pub fn new(interval_secs: u32) -> Self {
        Self { interval_secs }
    }
}

impl Timekeeper for CycleCountTime {
    fn column(&self) -> &'static str {
        "time_counter"
    }

    fn deploy(&mut self) -> Result<(), TimeError> {
        warn!(
            "No RTC: elapsed time is cycles x {} s and drifts if a sleep is inexact or a cycle is skipped",
            self.interval_secs
        );
        Ok(())
    }

    fn stamp(&mut self, completed_cycles: u32) -> Result<Timestamp, TimeError> {
        format_elapsed(completed_cycles as u64 * self.interval_secs as u64)
    }
}

/// Whichever strategy the deployment selected
pub enum Timebase<C, B> {
    Absolute(AbsoluteTime<C>),
    Elapsed(ElapsedTime<C, B>),
    CycleCounter(CycleCountTime),
}

impl<C: Clock, B: BaselineStore> Timebase<C, B> {
    pub fn new(mode: TimeMode, clock: C, store: B, interval_secs: u32) -> Self {
        match mode {
            TimeMode::Absolute => Self::Absolute(AbsoluteTime::new(clock)),
            TimeMode::Elapsed => Self::Elapsed(ElapsedTime::new(clock, store)),
            TimeMode::CycleCounter => Self::CycleCounter(CycleCountTime::new(interval_secs)),
        }
    }
}

impl<C: Clock, B: BaselineStore> Timekeeper for Timebase<C, B> {
    fn column(&self) -> &'static str {
        match self {
            Self::Absolute(t) => t.column(),
            Self::Elapsed(t) => t.column(),
            Self::CycleCounter(t) => t.column(),
        }
    }

    fn deploy(&mut self) -> Result<(), TimeError> {
        match self {
            Self::Absolute(t) => t.deploy(),
            Self::Elapsed(t) => t.deploy(),
            Self::CycleCounter(t) => t.deploy(),
        }
    }

    fn stamp(&mut self, completed_cycles: u32) -> Result<Timestamp, TimeError> {
        match self {
            Self::Absolute(t) => t.stamp(completed_cycles),
            Self::Elapsed(t) => t.stamp(completed_cycles),
            Self::CycleCounter(t) => t.stamp(completed_cycles),
        }
    }
}
