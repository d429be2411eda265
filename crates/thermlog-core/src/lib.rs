//! Hardware-independent core library for thermlog
//!
//! This crate contains all platform-agnostic logic for the thermlog
//! multi-channel NTC data logger: the analog sampling chain, battery
//! monitoring, timekeeping strategies, CSV row assembly, SD card storage and
//! the power/lifecycle state machine that sequences a measurement cycle.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets (ESP32-S3) and desktop hosts (for the simulator and tests).

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod board;
pub mod config;
pub mod logger;
pub mod power;
pub mod sensors;
pub mod storage;
pub mod time;

#[cfg(test)]
mod testing;

pub use board::{Board, Hardware};
pub use config::{ChannelConfig, ChannelTable, ConfigError, LoggerConfig, RowLayout, TimeMode};
pub use logger::{Logger, LoggerError};
pub use power::{PowerState, ResetCause, RetainedState, SleepMemory, SleepRequest};
