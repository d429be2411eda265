//! ESP32-S3 firmware-specific modules for thermlog
//!
//! This crate contains hardware-specific code that cannot compile on desktop
//! targets: ADC1 oneshot conversions, RTC fast memory that survives deep
//! sleep, and the board's pin map and calibration constants.

#![no_std]

extern crate alloc;

pub mod board_config;
pub mod hardware;
