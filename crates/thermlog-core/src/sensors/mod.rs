//! Analog front end of the logger
//!
//! A single converter is shared between the multiplexed thermistor inputs and
//! the battery sense divider. Every trusted sample is preceded by a discarded
//! conversion so that charge left on the converter's sampling capacitor by the
//! previously selected source cannot bias the result.

mod battery;
mod mux;
mod thermistor;

use thiserror_no_std::Error;

pub use battery::*;
pub use mux::*;
pub use thermistor::*;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("channel {channel} is not addressable")]
    ChannelOutOfRange { channel: u8 },
    #[error("{sensor}: {operation} failed ({details})")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },
}

/// A blocking, single-shot analog input.
///
/// Conversions are total over the input range, so there is no error path:
/// a floating or shorted input simply yields an extreme code which the
/// conversion math then rejects.
pub trait AnalogInput {
    /// Run one conversion and return the raw code
    fn read_raw(&mut self) -> u16;
}

impl<T: AnalogInput + ?Sized> AnalogInput for &mut T {
    fn read_raw(&mut self) -> u16 {
        (**self).read_raw()
    }
}

/// Convert a raw code to volts for a converter with the given reference
#[inline]
pub fn code_to_volts(raw: u16, v_ref: f64, full_scale: u16) -> f64 {
    raw as f64 * (v_ref / full_scale as f64)
}
