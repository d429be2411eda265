use embedded_hal::digital::{OutputPin, PinState};
use log::error;

use super::SensorError;

/// Number of address lines driving the multiplexer
pub const ADDRESS_LINES: usize = 3;

/// Drives the three address lines of an 8:1 analog multiplexer.
///
/// Line `i` carries bit `i` of the channel number. After every `select` the
/// caller must wait for the multiplexer output to settle before trusting a
/// conversion.
pub struct ChannelSelector<P> {
    lines: [P; ADDRESS_LINES],
    selected: Option<u8>,
}

impl<P: OutputPin> ChannelSelector<P> {
    /// Take ownership of the address lines, ordered S0, S1, S2
    pub fn new(lines: [P; ADDRESS_LINES]) -> Self {
        Self {
            lines,
            selected: None,
        }
    }

    /// Route `channel` (0..=7) to the common output
    pub fn select(&mut self, channel: u8) -> Result<(), SensorError> {
        if channel as usize >= 1 << ADDRESS_LINES {
            return Err(SensorError::ChannelOutOfRange { channel });
        }

        for (bit, line) in self.lines.iter_mut().enumerate() {
            let state = PinState::from((channel >> bit) & 1 == 1);
            line.set_state(state).map_err(|e| {
                error!("Mux address line S{} failed: {:?}", bit, e);
                SensorError::ReadFailed {
                    sensor: "mux",
                    operation: "drive address line",
                    details: "GPIO driver error",
                }
            })?;
        }

        self.selected = Some(channel);
        Ok(())
    }

    /// Channel routed by the last successful `select`
    pub fn selected(&self) -> Option<u8> {
        self.selected
    }

    pub fn release(self) -> [P; ADDRESS_LINES] {
        self.lines
    }
}
