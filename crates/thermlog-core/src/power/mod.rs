//! Power states, reset causes and state retained across deep sleep
//!
//! Deep sleep restarts execution from the boot entry point. The platform
//! reports whether that restart came from power-on ([`ResetCause::Cold`]) or
//! a timer wake ([`ResetCause::Warm`]); everything else that must survive the
//! sleep lives in a small block of sleep-retained memory as a
//! [`RetainedState`].

use log::warn;
use serde::{Deserialize, Serialize};

/// Why execution (re)started at the boot entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetCause {
    /// Power was applied
    Cold,
    /// Woken from deep sleep
    Warm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    AwaitingStart,
    Measuring,
    /// Terminal until power is removed and reapplied
    LowBatteryShutdown,
}

/// What the platform should do once a boot pass returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepRequest {
    /// Deep sleep, waking after exactly this many seconds
    Timed { seconds: u32 },
    /// Deep sleep with no wake source
    Indefinite,
}

/// State that survives deep sleep but not power loss
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetainedState {
    /// Rows attempted since the deployment started
    pub completed_cycles: u32,
    /// Set on low-battery shutdown; cleared only by a cold reset
    pub latched: bool,
}

/// Size of the sleep-retained block
pub const RETAINED_BYTES: usize = 16;

const RETAINED_MAGIC: u16 = 0x7E51;

#[derive(Serialize, Deserialize)]
struct Frame {
    magic: u16,
    state: RetainedState,
}

impl RetainedState {
    pub fn encode(&self) -> [u8; RETAINED_BYTES] {
        let mut bytes = [0u8; RETAINED_BYTES];
        let frame = Frame {
            magic: RETAINED_MAGIC,
            state: *self,
        };
        // Worst case varint frame is 3 + 5 + 1 bytes
        if let Err(e) = postcard::to_slice(&frame, &mut bytes) {
            warn!("Retained state did not encode: {:?}", e);
        }
        bytes
    }

    /// `None` when the block holds anything but a frame written by `encode`
    pub fn decode(bytes: &[u8; RETAINED_BYTES]) -> Option<Self> {
        match postcard::from_bytes::<Frame>(bytes) {
            Ok(frame) if frame.magic == RETAINED_MAGIC => Some(frame.state),
            _ => None,
        }
    }
}

/// Memory that keeps its contents through deep sleep (e.g. RTC fast RAM)
pub trait SleepMemory {
    fn read(&mut self) -> [u8; RETAINED_BYTES];
    fn write(&mut self, bytes: &[u8; RETAINED_BYTES]);
}

impl<T: SleepMemory + ?Sized> SleepMemory for &mut T {
    fn read(&mut self) -> [u8; RETAINED_BYTES] {
        (**self).read()
    }

    fn write(&mut self, bytes: &[u8; RETAINED_BYTES]) {
        (**self).write(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retained_state_survives_encoding() {
        let state = RetainedState {
            completed_cycles: u32::MAX,
            latched: true,
        };
        assert_eq!(RetainedState::decode(&state.encode()), Some(state));
        assert_eq!(
            RetainedState::decode(&RetainedState::default().encode()),
            Some(RetainedState::default())
        );
    }

    #[test]
    fn uninitialised_memory_is_rejected() {
        assert_eq!(RetainedState::decode(&[0u8; RETAINED_BYTES]), None);
        assert_eq!(RetainedState::decode(&[0xFF; RETAINED_BYTES]), None);
    }
}
