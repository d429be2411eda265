//! Hardware context handed to the lifecycle controller
//!
//! All peripheral handles are gathered once at start-up into a [`Board`] and
//! passed by `&mut` to the controller; nothing in the core reaches for a
//! global. The controller only sees the [`Hardware`] trait, which keeps it
//! testable against scripted fakes.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use log::{error, warn};

use crate::sensors::{
    AnalogInput, BatteryMonitor, BatteryReading, ThermistorReading, ThermistorSampler,
};

/// Capabilities one measurement cycle needs
pub trait Hardware {
    fn channel_count(&self) -> usize;
    fn sample_thermistor(&mut self, channel: u8) -> ThermistorReading;
    fn sample_battery(&mut self) -> BatteryReading;
    /// Level of the start input, idle low
    fn start_asserted(&mut self) -> bool;
    fn set_indicator(&mut self, on: bool);
    fn delay_ms(&mut self, ms: u32);

    fn blink(&mut self, count: u8, on_ms: u32, off_ms: u32) {
        for _ in 0..count {
            self.set_indicator(true);
            self.delay_ms(on_ms);
            self.set_indicator(false);
            self.delay_ms(off_ms);
        }
    }

    /// Indicator on for `ms`, then off
    fn pulse(&mut self, ms: u32) {
        self.set_indicator(true);
        self.delay_ms(ms);
        self.set_indicator(false);
    }
}

/// Visual indicator; driver errors are logged and otherwise ignored
pub struct Indicator<L> {
    led: L,
}

impl<L: OutputPin> Indicator<L> {
    pub fn new(led: L) -> Self {
        Self { led }
    }

    pub fn set(&mut self, on: bool) {
        let result = if on {
            self.led.set_high()
        } else {
            self.led.set_low()
        };
        if let Err(e) = result {
            warn!("Indicator output failed: {:?}", e);
        }
    }
}

/// Every peripheral of a deployed logger
pub struct Board<TA, BA, P, L, I, D> {
    pub thermistors: ThermistorSampler<TA, P>,
    pub battery: BatteryMonitor<BA>,
    pub indicator: Indicator<L>,
    pub start: I,
    pub delay: D,
}

impl<TA, BA, P, L, I, D> Hardware for Board<TA, BA, P, L, I, D>
where
    TA: AnalogInput,
    BA: AnalogInput,
    P: OutputPin,
    L: OutputPin,
    I: InputPin,
    D: DelayNs,
{
    fn channel_count(&self) -> usize {
        self.thermistors.channel_count()
    }

    fn sample_thermistor(&mut self, channel: u8) -> ThermistorReading {
        self.thermistors.sample(channel, &mut self.delay)
    }

    fn sample_battery(&mut self) -> BatteryReading {
        self.battery.sample()
    }

    fn start_asserted(&mut self) -> bool {
        self.start.is_high().unwrap_or_else(|e| {
            error!("Start input read failed: {:?}", e);
            false
        })
    }

    fn set_indicator(&mut self, on: bool) {
        self.indicator.set(on);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BatteryParams, ChannelTable, ThermistorParams};
    use crate::sensors::ChannelSelector;
    use crate::testing::{MuxedAdc, RecordingDelay, RecordingPin, ScriptedInput, SequenceAdc};

    #[test]
    fn board_routes_through_sampler_and_monitor() {
        let (adc, lines) = MuxedAdc::new(&[32768, 20000]);
        let led = RecordingPin::new();
        let led_probe = led.probe();
        let mut board = Board {
            thermistors: ThermistorSampler::new(
                adc,
                ChannelSelector::new(lines),
                ThermistorParams::DEFAULT,
                ChannelTable::from_offsets(&[0.0, 0.0]).unwrap(),
                30,
                5,
            ),
            battery: BatteryMonitor::new(SequenceAdc::new(&[0, 39718]), BatteryParams::DEFAULT),
            indicator: Indicator::new(led),
            start: ScriptedInput::new(&[false, true]),
            delay: RecordingDelay::default(),
        };

        assert_eq!(board.channel_count(), 2);
        assert_eq!(board.sample_thermistor(1).raw_code, 20000);
        assert_eq!(board.sample_battery().raw_code, 39718);
        assert!(!board.start_asserted());
        assert!(board.start_asserted());

        board.pulse(100);
        assert!(!led_probe.get());
        assert_eq!(board.delay.waits_ms().last(), Some(&100));
    }

    #[test]
    fn indicator_drives_led() {
        let led = RecordingPin::new();
        let probe = led.probe();
        let mut indicator = Indicator::new(led);
        for _ in 0..3 {
            indicator.set(true);
            indicator.set(false);
        }
        assert_eq!(probe.rising_edges(), 3);
    }
}
