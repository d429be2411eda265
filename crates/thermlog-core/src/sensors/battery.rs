use log::debug;

use super::{AnalogInput, code_to_volts};
use crate::config::BatteryParams;

/// One battery measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryReading {
    pub raw_code: u16,
    /// Voltage at the sense node
    pub divided_voltage: f64,
    /// Voltage at the battery terminals
    pub battery_voltage: f64,
    /// Always within `[0, 100]`
    pub state_of_charge: f64,
}

impl BatteryParams {
    /// Inverse of the divider ratio, battery volts per sense-node volt
    pub fn scale(&self) -> f64 {
        (self.r_top_ohms + self.r_bottom_ohms) / self.r_bottom_ohms
    }

    /// Linear SOC between the empty and full bounds, clamped
    pub fn state_of_charge(&self, battery_voltage: f64) -> f64 {
        let span = self.full_volts - self.empty_volts;
        let percent = (battery_voltage - self.empty_volts) / span * 100.0;
        if percent.is_nan() {
            return 0.0;
        }
        percent.clamp(0.0, 100.0)
    }

    pub fn reading(&self, raw_code: u16) -> BatteryReading {
        let divided_voltage = code_to_volts(raw_code, self.v_ref, self.full_scale);
        let battery_voltage = divided_voltage * self.scale();

        BatteryReading {
            raw_code,
            divided_voltage,
            battery_voltage,
            state_of_charge: self.state_of_charge(battery_voltage),
        }
    }
}

/// Samples the battery sense divider on its dedicated converter input
pub struct BatteryMonitor<A> {
    adc: A,
    params: BatteryParams,
}

impl<A: AnalogInput> BatteryMonitor<A> {
    pub fn new(adc: A, params: BatteryParams) -> Self {
        Self { adc, params }
    }

    /// Discard one conversion, then convert and scale
    pub fn sample(&mut self) -> BatteryReading {
        let _ = self.adc.read_raw();
        let reading = self.params.reading(self.adc.read_raw());
        debug!(
            "Battery: raw={} {:.3} V ({:.0}%)",
            reading.raw_code, reading.battery_voltage, reading.state_of_charge
        );
        reading
    }
}
