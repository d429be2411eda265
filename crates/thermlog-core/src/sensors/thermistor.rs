use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use log::{debug, warn};
use thiserror_no_std::Error;

use super::{AnalogInput, ChannelSelector, SensorError, code_to_volts};
use crate::config::{ChannelTable, ThermistorParams};

const KELVIN_OFFSET: f64 = 273.15;

/// Why a channel produced no temperature this cycle
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum ReadingError {
    #[error("divider output {voltage} V is at or above the reference")]
    DividerSaturated { voltage: f64 },
    #[error("thermistor resistance {ohms} Ω is not positive")]
    NonPositiveResistance { ohms: f64 },
    #[error("Steinhart-Hart model has no finite solution")]
    OutOfModel,
    #[error("sensor fault: {0}")]
    Sensor(SensorError),
}

impl From<SensorError> for ReadingError {
    fn from(error: SensorError) -> Self {
        Self::Sensor(error)
    }
}

/// Steinhart–Hart coefficients for one thermistor family.
///
/// `1/T = A + B·ln(R) + C·ln(R)³`, T in kelvin, R in ohms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteinhartHart {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl SteinhartHart {
    pub const fn new(a: f64, b: f64, c: f64) -> Self {
        Self { a, b, c }
    }

    /// Absolute temperature for a resistance
    pub fn kelvin(&self, ohms: f64) -> Result<f64, ReadingError> {
        if !(ohms > 0.0) || !ohms.is_finite() {
            return Err(ReadingError::NonPositiveResistance { ohms });
        }

        let ln_r = libm::log(ohms);
        let inv_kelvin = self.a + self.b * ln_r + self.c * ln_r * ln_r * ln_r;
        if !(inv_kelvin > 0.0) || !inv_kelvin.is_finite() {
            return Err(ReadingError::OutOfModel);
        }

        let kelvin = 1.0 / inv_kelvin;
        if !kelvin.is_finite() {
            return Err(ReadingError::OutOfModel);
        }
        Ok(kelvin)
    }

    /// Temperature in °C for a resistance, before calibration
    pub fn celsius(&self, ohms: f64) -> Result<f64, ReadingError> {
        self.kelvin(ohms).map(|k| k - KELVIN_OFFSET)
    }

    /// Resistance the model predicts at `celsius`; the inverse of [`Self::celsius`]
    pub fn resistance_at(&self, celsius: f64) -> Option<f64> {
        let inv_kelvin = 1.0 / (celsius + KELVIN_OFFSET);
        let ohms = if self.c == 0.0 {
            libm::exp((inv_kelvin - self.a) / self.b)
        } else {
            let x = (self.a - inv_kelvin) / self.c;
            let b3c = self.b / (3.0 * self.c);
            let y = libm::sqrt(b3c * b3c * b3c + x * x / 4.0);
            libm::exp(libm::cbrt(y - x / 2.0) - libm::cbrt(y + x / 2.0))
        };
        (ohms.is_finite() && ohms > 0.0).then_some(ohms)
    }
}

impl ThermistorParams {
    pub fn steinhart_hart(&self) -> SteinhartHart {
        SteinhartHart::new(self.a, self.b, self.c)
    }

    pub fn voltage(&self, raw: u16) -> f64 {
        code_to_volts(raw, self.v_ref, self.full_scale)
    }

    /// Thermistor resistance from the divider output, thermistor on the low side
    pub fn resistance(&self, voltage: f64) -> Result<f64, ReadingError> {
        if voltage >= self.v_ref {
            return Err(ReadingError::DividerSaturated { voltage });
        }
        let ohms = (voltage / (self.v_ref - voltage)) * self.pullup_ohms;
        if !(ohms > 0.0) {
            return Err(ReadingError::NonPositiveResistance { ohms });
        }
        Ok(ohms)
    }

    /// Divider output code a thermistor at `celsius` would produce
    pub fn code_at(&self, celsius: f64) -> Option<u16> {
        let ohms = self.steinhart_hart().resistance_at(celsius)?;
        let voltage = self.v_ref * ohms / (ohms + self.pullup_ohms);
        let code = libm::round(voltage / self.v_ref * self.full_scale as f64);
        Some(code.clamp(0.0, self.full_scale as f64) as u16)
    }
}

/// Result of sampling one thermistor channel. Never mutated after creation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermistorReading {
    pub channel: u8,
    pub raw_code: u16,
    pub voltage: f64,
    pub resistance: Option<f64>,
    /// Calibrated temperature in °C
    pub temperature: Result<f64, ReadingError>,
}

impl ThermistorReading {
    /// Run the conversion chain on a raw code. Pure and deterministic.
    pub fn from_raw(channel: u8, raw_code: u16, params: &ThermistorParams, offset: f64) -> Self {
        let voltage = params.voltage(raw_code);
        let resistance = params.resistance(voltage);
        let temperature = resistance
            .and_then(|ohms| params.steinhart_hart().celsius(ohms))
            .map(|celsius| celsius + offset);

        Self {
            channel,
            raw_code,
            voltage,
            resistance: resistance.ok(),
            temperature,
        }
    }

    /// Reading for a channel that could not be converted at all
    pub fn failed(channel: u8, error: SensorError) -> Self {
        Self {
            channel,
            raw_code: 0,
            voltage: 0.0,
            resistance: None,
            temperature: Err(error.into()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.temperature.is_ok()
    }
}

/// Samples thermistors routed through the multiplexer onto one converter.
pub struct ThermistorSampler<A, P> {
    adc: A,
    selector: ChannelSelector<P>,
    params: ThermistorParams,
    channels: ChannelTable,
    settle_ms: u32,
    self_heat_ms: u32,
}

impl<A, P> ThermistorSampler<A, P>
where
    A: AnalogInput,
    P: OutputPin,
{
    pub fn new(
        adc: A,
        selector: ChannelSelector<P>,
        params: ThermistorParams,
        channels: ChannelTable,
        settle_ms: u32,
        self_heat_ms: u32,
    ) -> Self {
        Self {
            adc,
            selector,
            params,
            channels,
            settle_ms,
            self_heat_ms,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Select, settle, discard one conversion, pause, convert.
    ///
    /// Failures are reported inside the returned reading so that a single bad
    /// channel never aborts the cycle.
    pub fn sample<D: DelayNs>(&mut self, channel: u8, delay: &mut D) -> ThermistorReading {
        let Some(config) = self.channels.get(channel) else {
            warn!("Thermistor channel {} is not configured", channel);
            return ThermistorReading::failed(channel, SensorError::ChannelOutOfRange { channel });
        };
        let offset = config.calibration_offset;

        if let Err(e) = self.selector.select(channel) {
            return ThermistorReading::failed(channel, e);
        }
        delay.delay_ms(self.settle_ms);

        // Charges the sampling capacitor to this channel's level.
        let _ = self.adc.read_raw();
        delay.delay_ms(self.self_heat_ms);

        let raw = self.adc.read_raw();
        let reading = ThermistorReading::from_raw(channel, raw, &self.params, offset);

        match reading.temperature {
            Ok(celsius) => debug!("ch{}: raw={} T={:.2}°C", channel, raw, celsius),
            Err(e) => warn!("ch{}: raw={} invalid: {}", channel, raw, e),
        }
        reading
    }
}
