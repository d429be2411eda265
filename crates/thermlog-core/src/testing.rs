//! In-crate fakes for the hardware and storage seams

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;
use std::string::String;
use std::vec::Vec;

use chrono::{DateTime, NaiveDateTime};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, InputPin, OutputPin};
use embedded_hal::i2c::{self, I2c, Operation};

use crate::board::Hardware;
use crate::config::ThermistorParams;
use crate::power::{RETAINED_BYTES, SleepMemory};
use crate::sensors::{AnalogInput, BatteryReading, ThermistorReading};
use crate::storage::{BaselineStore, RecordSink, StorageError};
use crate::time::{Clock, TimeError, epoch_seconds};

/// Output pin whose level and rising edges can be observed after it is moved
pub struct RecordingPin {
    probe: PinProbe,
}

#[derive(Clone, Default)]
pub struct PinProbe {
    level: Rc<Cell<bool>>,
    rising: Rc<Cell<u32>>,
}

impl PinProbe {
    pub fn get(&self) -> bool {
        self.level.get()
    }

    pub fn rising_edges(&self) -> u32 {
        self.rising.get()
    }
}

impl RecordingPin {
    pub fn new() -> Self {
        Self {
            probe: PinProbe::default(),
        }
    }

    pub fn probe(&self) -> PinProbe {
        self.probe.clone()
    }
}

impl digital::ErrorType for RecordingPin {
    type Error = Infallible;
}

impl OutputPin for RecordingPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.probe.level.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        if !self.probe.level.get() {
            self.probe.rising.set(self.probe.rising.get() + 1);
        }
        self.probe.level.set(true);
        Ok(())
    }
}

pub struct FailingPin;

impl digital::ErrorType for FailingPin {
    type Error = digital::ErrorKind;
}

impl OutputPin for FailingPin {
    fn set_low(&mut self) -> Result<(), digital::ErrorKind> {
        Err(digital::ErrorKind::Other)
    }

    fn set_high(&mut self) -> Result<(), digital::ErrorKind> {
        Err(digital::ErrorKind::Other)
    }
}

/// Converter behind a multiplexer: the code depends on the address lines.
///
/// With carry-over enabled, the first conversion after a channel change
/// returns the previous channel's code, as a sampling capacitor would.
pub struct MuxedAdc {
    codes: Vec<u16>,
    lines: [PinProbe; 3],
    log: Rc<RefCell<Vec<u8>>>,
    carryover: Cell<bool>,
    last_channel: Option<u8>,
}

impl MuxedAdc {
    pub fn new(codes: &[u16]) -> (Self, [RecordingPin; 3]) {
        let pins = [RecordingPin::new(), RecordingPin::new(), RecordingPin::new()];
        let adc = Self {
            codes: codes.to_vec(),
            lines: [pins[0].probe(), pins[1].probe(), pins[2].probe()],
            log: Rc::default(),
            carryover: Cell::new(false),
            last_channel: None,
        };
        (adc, pins)
    }

    pub fn enable_carryover(&self) {
        self.carryover.set(true);
    }

    /// Channel addressed by each conversion, in order
    pub fn log(&self) -> Rc<RefCell<Vec<u8>>> {
        self.log.clone()
    }

    fn code(&self, channel: u8) -> u16 {
        self.codes.get(channel as usize).copied().unwrap_or(0)
    }
}

impl AnalogInput for MuxedAdc {
    fn read_raw(&mut self) -> u16 {
        let channel = self
            .lines
            .iter()
            .enumerate()
            .fold(0u8, |acc, (bit, line)| acc | (line.get() as u8) << bit);
        self.log.borrow_mut().push(channel);

        let previous = self.last_channel.replace(channel);
        match previous {
            Some(prev) if self.carryover.get() && prev != channel => self.code(prev),
            _ => self.code(channel),
        }
    }
}

/// Returns the given codes in order, then repeats the last one
pub struct SequenceAdc {
    codes: VecDeque<u16>,
    last: u16,
}

impl SequenceAdc {
    pub fn new(codes: &[u16]) -> Self {
        Self {
            codes: codes.iter().copied().collect(),
            last: 0,
        }
    }
}

impl AnalogInput for SequenceAdc {
    fn read_raw(&mut self) -> u16 {
        if let Some(code) = self.codes.pop_front() {
            self.last = code;
        }
        self.last
    }
}

#[derive(Default)]
pub struct RecordingDelay {
    waits_ms: Vec<u32>,
}

impl RecordingDelay {
    pub fn waits_ms(&self) -> &[u32] {
        &self.waits_ms
    }
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, _ns: u32) {}

    fn delay_ms(&mut self, ms: u32) {
        self.waits_ms.push(ms);
    }
}

/// Input pin that plays back a script, then holds the last level
pub struct ScriptedInput {
    levels: VecDeque<bool>,
    last: bool,
}

impl ScriptedInput {
    pub fn new(levels: &[bool]) -> Self {
        Self {
            levels: levels.iter().copied().collect(),
            last: false,
        }
    }
}

impl digital::ErrorType for ScriptedInput {
    type Error = Infallible;
}

impl InputPin for ScriptedInput {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        if let Some(level) = self.levels.pop_front() {
            self.last = level;
        }
        Ok(self.last)
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        self.is_high().map(|high| !high)
    }
}

/// Settable clock; clones share the same time
#[derive(Clone)]
pub struct FakeClock {
    epoch: Rc<Cell<i64>>,
    failing: Rc<Cell<bool>>,
}

impl FakeClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            epoch: Rc::new(Cell::new(epoch_seconds(&start))),
            failing: Rc::default(),
        }
    }

    pub fn advance_secs(&self, secs: i64) {
        self.epoch.set(self.epoch.get() + secs);
    }

    pub fn fail(&self, failing: bool) {
        self.failing.set(failing);
    }
}

impl Clock for FakeClock {
    fn now(&mut self) -> Result<NaiveDateTime, TimeError> {
        if self.failing.get() {
            return Err(TimeError::Bus);
        }
        DateTime::from_timestamp(self.epoch.get(), 0)
            .map(|t| t.naive_utc())
            .ok_or(TimeError::InvalidDate)
    }
}

/// DS3231 register file on a fake bus
#[derive(Clone, Default)]
pub struct FakeI2cRtc {
    registers: Rc<RefCell<[u8; 19]>>,
    failing: Rc<Cell<bool>>,
}

impl FakeI2cRtc {
    pub fn fail(&self, failing: bool) {
        self.failing.set(failing);
    }
}

impl i2c::ErrorType for FakeI2cRtc {
    type Error = i2c::ErrorKind;
}

impl I2c for FakeI2cRtc {
    fn transaction(
        &mut self,
        _address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if self.failing.get() {
            return Err(i2c::ErrorKind::NoAcknowledge(i2c::NoAcknowledgeSource::Address));
        }

        let mut registers = self.registers.borrow_mut();
        let mut pointer = 0usize;
        for operation in operations.iter_mut() {
            match operation {
                Operation::Write(bytes) => {
                    if let Some((&first, rest)) = bytes.split_first() {
                        pointer = first as usize;
                        for &b in rest {
                            registers[pointer] = b;
                            pointer += 1;
                        }
                    }
                }
                Operation::Read(buffer) => {
                    for b in buffer.iter_mut() {
                        *b = registers[pointer];
                        pointer += 1;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Shared baseline cell; clones see the same value
#[derive(Clone, Default)]
pub struct MemoryBaseline {
    value: Rc<Cell<Option<i64>>>,
    writes: Rc<Cell<u32>>,
}

impl MemoryBaseline {
    pub fn value(&self) -> Option<i64> {
        self.value.get()
    }

    pub fn writes(&self) -> u32 {
        self.writes.get()
    }
}

impl BaselineStore for MemoryBaseline {
    fn load(&mut self) -> Result<Option<i64>, StorageError> {
        Ok(self.value.get())
    }

    fn store(&mut self, epoch: i64) -> Result<(), StorageError> {
        self.value.set(Some(epoch));
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }
}

#[derive(Default)]
struct SinkInner {
    lines: Vec<String>,
    header_attempts: u32,
    header_failures_left: u32,
    failing_appends: bool,
}

/// In-memory CSV file; clones share the same contents
#[derive(Clone, Default)]
pub struct MemorySink {
    inner: Rc<RefCell<SinkInner>>,
}

impl MemorySink {
    /// Fail the next `count` header attempts
    pub fn fail_headers(&self, count: u32) {
        self.inner.borrow_mut().header_failures_left = count;
    }

    pub fn fail_appends(&self, failing: bool) {
        self.inner.borrow_mut().failing_appends = failing;
    }

    pub fn lines(&self) -> Vec<String> {
        self.inner.borrow().lines.clone()
    }

    /// Data rows, header excluded
    pub fn rows(&self) -> Vec<String> {
        self.lines().into_iter().skip(1).collect()
    }

    pub fn header_attempts(&self) -> u32 {
        self.inner.borrow().header_attempts
    }
}

impl RecordSink for MemorySink {
    fn ensure_header(&mut self, header: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.borrow_mut();
        inner.header_attempts += 1;
        if inner.header_failures_left > 0 {
            inner.header_failures_left -= 1;
            return Err(StorageError::device("card not present"));
        }
        if inner.lines.is_empty() {
            inner.lines.push(header.into());
        }
        Ok(())
    }

    fn append(&mut self, row: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.borrow_mut();
        if inner.failing_appends {
            return Err(StorageError::device("write failed"));
        }
        inner.lines.push(row.into());
        Ok(())
    }
}

/// Sleep-retained block; starts as garbage like real RTC RAM
#[derive(Clone)]
pub struct MemorySleep {
    bytes: Rc<RefCell<[u8; RETAINED_BYTES]>>,
}

impl MemorySleep {
    pub fn new() -> Self {
        Self {
            bytes: Rc::new(RefCell::new([0xA5; RETAINED_BYTES])),
        }
    }

    pub fn scramble(&self) {
        *self.bytes.borrow_mut() = [0xA5; RETAINED_BYTES];
    }
}

impl SleepMemory for MemorySleep {
    fn read(&mut self) -> [u8; RETAINED_BYTES] {
        *self.bytes.borrow()
    }

    fn write(&mut self, bytes: &[u8; RETAINED_BYTES]) {
        *self.bytes.borrow_mut() = *bytes;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HwEvent {
    Thermistor(u8),
    Battery,
    StartPoll,
    Indicator(bool),
    Delay(u32),
}

/// Hardware stand-in with scripted battery levels and start input
pub struct ScriptedHardware {
    readings: Vec<ThermistorReading>,
    soc: VecDeque<f64>,
    last_soc: f64,
    start: VecDeque<bool>,
    events: Vec<HwEvent>,
}

impl ScriptedHardware {
    /// `channels` thermistors near 25 °C, battery at 80 %, start pressed
    pub fn new(channels: usize) -> Self {
        let params = ThermistorParams::DEFAULT;
        Self {
            readings: (0..channels as u8)
                .map(|ch| ThermistorReading::from_raw(ch, 32768, &params, 0.0))
                .collect(),
            soc: VecDeque::new(),
            last_soc: 80.0,
            start: VecDeque::new(),
            events: Vec::new(),
        }
    }

    /// Make `channel` saturate the divider
    pub fn break_channel(mut self, channel: u8) -> Self {
        self.readings[channel as usize] =
            ThermistorReading::from_raw(channel, u16::MAX, &ThermistorParams::DEFAULT, 0.0);
        self
    }

    /// Battery levels for successive samples, the last one then repeats
    pub fn with_soc(mut self, levels: &[f64]) -> Self {
        self.soc = levels.iter().copied().collect();
        self
    }

    /// Start-input levels for successive polls, then held high
    pub fn with_start(mut self, levels: &[bool]) -> Self {
        self.start = levels.iter().copied().collect();
        self
    }

    pub fn events(&self) -> &[HwEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    pub fn thermistor_order(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|e| match e {
                HwEvent::Thermistor(ch) => Some(*ch),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, event: HwEvent) -> usize {
        self.events.iter().filter(|&&e| e == event).count()
    }
}

impl Hardware for ScriptedHardware {
    fn channel_count(&self) -> usize {
        self.readings.len()
    }

    fn sample_thermistor(&mut self, channel: u8) -> ThermistorReading {
        self.events.push(HwEvent::Thermistor(channel));
        self.readings[channel as usize]
    }

    fn sample_battery(&mut self) -> BatteryReading {
        self.events.push(HwEvent::Battery);
        if let Some(level) = self.soc.pop_front() {
            self.last_soc = level;
        }
        BatteryReading {
            raw_code: 0,
            divided_voltage: 0.0,
            battery_voltage: 0.0,
            state_of_charge: self.last_soc,
        }
    }

    fn start_asserted(&mut self) -> bool {
        self.events.push(HwEvent::StartPoll);
        self.start.pop_front().unwrap_or(true)
    }

    fn set_indicator(&mut self, on: bool) {
        self.events.push(HwEvent::Indicator(on));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.events.push(HwEvent::Delay(ms));
    }
}
