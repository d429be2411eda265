//! DS3231 real-time clock over blocking I2C
//!
//! Only the seven timekeeping registers (0x00–0x06) are used. The clock is
//! always kept in UTC, 24-hour mode.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use embedded_hal::i2c::I2c;
use log::error;

use super::{Clock, TimeError};

/// Fixed 7-bit bus address of the DS3231
pub const DS3231_ADDRESS: u8 = 0x68;

const REG_SECONDS: u8 = 0x00;
const TIME_REGISTERS: usize = 7;

const HOUR_12H_MODE: u8 = 0x40;
const HOUR_PM: u8 = 0x20;
const MONTH_CENTURY: u8 = 0x80;

/// Decode one packed-BCD byte
pub const fn bcd_to_decimal(byte: u8) -> u8 {
    (byte >> 4) * 10 + (byte & 0x0F)
}

pub const fn decimal_to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

fn decode_field(register: u8, value: u8, mask: u8) -> Result<u8, TimeError> {
    let masked = value & mask;
    if masked >> 4 > 9 || masked & 0x0F > 9 {
        return Err(TimeError::InvalidRegister { register, value });
    }
    Ok(bcd_to_decimal(masked))
}

/// Decode the register block starting at `REG_SECONDS`
pub fn decode_registers(regs: &[u8; TIME_REGISTERS]) -> Result<NaiveDateTime, TimeError> {
    let second = decode_field(0x00, regs[0], 0x7F)?;
    let minute = decode_field(0x01, regs[1], 0x7F)?;

    let hour = if regs[2] & HOUR_12H_MODE != 0 {
        let hour12 = decode_field(0x02, regs[2], 0x1F)?;
        let pm = regs[2] & HOUR_PM != 0;
        hour12 % 12 + if pm { 12 } else { 0 }
    } else {
        decode_field(0x02, regs[2], 0x3F)?
    };

    // regs[3] is the day of week, derived from the date anyway
    let day = decode_field(0x04, regs[4], 0x3F)?;
    let month = decode_field(0x05, regs[5], 0x1F)?;
    let century = if regs[5] & MONTH_CENTURY != 0 { 100 } else { 0 };
    let year = 2000 + century + decode_field(0x06, regs[6], 0xFF)? as i32;

    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
        .and_then(|date| date.and_hms_opt(hour as u32, minute as u32, second as u32))
        .ok_or(TimeError::InvalidDate)
}

/// Encode a time into the register block, 24-hour mode
pub fn encode_registers(time: &NaiveDateTime) -> Result<[u8; TIME_REGISTERS], TimeError> {
    let offset_year = time.year() - 2000;
    if !(0..200).contains(&offset_year) {
        return Err(TimeError::InvalidDate);
    }
    let century = if offset_year >= 100 { MONTH_CENTURY } else { 0 };

    Ok([
        decimal_to_bcd(time.second() as u8),
        decimal_to_bcd(time.minute() as u8),
        decimal_to_bcd(time.hour() as u8),
        decimal_to_bcd(time.weekday().number_from_monday() as u8),
        decimal_to_bcd(time.day() as u8),
        decimal_to_bcd(time.month() as u8) | century,
        decimal_to_bcd((offset_year % 100) as u8),
    ])
}

pub struct Ds3231<I> {
    i2c: I,
}

impl<I: I2c> Ds3231<I> {
    pub fn new(i2c: I) -> Self {
        Self { i2c }
    }

    pub fn release(self) -> I {
        self.i2c
    }

    /// Set the clock, used when provisioning a board
    pub fn set(&mut self, time: &NaiveDateTime) -> Result<(), TimeError> {
        let regs = encode_registers(time)?;
        let mut frame = [0u8; TIME_REGISTERS + 1];
        frame[0] = REG_SECONDS;
        frame[1..].copy_from_slice(&regs);

        self.i2c.write(DS3231_ADDRESS, &frame).map_err(|e| {
            error!("DS3231 write failed: {:?}", e);
            TimeError::Bus
        })
    }
}

impl<I: I2c> Clock for Ds3231<I> {
    fn now(&mut self) -> Result<NaiveDateTime, TimeError> {
        let mut regs = [0u8; TIME_REGISTERS];
        self.i2c
            .write_read(DS3231_ADDRESS, &[REG_SECONDS], &mut regs)
            .map_err(|e| {
                error!("DS3231 read failed: {:?}", e);
                TimeError::Bus
            })?;
        decode_registers(&regs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeI2cRtc;

    #[test]
    fn decodes_bcd_bytes() {
        assert_eq!(bcd_to_decimal(0x59), 59);
        assert_eq!(bcd_to_decimal(0x00), 0);
        assert_eq!(bcd_to_decimal(0x23), 23);
        assert_eq!(decimal_to_bcd(47), 0x47);
    }

    #[test]
    fn decodes_24_hour_register_block() {
        let regs = [0x30, 0x45, 0x13, 0x06, 0x28, 0x02, 0x24];
        let time = decode_registers(&regs).unwrap();
        assert_eq!(
            time,
            NaiveDate::from_ymd_opt(2024, 2, 28)
                .unwrap()
                .and_hms_opt(13, 45, 30)
                .unwrap()
        );
    }

    #[test]
    fn decodes_12_hour_mode() {
        // 12:05 AM is midnight, 01:05 PM is 13:05
        let midnight = [0x00, 0x05, 0x40 | 0x12, 0x01, 0x01, 0x01, 0x25];
        assert_eq!(decode_registers(&midnight).unwrap().hour(), 0);
        let afternoon = [0x00, 0x05, 0x40 | 0x20 | 0x01, 0x01, 0x01, 0x01, 0x25];
        assert_eq!(decode_registers(&afternoon).unwrap().hour(), 13);
    }

    #[test]
    fn rejects_non_bcd_and_impossible_dates() {
        let bad_nibble = [0x3A, 0x00, 0x00, 0x01, 0x01, 0x01, 0x24];
        assert_eq!(
            decode_registers(&bad_nibble),
            Err(TimeError::InvalidRegister {
                register: 0x00,
                value: 0x3A
            })
        );
        let february_31 = [0x00, 0x00, 0x00, 0x01, 0x31, 0x02, 0x24];
        assert_eq!(decode_registers(&february_31), Err(TimeError::InvalidDate));
    }

    #[test]
    fn set_then_read_through_bus() {
        let time = NaiveDate::from_ymd_opt(2031, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 58)
            .unwrap();
        let mut rtc = Ds3231::new(FakeI2cRtc::default());
        rtc.set(&time).unwrap();
        assert_eq!(rtc.now().unwrap(), time);
    }

    #[test]
    fn bus_error_maps_to_time_error() {
        let bus = FakeI2cRtc::default();
        bus.fail(true);
        let mut rtc = Ds3231::new(bus);
        assert_eq!(rtc.now(), Err(TimeError::Bus));
    }
}
