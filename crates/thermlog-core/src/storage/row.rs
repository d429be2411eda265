//! CSV row assembly
//!
//! A row is only built once every channel of the cycle has been sampled, so
//! a partial row can never reach the sink. Fields that could not be produced
//! are written as [`SENTINEL`] rather than dropped, keeping every row aligned
//! with the header.

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

use crate::config::RowLayout;
use crate::sensors::{BatteryReading, ThermistorReading};

/// Written in place of any value that is unavailable this cycle
pub const SENTINEL: &str = "ERR";

/// Ordered fields of one CSV line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRow {
    fields: Vec<String>,
}

impl LogRow {
    /// Column names for a layout
    pub fn header(layout: RowLayout, time_column: &str, channel_count: usize) -> Self {
        let mut fields = Vec::new();
        fields.push(time_column.to_string());

        for ch in 0..channel_count {
            match layout {
                RowLayout::Compact => fields.push(format!("ch{ch}_C")),
                RowLayout::Detailed => {
                    fields.push(format!("ch{ch}_raw"));
                    fields.push(format!("ch{ch}_V"));
                    fields.push(format!("ch{ch}_Ohm"));
                    fields.push(format!("ch{ch}_C"));
                }
            }
        }

        if layout == RowLayout::Detailed {
            fields.push("bat_raw".to_string());
            fields.push("bat_divV".to_string());
            fields.push("bat_V".to_string());
        }
        fields.push("bat_%".to_string());

        Self { fields }
    }

    /// Values of one completed cycle, channels in the order given
    pub fn from_cycle(
        layout: RowLayout,
        timestamp: Option<&str>,
        readings: &[ThermistorReading],
        battery: &BatteryReading,
    ) -> Self {
        let mut fields = Vec::new();
        fields.push(timestamp.unwrap_or(SENTINEL).to_string());

        for reading in readings {
            let celsius = match reading.temperature {
                Ok(celsius) => format!("{celsius:.2}"),
                Err(_) => SENTINEL.to_string(),
            };

            match layout {
                RowLayout::Compact => fields.push(celsius),
                RowLayout::Detailed => {
                    fields.push(format!("{}", reading.raw_code));
                    fields.push(format!("{:.4}", reading.voltage));
                    fields.push(match reading.resistance {
                        Some(ohms) => format!("{ohms:.1}"),
                        None => SENTINEL.to_string(),
                    });
                    fields.push(celsius);
                }
            }
        }

        if layout == RowLayout::Detailed {
            fields.push(format!("{}", battery.raw_code));
            fields.push(format!("{:.4}", battery.divided_voltage));
            fields.push(format!("{:.4}", battery.battery_voltage));
        }
        fields.push(format!("{:.0}", battery.state_of_charge));

        Self { fields }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for LogRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(field)?;
        }
        Ok(())
    }
}
