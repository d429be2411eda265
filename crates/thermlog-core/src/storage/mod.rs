//! Durable storage seams: the CSV record sink and the baseline store
//!
//! Both are append/overwrite-only collaborators of the lifecycle controller.
//! [`SdCardStorage`] implements them on a FAT volume; the simulator and the
//! tests provide their own implementations.

pub mod row;
pub mod sd_card;

use core::fmt::{self, Debug, Write};

use thiserror_no_std::Error;

pub use row::*;
pub use sd_card::*;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage device error: {0}")]
    Device(heapless::String<64>),
    #[error("stored baseline is not a decimal integer")]
    CorruptBaseline,
}

impl StorageError {
    /// Capture a driver error's debug text, truncated to fit
    pub fn device<E: Debug>(error: E) -> Self {
        let mut text = heapless::String::new();
        let _ = write!(Truncating(&mut text), "{:?}", error);
        Self::Device(text)
    }
}

struct Truncating<'a, const N: usize>(&'a mut heapless::String<N>);

impl<const N: usize> Write for Truncating<'_, N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if self.0.push(c).is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// Append-only sink for formatted log rows
pub trait RecordSink {
    /// Write `header` as the first line unless the log already has content
    fn ensure_header(&mut self, header: &str) -> Result<(), StorageError>;

    /// Append one complete row; the sink terminates the line
    fn append(&mut self, row: &str) -> Result<(), StorageError>;
}

impl<T: RecordSink + ?Sized> RecordSink for &mut T {
    fn ensure_header(&mut self, header: &str) -> Result<(), StorageError> {
        (**self).ensure_header(header)
    }

    fn append(&mut self, row: &str) -> Result<(), StorageError> {
        (**self).append(row)
    }
}

/// Single-integer store for the elapsed-time baseline epoch
pub trait BaselineStore {
    fn load(&mut self) -> Result<Option<i64>, StorageError>;
    fn store(&mut self, epoch: i64) -> Result<(), StorageError>;
}

impl<T: BaselineStore + ?Sized> BaselineStore for &mut T {
    fn load(&mut self) -> Result<Option<i64>, StorageError> {
        (**self).load()
    }

    fn store(&mut self, epoch: i64) -> Result<(), StorageError> {
        (**self).store(epoch)
    }
}

/// Parse the contents of a baseline file; empty means never written
pub fn parse_baseline(contents: &[u8]) -> Result<Option<i64>, StorageError> {
    let text = core::str::from_utf8(contents).map_err(|_| StorageError::CorruptBaseline)?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    text.parse::<i64>()
        .map(Some)
        .map_err(|_| StorageError::CorruptBaseline)
}

/// Longest baseline file: sign, 19 digits and a newline
pub const BASELINE_MAX_LEN: usize = 21;

pub fn format_baseline(epoch: i64) -> heapless::String<BASELINE_MAX_LEN> {
    let mut text = heapless::String::new();
    // i64 plus newline always fits.
    let _ = writeln!(text, "{}", epoch);
    text
}
