use alloc::string::String;

use embedded_sdmmc::{BlockDevice, Mode, TimeSource, VolumeIdx, VolumeManager};
use log::{debug, info};

use super::{
    BASELINE_MAX_LEN, BaselineStore, RecordSink, StorageError, format_baseline, parse_baseline,
};

/// CSV log on the card's root directory (8.3 name)
pub const LOG_FILE: &str = "THERMLOG.CSV";
/// Elapsed-time baseline, one decimal integer
pub const BASELINE_FILE: &str = "BASELINE.TXT";

/// FAT volume on an SD card holding the log and the baseline file.
///
/// These operations are blocking. Each one opens the volume, works on the
/// root directory and closes everything again, so nothing is left open
/// across a deep sleep.
pub struct SdCardStorage<D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    volume_mgr: VolumeManager<D, T, 4, 4, 1>,
}

impl<D, T> SdCardStorage<D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    pub fn new(device: D, ts: T) -> Self {
        let volume_mgr = VolumeManager::new(device, ts);

        Self { volume_mgr }
    }

    /// Size in bytes of a root-directory file, `None` if it does not exist
    pub fn file_length(
        &self,
        file_name: &str,
    ) -> Result<Option<u32>, embedded_sdmmc::Error<D::Error>> {
        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;

        let length = match root_dir.open_file_in_dir(file_name, Mode::ReadOnly) {
            Ok(file) => {
                let length = file.length();
                file.close()?;
                Some(length)
            }
            Err(embedded_sdmmc::Error::NotFound) => None,
            Err(e) => return Err(e),
        };

        root_dir.close()?;
        volume0.close()?;

        Ok(length)
    }

    /// Append bytes to a root-directory file, creating it if needed
    pub fn append_bytes(
        &self,
        file_name: &str,
        data: &[u8],
    ) -> Result<(), embedded_sdmmc::Error<D::Error>> {
        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;
        let file = root_dir.open_file_in_dir(file_name, Mode::ReadWriteCreateOrAppend)?;

        file.write(data)?;

        // Close explicitly so errors on flush are seen
        file.close()?;
        root_dir.close()?;
        volume0.close()?;

        Ok(())
    }

    /// Replace the contents of a root-directory file
    pub fn overwrite(
        &self,
        file_name: &str,
        data: &[u8],
    ) -> Result<(), embedded_sdmmc::Error<D::Error>> {
        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;
        let file = root_dir.open_file_in_dir(file_name, Mode::ReadWriteCreateOrTruncate)?;

        file.write(data)?;

        file.close()?;
        root_dir.close()?;
        volume0.close()?;

        Ok(())
    }

    /// Read up to `buffer.len()` bytes, `None` if the file does not exist
    pub fn read_into(
        &self,
        file_name: &str,
        buffer: &mut [u8],
    ) -> Result<Option<usize>, embedded_sdmmc::Error<D::Error>> {
        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;

        let count = match root_dir.open_file_in_dir(file_name, Mode::ReadOnly) {
            Ok(file) => {
                let mut count = 0;
                while count < buffer.len() {
                    let bytes_read = file.read(&mut buffer[count..])?;
                    if bytes_read == 0 {
                        break; // EOF
                    }
                    count += bytes_read;
                }
                file.close()?;
                Some(count)
            }
            Err(embedded_sdmmc::Error::NotFound) => None,
            Err(e) => return Err(e),
        };

        root_dir.close()?;
        volume0.close()?;

        Ok(count)
    }
}

/// A line with its terminator, for a single write
fn csv_line(text: &str) -> String {
    let mut line = String::with_capacity(text.len() + 1);
    line.push_str(text);
    line.push('\n');
    line
}

impl<D, T> RecordSink for &SdCardStorage<D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    fn ensure_header(&mut self, header: &str) -> Result<(), StorageError> {
        let length = self.file_length(LOG_FILE).map_err(StorageError::device)?;
        if length.unwrap_or(0) > 0 {
            debug!("{} present ({} bytes)", LOG_FILE, length.unwrap_or(0));
            return Ok(());
        }

        info!("Writing header to new {}", LOG_FILE);
        self.append_bytes(LOG_FILE, csv_line(header).as_bytes())
            .map_err(StorageError::device)
    }

    fn append(&mut self, row: &str) -> Result<(), StorageError> {
        self.append_bytes(LOG_FILE, csv_line(row).as_bytes())
            .map_err(StorageError::device)
    }
}

impl<D, T> RecordSink for SdCardStorage<D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    fn ensure_header(&mut self, header: &str) -> Result<(), StorageError> {
        (&*self).ensure_header(header)
    }

    fn append(&mut self, row: &str) -> Result<(), StorageError> {
        (&*self).append(row)
    }
}

impl<D, T> BaselineStore for &SdCardStorage<D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    fn load(&mut self) -> Result<Option<i64>, StorageError> {
        let mut buffer = [0u8; BASELINE_MAX_LEN];
        match self
            .read_into(BASELINE_FILE, &mut buffer)
            .map_err(StorageError::device)?
        {
            Some(count) => parse_baseline(&buffer[..count]),
            None => Ok(None),
        }
    }

    fn store(&mut self, epoch: i64) -> Result<(), StorageError> {
        self.overwrite(BASELINE_FILE, format_baseline(epoch).as_bytes())
            .map_err(StorageError::device)
    }
}

impl<D, T> BaselineStore for SdCardStorage<D, T>
where
    D: BlockDevice,
    T: TimeSource,
{
    fn load(&mut self) -> Result<Option<i64>, StorageError> {
        (&*self).load()
    }

    fn store(&mut self, epoch: i64) -> Result<(), StorageError> {
        (&*self).store(epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_and_terminator_form_one_write() {
        let header = "elapsed,ch0_C,ch1_C,bat_%";
        let line = csv_line(header);
        assert_eq!(line, "elapsed,ch0_C,ch1_C,bat_%\n");
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn rows_follow_header_on_their_own_line() {
        let mut file = csv_line("elapsed,ch0_C,bat_%");
        file.push_str(&csv_line("000h:00m,25.00,80"));
        let lines: alloc::vec::Vec<&str> = file.lines().collect();
        assert_eq!(lines, ["elapsed,ch0_C,bat_%", "000h:00m,25.00,80"]);
    }
}
