//! Host directory standing in for the SD card's root directory

use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::info;

use thermlog_core::storage::{
    BASELINE_FILE, BaselineStore, LOG_FILE, RecordSink, StorageError, format_baseline,
    parse_baseline,
};

/// Same file names and formats as the card, so output is interchangeable
pub struct FsStorage {
    dir: PathBuf,
}

impl FsStorage {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }

    pub fn baseline_path(&self) -> PathBuf {
        self.dir.join(BASELINE_FILE)
    }

    fn append_line(path: &Path, line: &str) -> io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{line}")
    }
}

impl RecordSink for &FsStorage {
    fn ensure_header(&mut self, header: &str) -> Result<(), StorageError> {
        let path = self.log_path();
        match fs::metadata(&path) {
            Ok(meta) if meta.len() > 0 => return Ok(()),
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::device(e)),
        }

        info!("Writing header to new {}", path.display());
        FsStorage::append_line(&path, header).map_err(StorageError::device)
    }

    fn append(&mut self, row: &str) -> Result<(), StorageError> {
        FsStorage::append_line(&self.log_path(), row).map_err(StorageError::device)
    }
}

impl BaselineStore for &FsStorage {
    fn load(&mut self) -> Result<Option<i64>, StorageError> {
        match fs::read(self.baseline_path()) {
            Ok(bytes) => parse_baseline(&bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::device(e)),
        }
    }

    fn store(&mut self, epoch: i64) -> Result<(), StorageError> {
        fs::write(self.baseline_path(), format_baseline(epoch).as_bytes())
            .map_err(StorageError::device)
    }
}
