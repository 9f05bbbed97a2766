//! Append-only reading log with continuous row numbering.
//!
//! The log owns one table for the duration of a capture session. Sequence numbers
//! continue from the persisted row count when an existing file is reopened, so a log
//! written across several sessions always numbers its rows `1..=N`.
//!
//! # Single writer
//!
//! Every mutating method takes `&mut self` and there is no internal locking. The
//! ingestion loop is the only caller; the keyboard listener hands entries to it over a
//! channel instead of touching the log.
use crate::data::storage::{CsvTable, TabularStorage};
use crate::error::{AppResult, LoggerError};
use crate::reading::Reading;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// Column titles, written once when the log file is created.
pub const LOG_HEADER: [&str; 5] = ["No", "Timestamp", "Nilai KN", "Sumber", "Raw Data/Keterangan"];

/// The reading log.
pub struct AppendLog<S: TabularStorage = CsvTable> {
    storage: Option<S>,
    path: PathBuf,
    next_sequence: u64,
}

impl AppendLog<CsvTable> {
    /// Open the CSV log at `path`, creating it with [`LOG_HEADER`] when absent.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` when the file cannot be created or written, or when an
    /// existing file is not a readable log table.
    pub fn open_or_create(path: impl AsRef<Path>, delimiter: u8) -> AppResult<Self> {
        let path = path.as_ref();
        let table = CsvTable::open_or_create(path, &LOG_HEADER, delimiter)?;
        Ok(Self::with_storage(table, path))
    }
}

impl<S: TabularStorage> AppendLog<S> {
    /// Wrap an already opened table.
    pub fn with_storage(storage: S, path: impl Into<PathBuf>) -> Self {
        let next_sequence = storage.row_count() + 1;
        Self {
            storage: Some(storage),
            path: path.into(),
            next_sequence,
        }
    }

    /// Number the next appended row will get.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Rows persisted so far, including those from earlier sessions.
    pub fn row_count(&self) -> u64 {
        self.next_sequence - 1
    }

    /// Log file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// False once `close` has run.
    pub fn is_open(&self) -> bool {
        self.storage.is_some()
    }

    /// Append `reading` and persist it before returning its sequence number.
    ///
    /// On failure the counter is left untouched and the reading is lost; the caller
    /// reports it and carries on.
    #[instrument(skip(self, reading), fields(source = %reading.source, seq = self.next_sequence))]
    pub fn append(&mut self, reading: &Reading) -> AppResult<u64> {
        let sequence = self.next_sequence;
        let storage = self
            .storage
            .as_mut()
            .ok_or_else(|| LoggerError::WriteFailed("log is closed".into()))?;

        let record = reading.to_record(sequence);
        let result = storage.append_row(&record).and_then(|_| storage.save());

        match result {
            Ok(()) => {
                self.next_sequence += 1;
                info!(value = reading.value, "Row {} saved.", sequence);
                Ok(sequence)
            }
            Err(e) => {
                warn!("Row {} lost: {}", sequence, e);
                Err(match e {
                    LoggerError::WriteFailed(reason) => LoggerError::WriteFailed(reason),
                    other => LoggerError::WriteFailed(other.to_string()),
                })
            }
        }
    }

    /// Flush and release the table. Later calls do nothing.
    pub fn close(&mut self) -> AppResult<()> {
        if let Some(mut storage) = self.storage.take() {
            storage.close()?;
        }
        Ok(())
    }
}
