//! Tabular storage for the reading log.
//!
//! `TabularStorage` is the seam between the append log and the file format; `CsvTable`
//! is the shipped implementation.
use crate::error::{AppResult, LoggerError};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Primitive operations the append log needs from a table file.
pub trait TabularStorage: Send {
    /// Number of persisted data rows, header excluded.
    fn row_count(&self) -> u64;

    /// Stage one row. It becomes durable on the next successful `save`.
    fn append_row(&mut self, record: &[String]) -> AppResult<()>;

    /// Persist staged rows. Staged rows are discarded when this fails.
    fn save(&mut self) -> AppResult<()>;

    /// Release the file. Safe to call more than once.
    fn close(&mut self) -> AppResult<()>;
}

/// A CSV file with a fixed header, written one synced row at a time.
pub struct CsvTable {
    path: PathBuf,
    delimiter: u8,
    file: Option<File>,
    rows: u64,
    pending: Vec<u8>,
    pending_rows: u64,
    /// The last record on disk has no line terminator yet
    needs_terminator: bool,
}

impl CsvTable {
    /// Open `path`, creating it with `header` if it is missing or empty.
    ///
    /// An existing file must start with exactly `header` and every record must be
    /// readable with the same number of fields; anything else is reported as
    /// `StorageUnavailable`. A file whose last record lacks a line terminator is
    /// accepted; the terminator is written ahead of the first new row.
    pub fn open_or_create(path: &Path, header: &[&str], delimiter: u8) -> AppResult<Self> {
        let existing_len = match std::fs::metadata(path) {
            Ok(meta) => Some(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(LoggerError::storage_unavailable(path, e)),
        };

        let mut needs_terminator = false;
        let rows = match existing_len {
            Some(len) if len > 0 => {
                let rows = count_rows(path, header, delimiter)?;
                needs_terminator = !ends_with_newline(path)
                    .map_err(|e| LoggerError::storage_unavailable(path, e))?;
                if needs_terminator {
                    debug!("Log '{}' has no final line break.", path.display());
                }
                info!("Log '{}' found with {} rows, continuing.", path.display(), rows);
                rows
            }
            _ => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| LoggerError::storage_unavailable(path, e))?;
                }
                write_header(path, header, delimiter)?;
                info!("Log '{}' created.", path.display());
                0
            }
        };

        let file = OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(|e| LoggerError::storage_unavailable(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            delimiter,
            file: Some(file),
            rows,
            pending: Vec::new(),
            pending_rows: 0,
            needs_terminator,
        })
    }

    /// Location of the table on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TabularStorage for CsvTable {
    fn row_count(&self) -> u64 {
        self.rows
    }

    fn append_row(&mut self, record: &[String]) -> AppResult<()> {
        let encoded = encode_record(record, self.delimiter)?;
        self.pending.extend_from_slice(&encoded);
        self.pending_rows += 1;
        Ok(())
    }

    fn save(&mut self) -> AppResult<()> {
        let mut pending = std::mem::take(&mut self.pending);
        let staged = std::mem::take(&mut self.pending_rows);
        if pending.is_empty() {
            return Ok(());
        }

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| LoggerError::WriteFailed("log file is closed".into()))?;
        if self.needs_terminator {
            pending.insert(0, b'\n');
        }

        match append_or_rollback(file, &pending) {
            Ok(()) => {}
            Err(AppendFailure::RolledBack(e)) => {
                warn!("Row not saved to '{}': {}", self.path.display(), e);
                return Err(LoggerError::WriteFailed(e.to_string()));
            }
            Err(AppendFailure::Torn { write, undo }) => {
                // A fragment is left on disk; refuse further appends instead of
                // gluing rows onto it.
                error!(
                    "Partial row left in '{}' ({}); log closed: {}",
                    self.path.display(),
                    write,
                    undo
                );
                self.file = None;
                return Err(LoggerError::WriteFailed(format!(
                    "{}; partial row could not be removed: {}",
                    write, undo
                )));
            }
        }

        self.needs_terminator = false;
        self.rows += staged;
        debug!("Saved {} row(s) to '{}'.", staged, self.path.display());
        Ok(())
    }

    fn close(&mut self) -> AppResult<()> {
        self.save()?;
        if let Some(file) = self.file.take() {
            file.sync_all()?;
            info!("Log '{}' closed with {} rows.", self.path.display(), self.rows);
        }
        Ok(())
    }
}

impl Drop for CsvTable {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// File operations an append needs, including undoing a partial one.
trait AppendTarget: Write {
    fn current_len(&self) -> io::Result<u64>;
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl AppendTarget for File {
    fn current_len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.sync_data()
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

#[derive(Debug)]
enum AppendFailure {
    /// The write failed and the target is back to its previous length.
    RolledBack(io::Error),
    /// The write failed and so did removing what it left behind.
    Torn { write: io::Error, undo: io::Error },
}

/// Append `bytes` and sync, or leave the target at its previous length.
fn append_or_rollback<F: AppendTarget>(target: &mut F, bytes: &[u8]) -> Result<(), AppendFailure> {
    let len = target.current_len().map_err(AppendFailure::RolledBack)?;
    let written = target.write_all(bytes).and_then(|_| target.sync());
    match written {
        Ok(()) => Ok(()),
        Err(write) => match target.truncate_to(len) {
            Ok(()) => Err(AppendFailure::RolledBack(write)),
            Err(undo) => Err(AppendFailure::Torn { write, undo }),
        },
    }
}

fn ends_with_newline(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    if file.seek(SeekFrom::End(0))? == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

fn encode_record(record: &[String], delimiter: u8) -> AppResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());
    writer
        .write_record(record)
        .map_err(|e| LoggerError::WriteFailed(e.to_string()))?;
    writer
        .into_inner()
        .map_err(|e| LoggerError::WriteFailed(e.to_string()))
}

fn write_header(path: &Path, header: &[&str], delimiter: u8) -> AppResult<()> {
    let file = File::create(path).map_err(|e| LoggerError::storage_unavailable(path, e))?;
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(file);
    writer
        .write_record(header)
        .map_err(|e| LoggerError::storage_unavailable(path, e))?;
    writer
        .flush()
        .map_err(|e| LoggerError::storage_unavailable(path, e))?;
    let file = writer
        .into_inner()
        .map_err(|e| LoggerError::storage_unavailable(path, e.error()))?;
    file.sync_all()
        .map_err(|e| LoggerError::storage_unavailable(path, e))
}

fn count_rows(path: &Path, header: &[&str], delimiter: u8) -> AppResult<u64> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_path(path)
        .map_err(|e| LoggerError::storage_unavailable(path, e))?;

    let found = reader
        .headers()
        .map_err(|e| LoggerError::storage_unavailable(path, e))?;
    if found.iter().ne(header.iter().copied()) {
        return Err(LoggerError::storage_unavailable(
            path,
            format!(
                "unexpected header [{}], expected [{}]",
                found.iter().collect::<Vec<_>>().join(", "),
                header.join(", ")
            ),
        ));
    }

    let mut rows = 0u64;
    for record in reader.records() {
        record.map_err(|e| LoggerError::storage_unavailable(path, e))?;
        rows += 1;
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: [&str; 3] = ["No", "Value", "Note"];

    fn row(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_creates_file_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("log.csv");

        let table = CsvTable::open_or_create(&path, &HEADER, b';').unwrap();
        assert_eq!(table.row_count(), 0);
        drop(table);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "No;Value;Note\n");
    }

    #[test]
    fn test_rows_are_durable_after_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");

        let mut table = CsvTable::open_or_create(&path, &HEADER, b';').unwrap();
        table.append_row(&row(&["1", "7,2", "ovalue 7.2"])).unwrap();
        assert_eq!(table.row_count(), 0);
        table.save().unwrap();
        assert_eq!(table.row_count(), 1);

        // Visible before close.
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "No;Value;Note\n1;7,2;ovalue 7.2\n");
    }

    #[test]
    fn test_reopen_counts_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");

        {
            let mut table = CsvTable::open_or_create(&path, &HEADER, b';').unwrap();
            for i in 1..=3 {
                table.append_row(&row(&[&i.to_string(), "1", ""])).unwrap();
                table.save().unwrap();
            }
            table.close().unwrap();
        }

        let table = CsvTable::open_or_create(&path, &HEADER, b';').unwrap();
        assert_eq!(table.row_count(), 3);
    }

    #[test]
    fn test_empty_existing_file_gets_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        std::fs::write(&path, "").unwrap();

        let table = CsvTable::open_or_create(&path, &HEADER, b';').unwrap();
        assert_eq!(table.row_count(), 0);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "No;Value;Note\n");
    }

    #[test]
    fn test_foreign_header_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        std::fs::write(&path, "a;b\n1;2\n").unwrap();

        match CsvTable::open_or_create(&path, &HEADER, b';') {
            Err(LoggerError::StorageUnavailable { reason, .. }) => {
                assert!(reason.contains("unexpected header"));
            }
            other => panic!("expected StorageUnavailable, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_ragged_rows_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        std::fs::write(&path, "No;Value;Note\n1;2\n").unwrap();

        assert!(matches!(
            CsvTable::open_or_create(&path, &HEADER, b';'),
            Err(LoggerError::StorageUnavailable { .. })
        ));
    }

    #[test]
    fn test_close_is_idempotent_and_blocks_saves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");

        let mut table = CsvTable::open_or_create(&path, &HEADER, b';').unwrap();
        table.close().unwrap();
        table.close().unwrap();

        table.append_row(&row(&["1", "2", "3"])).unwrap();
        assert!(matches!(table.save(), Err(LoggerError::WriteFailed(_))));
        assert_eq!(table.row_count(), 0);

        // The failed row does not come back on a later save.
        assert!(table.save().is_ok());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "No;Value;Note\n");
    }

    #[test]
    fn test_missing_final_line_break_is_added_before_next_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        std::fs::write(&path, "No;Value;Note\n1;7,2;ovalue 7.2").unwrap();

        let mut table = CsvTable::open_or_create(&path, &HEADER, b';').unwrap();
        assert_eq!(table.row_count(), 1);
        table.append_row(&row(&["2", "15", "Input cepat"])).unwrap();
        table.save().unwrap();
        table.append_row(&row(&["3", "16", ""])).unwrap();
        table.save().unwrap();
        drop(table);

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "No;Value;Note\n1;7,2;ovalue 7.2\n2;15;Input cepat\n3;16;\n"
        );
        let table = CsvTable::open_or_create(&path, &HEADER, b';').unwrap();
        assert_eq!(table.row_count(), 3);
    }

    #[test]
    fn test_open_without_appending_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        std::fs::write(&path, "No;Value;Note\n1;7,2;x").unwrap();

        let mut table = CsvTable::open_or_create(&path, &HEADER, b';').unwrap();
        table.close().unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "No;Value;Note\n1;7,2;x"
        );
    }

    /// In-memory file that runs out of space after `room` bytes.
    struct ShortFile {
        data: Vec<u8>,
        room: usize,
        undo_fails: bool,
    }

    impl ShortFile {
        fn new(existing: &[u8], room: usize) -> Self {
            Self {
                data: existing.to_vec(),
                room,
                undo_fails: false,
            }
        }
    }

    impl Write for ShortFile {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let free = self.room.saturating_sub(self.data.len());
            if free == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "File too large"));
            }
            let n = free.min(buf.len());
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl AppendTarget for ShortFile {
        fn current_len(&self) -> io::Result<u64> {
            Ok(self.data.len() as u64)
        }

        fn truncate_to(&mut self, len: u64) -> io::Result<()> {
            if self.undo_fails {
                return Err(io::Error::new(io::ErrorKind::Other, "read-only"));
            }
            self.data.truncate(len as usize);
            Ok(())
        }

        fn sync(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_partial_row_is_removed_when_write_fails() {
        let existing = b"No;Value;Note\n1;1;a\n";
        let mut file = ShortFile::new(existing, existing.len() + 4);

        let result = append_or_rollback(&mut file, b"2;1,5;xxxxxxxxxxxx\n");
        match result {
            Err(AppendFailure::RolledBack(e)) => assert_eq!(e.to_string(), "File too large"),
            other => panic!("expected RolledBack, got {:?}", other),
        }
        assert_eq!(file.data, existing);

        // Room again: the next row lands on a clean line.
        file.room = 1024;
        append_or_rollback(&mut file, b"2;3;b\n").unwrap();
        assert_eq!(file.data, b"No;Value;Note\n1;1;a\n2;3;b\n");
    }

    #[test]
    fn test_failed_undo_is_reported_as_torn() {
        let mut file = ShortFile::new(b"No\n", 5);
        file.undo_fails = true;

        assert!(matches!(
            append_or_rollback(&mut file, b"1234\n"),
            Err(AppendFailure::Torn { .. })
        ));
    }

    #[test]
    fn test_fields_with_delimiter_are_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");

        let mut table = CsvTable::open_or_create(&path, &HEADER, b',').unwrap();
        table.append_row(&row(&["1", "7,2", "note"])).unwrap();
        table.save().unwrap();
        drop(table);

        let table = CsvTable::open_or_create(&path, &HEADER, b',').unwrap();
        assert_eq!(table.row_count(), 1);
        assert!(std::fs::read_to_string(&path)
            .unwrap()
            .contains("1,\"7,2\",note"));
    }
}
