//! Reading log storage: the table format and the append log on top of it.
pub mod append_log;
pub mod storage;

pub use append_log::{AppendLog, LOG_HEADER};
pub use storage::{CsvTable, TabularStorage};
