//! # Serial Pressure Logger
//!
//! Reads pressure readings from a serial-attached gauge and appends them, together with
//! manually entered values, to a CSV log whose row numbers continue across sessions.
//!
//! ## Crate Structure
//!
//! - **`frame`**: Classifies device lines and normalizes decimal values. Pure, no I/O.
//! - **`reading`**: The `Reading` record and its persisted layout.
//! - **`data`**: `TabularStorage` with the CSV implementation, and the `AppendLog`
//!   that numbers and persists rows.
//! - **`adapters`**: The `LineTransport` trait with the serial and idle transports.
//! - **`discovery`**: Port enumeration and connection probes.
//! - **`ingest`**: The ingestion loop interleaving device lines and keyboard entries,
//!   the keyboard listener task and single-shot reads.
//! - **`menu`**: The operator console behind the interactive menu and the subcommands.
//! - **`config`**: Layered configuration (defaults, TOML file, environment).
//! - **`logging`**: `tracing` subscriber setup.
//! - **`error`**: The `LoggerError` enum shared by all modules.

pub mod adapters;
pub mod config;
pub mod data;
pub mod discovery;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod logging;
pub mod menu;
pub mod reading;
