//! Device-line ingestion.
//!
//! One [`IngestSession`] owns the transport and the append log for the length of a
//! capture. Keyboard input reaches it only through an mpsc channel filled by the
//! listener task from [`spawn_line_listener`], so every append happens on the session's
//! own task.
//!
//! ```text
//! stdin ──► listener task ──► mpsc ──┐
//!                                    ├──► IngestSession ──► AppendLog ──► CSV file
//! serial port ──► LineTransport ─────┘          │
//!                                               └──► SessionEvent ──► operator console
//! ```
//!
//! Each iteration handles at most one pending manual entry before it polls the device,
//! so a manual entry and a device line that are both ready are appended in that order.
//! While a detailed entry waits for the operator, device lines are still read and
//! appended.

pub mod listener;
pub mod manual;
pub mod session;

pub use listener::spawn_line_listener;
pub use manual::ManualCommand;
pub use session::{read_single, IngestSession};

use crate::frame::FrameOutcome;
use crate::reading::Reading;
use std::fmt;
use std::path::PathBuf;
use tokio::sync::watch;

/// Where the ingestion loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    /// Created, not yet running.
    Idle,
    /// Waiting for a device line or a keyboard line.
    AwaitingDeviceOrManual,
    /// Handling a line from the device.
    DeviceLineReceived,
    /// Handling a keyboard line, including a detailed entry in progress.
    ManualEntryReceived,
    /// Appending an accepted reading.
    AppendAttempt,
    /// Transport and log are closed.
    Stopped,
}

/// What the operator is being asked for during a detailed manual entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    /// The value in kN.
    Value,
    /// A free-text note.
    Note,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The stop flag was raised (Ctrl+C).
    Interrupted,
    /// The operator typed a stop command.
    Command,
    /// The device stream reached end of file.
    DeviceClosed,
    /// Keyboard input ended and there is no device to read from.
    InputClosed,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::Interrupted => "stopped by user",
            StopReason::Command => "stop command",
            StopReason::DeviceClosed => "device disconnected",
            StopReason::InputClosed => "input closed",
        };
        f.write_str(text)
    }
}

/// Totals reported when a session stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// Rows appended during this session
    pub appended: u64,
    /// Accepted readings whose append failed
    pub lost: u64,
    /// Manual values refused as non-numeric
    pub rejected: u64,
    /// Sequence number of the last row appended this session
    pub last_sequence: Option<u64>,
    /// Rows in the log file, earlier sessions included
    pub rows_in_log: u64,
    /// Log file written by the session
    pub log_path: PathBuf,
    /// Why the session ended
    pub reason: StopReason,
}

/// Observations published for the operator console.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The session is running.
    Started {
        /// Transport name
        transport: String,
        /// Log file being appended to
        log_path: PathBuf,
        /// Sequence number the next row will get
        next_sequence: u64,
    },
    /// Non-empty decoded line from the device.
    DeviceLine(String),
    /// A device line that carried the sentinel but no usable value.
    NotAReading(FrameOutcome),
    /// A reading was persisted.
    Saved {
        /// Row number it was written under
        sequence: u64,
        /// The persisted reading
        reading: Reading,
    },
    /// An accepted reading could not be persisted.
    Lost {
        /// The lost reading
        reading: Reading,
        /// Storage error text
        reason: String,
    },
    /// A manual value that is not a number.
    ManualRejected {
        /// The text as typed, trimmed
        input: String,
    },
    /// Detailed manual entry abandoned.
    ManualCancelled,
    /// A keyboard line that is not a command.
    UnknownCommand(String),
    /// The operator is asked for input.
    Prompt(Prompt),
    /// A device read failed.
    TransportFault(String),
    /// The session ended; the last event.
    Stopped(SessionSummary),
}

/// Resolve once the stop flag is raised.
///
/// Never resolves if the sender is dropped without raising it.
pub async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stop_requested_sees_raised_flag() {
        let (tx, mut rx) = watch::channel(false);
        tx.send_replace(true);
        tokio::time::timeout(Duration::from_millis(100), stop_requested(&mut rx))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_stop_requested_waits_after_sender_dropped() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        let waited = tokio::time::timeout(Duration::from_millis(50), stop_requested(&mut rx)).await;
        assert!(waited.is_err());
    }

    #[test]
    fn test_stop_reason_display() {
        assert_eq!(StopReason::Interrupted.to_string(), "stopped by user");
        assert_eq!(StopReason::DeviceClosed.to_string(), "device disconnected");
    }
}
