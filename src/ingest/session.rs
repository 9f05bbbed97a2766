//! The ingestion loop.
use super::{stop_requested, IngestState, ManualCommand, Prompt, SessionEvent, SessionSummary, StopReason};
use crate::adapters::LineTransport;
use crate::data::{AppendLog, CsvTable, TabularStorage};
use crate::error::{AppResult, LoggerError};
use crate::frame::{self, decode_line, parse_decimal, FrameOutcome, ParsedFrame};
use crate::reading::{Reading, QUICK_ENTRY_NOTE};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::watch;
use tracing::{debug, info, instrument, trace, warn};

/// Pause after a failed device read before polling again.
const DEFAULT_FAULT_BACKOFF: Duration = Duration::from_millis(500);

/// A capture session: one transport, one append log, one writer.
pub struct IngestSession<T: LineTransport, S: TabularStorage = CsvTable> {
    transport: T,
    log: AppendLog<S>,
    stop: watch::Receiver<bool>,
    events: Option<mpsc::UnboundedSender<SessionEvent>>,
    state: IngestState,
    fault_backoff: Duration,
    /// The device stream ended; no further reads are attempted
    device_closed: bool,
    appended: u64,
    lost: u64,
    rejected: u64,
    last_sequence: Option<u64>,
}

impl<T: LineTransport, S: TabularStorage> IngestSession<T, S> {
    /// Session over `transport` appending to `log`; raising `stop` ends it.
    pub fn new(transport: T, log: AppendLog<S>, stop: watch::Receiver<bool>) -> Self {
        Self {
            transport,
            log,
            stop,
            events: None,
            state: IngestState::Idle,
            fault_backoff: DEFAULT_FAULT_BACKOFF,
            device_closed: false,
            appended: 0,
            lost: 0,
            rejected: 0,
            last_sequence: None,
        }
    }

    /// Publish session events on `events`.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Pause after a failed device read (default 500 ms).
    pub fn with_fault_backoff(mut self, backoff: Duration) -> Self {
        self.fault_backoff = backoff;
        self
    }

    /// Current loop state.
    pub fn state(&self) -> IngestState {
        self.state
    }

    /// The append log, closed once `run` returns.
    pub fn log(&self) -> &AppendLog<S> {
        &self.log
    }

    /// Run until stopped, then close the transport and the log.
    ///
    /// `manual` carries raw keyboard lines. Only closing the log can fail; every other
    /// error is reported through events and the loop carries on.
    #[instrument(skip_all, fields(transport = %self.transport.name(), log = %self.log.path().display()))]
    pub async fn run(&mut self, manual: &mut mpsc::Receiver<String>) -> AppResult<SessionSummary> {
        info!(next_sequence = self.log.next_sequence(), "Capture started");
        self.emit(SessionEvent::Started {
            transport: self.transport.name().to_string(),
            log_path: self.log.path().to_path_buf(),
            next_sequence: self.log.next_sequence(),
        });

        let reason = loop {
            if *self.stop.borrow() {
                break StopReason::Interrupted;
            }
            self.state = IngestState::AwaitingDeviceOrManual;

            match manual.try_recv() {
                Ok(line) => {
                    self.state = IngestState::ManualEntryReceived;
                    if let Some(reason) = self.handle_manual(&line, manual).await {
                        break reason;
                    }
                    if self.device_closed {
                        break StopReason::DeviceClosed;
                    }
                    self.state = IngestState::AwaitingDeviceOrManual;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    if !self.transport.is_device() {
                        break StopReason::InputClosed;
                    }
                }
            }

            // A detailed entry can take arbitrarily long.
            if *self.stop.borrow() {
                break StopReason::Interrupted;
            }

            let read = self.transport.read_line().await;
            self.handle_read(read).await;
            if self.device_closed {
                break StopReason::DeviceClosed;
            }
        };

        self.finish(reason).await
    }

    async fn finish(&mut self, reason: StopReason) -> AppResult<SessionSummary> {
        self.state = IngestState::Stopped;

        if let Err(e) = self.transport.close().await {
            warn!("Failed to close {}: {}", self.transport.name(), e);
        }
        let closed = self.log.close();

        let summary = SessionSummary {
            appended: self.appended,
            lost: self.lost,
            rejected: self.rejected,
            last_sequence: self.last_sequence,
            rows_in_log: self.log.row_count(),
            log_path: self.log.path().to_path_buf(),
            reason,
        };
        info!(
            appended = summary.appended,
            lost = summary.lost,
            rows = summary.rows_in_log,
            "Capture stopped: {}",
            reason
        );
        self.emit(SessionEvent::Stopped(summary.clone()));

        closed.map(|_| summary)
    }

    /// Act on the outcome of one device read.
    ///
    /// Errors the session can ride out are reported and followed by the fault back-off;
    /// end of stream, or any other error, marks the device closed.
    async fn handle_read(&mut self, read: AppResult<Option<Vec<u8>>>) {
        match read {
            Ok(None) => {}
            Ok(Some(bytes)) => {
                self.state = IngestState::DeviceLineReceived;
                self.handle_device_line(&bytes);
            }
            Err(LoggerError::SerialUnexpectedEof) => {
                warn!("Device stream ended");
                self.device_closed = true;
            }
            Err(e) if e.is_recoverable() => {
                warn!("Error reading from {}: {}", self.transport.name(), e);
                self.emit(SessionEvent::TransportFault(e.to_string()));
                tokio::time::sleep(self.fault_backoff).await;
            }
            Err(e) => {
                warn!("Giving up on {}: {}", self.transport.name(), e);
                self.emit(SessionEvent::TransportFault(e.to_string()));
                self.device_closed = true;
            }
        }
    }

    fn handle_device_line(&mut self, bytes: &[u8]) {
        let line = decode_line(bytes);
        if line.is_empty() {
            return;
        }
        self.emit(SessionEvent::DeviceLine(line.clone()));

        match frame::parse(&line) {
            FrameOutcome::Reading(frame) => self.append(Reading::from_frame(frame)),
            FrameOutcome::NoSentinel => trace!("Ignoring line without sentinel"),
            outcome => {
                debug!("Dropping device line ({}): {}", outcome.kind(), outcome);
                self.emit(SessionEvent::NotAReading(outcome));
            }
        }
    }

    /// Handle one keyboard line. Returns the stop reason if the session must end.
    async fn handle_manual(
        &mut self,
        line: &str,
        manual: &mut mpsc::Receiver<String>,
    ) -> Option<StopReason> {
        match ManualCommand::parse(line) {
            ManualCommand::Quick(value) => {
                self.append(Reading::manual(value, QUICK_ENTRY_NOTE));
                None
            }
            ManualCommand::InvalidQuick(input) => {
                self.reject(input);
                None
            }
            ManualCommand::Detail => self.detail_entry(manual).await,
            ManualCommand::Stop => {
                info!("Stop command received");
                Some(StopReason::Command)
            }
            ManualCommand::Empty => None,
            ManualCommand::Unknown(input) => {
                debug!("Unknown command '{}'", input);
                self.emit(SessionEvent::UnknownCommand(input));
                None
            }
        }
    }

    /// Ask for a value until one parses (a blank line cancels), then for a note.
    async fn detail_entry(&mut self, manual: &mut mpsc::Receiver<String>) -> Option<StopReason> {
        self.emit(SessionEvent::Prompt(Prompt::Value));
        let value = loop {
            let line = match self.next_line(manual).await {
                Ok(line) => line,
                Err(reason) => return self.abandon_entry(reason),
            };
            let input = line.trim();
            if input.is_empty() {
                self.emit(SessionEvent::ManualCancelled);
                return None;
            }
            match parse_decimal(input) {
                Some(value) => break value,
                None => {
                    self.reject(input.to_string());
                    self.emit(SessionEvent::Prompt(Prompt::Value));
                }
            }
        };

        self.emit(SessionEvent::Prompt(Prompt::Note));
        let note = match self.next_line(manual).await {
            Ok(note) => note,
            Err(reason) => return self.abandon_entry(reason),
        };

        self.append(Reading::manual(value, note.trim()));
        None
    }

    /// Drop a half-finished detailed entry. Closed input only ends the session when
    /// there is no device to keep reading.
    fn abandon_entry(&mut self, reason: StopReason) -> Option<StopReason> {
        self.emit(SessionEvent::ManualCancelled);
        if reason == StopReason::InputClosed && self.transport.is_device() {
            None
        } else {
            Some(reason)
        }
    }

    /// Wait for the next keyboard line with no timeout, giving up only on stop or
    /// closed input. The device keeps being read and its readings appended meanwhile.
    async fn next_line(&mut self, manual: &mut mpsc::Receiver<String>) -> Result<String, StopReason> {
        loop {
            let poll_device = !self.device_closed;
            let wait = tokio::select! {
                biased;
                _ = stop_requested(&mut self.stop) => return Err(StopReason::Interrupted),
                line = manual.recv() => return line.ok_or(StopReason::InputClosed),
                read = self.transport.read_line(), if poll_device => read,
            };
            let state = self.state;
            self.handle_read(wait).await;
            self.state = state;
        }
    }

    fn reject(&mut self, input: String) {
        self.rejected += 1;
        debug!("Rejected manual value '{}'", input);
        self.emit(SessionEvent::ManualRejected { input });
    }

    fn append(&mut self, reading: Reading) {
        self.state = IngestState::AppendAttempt;
        match self.log.append(&reading) {
            Ok(sequence) => {
                self.appended += 1;
                self.last_sequence = Some(sequence);
                self.emit(SessionEvent::Saved { sequence, reading });
            }
            Err(e) => {
                self.lost += 1;
                self.emit(SessionEvent::Lost {
                    reading,
                    reason: e.to_string(),
                });
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(events) = &self.events {
            // Nobody listening is fine.
            let _ = events.send(event);
        }
    }
}

/// Read until the first accepted reading or until `deadline` passes.
///
/// Nothing is persisted; lines that are not readings are skipped.
pub async fn read_single<T: LineTransport + ?Sized>(
    transport: &mut T,
    deadline: Duration,
) -> AppResult<Option<ParsedFrame>> {
    let outcome = tokio::time::timeout(deadline, first_reading(transport)).await;
    match outcome {
        Ok(result) => result.map(Some),
        Err(_) => {
            debug!("No reading from {} within {:?}", transport.name(), deadline);
            Ok(None)
        }
    }
}

async fn first_reading<T: LineTransport + ?Sized>(transport: &mut T) -> AppResult<ParsedFrame> {
    loop {
        let Some(bytes) = transport.read_line().await? else {
            continue;
        };
        let line = decode_line(&bytes);
        match frame::parse(&line) {
            FrameOutcome::Reading(frame) => return Ok(frame),
            outcome => trace!("Skipping '{}' ({})", line, outcome.kind()),
        }
    }
}
