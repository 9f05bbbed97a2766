//! Operator console.
//!
//! [`Console`] backs both the interactive menu and the one-shot subcommands. Keyboard
//! input arrives through the same line channel a capture session reads, so nothing typed
//! between the menu and a session is lost.
//!
//! Ctrl+C raises the shared interrupt flag. A running capture stops and control returns
//! to the menu; at a menu prompt it ends the program.

use crate::adapters::{IdleTransport, LineTransport, SerialLineTransport};
use crate::config::LoggerConfig;
use crate::data::AppendLog;
use crate::discovery::{self, PortInfo, ProbeResult};
use crate::error::{AppResult, LoggerError};
use crate::frame::{format_decimal_comma, FrameOutcome, ParsedFrame};
use crate::ingest::{
    read_single, stop_requested, IngestSession, Prompt, SessionEvent, SessionSummary,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::debug;

const RULE_WIDTH: usize = 60;

/// Log files are always CSV.
const LOG_EXTENSION: &str = ".csv";

/// One entry of the main menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    /// 1. List serial ports
    ListPorts,
    /// 2. Try to open every port
    TestAllPorts,
    /// 3. Pick a port and test it
    Connect,
    /// 4. Show one reading without saving it
    ReadOne,
    /// 5. Device capture with manual entry
    Capture,
    /// 6. Manual entry without a device
    ManualOnly,
    /// 7. Quit
    Exit,
}

impl MenuChoice {
    /// Menu order.
    pub const ALL: [MenuChoice; 7] = [
        MenuChoice::ListPorts,
        MenuChoice::TestAllPorts,
        MenuChoice::Connect,
        MenuChoice::ReadOne,
        MenuChoice::Capture,
        MenuChoice::ManualOnly,
        MenuChoice::Exit,
    ];

    /// Choice for a typed number, 1-based.
    pub fn parse(input: &str) -> Option<Self> {
        let index: usize = input.trim().parse().ok()?;
        Self::ALL.get(index.checked_sub(1)?).copied()
    }

    /// Menu text.
    pub fn label(&self) -> &'static str {
        match self {
            MenuChoice::ListPorts => "List serial ports",
            MenuChoice::TestAllPorts => "Test all ports",
            MenuChoice::Connect => "Connect to a port",
            MenuChoice::ReadOne => "Read one value",
            MenuChoice::Capture => "Continuous capture (auto-save)",
            MenuChoice::ManualOnly => "Manual entry only",
            MenuChoice::Exit => "Exit",
        }
    }
}

/// Resolve an operator-supplied log file name.
///
/// Blank input selects `default`; names not ending in `.csv` get it appended.
pub fn normalize_log_path(input: &str, default: &Path) -> PathBuf {
    let input = input.trim();
    if input.is_empty() {
        return default.to_path_buf();
    }
    if input.to_lowercase().ends_with(LOG_EXTENSION) {
        PathBuf::from(input)
    } else {
        PathBuf::from(format!("{}{}", input, LOG_EXTENSION))
    }
}

/// Console text for a session event. Prompts carry no trailing newline.
pub fn render_event(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Started {
            transport,
            log_path,
            next_sequence,
        } => format!(
            "Source: {}\nData will be saved to: {}\nNext row: {}\n{}\n\
             Quick entry: m <value>   Detailed entry: m   Stop: exit or Ctrl+C\n",
            transport,
            log_path.display(),
            next_sequence,
            "=".repeat(RULE_WIDTH)
        ),
        SessionEvent::DeviceLine(line) => {
            format!("[{}] Raw: {}", chrono::Local::now().format("%H:%M:%S"), line)
        }
        SessionEvent::NotAReading(FrameOutcome::Malformed) => {
            "⚠ Incomplete data format, waiting for the next line...".to_string()
        }
        SessionEvent::NotAReading(outcome) => format!("⚠ Could not parse value: {}", outcome),
        SessionEvent::Saved { sequence, reading } => format!(
            "✓ Data #{} saved: {} KN ({})\n{}",
            sequence,
            reading.value_string(),
            reading.source,
            "-".repeat(RULE_WIDTH)
        ),
        SessionEvent::Lost { reading, reason } => format!(
            "⚠ Reading {} KN was NOT saved: {}",
            reading.value_string(),
            reason
        ),
        SessionEvent::ManualRejected { input } => {
            format!("⚠ '{}' is not a valid number", input)
        }
        SessionEvent::ManualCancelled => "Manual entry cancelled".to_string(),
        SessionEvent::UnknownCommand(input) => format!(
            "Unknown command '{}'. Use 'm <value>', 'm' or 'exit'",
            input
        ),
        SessionEvent::Prompt(Prompt::Value) => {
            "Value in KN (blank to cancel): ".to_string()
        }
        SessionEvent::Prompt(Prompt::Note) => "Note (optional): ".to_string(),
        SessionEvent::TransportFault(reason) => format!("⚠ Error reading data: {}", reason),
        SessionEvent::Stopped(summary) => format!(
            "\n✓ Capture stopped ({})\n✓ Rows saved this session: {}\n✓ Total rows in file: {}\n✓ File: {}",
            summary.reason,
            summary.appended,
            summary.rows_in_log,
            summary.log_path.display()
        ),
    }
}

async fn print_events(mut events: mpsc::UnboundedReceiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        let text = render_event(&event);
        if matches!(event, SessionEvent::Prompt(_)) {
            print!("{}", text);
            let _ = std::io::stdout().flush();
        } else {
            println!("{}", text);
        }
    }
}

/// Interactive front end over discovery, single reads and capture sessions.
pub struct Console {
    config: LoggerConfig,
    input: mpsc::Receiver<String>,
    interrupt: Arc<watch::Sender<bool>>,
    /// Port chosen with "connect", reused by later reads and captures
    port: Option<String>,
}

impl Console {
    /// `input` carries keyboard lines; `interrupt` is raised by Ctrl+C.
    pub fn new(
        config: LoggerConfig,
        input: mpsc::Receiver<String>,
        interrupt: Arc<watch::Sender<bool>>,
    ) -> Self {
        let port = config.serial.port.clone();
        Self {
            config,
            input,
            interrupt,
            port,
        }
    }

    /// Loaded configuration.
    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    /// Port picked with "connect", or the configured one.
    pub fn selected_port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    /// Run the menu until "exit", end of input or Ctrl+C.
    pub async fn run_menu(&mut self) -> AppResult<()> {
        println!("{}", "=".repeat(RULE_WIDTH));
        println!("{}", self.config.application.name);
        println!("{}", "=".repeat(RULE_WIDTH));

        loop {
            println!("\nMenu:");
            for (i, choice) in MenuChoice::ALL.iter().enumerate() {
                println!("{}. {}", i + 1, choice.label());
            }
            if let Some(port) = &self.port {
                println!("(selected port: {})", port);
            }

            let Some(line) = self.ask("\nChoose an option (1-7): ").await else {
                println!("\n\nProgram stopped. Thank you!");
                return Ok(());
            };

            let Some(choice) = MenuChoice::parse(&line) else {
                println!("Invalid option! Choose 1-7.");
                continue;
            };

            if choice == MenuChoice::Exit {
                println!("Thank you!");
                return Ok(());
            }

            // Session-level failures are reported and the menu carries on.
            if let Err(e) = self.dispatch(choice).await {
                debug!("{} failed: {}", choice.label(), e);
                println!("Error: {}", e);
            }
        }
    }

    async fn dispatch(&mut self, choice: MenuChoice) -> AppResult<()> {
        match choice {
            MenuChoice::ListPorts => {
                println!();
                let ports = self.list_ports().await?;
                println!("\nFound {} serial ports", ports.len());
            }
            MenuChoice::TestAllPorts => {
                self.test_all_ports().await?;
            }
            MenuChoice::Connect => {
                if let Some(port) = self.choose_port().await? {
                    if self.test_port(&port).await.is_connected() {
                        self.port = Some(port);
                    }
                }
            }
            MenuChoice::ReadOne => {
                if let Some(port) = self.port_or_choose().await? {
                    self.read_one(&port).await?;
                }
            }
            MenuChoice::Capture => {
                if let Some(port) = self.port_or_choose().await? {
                    let default_path = self.config.storage.path.clone();
                    let Some(file) = self
                        .ask(&format!(
                            "\nLog file name (Enter for '{}'): ",
                            default_path.display()
                        ))
                        .await
                    else {
                        return Ok(());
                    };
                    let path = normalize_log_path(&file, &default_path);

                    let default_baud = self.config.serial.baud_rate;
                    let Some(baud) = self
                        .ask(&format!("Baud rate (Enter for {}): ", default_baud))
                        .await
                    else {
                        return Ok(());
                    };
                    let baud = match baud.trim() {
                        "" => default_baud,
                        text => match text.parse() {
                            Ok(baud) => baud,
                            Err(_) => {
                                println!("Enter a valid number!");
                                return Ok(());
                            }
                        },
                    };

                    self.capture(&port, &path, baud).await?;
                }
            }
            MenuChoice::ManualOnly => {
                let default_path = self.config.storage.path.clone();
                let Some(file) = self
                    .ask(&format!(
                        "\nLog file name (Enter for '{}'): ",
                        default_path.display()
                    ))
                    .await
                else {
                    return Ok(());
                };
                let path = normalize_log_path(&file, &default_path);
                self.manual_only(&path).await?;
            }
            MenuChoice::Exit => {}
        }
        Ok(())
    }

    /// Print and return the ports the OS reports.
    pub async fn list_ports(&self) -> AppResult<Vec<PortInfo>> {
        let ports = tokio::task::spawn_blocking(discovery::enumerate_ports)
            .await
            .map_err(|e| LoggerError::Discovery(e.to_string()))??;

        if ports.is_empty() {
            println!("No serial ports found");
            return Ok(ports);
        }

        println!("Available serial ports:");
        for port in &ports {
            println!("Port: {}", port.device_name);
            println!("Description: {}", port.description);
            println!("Hardware ID: {}", port.hardware_id);
            println!("{}", "-".repeat(40));
        }
        Ok(ports)
    }

    /// Probe every port and print a status line for each.
    pub async fn test_all_ports(&self) -> AppResult<Vec<(PortInfo, ProbeResult)>> {
        let baud = self.config.serial.baud_rate;
        let bits = self.config.serial.data_bits;
        let results = tokio::task::spawn_blocking(move || discovery::probe_all(baud, bits))
            .await
            .map_err(|e| LoggerError::Discovery(e.to_string()))??;

        if results.is_empty() {
            println!("No serial ports found");
        }
        for (port, result) in &results {
            let mark = if result.is_connected() { "✓" } else { "✗" };
            println!("{} {:<20} {}", mark, port.device_name, result);
        }
        Ok(results)
    }

    /// Open and close `port`, printing the outcome.
    pub async fn test_port(&self, port: &str) -> ProbeResult {
        let name = port.to_string();
        let baud = self.config.serial.baud_rate;
        let bits = self.config.serial.data_bits;
        let result = tokio::task::spawn_blocking(move || discovery::probe_port(&name, baud, bits))
            .await
            .unwrap_or_else(|e| ProbeResult::Failed(e.to_string()));

        match &result {
            ProbeResult::Connected => println!("✓ Connected to {}", port),
            ProbeResult::Failed(reason) => println!("✗ Error connecting to {}: {}", port, reason),
        }
        result
    }

    /// Wait for one reading from `port` without saving it.
    pub async fn read_one(&mut self, port: &str) -> AppResult<Option<ParsedFrame>> {
        let settings = self.config.serial_settings(port);
        let deadline = Duration::from_secs(self.config.capture.single_read_timeout_secs);
        let mut transport = SerialLineTransport::open(&settings).await?;

        println!("Waiting up to {}s for a reading from {}...", deadline.as_secs(), port);
        self.interrupt.send_replace(false);
        let mut stop = self.interrupt.subscribe();

        let result = tokio::select! {
            biased;
            _ = stop_requested(&mut stop) => Ok(None),
            frame = read_single(&mut transport, deadline) => frame,
        };
        transport.close().await?;
        self.interrupt.send_replace(false);

        match &result {
            Ok(Some(frame)) => println!(
                "✓ Value: {} KN (raw: {})",
                format_decimal_comma(frame.value),
                frame.raw
            ),
            Ok(None) => println!("⚠ No reading received"),
            Err(_) => {}
        }
        result
    }

    /// Capture from `port` into the log at `path` until stopped.
    pub async fn capture(&mut self, port: &str, path: &Path, baud: u32) -> AppResult<SessionSummary> {
        let settings = self.config.serial_settings(port).with_baud_rate(baud);
        let transport = SerialLineTransport::open(&settings).await?;

        println!("\n{}", "=".repeat(RULE_WIDTH));
        println!("Connected to {}", port);
        println!("Baud rate: {}", baud);
        self.run_session(transport, path).await
    }

    /// Session fed only by keyboard entries.
    pub async fn manual_only(&mut self, path: &Path) -> AppResult<SessionSummary> {
        let transport = IdleTransport::new(self.config.read_timeout());
        println!("\n{}", "=".repeat(RULE_WIDTH));
        self.run_session(transport, path).await
    }

    async fn run_session<T: LineTransport>(&mut self, transport: T, path: &Path) -> AppResult<SessionSummary> {
        let log = AppendLog::open_or_create(path, self.config.delimiter()?)?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let printer = tokio::spawn(print_events(event_rx));

        self.interrupt.send_replace(false);
        let mut session =
            IngestSession::new(transport, log, self.interrupt.subscribe()).with_events(event_tx);
        let summary = session.run(&mut self.input).await;

        // Dropping the session closes the event channel and lets the printer drain.
        drop(session);
        if let Err(e) = printer.await {
            debug!("Event printer ended abnormally: {}", e);
        }
        self.interrupt.send_replace(false);
        summary
    }

    async fn port_or_choose(&mut self) -> AppResult<Option<String>> {
        match &self.port {
            Some(port) => Ok(Some(port.clone())),
            None => self.choose_port().await,
        }
    }

    async fn choose_port(&mut self) -> AppResult<Option<String>> {
        let ports = self.list_ports().await?;
        if ports.is_empty() {
            return Ok(None);
        }

        println!("\nFound {} serial ports", ports.len());
        for (i, port) in ports.iter().enumerate() {
            println!("{}. {}", i + 1, port.device_name);
        }

        let Some(line) = self.ask("\nPort number (0 to cancel): ").await else {
            return Ok(None);
        };
        match line.trim().parse::<usize>() {
            Ok(0) => Ok(None),
            Ok(n) if n <= ports.len() => Ok(Some(ports[n - 1].device_name.clone())),
            Ok(_) => {
                println!("Invalid choice!");
                Ok(None)
            }
            Err(_) => {
                println!("Enter a valid number!");
                Ok(None)
            }
        }
    }

    /// Prompt and wait for one line. `None` on Ctrl+C or end of input.
    async fn ask(&mut self, prompt: &str) -> Option<String> {
        print!("{}", prompt);
        let _ = std::io::stdout().flush();

        let mut stop = self.interrupt.subscribe();
        tokio::select! {
            biased;
            _ = stop_requested(&mut stop) => None,
            line = self.input.recv() => line,
        }
    }
}
