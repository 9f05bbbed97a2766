//! CLI Entry Point for pressure-logger
//!
//! Without a subcommand the interactive menu starts. The subcommands run one menu
//! action directly:
//!
//! ```bash
//! pressure-logger ports
//! pressure-logger probe --port /dev/ttyUSB0
//! pressure-logger capture --port /dev/ttyUSB0 --file bench3
//! pressure-logger manual --file notes.csv
//! ```
//!
//! Ctrl+C stops a running capture. Everything the operator needs goes to stdout; the
//! diagnostic log goes to stderr.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pressure_logger::config::{LoggerConfig, DEFAULT_CONFIG_PATH};
use pressure_logger::ingest::spawn_line_listener;
use pressure_logger::logging;
use pressure_logger::menu::{normalize_log_path, Console};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::sync::watch;
use tracing::{info, warn};

// Use mimalloc for improved allocation performance
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "pressure-logger")]
#[command(about = "Log serial pressure gauge readings to a CSV file", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the configured log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive menu (default)
    Menu,

    /// List serial ports
    Ports,

    /// Test whether ports can be opened
    Probe {
        /// Port to test; all ports when omitted
        #[arg(long)]
        port: Option<String>,
    },

    /// Read one value and print it without saving
    Read {
        #[arg(long)]
        port: Option<String>,
    },

    /// Capture continuously, saving every reading
    Capture {
        #[arg(long)]
        port: Option<String>,

        /// Log file; `.csv` is appended when missing
        #[arg(long)]
        file: Option<String>,

        #[arg(long)]
        baud: Option<u32>,
    },

    /// Log manually entered values only
    Manual {
        #[arg(long)]
        file: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = LoggerConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    if let Some(level) = &cli.log_level {
        config.application.log_level = level.clone();
    }
    config.validate()?;
    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let result = runtime.block_on(run(cli.command.unwrap_or(Commands::Menu), config));

    // The blocking stdin read cannot be cancelled; do not wait for it.
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

async fn run(command: Commands, config: LoggerConfig) -> Result<()> {
    info!("{} starting", config.application.name);

    let (interrupt, _) = watch::channel(false);
    let interrupt = Arc::new(interrupt);
    spawn_interrupt_forwarder(Arc::clone(&interrupt));

    // Kept alive for the whole run: the keyboard listener outlives every session.
    let (_shutdown, shutdown_rx) = watch::channel(false);
    let (input, _listener) = spawn_line_listener(BufReader::new(tokio::io::stdin()), shutdown_rx);

    let default_port = config.serial.port.clone();
    let default_path = config.storage.path.clone();
    let mut console = Console::new(config, input, interrupt);

    match command {
        Commands::Menu => console.run_menu().await?,
        Commands::Ports => {
            console.list_ports().await?;
        }
        Commands::Probe { port: Some(port) } => {
            if !console.test_port(&port).await.is_connected() {
                bail!("Connection test on {} failed", port);
            }
        }
        Commands::Probe { port: None } => {
            console.test_all_ports().await?;
        }
        Commands::Read { port } => {
            let port = require_port(port, &default_port)?;
            console.read_one(&port).await?;
        }
        Commands::Capture { port, file, baud } => {
            let port = require_port(port, &default_port)?;
            let path = normalize_log_path(file.as_deref().unwrap_or_default(), &default_path);
            let baud = baud.unwrap_or(console.config().serial.baud_rate);
            console.capture(&port, &path, baud).await?;
        }
        Commands::Manual { file } => {
            let path = normalize_log_path(file.as_deref().unwrap_or_default(), &default_path);
            console.manual_only(&path).await?;
        }
    }

    Ok(())
}

fn require_port(port: Option<String>, default_port: &Option<String>) -> Result<String> {
    match port.or_else(|| default_port.clone()) {
        Some(port) => Ok(port),
        None => bail!("No port given; use --port or set serial.port in the configuration"),
    }
}

/// Raise `interrupt` on every Ctrl+C.
fn spawn_interrupt_forwarder(interrupt: Arc<watch::Sender<bool>>) {
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Cannot listen for Ctrl+C: {}", e);
                return;
            }
            info!("Interrupt received");
            interrupt.send_replace(true);
        }
    });
}
