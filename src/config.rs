//! Configuration System using Figment
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Built-in defaults
//! 2. `config/logger.toml` (or the file passed with `--config`)
//! 3. Environment variables prefixed with `PRESSURE_LOGGER_`, nested keys joined with
//!    `__` (e.g. `PRESSURE_LOGGER_SERIAL__BAUD_RATE=19200`)
//!
//! # Example
//! ```no_run
//! use pressure_logger::config::LoggerConfig;
//!
//! let config = LoggerConfig::load()?;
//! config.validate()?;
//! println!("Logging to {}", config.storage.path.display());
//! # Ok::<(), pressure_logger::error::LoggerError>(())
//! ```

use crate::adapters::{SerialSettings, DEFAULT_BAUD_RATE, DEFAULT_DATA_BITS};
use crate::error::{AppResult, LoggerError};
use crate::logging::OutputFormat;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/logger.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "PRESSURE_LOGGER_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Name and diagnostics
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Serial line parameters
    #[serde(default)]
    pub serial: SerialConfig,
    /// Log file
    #[serde(default)]
    pub storage: StorageConfig,
    /// Capture timing
    #[serde(default)]
    pub capture: CaptureConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Diagnostic log layout: compact, pretty or json
    #[serde(default)]
    pub log_format: OutputFormat,
    /// Log span open and close events
    #[serde(default)]
    pub log_span_events: bool,
    /// Add file and line to diagnostic events
    #[serde(default)]
    pub log_source_location: bool,
    /// Colored diagnostic output
    #[serde(default = "default_true")]
    pub log_ansi: bool,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "Serial Pressure Logger".to_string(),
            log_level: "warn".to_string(),
            log_format: OutputFormat::default(),
            log_span_events: false,
            log_source_location: false,
            log_ansi: true,
        }
    }
}

/// Serial port settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Port to use when none is given on the command line
    #[serde(default)]
    pub port: Option<String>,
    /// Line speed (default 9600)
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Data bits, 5-8 (default 8)
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    /// Bounded wait of one device read, in milliseconds (must be sub-second)
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            read_timeout_ms: default_read_timeout(),
        }
    }
}

/// Log file settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Log file path
    #[serde(default = "default_log_path")]
    pub path: PathBuf,
    /// Field delimiter, a single ASCII character
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_log_path(),
            delimiter: default_delimiter(),
        }
    }
}

/// Capture behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// How long "read one value" waits for a reading, in seconds
    #[serde(default = "default_single_read_timeout")]
    pub single_read_timeout_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            single_read_timeout_secs: default_single_read_timeout(),
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_data_bits() -> u8 {
    DEFAULT_DATA_BITS
}

fn default_read_timeout() -> u64 {
    200
}

fn default_log_path() -> PathBuf {
    PathBuf::from("pressure_data.csv")
}

fn default_delimiter() -> String {
    ";".to_string()
}

fn default_single_read_timeout() -> u64 {
    10
}

impl LoggerConfig {
    /// Load configuration from the default file and environment variables.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Self::figment(path.as_ref()).extract().map_err(LoggerError::from)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(LoggerConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(LoggerError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.serial.baud_rate == 0 {
            return Err(LoggerError::Configuration(
                "baud_rate must be greater than 0".to_string(),
            ));
        }

        if !(5..=8).contains(&self.serial.data_bits) {
            return Err(LoggerError::Configuration(format!(
                "Invalid data_bits {}. Must be 5-8",
                self.serial.data_bits
            )));
        }

        if !(1..=999).contains(&self.serial.read_timeout_ms) {
            return Err(LoggerError::Configuration(format!(
                "Invalid read_timeout_ms {}. Must be 1-999",
                self.serial.read_timeout_ms
            )));
        }

        self.delimiter()?;

        if self.storage.path.as_os_str().is_empty() {
            return Err(LoggerError::Configuration(
                "storage.path must not be empty".to_string(),
            ));
        }

        if self.capture.single_read_timeout_secs == 0 {
            return Err(LoggerError::Configuration(
                "single_read_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// The configured delimiter as a byte.
    pub fn delimiter(&self) -> AppResult<u8> {
        let bytes = self.storage.delimiter.as_bytes();
        match bytes {
            [b] if b.is_ascii() && !matches!(b, b'.' | b',' | b'"' | b'\n' | b'\r') => Ok(*b),
            _ => Err(LoggerError::Configuration(format!(
                "Invalid delimiter '{}'. Must be one ASCII character other than '.', ',', '\"' or a line break",
                self.storage.delimiter.escape_default()
            ))),
        }
    }

    /// Device read timeout.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.serial.read_timeout_ms)
    }

    /// Serial settings for `port` using the configured line parameters.
    pub fn serial_settings(&self, port: impl Into<String>) -> SerialSettings {
        SerialSettings::new(port)
            .with_baud_rate(self.serial.baud_rate)
            .with_data_bits(self.serial.data_bits)
            .with_read_timeout(self.read_timeout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = LoggerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.data_bits, 8);
        assert_eq!(config.read_timeout(), Duration::from_millis(200));
        assert_eq!(config.delimiter().unwrap(), b';');
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logger.toml");
        std::fs::write(
            &path,
            r#"
[application]
name = "Bench 3"
log_level = "debug"

[serial]
port = "/dev/ttyUSB1"
baud_rate = 19200

[storage]
path = "bench3.csv"
"#,
        )
        .unwrap();

        let config = LoggerConfig::load_from(&path).unwrap();
        assert_eq!(config.application.name, "Bench 3");
        assert_eq!(config.serial.port.as_deref(), Some("/dev/ttyUSB1"));
        assert_eq!(config.serial.baud_rate, 19200);
        // Untouched keys keep their defaults.
        assert_eq!(config.serial.data_bits, 8);
        assert_eq!(config.storage.path, PathBuf::from("bench3.csv"));
        assert_eq!(config.storage.delimiter, ";");
        assert_eq!(config.application.log_format, OutputFormat::Compact);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_output_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logger.toml");
        std::fs::write(
            &path,
            r#"
[application]
log_format = "json"
log_source_location = true
log_ansi = false
"#,
        )
        .unwrap();

        let config = LoggerConfig::load_from(&path).unwrap();
        assert_eq!(config.application.log_format, OutputFormat::Json);
        assert!(config.application.log_source_location);
        assert!(!config.application.log_ansi);
        assert!(!config.application.log_span_events);
        assert_eq!(config.application.log_level, "warn");
    }

    #[test]
    fn test_unknown_log_format_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logger.toml");
        std::fs::write(&path, "[application]\nlog_format = \"xml\"\n").unwrap();

        assert!(matches!(
            LoggerConfig::load_from(&path),
            Err(LoggerError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggerConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.storage.path, PathBuf::from("pressure_data.csv"));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = LoggerConfig::default();
        config.application.log_level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_read_timeout_must_be_sub_second() {
        let mut config = LoggerConfig::default();
        config.serial.read_timeout_ms = 1000;
        assert!(config.validate().is_err());

        config.serial.read_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_delimiters() {
        for delimiter in ["", ",", ".", ";;", "\n", "é"] {
            let mut config = LoggerConfig::default();
            config.storage.delimiter = delimiter.to_string();
            assert!(config.validate().is_err(), "delimiter {:?}", delimiter);
        }

        let mut config = LoggerConfig::default();
        config.storage.delimiter = "\t".to_string();
        assert_eq!(config.delimiter().unwrap(), b'\t');
    }

    #[test]
    fn test_serial_settings_follow_config() {
        let mut config = LoggerConfig::default();
        config.serial.baud_rate = 115200;
        config.serial.read_timeout_ms = 100;

        let settings = config.serial_settings("COM3");
        assert_eq!(settings.port, "COM3");
        assert_eq!(settings.baud_rate, 115200);
        assert_eq!(settings.read_timeout, Duration::from_millis(100));
    }
}
