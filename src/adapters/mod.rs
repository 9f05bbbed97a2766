// src/adapters/mod.rs

//! Line transports feeding the ingestion loop.
//!
//! A transport yields one device line per call, waiting at most its read timeout.
//! `SerialLineTransport` talks to a real port (or any async byte stream in tests);
//! `IdleTransport` stands in when readings are only entered by hand.

use crate::error::AppResult;
use async_trait::async_trait;
use std::time::Duration;

pub mod idle;
pub mod serial;

pub use idle::IdleTransport;
pub use serial::SerialLineTransport;

/// Default baud rate of the pressure gauge.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default number of data bits.
pub const DEFAULT_DATA_BITS: u8 = 8;

/// Settings for opening a serial port (always no parity, one stop bit, no flow control).
#[derive(Debug, Clone, PartialEq)]
pub struct SerialSettings {
    /// Port path (e.g., "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Line speed
    pub baud_rate: u32,
    /// 5 to 8
    pub data_bits: u8,
    /// Longest a single `read_line` waits before reporting "nothing yet"
    pub read_timeout: Duration,
}

impl SerialSettings {
    /// Defaults for the gauge: 9600 baud, 8 data bits, 200 ms reads.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DEFAULT_DATA_BITS,
            read_timeout: Duration::from_millis(200),
        }
    }

    /// Set the baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the number of data bits
    pub fn with_data_bits(mut self, data_bits: u8) -> Self {
        self.data_bits = data_bits;
        self
    }

    /// Set the longest wait of one read
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

/// Source of newline-delimited device lines.
#[async_trait]
pub trait LineTransport: Send {
    /// Read one line, without its terminator.
    ///
    /// Returns `Ok(None)` when no complete line arrived within the read timeout;
    /// bytes of an incomplete line are kept for the next call.
    async fn read_line(&mut self) -> AppResult<Option<Vec<u8>>>;

    /// Release the underlying port. Safe to call more than once.
    async fn close(&mut self) -> AppResult<()>;

    /// Human-readable name used in logs and messages.
    fn name(&self) -> &str;

    /// Whether this transport can ever produce device lines.
    fn is_device(&self) -> bool {
        true
    }
}

/// Convert data bits count to tokio-serial's DataBits type
pub fn to_data_bits(bits: u8) -> tokio_serial::DataBits {
    match bits {
        5 => tokio_serial::DataBits::Five,
        6 => tokio_serial::DataBits::Six,
        7 => tokio_serial::DataBits::Seven,
        _ => tokio_serial::DataBits::Eight,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_builder() {
        let settings = SerialSettings::new("/dev/ttyUSB0")
            .with_baud_rate(19200)
            .with_data_bits(7)
            .with_read_timeout(Duration::from_millis(50));

        assert_eq!(settings.port, "/dev/ttyUSB0");
        assert_eq!(settings.baud_rate, 19200);
        assert_eq!(settings.data_bits, 7);
        assert_eq!(settings.read_timeout, Duration::from_millis(50));
    }

    #[test]
    fn test_to_data_bits() {
        assert!(matches!(to_data_bits(5), tokio_serial::DataBits::Five));
        assert!(matches!(to_data_bits(7), tokio_serial::DataBits::Seven));
        assert!(matches!(to_data_bits(8), tokio_serial::DataBits::Eight));
        assert!(matches!(to_data_bits(9), tokio_serial::DataBits::Eight)); // default
    }
}
