//! Serial port line transport.
//!
//! Any type implementing `AsyncRead + AsyncWrite + Unpin + Send` can back the
//! transport: `tokio_serial::SerialStream` for hardware, `tokio::io::DuplexStream`
//! in tests.

use super::{to_data_bits, LineTransport, SerialSettings};
use crate::error::{AppResult, LoggerError};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, instrument, trace};

/// Trait alias for async serial port I/O.
pub trait SerialPortIO: AsyncRead + AsyncWrite + Unpin + Send {}

// Blanket implementation for all types meeting the requirements
impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPortIO for T {}

/// Type-erased boxed serial port.
pub type DynSerial = Box<dyn SerialPortIO>;

/// Buffered line reader over a serial port.
pub struct SerialLineTransport {
    name: String,
    reader: Option<BufReader<DynSerial>>,
    /// Bytes of a line whose terminator has not arrived yet
    pending: Vec<u8>,
    read_timeout: Duration,
}

impl SerialLineTransport {
    /// Open the port described by `settings`.
    ///
    /// Opening runs in `spawn_blocking` so a slow driver does not stall the runtime.
    ///
    /// # Errors
    ///
    /// `Transport` if the port is missing, busy or not permitted.
    #[instrument(skip(settings), fields(port = %settings.port, baud = settings.baud_rate))]
    pub async fn open(settings: &SerialSettings) -> AppResult<Self> {
        use tokio_serial::SerialPortBuilderExt;

        let port_path = settings.port.clone();
        let baud_rate = settings.baud_rate;
        let data_bits = to_data_bits(settings.data_bits);

        let stream = tokio::task::spawn_blocking(move || {
            tokio_serial::new(&port_path, baud_rate)
                .data_bits(data_bits)
                .parity(tokio_serial::Parity::None)
                .stop_bits(tokio_serial::StopBits::One)
                .flow_control(tokio_serial::FlowControl::None)
                .open_native_async()
        })
        .await
        .map_err(|e| LoggerError::transport(&settings.port, e))?
        .map_err(|e| LoggerError::transport(&settings.port, e))?;

        debug!("Serial port opened");
        Ok(Self::from_stream(
            settings.port.clone(),
            Box::new(stream),
            settings.read_timeout,
        ))
    }

    /// Wrap an already open byte stream.
    pub fn from_stream(name: impl Into<String>, stream: DynSerial, read_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            reader: Some(BufReader::new(stream)),
            pending: Vec::new(),
            read_timeout,
        }
    }

    /// Longest a single `read_line` waits.
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }
}

#[async_trait]
impl LineTransport for SerialLineTransport {
    async fn read_line(&mut self) -> AppResult<Option<Vec<u8>>> {
        let reader = self.reader.as_mut().ok_or(LoggerError::SerialUnexpectedEof)?;

        // read_until appends into `pending`, so bytes read before a timeout are kept.
        match tokio::time::timeout(self.read_timeout, reader.read_until(b'\n', &mut self.pending))
            .await
        {
            Err(_) => Ok(None),
            Ok(Err(e)) => Err(LoggerError::Io(e)),
            Ok(Ok(0)) if self.pending.is_empty() => Err(LoggerError::SerialUnexpectedEof),
            Ok(Ok(_)) => {
                let mut line = std::mem::take(&mut self.pending);
                while matches!(line.last(), Some(b'\n' | b'\r')) {
                    line.pop();
                }
                trace!("Line from {}: '{}'", self.name, line.escape_ascii());
                Ok(Some(line))
            }
        }
    }

    async fn close(&mut self) -> AppResult<()> {
        if let Some(mut reader) = self.reader.take() {
            // Best effort: some streams refuse shutdown once the peer is gone.
            let _ = reader.get_mut().shutdown().await;
            debug!("Serial port {} closed", self.name);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(stream: tokio::io::DuplexStream) -> SerialLineTransport {
        SerialLineTransport::from_stream("duplex", Box::new(stream), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_reads_line_without_terminator() {
        let (mut host, device) = tokio::io::duplex(64);
        let mut port = transport(device);

        host.write_all(b"ovalue 7.2 kPa\r\n").await.unwrap();

        let line = port.read_line().await.unwrap();
        assert_eq!(line.as_deref(), Some(&b"ovalue 7.2 kPa"[..]));
    }

    #[tokio::test]
    async fn test_timeout_returns_none() {
        let (_host, device) = tokio::io::duplex(64);
        let mut port = transport(device);

        assert_eq!(port.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_partial_line_survives_timeout() {
        let (mut host, device) = tokio::io::duplex(64);
        let mut port = transport(device);

        host.write_all(b"ovalue 1").await.unwrap();
        assert_eq!(port.read_line().await.unwrap(), None);

        host.write_all(b"2,5\n").await.unwrap();
        let line = port.read_line().await.unwrap();
        assert_eq!(line.as_deref(), Some(&b"ovalue 12,5"[..]));
    }

    #[tokio::test]
    async fn test_eof_is_reported() {
        let stream = tokio_test::io::Builder::new()
            .read(b"ovalue 3.0\n")
            .build();
        let mut port =
            SerialLineTransport::from_stream("mock", Box::new(stream), Duration::from_millis(50));

        assert_eq!(
            port.read_line().await.unwrap().as_deref(),
            Some(&b"ovalue 3.0"[..])
        );
        assert!(matches!(
            port.read_line().await,
            Err(LoggerError::SerialUnexpectedEof)
        ));
    }

    #[tokio::test]
    async fn test_last_line_without_newline_is_returned_at_eof() {
        let (mut host, device) = tokio::io::duplex(64);
        let mut port = transport(device);

        host.write_all(b"ovalue 9").await.unwrap();
        drop(host);

        assert_eq!(
            port.read_line().await.unwrap().as_deref(),
            Some(&b"ovalue 9"[..])
        );
        assert!(matches!(
            port.read_line().await,
            Err(LoggerError::SerialUnexpectedEof)
        ));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (_host, device) = tokio::io::duplex(64);
        let mut port = transport(device);

        port.close().await.unwrap();
        port.close().await.unwrap();
        assert!(matches!(
            port.read_line().await,
            Err(LoggerError::SerialUnexpectedEof)
        ));
    }
}
