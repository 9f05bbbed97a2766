//! Transport for sessions without a device.
use super::LineTransport;
use crate::error::AppResult;
use async_trait::async_trait;
use std::time::Duration;

/// Never yields a line; each poll just waits out the read timeout.
///
/// Lets the ingestion loop run manual-entry-only sessions with the same pacing as a
/// device session.
pub struct IdleTransport {
    poll_interval: Duration,
}

impl IdleTransport {
    /// Each `read_line` sleeps for `poll_interval`.
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

#[async_trait]
impl LineTransport for IdleTransport {
    async fn read_line(&mut self) -> AppResult<Option<Vec<u8>>> {
        tokio::time::sleep(self.poll_interval).await;
        Ok(None)
    }

    async fn close(&mut self) -> AppResult<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "manual"
    }

    fn is_device(&self) -> bool {
        false
    }
}
