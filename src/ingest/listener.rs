//! Keyboard listener task.
use super::stop_requested;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Lines buffered between the listener and its consumer.
const LINE_BUFFER: usize = 32;

/// Forward lines from `reader` into a channel until end of input or until `stop` is raised.
///
/// The task only enqueues text; interpreting it is left to the receiver.
pub fn spawn_line_listener<R>(
    reader: R,
    mut stop: watch::Receiver<bool>,
) -> (mpsc::Receiver<String>, JoinHandle<()>)
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(LINE_BUFFER);

    let handle = tokio::spawn(async move {
        let mut lines = reader.lines();
        loop {
            tokio::select! {
                biased;
                _ = stop_requested(&mut stop) => {
                    debug!("Input listener stopped");
                    break;
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("Input closed");
                        break;
                    }
                    Err(e) => {
                        warn!("Failed to read input: {}", e);
                        break;
                    }
                },
            }
        }
    });

    (rx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn test_forwards_lines_until_eof() {
        let (_stop_tx, stop_rx) = watch::channel(false);
        let input: &[u8] = b"m 15\r\nexit\n";
        let (mut rx, handle) = spawn_line_listener(BufReader::new(input), stop_rx);

        assert_eq!(rx.recv().await.as_deref(), Some("m 15"));
        assert_eq!(rx.recv().await.as_deref(), Some("exit"));
        assert_eq!(rx.recv().await, None);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_exits_when_stop_is_raised() {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (mut keyboard, input) = tokio::io::duplex(64);
        let (mut rx, handle) = spawn_line_listener(BufReader::new(input), stop_rx);

        keyboard.write_all(b"m\n").await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("m"));

        stop_tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rx.recv().await, None);
    }
}
