use std::io::{self, BufRead};
use std::thread;
use std::time::Duration;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::error::RelayError;

/// Body posted to the ingestion endpoint.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngestPayload<'a> {
    pub text: &'a str,
    pub chat_id: i64,
    pub chat_name: &'a str,
    pub source: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Delivered,
    /// Blank message, nothing sent.
    Skipped,
    /// Sending failed; the message is gone.
    Dropped,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub delivered: usize,
    pub skipped: usize,
    pub dropped: usize,
}

/// Forwards chat messages to the ingestion URL. Never retries.
pub struct IngestRelay {
    client: reqwest::Client,
    url: String,
    chat_id: i64,
    chat_name: String,
    source: String,
}

impl IngestRelay {
    pub fn new(config: &RelayConfig, chat_id: i64) -> Result<Self, Report<RelayError>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .change_context(RelayError::Client)?;

        Ok(Self {
            client,
            url: config.ingest_url.clone(),
            chat_id,
            chat_name: config.chat_name.clone(),
            source: config.source.clone(),
        })
    }

    fn payload<'a>(&'a self, text: &'a str) -> IngestPayload<'a> {
        IngestPayload {
            text,
            chat_id: self.chat_id,
            chat_name: &self.chat_name,
            source: &self.source,
        }
    }

    /// Forward one message. Failures are logged here and never returned.
    pub async fn forward(&self, text: &str) -> RelayOutcome {
        if text.trim().is_empty() {
            return RelayOutcome::Skipped;
        }

        match self.post(text).await {
            Ok(()) => {
                debug!(chars = text.len(), "message relayed");
                RelayOutcome::Delivered
            }
            Err(e) => {
                warn!(error = ?e, url = %self.url, "ingest request failed");
                RelayOutcome::Dropped
            }
        }
    }

    async fn post(&self, text: &str) -> Result<(), Report<RelayError>> {
        let response = self
            .client
            .post(&self.url)
            .json(&self.payload(text))
            .send()
            .await
            .change_context(RelayError::Transport)?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(Report::new(RelayError::Rejected {
                status: status.as_u16(),
            })
            .attach(format!("body: {body}")));
        }
        Ok(())
    }
}

/// Source of chat messages for the relay.
pub trait ChatSource: Send {
    /// Send messages into `tx` until the source ends or `cancel` is triggered.
    fn run(
        self: Box<Self>,
        tx: mpsc::Sender<String>,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<(), Report<RelayError>>>;
}

/// Newline-delimited messages from a blocking reader (stdin in production).
///
/// Lines are read on a dedicated OS thread. A blocking read there cannot be
/// cancelled, but the thread is detached, so neither cancellation nor process
/// exit waits on it.
pub struct LineSource<R> {
    reader: R,
}

impl LineSource<io::BufReader<io::Stdin>> {
    pub fn stdin() -> Self {
        Self::new(io::BufReader::new(io::stdin()))
    }
}

impl<R> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R> ChatSource for LineSource<R>
where
    R: BufRead + Send + 'static,
{
    fn run(
        self: Box<Self>,
        tx: mpsc::Sender<String>,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<(), Report<RelayError>>> {
        let (done_tx, done_rx) = oneshot::channel();
        let reader = self.reader;
        let spawned = thread::Builder::new()
            .name("line-source".into())
            .spawn(move || {
                let _ = done_tx.send(read_lines(reader, &tx));
            });

        Box::pin(async move {
            spawned
                .change_context(RelayError::Transport)
                .attach("failed to spawn line reader thread")?;

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("line source cancelled");
                    Ok(())
                }
                done = done_rx => match done {
                    Ok(result) => result,
                    Err(_) => Err(Report::new(RelayError::Transport)
                        .attach("line reader thread exited without a result")),
                },
            }
        })
    }
}

/// Forward lines until EOF or until the receiving side is gone.
fn read_lines<R: BufRead>(reader: R, tx: &mpsc::Sender<String>) -> Result<(), Report<RelayError>> {
    for line in reader.lines() {
        let text = line.change_context(RelayError::Transport)?;
        if tx.blocking_send(text).is_err() {
            break;
        }
    }
    Ok(())
}

/// Relay every received message until the channel closes.
pub async fn relay_loop(mut rx: mpsc::Receiver<String>, relay: &IngestRelay) -> RelayStats {
    let mut stats = RelayStats::default();
    while let Some(text) = rx.recv().await {
        match relay.forward(&text).await {
            RelayOutcome::Delivered => stats.delivered += 1,
            RelayOutcome::Skipped => stats.skipped += 1,
            RelayOutcome::Dropped => stats.dropped += 1,
        }
    }
    info!(
        delivered = stats.delivered,
        skipped = stats.skipped,
        dropped = stats.dropped,
        "relay stopped"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Port 9 (discard) on loopback refuses connections on test machines.
    fn unreachable_relay() -> IngestRelay {
        let config = RelayConfig {
            ingest_url: "http://127.0.0.1:9/api/telegram/ingest".into(),
            timeout_secs: 2,
            ..RelayConfig::default()
        };
        IngestRelay::new(&config, -100123).unwrap()
    }

    #[test]
    fn payload_uses_ingest_field_names() {
        let relay = unreachable_relay();
        let json = serde_json::to_value(relay.payload("gold long 2300")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "text": "gold long 2300",
                "chatId": -100123,
                "chatName": "PROVIDER_GROUP",
                "source": "PROVIDER",
            })
        );
    }

    #[tokio::test]
    async fn blank_messages_are_skipped() {
        let relay = unreachable_relay();
        assert_eq!(relay.forward("").await, RelayOutcome::Skipped);
        assert_eq!(relay.forward("  \t ").await, RelayOutcome::Skipped);
    }

    #[tokio::test]
    async fn transport_failure_is_swallowed() {
        let relay = unreachable_relay();
        assert_eq!(relay.forward("hello").await, RelayOutcome::Dropped);
    }

    #[tokio::test]
    async fn line_source_feeds_relay_loop() {
        let relay = unreachable_relay();
        let (tx, rx) = mpsc::channel(8);
        let source: Box<dyn ChatSource> = Box::new(LineSource::new(&b"first\n\n   \nsecond\n"[..]));

        let handle = tokio::spawn(source.run(tx, CancellationToken::new()));
        let stats = relay_loop(rx, &relay).await;
        handle.await.unwrap().unwrap();

        assert_eq!(
            stats,
            RelayStats {
                delivered: 0,
                skipped: 2,
                dropped: 2,
            }
        );
    }

    /// A reader that blocks until its sender is dropped, like an idle terminal.
    struct StalledReader(std::sync::mpsc::Receiver<()>);

    impl io::Read for StalledReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            let _ = self.0.recv();
            Ok(0)
        }
    }

    #[tokio::test]
    async fn cancel_stops_source_blocked_on_read() {
        let (_hold_open, stalled) = std::sync::mpsc::channel::<()>();
        let source: Box<dyn ChatSource> =
            Box::new(LineSource::new(io::BufReader::new(StalledReader(stalled))));
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(source.run(tx, cancel.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("source did not stop after cancel");
        result.unwrap().unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn source_ends_at_eof() {
        let (tx, mut rx) = mpsc::channel(4);
        let source = Box::new(LineSource::new(&b"only line"[..]));

        source.run(tx, CancellationToken::new()).await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("only line"));
        assert!(rx.recv().await.is_none());
    }
}
