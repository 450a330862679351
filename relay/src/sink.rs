use async_trait::async_trait;
use metrics::{counter, histogram};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::api::RelayError;
use crate::event::LogEvent;

#[async_trait]
pub trait EventSink {
    async fn send_batch(&self, events: Vec<LogEvent>) -> Result<(), RelayError>;
}

/// Wire entry accepted by the log-sink's put-events operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLogEvent {
    pub timestamp: i64,
    pub message: String,
}

/// Boundary to the external append-only log service. The concrete cloud
/// client lives outside this crate; tests substitute an in-memory double.
#[async_trait]
pub trait LogStreamClient {
    /// Creates the stream this process will append to. Idempotent clients
    /// may map creation-already-exists to success.
    async fn create_stream(&self, log_group: &str, log_stream: &str) -> Result<(), RelayError>;

    /// Appends a batch and returns the sequence token expected by the next
    /// call.
    async fn put_events(
        &self,
        log_group: &str,
        log_stream: &str,
        events: Vec<OutputLogEvent>,
        sequence_token: Option<String>,
    ) -> Result<String, RelayError>;
}

/// Publishes batches through the token-sequenced log-service API.
///
/// The sequence token is the one piece of state that outlives a batch: it is
/// held for the lifetime of this sink (a warm process) and starts out absent
/// on a cold start, which triggers stream creation.
pub struct StreamSink<C> {
    client: C,
    log_group: String,
    log_stream: String,
    sequence_token: Mutex<Option<String>>,
}

impl<C: LogStreamClient> StreamSink<C> {
    pub fn new(client: C, log_group: String, log_stream: String) -> StreamSink<C> {
        StreamSink {
            client,
            log_group,
            log_stream,
            sequence_token: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<C: LogStreamClient + Send + Sync> EventSink for StreamSink<C> {
    async fn send_batch(&self, events: Vec<LogEvent>) -> Result<(), RelayError> {
        let mut batch = events
            .iter()
            .map(|event| {
                Ok(OutputLogEvent {
                    timestamp: event.epoch_ms(),
                    message: event.to_json()?,
                })
            })
            .collect::<Result<Vec<_>, RelayError>>()?;

        // The sink requires chronological order; sort_by_key is stable so
        // equal timestamps keep their arrival order.
        batch.sort_by_key(|entry| entry.timestamp);

        histogram!("relay_batch_size").record(batch.len() as f64);

        // Hold the token lock across the publish so concurrent invocations
        // in the same process cannot interleave the sequencing handshake.
        let mut token = self.sequence_token.lock().await;

        if token.is_none() {
            self.client
                .create_stream(&self.log_group, &self.log_stream)
                .await?;
        }

        let published = batch.len();
        let next = self
            .client
            .put_events(&self.log_group, &self.log_stream, batch, token.clone())
            .await?;
        *token = Some(next);

        counter!("relay_events_published_total").increment(published as u64);
        Ok(())
    }
}

/// Plain output mode: one wire-JSON record per line, input order, no token
/// state. Used when no stateful log-service sink is configured.
pub struct StdoutSink {}

#[async_trait]
impl EventSink for StdoutSink {
    async fn send_batch(&self, events: Vec<LogEvent>) -> Result<(), RelayError> {
        let mut out = tokio::io::stdout();

        for event in &events {
            let mut line = event.to_json()?;
            line.push('\n');
            out.write_all(line.as_bytes())
                .await
                .map_err(|e| RelayError::SinkError(e.to_string()))?;
        }
        out.flush()
            .await
            .map_err(|e| RelayError::SinkError(e.to_string()))?;

        counter!("relay_events_published_total").increment(events.len() as u64);
        Ok(())
    }
}
