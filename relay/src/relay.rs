use metrics::counter;
use tracing::instrument;

use crate::api::RelayError;
use crate::envelope::{self, Envelope};
use crate::event::LogEvent;
use crate::fingerprint::Fingerprinter;
use crate::sink::EventSink;

/// Runs one invocation of the pipeline: decode the envelope, parse and
/// fingerprint every event, publish the assembled batch. All-or-nothing: a
/// failure on any event aborts the batch and nothing is durably published.
#[instrument(skip_all, fields(batch_size))]
pub async fn process_batch(
    envelope: &Envelope,
    fingerprinter: &dyn Fingerprinter,
    sink: &dyn EventSink,
) -> Result<(), RelayError> {
    let events = match assemble(envelope, fingerprinter).await {
        Ok(events) => events,
        Err(err) => {
            // Keep the raw payload around for diagnosis before surfacing the
            // failure to the invoking runtime.
            tracing::info!(payload = envelope.awslogs.data.as_str(), "failed batch");
            return Err(err);
        }
    };

    tracing::Span::current().record("batch_size", events.len());

    if events.is_empty() {
        return Ok(());
    }

    counter!("relay_events_received_total").increment(events.len() as u64);

    sink.send_batch(events).await
}

async fn assemble(
    envelope: &Envelope,
    fingerprinter: &dyn Fingerprinter,
) -> Result<Vec<LogEvent>, RelayError> {
    let raw_events = envelope::decode(&envelope.awslogs.data)?;

    let mut events = Vec::with_capacity(raw_events.len());
    for raw in &raw_events {
        events.push(LogEvent::from_raw(raw, fingerprinter).await?);
    }

    Ok(events)
}
