use std::io::prelude::*;

use base64::Engine;
use flate2::read::GzDecoder;
use serde::Deserialize;

use crate::api::RelayError;

/// Envelope delivered by the log-subscription filter: base64 text wrapping
/// gzip-compressed JSON wrapping the raw event batch.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub awslogs: AwsLogs,
}

#[derive(Debug, Deserialize)]
pub struct AwsLogs {
    pub data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBatch {
    log_events: Vec<RawLogEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLogEvent {
    pub id: Option<String>,
    /// Milliseconds since the epoch.
    pub timestamp: i64,
    /// Multi-line slow-query log entry.
    pub message: String,
}

/// Reverses the envelope encoding, yielding raw events in arrival order.
/// Any stage failing aborts the whole batch; there is no partial decode.
pub fn decode(data: &str) -> Result<Vec<RawLogEvent>, RelayError> {
    tracing::debug!(len = data.len(), "decoding new batch");

    let compressed = base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| {
            tracing::error!("failed to decode base64: {}", e);
            RelayError::DecodeError(String::from("invalid base64 data"))
        })?;

    let mut decoder = GzDecoder::new(compressed.as_slice());
    let mut payload = String::new();
    decoder.read_to_string(&mut payload).map_err(|e| {
        tracing::error!("failed to decode gzip: {}", e);
        RelayError::DecodeError(String::from("invalid gzip data"))
    })?;

    let batch: RawBatch = serde_json::from_str(&payload)?;
    Ok(batch.log_events)
}

#[cfg(test)]
mod tests {
    use base64::Engine;
    use serde_json::json;

    use super::decode;
    use crate::api::RelayError;

    fn encode(payload: &serde_json::Value) -> String {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(payload.to_string().as_bytes())
            .expect("failed to gzip payload");
        base64::engine::general_purpose::STANDARD.encode(encoder.finish().unwrap())
    }

    #[test]
    fn round_trips_a_batch() {
        let payload = json!({
            "logEvents": [
                {"id": "1", "timestamp": 1_700_000_000_000_i64, "message": "SELECT 1"},
                {"id": "2", "timestamp": 1_700_000_000_500_i64, "message": "SELECT 2"},
            ]
        });

        let events = decode(&encode(&payload)).expect("failed to decode batch");

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id.as_deref(), Some("1"));
        assert_eq!(events[0].timestamp, 1_700_000_000_000);
        assert_eq!(events[0].message, "SELECT 1");
        assert_eq!(events[1].message, "SELECT 2");
    }

    #[test]
    fn preserves_arrival_order() {
        let payload = json!({
            "logEvents": [
                {"timestamp": 3, "message": "c"},
                {"timestamp": 1, "message": "a"},
                {"timestamp": 2, "message": "b"},
            ]
        });

        let events = decode(&encode(&payload)).unwrap();
        let messages: Vec<&str> = events.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["c", "a", "b"]);
    }

    #[test]
    fn rejects_invalid_base64() {
        let err = decode("this is not base64!").unwrap_err();
        assert!(matches!(err, RelayError::DecodeError(_)), "{err:?}");
    }

    #[test]
    fn rejects_invalid_gzip() {
        let data = base64::engine::general_purpose::STANDARD.encode(b"plain bytes, no gzip");
        let err = decode(&data).unwrap_err();
        assert!(matches!(err, RelayError::DecodeError(_)), "{err:?}");
    }

    #[test]
    fn rejects_malformed_structure() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"{\"logEvents\": 42}").unwrap();
        let data = base64::engine::general_purpose::STANDARD.encode(encoder.finish().unwrap());

        let err = decode(&data).unwrap_err();
        assert!(matches!(err, RelayError::ParseError(_)), "{err:?}");
    }
}
