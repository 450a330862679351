use thiserror::Error;

/// Every failure aborts the current batch: there is no per-event skip or
/// partial publish. The invoking runtime decides whether to redeliver.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("failed to decode envelope: {0}")]
    DecodeError(String),
    #[error("failed to parse envelope: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("failed to scan annotation line: {0}")]
    AnnotationError(String),
    #[error("annotation key {key} holds a non-numeric value: {value:?}")]
    CoercionError { key: String, value: String },

    #[error("fingerprint process failed: {0}")]
    FingerprintError(String),

    #[error("event timestamp out of range: {0}")]
    InvalidTimestamp(i64),
    #[error("failed to serialize event: {0}")]
    SerializationError(String),

    #[error("failed to publish batch: {0}")]
    SinkError(String),
}
