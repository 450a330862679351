use std::collections::BTreeMap;

use serde::Serialize;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::api::RelayError;
use crate::envelope::RawLogEvent;
use crate::fingerprint::{fingerprint_id, Fingerprinter};
use crate::parse::{self, PropValue};

/// `_t` wire timestamp: UTC with microsecond precision.
const WIRE_TIMESTAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z");

/// One enriched slow-query record. Immutable once assembled; owned by the
/// pipeline run that created it.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub timestamp: OffsetDateTime,
    pub sql: String,
    pub props: BTreeMap<String, PropValue>,
    pub fingerprint: String,
    pub fingerprint_id: String,
}

/// Wire shape consumed by downstream log-scanning tools: exactly these keys,
/// lexicographic order, compact separators. Field order here plus the
/// `BTreeMap` props is what guarantees the ordering.
#[derive(Serialize)]
struct WireEvent<'a> {
    #[serde(rename = "_t")]
    timestamp: String,
    fp: &'a str,
    fp_md5: &'a str,
    props: &'a BTreeMap<String, PropValue>,
    sql: &'a str,
}

impl LogEvent {
    pub async fn from_raw(
        raw: &RawLogEvent,
        fingerprinter: &dyn Fingerprinter,
    ) -> Result<LogEvent, RelayError> {
        let (sql, props) = parse::parse(&raw.message)?;
        let fingerprint = fingerprinter.fingerprint(&sql).await?;
        let fingerprint_id = fingerprint_id(&fingerprint);

        let timestamp =
            OffsetDateTime::from_unix_timestamp_nanos(i128::from(raw.timestamp) * 1_000_000)
                .map_err(|_| RelayError::InvalidTimestamp(raw.timestamp))?;

        Ok(LogEvent {
            timestamp,
            sql,
            props,
            fingerprint,
            fingerprint_id,
        })
    }

    pub fn epoch_ms(&self) -> i64 {
        (self.timestamp.unix_timestamp_nanos() / 1_000_000) as i64
    }

    pub fn to_json(&self) -> Result<String, RelayError> {
        let timestamp = self
            .timestamp
            .format(WIRE_TIMESTAMP_FORMAT)
            .map_err(|e| RelayError::SerializationError(e.to_string()))?;

        let wire = WireEvent {
            timestamp,
            fp: &self.fingerprint,
            fp_md5: &self.fingerprint_id,
            props: &self.props,
            sql: &self.sql,
        };

        serde_json::to_string(&wire).map_err(|e| RelayError::SerializationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use time::OffsetDateTime;

    use super::LogEvent;
    use crate::api::RelayError;
    use crate::envelope::RawLogEvent;
    use crate::fingerprint::{fingerprint_id, Fingerprinter};
    use crate::parse::PropValue;

    struct LowercaseFingerprinter;

    #[async_trait]
    impl Fingerprinter for LowercaseFingerprinter {
        async fn fingerprint(&self, sql: &str) -> Result<String, RelayError> {
            Ok(sql.to_lowercase())
        }
    }

    fn sample_event() -> LogEvent {
        LogEvent {
            timestamp: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
            sql: String::from("SELECT 1"),
            props: BTreeMap::from([(String::from("Rows_sent"), PropValue::Int(1))]),
            fingerprint: String::from("select ?"),
            fingerprint_id: fingerprint_id("select ?"),
        }
    }

    #[test]
    fn serializes_compact_with_sorted_keys() {
        assert_eq!(
            sample_event().to_json().unwrap(),
            r#"{"_t":"2023-11-14T22:13:20.000000Z","fp":"select ?","fp_md5":"0x1fe1379fe2a31b8d16219655761820a2","props":{"Rows_sent":1},"sql":"SELECT 1"}"#
        );
    }

    #[test]
    fn wire_timestamp_has_microsecond_precision() {
        let mut event = sample_event();
        event.timestamp =
            OffsetDateTime::from_unix_timestamp_nanos(1_700_000_000_123_000_000).unwrap();

        let json = event.to_json().unwrap();
        assert!(
            json.contains("\"_t\":\"2023-11-14T22:13:20.123000Z\""),
            "{json}"
        );
    }

    #[tokio::test]
    async fn assembles_the_spec_example() {
        let raw = RawLogEvent {
            id: None,
            timestamp: 1_700_000_000_000,
            message: String::from(
                "# Query_time: 0.000152  Lock_time: 0.000041 Rows_sent: 1  Rows_examined: 1\nSET timestamp=1700000000;\nuse mydb;\nSELECT 1",
            ),
        };

        let event = LogEvent::from_raw(&raw, &LowercaseFingerprinter)
            .await
            .unwrap();

        assert_eq!(event.sql, "SELECT 1");
        assert_eq!(event.fingerprint, "select 1");
        assert_eq!(event.fingerprint_id, fingerprint_id("select 1"));
        assert_eq!(event.epoch_ms(), 1_700_000_000_000);
        assert_eq!(event.props.len(), 4);
        assert_eq!(event.props["Query_time"], PropValue::Float(0.000152));
    }

    #[tokio::test]
    async fn rejects_out_of_range_timestamps() {
        let raw = RawLogEvent {
            id: None,
            timestamp: i64::MAX,
            message: String::from("SELECT 1"),
        };

        let err = LogEvent::from_raw(&raw, &LowercaseFingerprinter)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidTimestamp(_)), "{err:?}");
    }

    #[test]
    fn epoch_ms_round_trips() {
        let event = sample_event();
        assert_eq!(event.epoch_ms(), 1_700_000_000_000);
    }
}
