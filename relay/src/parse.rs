use std::collections::{BTreeMap, HashSet};

use fancy_regex::Regex;
use once_cell::sync::Lazy;
use serde::Serialize;

use crate::api::RelayError;

/// Matches one `key: value` pair on an annotation line. Values may embed
/// colons as long as the colon is not followed by whitespace (timestamps,
/// connection ids); the lookahead stops a value at the next `word: ` pair
/// or at end of line. The `regex` crate cannot express the lookahead, hence
/// `fancy-regex`.
static COMMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s*([^:]+):\s+((?:\s*[^:\s]|:[^\s])+)(?=\s+\w+: |$)")
        .expect("invalid annotation pattern")
});

/// Annotation keys coerced to integers.
static INT_KEYS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "Bytes_sent",
        "Rows_affected",
        "Rows_examined",
        "Rows_sent",
        "Thread_id",
    ])
});

/// Annotation keys coerced to floating point.
static FLOAT_KEYS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| HashSet::from(["Lock_time", "Query_time"]));

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropValue {
    Int(i64),
    Float(f64),
    Text(String),
}

/// Splits one slow-query log message into its SQL body and annotation
/// properties.
///
/// `# `-prefixed lines carry `key: value` metadata pairs; duplicate keys are
/// overwritten by later occurrences, within a line and across lines. The
/// `SET timestamp=` line is dropped (the envelope already carries the
/// timestamp) and so is the schema-selecting `use ` statement. Everything
/// else is retained, in order, as the SQL body.
pub fn parse(message: &str) -> Result<(String, BTreeMap<String, PropValue>), RelayError> {
    let mut raw_props: BTreeMap<String, String> = BTreeMap::new();
    let mut sql_lines: Vec<&str> = Vec::new();

    for line in message.split('\n') {
        if let Some(annotations) = line.strip_prefix("# ") {
            for caps in COMMENT_RE.captures_iter(annotations) {
                let caps = caps.map_err(|e| RelayError::AnnotationError(e.to_string()))?;
                let (Some(key), Some(value)) = (caps.get(1), caps.get(2)) else {
                    continue;
                };
                raw_props.insert(key.as_str().to_string(), value.as_str().to_string());
            }
            continue;
        }

        if line.starts_with("SET timestamp=") {
            continue;
        }

        if line.starts_with("use ") {
            continue;
        }

        sql_lines.push(line);
    }

    let mut props = BTreeMap::new();
    for (key, value) in raw_props {
        let coerced = coerce(&key, value)?;
        props.insert(key, coerced);
    }

    Ok((sql_lines.join("\n"), props))
}

/// A recognized numeric key holding a non-numeric value is malformed input,
/// not something to ignore.
fn coerce(key: &str, value: String) -> Result<PropValue, RelayError> {
    if INT_KEYS.contains(key) {
        match value.parse::<i64>() {
            Ok(n) => Ok(PropValue::Int(n)),
            Err(_) => Err(RelayError::CoercionError {
                key: key.to_string(),
                value,
            }),
        }
    } else if FLOAT_KEYS.contains(key) {
        match value.parse::<f64>() {
            Ok(f) => Ok(PropValue::Float(f)),
            Err(_) => Err(RelayError::CoercionError {
                key: key.to_string(),
                value,
            }),
        }
    } else {
        Ok(PropValue::Text(value))
    }
}
