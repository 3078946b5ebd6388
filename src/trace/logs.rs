//! Log-shape normalization
//!
//! Fork-node builds disagree on how a log rides inside a call trace:
//! some emit a bare `[address, topics, data]` array, some wrap the
//! fields in a `"raw"` sub-object, some inline them flat. Each variant
//! gets one adapter; the adapters run in a fixed order and the first
//! hit wins. Records no adapter recognizes are skipped, never fatal.

use alloy::primitives::{Address, Bytes, B256};
use serde_json::Value;

/// A log reduced to the fields transfer decoding needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedLog {
    /// Emitting contract
    pub address: Address,
    /// Indexed topic words
    pub topics: Vec<B256>,
    /// Unindexed data payload
    pub data: Bytes,
}

/// Attempts to normalize one raw log value, trying each known shape
/// in order
pub fn normalize_log(raw: &Value) -> Option<NormalizedLog> {
    from_array(raw)
        .or_else(|| from_raw_object(raw))
        .or_else(|| from_flat_object(raw))
}

/// Shape A: top-level array `[address, topics, data]`
fn from_array(raw: &Value) -> Option<NormalizedLog> {
    let parts = raw.as_array()?;
    if parts.len() < 3 {
        return None;
    }
    build(&parts[0], &parts[1], &parts[2])
}

/// Shape B: nested `{"raw": {"address": .., "topics": .., "data": ..}}`
fn from_raw_object(raw: &Value) -> Option<NormalizedLog> {
    let inner = raw.get("raw")?;
    from_flat_object(inner)
}

/// Shape C: flat `{"address": .., "topics": .., "data": ..}`
fn from_flat_object(raw: &Value) -> Option<NormalizedLog> {
    let address = raw.get("address")?;
    let topics = raw.get("topics")?;
    // data may be legitimately absent for topic-only logs
    let empty = Value::String("0x".to_string());
    let data = raw.get("data").unwrap_or(&empty);
    build(address, topics, data)
}

fn build(address: &Value, topics: &Value, data: &Value) -> Option<NormalizedLog> {
    let address: Address = address.as_str()?.parse().ok()?;
    let topics = topics
        .as_array()?
        .iter()
        .map(|t| t.as_str().and_then(|s| s.parse::<B256>().ok()))
        .collect::<Option<Vec<_>>>()?;
    let data = parse_bytes(data.as_str()?)?;
    Some(NormalizedLog {
        address,
        topics,
        data,
    })
}

fn parse_bytes(raw: &str) -> Option<Bytes> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    if digits.is_empty() {
        return Some(Bytes::new());
    }
    alloy::primitives::hex::decode(digits).ok().map(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ADDR: &str = "0x2222222222222222222222222222222222222222";
    const TOPIC: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";

    fn expected() -> NormalizedLog {
        NormalizedLog {
            address: ADDR.parse().unwrap(),
            topics: vec![TOPIC.parse().unwrap()],
            data: Bytes::from(vec![0xab]),
        }
    }

    #[test]
    fn normalizes_array_shape() {
        let raw = json!([ADDR, [TOPIC], "0xab"]);
        assert_eq!(normalize_log(&raw), Some(expected()));
    }

    #[test]
    fn normalizes_nested_raw_shape() {
        let raw = json!({"raw": {"address": ADDR, "topics": [TOPIC], "data": "0xab"}});
        assert_eq!(normalize_log(&raw), Some(expected()));
    }

    #[test]
    fn normalizes_flat_shape() {
        let raw = json!({"address": ADDR, "topics": [TOPIC], "data": "0xab"});
        assert_eq!(normalize_log(&raw), Some(expected()));
    }

    #[test]
    fn missing_data_defaults_to_empty() {
        let raw = json!({"address": ADDR, "topics": [TOPIC]});
        let log = normalize_log(&raw).unwrap();
        assert!(log.data.is_empty());
    }

    #[test]
    fn unrecognized_shapes_are_skipped() {
        assert_eq!(normalize_log(&json!({"foo": "bar"})), None);
        assert_eq!(normalize_log(&json!([ADDR])), None);
        assert_eq!(normalize_log(&json!({"address": "not-an-address", "topics": []})), None);
        assert_eq!(normalize_log(&json!(42)), None);
    }
}
