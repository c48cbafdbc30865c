//! Messages and the metadata map they carry through a chain.
//!
//! Messages are value-copied between nodes: a node mutating its local copy
//! never affects the submitter's copy or a sibling branch.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Payload encoding carried by a [`Message`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    #[default]
    Json,
    Text,
    Binary,
}

/// Ordered string→string map attached to every message.
///
/// `values` returns an owned snapshot, safe to iterate while the message is
/// still in flight elsewhere.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata {
    values: BTreeMap<String, String>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an existing map.
    pub fn from_map(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Snapshot of the current entries.
    pub fn values(&self) -> BTreeMap<String, String> {
        self.values.clone()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self { values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}

/// A message flowing through a rule chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique id stamped at creation
    pub id: String,
    /// Creation timestamp, wall-clock milliseconds
    pub ts: i64,
    /// Business type of the message (routable by type-switch nodes)
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Payload encoding
    pub data_type: DataType,
    /// Payload
    pub data: String,
    /// Mutable companion map, copied with the message
    pub metadata: Metadata,
}

impl Message {
    /// Create a message, stamping a fresh id and the current timestamp.
    pub fn new(
        msg_type: impl Into<String>,
        data_type: DataType,
        metadata: Metadata,
        data: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            ts: chrono::Utc::now().timestamp_millis(),
            msg_type: msg_type.into(),
            data_type,
            data: data.into(),
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stamps_identity() {
        let a = Message::new("EVENT", DataType::Json, Metadata::new(), "{}");
        let b = Message::new("EVENT", DataType::Json, Metadata::new(), "{}");
        assert_ne!(a.id, b.id);
        assert!(a.ts > 0);
    }

    #[test]
    fn test_clone_is_value_copy() {
        let mut original = Message::new("EVENT", DataType::Text, Metadata::new(), "aa");
        original.metadata.put("k", "v");

        let mut copy = original.clone();
        copy.data = "bb".to_string();
        copy.metadata.put("k", "changed");

        assert_eq!(original.data, "aa");
        assert_eq!(original.metadata.get("k"), Some("v"));
    }

    #[test]
    fn test_metadata_snapshot() {
        let mut md = Metadata::new();
        md.put("a", "1");
        let snapshot = md.values();
        md.put("b", "2");

        assert_eq!(snapshot.len(), 1);
        assert_eq!(md.len(), 2);
    }

    #[test]
    fn test_serde_field_names() {
        let msg = Message::new("TEST", DataType::Json, Metadata::new(), "{}");
        let value = serde_json::to_value(&msg).unwrap();
        assert!(value.get("type").is_some());
        assert_eq!(value.get("dataType").unwrap(), "JSON");
        assert!(value.get("metadata").is_some());
    }

    #[test]
    fn test_serde_round_trip() {
        let msg = Message::new(
            "TEST",
            DataType::Json,
            Metadata::from_iter([("productType", "sensor")]),
            r#"{"temperature":41}"#,
        );
        let encoded = serde_json::to_string(&msg).unwrap();
        let decoded: Message = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }
}
