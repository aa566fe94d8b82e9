//! Singer message types and their wire representation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single Singer message.
///
/// Serialized with a `type` discriminator so each wire line is
/// self-describing:
///
/// ```json
/// {"type": "SCHEMA", "stream": "leads", "schema": {...}, "key_properties": ["id"]}
/// {"type": "RECORD", "stream": "leads", "record": {...}, "time_extracted": "..."}
/// {"type": "STATE", "value": {"bookmarks": {...}}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Describes a stream's record shape. Emitted once per stream, before
    /// any of that stream's records.
    #[serde(rename = "SCHEMA")]
    Schema {
        stream: String,
        schema: Value,
        key_properties: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bookmark_properties: Option<Vec<String>>,
    },

    /// One extracted row, shaped per the stream's schema.
    #[serde(rename = "RECORD")]
    Record {
        stream: String,
        record: Value,
        time_extracted: DateTime<Utc>,
    },

    /// A replication-state snapshot. Only ever reflects committed bookmarks.
    #[serde(rename = "STATE")]
    State { value: Value },
}

impl Message {
    /// Build a SCHEMA message.
    pub fn schema(
        stream: &str,
        schema: Value,
        key_properties: &[String],
        bookmark_properties: Option<Vec<String>>,
    ) -> Self {
        Message::Schema {
            stream: stream.to_string(),
            schema,
            key_properties: key_properties.to_vec(),
            bookmark_properties,
        }
    }

    /// Build a RECORD message stamped with the current extraction time.
    pub fn record(stream: &str, record: Value) -> Self {
        Message::Record {
            stream: stream.to_string(),
            record,
            time_extracted: Utc::now(),
        }
    }

    /// Build a STATE message.
    pub fn state(value: Value) -> Self {
        Message::State { value }
    }

    /// The stream a SCHEMA or RECORD message belongs to. STATE messages are
    /// not scoped to a stream.
    pub fn stream(&self) -> Option<&str> {
        match self {
            Message::Schema { stream, .. } | Message::Record { stream, .. } => Some(stream),
            Message::State { .. } => None,
        }
    }
}
