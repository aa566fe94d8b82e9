//! The replication-state document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Bookmark values for a single stream, keyed by bookmark field name.
///
/// Most streams carry exactly one entry (their replication key). Child
/// streams additionally carry a parent-scoped entry
/// (`<parent>_<replication key>`) so an interrupted parent traversal can
/// resume without skipping the child's window.
pub type StreamBookmarks = BTreeMap<String, Value>;

/// The full replication state for a run.
///
/// Keys are ordered maps so serialization is deterministic:
/// `serialize(load(blob))` reproduces `blob` byte-for-byte for any blob this
/// tool previously emitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookmarkState {
    /// Per-stream bookmark values.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bookmarks: BTreeMap<String, StreamBookmarks>,

    /// Stream currently being synced, present only mid-stream. A downstream
    /// runner that captures STATE mid-run can hand this back so the next run
    /// knows which stream was interrupted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currently_syncing: Option<String>,
}

impl BookmarkState {
    /// Parse a state blob. An empty or all-whitespace blob yields the empty
    /// state, so a fresh run and a `--state` file containing `{}` behave the
    /// same.
    pub fn load(blob: &str) -> anyhow::Result<Self> {
        if blob.trim().is_empty() {
            return Ok(Self::default());
        }
        let state: Self =
            serde_json::from_str(blob).map_err(|e| anyhow::anyhow!("Invalid state blob: {e}"))?;
        Ok(state)
    }

    /// Serialize to the canonical single-line JSON form used in STATE
    /// messages and state files.
    pub fn serialize(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Serialize to a `serde_json::Value` for embedding in a STATE message.
    pub fn to_value(&self) -> anyhow::Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Look up a bookmark value.
    pub fn get_bookmark(&self, stream: &str, key: &str) -> Option<&Value> {
        self.bookmarks.get(stream).and_then(|b| b.get(key))
    }

    /// Set a bookmark value, creating the stream entry if needed.
    pub fn write_bookmark(&mut self, stream: &str, key: &str, value: Value) {
        self.bookmarks
            .entry(stream.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Replace a stream's bookmarks wholesale (overwrite-per-stream, not a
    /// deep merge).
    pub fn merge(&mut self, stream: &str, update: StreamBookmarks) {
        self.bookmarks.insert(stream.to_string(), update);
    }

    /// Mark which stream is being synced; `None` clears the marker.
    pub fn set_currently_syncing(&mut self, stream: Option<&str>) {
        self.currently_syncing = stream.map(str::to_string);
    }
}
