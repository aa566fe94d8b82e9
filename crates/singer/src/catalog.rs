//! The catalog document: discoverable streams plus selection metadata.
//!
//! The catalog is produced by discovery and then edited by the operator, who
//! flips `selected` flags on streams and fields. The sync driver only ever
//! reads selection metadata, it never writes it.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Field is always emitted (key properties, replication keys).
pub const INCLUSION_AUTOMATIC: &str = "automatic";
/// Field is emitted when selected.
pub const INCLUSION_AVAILABLE: &str = "available";
/// Field or stream cannot be extracted from the source.
pub const INCLUSION_UNSUPPORTED: &str = "unsupported";

/// One metadata entry, addressed by breadcrumb.
///
/// The empty breadcrumb addresses the stream itself; `["properties", name]`
/// addresses a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub breadcrumb: Vec<String>,
    pub metadata: Map<String, Value>,
}

/// One stream in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub tap_stream_id: String,
    pub stream: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_properties: Vec<String>,
    pub schema: Value,
    pub metadata: Vec<MetadataEntry>,
}

/// The catalog document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub streams: Vec<CatalogEntry>,
}

impl Catalog {
    /// Parse a catalog document from a JSON string.
    pub fn from_string(blob: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(blob)?)
    }

    /// Read and parse a catalog file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let blob = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read catalog file {}: {e}", path.display()))?;
        Self::from_string(&blob)
            .map_err(|e| anyhow::anyhow!("Failed to parse catalog file {}: {e}", path.display()))
    }

    /// Serialize in the indented form produced by discovery.
    pub fn to_pretty_string(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Look up a stream by its `tap_stream_id`.
    pub fn get_stream(&self, tap_stream_id: &str) -> Option<&CatalogEntry> {
        self.streams.iter().find(|s| s.tap_stream_id == tap_stream_id)
    }

    /// Streams with `selected: true` on their root metadata, in catalog
    /// order.
    pub fn selected_streams(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.streams.iter().filter(|s| s.is_selected())
    }
}

impl CatalogEntry {
    fn metadata_for(&self, breadcrumb: &[&str]) -> Option<&Map<String, Value>> {
        self.metadata
            .iter()
            .find(|m| m.breadcrumb.iter().map(String::as_str).eq(breadcrumb.iter().copied()))
            .map(|m| &m.metadata)
    }

    /// Root (stream-level) metadata.
    pub fn root_metadata(&self) -> Option<&Map<String, Value>> {
        self.metadata_for(&[])
    }

    /// Whether the operator selected this stream for sync.
    pub fn is_selected(&self) -> bool {
        self.root_metadata()
            .and_then(|m| m.get("selected"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Whether a field should be emitted, per its selection metadata:
    /// `automatic` fields always, `unsupported` fields never, `available`
    /// fields per their `selected` flag (defaulting to the field's
    /// `selected-by-default`, then to true).
    pub fn is_field_selected(&self, field: &str) -> bool {
        let Some(meta) = self.metadata_for(&["properties", field]) else {
            // Fields without metadata (not produced by discovery) pass
            // through; the schema filter drops anything unknown.
            return true;
        };
        let inclusion = meta
            .get("inclusion")
            .and_then(Value::as_str)
            .unwrap_or(INCLUSION_AVAILABLE);
        match inclusion {
            INCLUSION_AUTOMATIC => true,
            INCLUSION_UNSUPPORTED => false,
            _ => meta
                .get("selected")
                .and_then(Value::as_bool)
                .unwrap_or_else(|| {
                    meta.get("selected-by-default")
                        .and_then(Value::as_bool)
                        .unwrap_or(true)
                }),
        }
    }

    /// The set of fields to emit, taken from the schema's properties and
    /// filtered by selection metadata.
    pub fn selected_fields(&self) -> BTreeSet<String> {
        let Some(props) = self.schema.get("properties").and_then(Value::as_object) else {
            return BTreeSet::new();
        };
        props
            .keys()
            .filter(|f| self.is_field_selected(f))
            .cloned()
            .collect()
    }
}

/// Build the standard metadata list for a discovered stream: root entry with
/// key properties and replication facts, one entry per schema property with
/// its inclusion.
pub fn standard_metadata(
    schema: &Value,
    key_properties: &[&str],
    replication_method: &str,
    valid_replication_keys: &[&str],
) -> Vec<MetadataEntry> {
    let mut root = Map::new();
    root.insert("inclusion".to_string(), json!(INCLUSION_AVAILABLE));
    root.insert("table-key-properties".to_string(), json!(key_properties));
    root.insert(
        "forced-replication-method".to_string(),
        json!(replication_method),
    );
    if !valid_replication_keys.is_empty() {
        root.insert(
            "valid-replication-keys".to_string(),
            json!(valid_replication_keys),
        );
    }

    let mut entries = vec![MetadataEntry {
        breadcrumb: vec![],
        metadata: root,
    }];

    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        for field in props.keys() {
            let automatic = key_properties.contains(&field.as_str())
                || valid_replication_keys.contains(&field.as_str());
            let inclusion = if automatic {
                INCLUSION_AUTOMATIC
            } else {
                INCLUSION_AVAILABLE
            };
            let mut meta = Map::new();
            meta.insert("inclusion".to_string(), json!(inclusion));
            entries.push(MetadataEntry {
                breadcrumb: vec!["properties".to_string(), field.clone()],
                metadata: meta,
            });
        }
    }

    entries
}

/// Set a metadata key at the given breadcrumb, creating the entry if needed.
pub fn write_metadata(
    entries: &mut Vec<MetadataEntry>,
    breadcrumb: &[&str],
    key: &str,
    value: Value,
) {
    if let Some(entry) = entries
        .iter_mut()
        .find(|m| m.breadcrumb.iter().map(String::as_str).eq(breadcrumb.iter().copied()))
    {
        entry.metadata.insert(key.to_string(), value);
        return;
    }
    let mut metadata = Map::new();
    metadata.insert(key.to_string(), value);
    entries.push(MetadataEntry {
        breadcrumb: breadcrumb.iter().map(|s| s.to_string()).collect(),
        metadata,
    });
}
