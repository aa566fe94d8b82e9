//! Catalog discovery.
//!
//! Builds the catalog document from the static stream registry and the
//! embedded schemas. Discovery is deterministic: the same binary produces a
//! byte-identical catalog on every run. Selection flags are left for the
//! operator to edit; discovery never selects anything.

use serde_json::json;
use singer::{standard_metadata, write_metadata, Catalog, CatalogEntry};

use crate::registry;
use crate::schema;

/// Fatal discovery failure. No partial catalog is ever produced.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("{stream}: embedded schema is invalid")]
    InvalidSchema {
        stream: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Build the catalog for every registry stream.
pub fn discover() -> Result<Catalog, DiscoveryError> {
    let mut streams = Vec::new();

    for def in registry::all_streams() {
        let stream_schema = schema::schema_for(def).map_err(|source| DiscoveryError::InvalidSchema {
            stream: def.name.to_string(),
            source,
        })?;

        let valid_replication_keys: Vec<&str> = def.bookmark_field.into_iter().collect();
        let mut metadata = standard_metadata(
            &stream_schema,
            def.key_properties,
            def.replication.as_str(),
            &valid_replication_keys,
        );

        if let Some(parent) = def.parent {
            write_metadata(&mut metadata, &[], "parent-tap-stream-id", json!(parent));
        }

        // pipeline_stages is unauthorized at the source when fetched
        // standalone; keep it discoverable but unsupported, so it only syncs
        // as a child of pipelines.
        if def.name == "pipeline_stages" {
            tracing::warn!(
                "Marking stream '{}' as unsupported during discovery (unauthorized at source)",
                def.name
            );
            write_metadata(&mut metadata, &[], "inclusion", json!("unsupported"));
            write_metadata(&mut metadata, &[], "selected-by-default", json!(false));
        }

        streams.push(CatalogEntry {
            tap_stream_id: def.name.to_string(),
            stream: def.name.to_string(),
            key_properties: def.key_properties.iter().map(|s| s.to_string()).collect(),
            schema: stream_schema,
            metadata,
        });
    }

    Ok(Catalog { streams })
}
