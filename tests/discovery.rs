//! Discovery tests: catalog shape, determinism, and metadata.

use copper_sync::{discover, registry};
use singer::Catalog;

#[test]
fn test_discovery_is_idempotent() {
    let first = discover().unwrap().to_pretty_string().unwrap();
    let second = discover().unwrap().to_pretty_string().unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_catalog_covers_every_registry_stream_in_order() {
    let catalog = discover().unwrap();
    let catalog_names: Vec<&str> = catalog
        .streams
        .iter()
        .map(|s| s.tap_stream_id.as_str())
        .collect();
    let registry_names: Vec<&str> = registry::all_streams().iter().map(|s| s.name).collect();
    assert_eq!(catalog_names, registry_names);
}

#[test]
fn test_root_metadata_carries_replication_facts() {
    let catalog = discover().unwrap();

    let leads = catalog.get_stream("leads").unwrap();
    let root = leads.root_metadata().unwrap();
    assert_eq!(root["table-key-properties"], serde_json::json!(["id"]));
    assert_eq!(root["forced-replication-method"], "INCREMENTAL");
    assert_eq!(root["valid-replication-keys"], serde_json::json!(["date_modified"]));

    let tags = catalog.get_stream("tags").unwrap();
    let root = tags.root_metadata().unwrap();
    assert_eq!(root["forced-replication-method"], "FULL_TABLE");
    assert!(root.get("valid-replication-keys").is_none());
}

#[test]
fn test_replication_key_is_automatic() {
    let catalog = discover().unwrap();
    let leads = catalog.get_stream("leads").unwrap();

    let meta = leads
        .metadata
        .iter()
        .find(|m| m.breadcrumb == vec!["properties", "date_modified"])
        .unwrap();
    assert_eq!(meta.metadata["inclusion"], "automatic");

    let meta = leads
        .metadata
        .iter()
        .find(|m| m.breadcrumb == vec!["properties", "name"])
        .unwrap();
    assert_eq!(meta.metadata["inclusion"], "available");
}

#[test]
fn test_child_streams_reference_their_parent() {
    let catalog = discover().unwrap();
    for (child, parent) in [
        ("people", "companies"),
        ("opportunities", "companies"),
        ("pipeline_stages", "pipelines"),
    ] {
        let entry = catalog.get_stream(child).unwrap();
        let root = entry.root_metadata().unwrap();
        assert_eq!(root["parent-tap-stream-id"], parent, "{child}");
    }
}

#[test]
fn test_pipeline_stages_is_unsupported_standalone() {
    let catalog = discover().unwrap();
    let entry = catalog.get_stream("pipeline_stages").unwrap();
    let root = entry.root_metadata().unwrap();
    assert_eq!(root["inclusion"], "unsupported");
    assert_eq!(root["selected-by-default"], false);
}

#[test]
fn test_catalog_is_valid_with_nothing_selected() {
    let catalog = discover().unwrap();
    assert_eq!(catalog.selected_streams().count(), 0);

    // The document survives a serialization round-trip untouched.
    let blob = catalog.to_pretty_string().unwrap();
    let reloaded = Catalog::from_string(&blob).unwrap();
    assert_eq!(reloaded, catalog);
}
