//! Sync driver: orchestrates per-stream replication.
//!
//! Streams are processed strictly sequentially in catalog order, so the
//! emitted message sequence is deterministic and the remote rate-limit
//! budget is never contended. For each stream the driver resolves the
//! effective bookmark, pages through the remote source, emits records in API
//! order, and commits the advanced bookmark before moving on:
//!
//! 1. SCHEMA messages for the stream (and its selected children)
//! 2. STATE marking the stream as currently syncing
//! 3. RECORD messages, page by page
//! 4. bookmark commit, then STATE with the committed value
//!
//! A bookmark candidate is the maximum replication-key value seen across the
//! *entire* fetch, not the last page, so an API that returns pages out of
//! order cannot regress the committed bookmark. Records whose replication
//! key is below the starting bookmark are filtered; a boundary record (equal
//! to the bookmark) is re-emitted, which keeps the stream at-least-once.
//!
//! On an unrecoverable failure the in-flight stream's candidate is dropped
//! and the error propagates; bookmarks already committed for earlier streams
//! have been emitted and stand.

use std::collections::BTreeSet;

use anyhow::Context;
use serde_json::{Map, Value};

use bookmark::BookmarkState;
use singer::{Catalog, CatalogEntry, Message, MessageSink};

use crate::client::{PageQuery, PageToken, RemoteSource};
use crate::registry::{self, StreamDef};
use crate::transform;

/// Per-run context for a child stream synced under a parent.
struct ChildCtx {
    def: &'static StreamDef,
    date_fields: BTreeSet<String>,
    selected_fields: BTreeSet<String>,
    /// Lower bound for the child's own records (epoch seconds).
    start: Option<i64>,
    /// Bookmark key scoping the parent's progress to this child, present
    /// when the parent is incremental.
    parent_scoped_key: Option<String>,
    parent_scoped_start: Option<i64>,
    candidate: Option<i64>,
    count: u64,
}

/// Per-run context for a top-level stream.
struct StreamRun {
    def: &'static StreamDef,
    date_fields: BTreeSet<String>,
    selected_fields: BTreeSet<String>,
    /// Whether the stream itself is selected. An unselected parent is still
    /// traversed when one of its children is selected, without emitting its
    /// own records.
    emit_records: bool,
    /// The stream's own resolved bookmark (epoch seconds).
    own_start: Option<i64>,
    /// Effective fetch lower bound: the minimum of the stream's own bookmark
    /// and every selected child's parent-scoped bookmark. `None` means the
    /// full history is needed.
    window_start: Option<i64>,
    candidate: Option<i64>,
    count: u64,
    children: Vec<ChildCtx>,
}

fn max_opt(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (v, None) | (None, v) => v,
    }
}

/// Drives a full sync run against a remote source, emitting messages to the
/// sink and advancing bookmark state.
pub struct Syncer<'a, S: RemoteSource, M: MessageSink> {
    source: &'a S,
    sink: &'a mut M,
    catalog: &'a Catalog,
    state: BookmarkState,
    start_date: Option<i64>,
}

impl<'a, S: RemoteSource, M: MessageSink> Syncer<'a, S, M> {
    pub fn new(
        source: &'a S,
        sink: &'a mut M,
        catalog: &'a Catalog,
        state: BookmarkState,
        start_date: Option<i64>,
    ) -> Self {
        Self {
            source,
            sink,
            catalog,
            state,
            start_date,
        }
    }

    /// The current bookmark state. After a failed run this still reflects
    /// every bookmark committed before the failure.
    pub fn state(&self) -> &BookmarkState {
        &self.state
    }

    /// Run the sync: every selected catalog stream, in catalog order.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let catalog = self.catalog;
        let selected: Vec<&str> = catalog
            .selected_streams()
            .map(|e| e.tap_stream_id.as_str())
            .collect();
        tracing::info!("Selected streams: {selected:?}");

        if let Some(current) = self.state.currently_syncing.clone() {
            tracing::info!("Previous run was interrupted while syncing: {current}");
        }

        for entry in &catalog.streams {
            let Some(def) = registry::get(&entry.tap_stream_id) else {
                tracing::warn!("Ignoring unknown stream in catalog: {}", entry.tap_stream_id);
                continue;
            };
            // Child streams sync under their parent's traversal.
            if def.parent.is_some() {
                continue;
            }
            let children = self.selected_children(def);
            if !entry.is_selected() && children.is_empty() {
                continue;
            }
            self.sync_stream(def, entry, children)
                .await
                .with_context(|| format!("Failed syncing stream {}", def.name))?;
        }

        // Final snapshot at process end.
        self.emit_state()?;
        Ok(())
    }

    fn selected_children(&self, def: &'static StreamDef) -> Vec<(&'static StreamDef, &'a CatalogEntry)> {
        let catalog = self.catalog;
        def.children
            .iter()
            .filter_map(|name| {
                let child_def = registry::get(name)?;
                let child_entry = catalog.get_stream(name)?;
                child_entry.is_selected().then_some((child_def, child_entry))
            })
            .collect()
    }

    async fn sync_stream(
        &mut self,
        def: &'static StreamDef,
        entry: &'a CatalogEntry,
        children: Vec<(&'static StreamDef, &'a CatalogEntry)>,
    ) -> anyhow::Result<()> {
        tracing::info!("START syncing: {}", def.name);

        if entry.is_selected() {
            self.emit_schema(def, entry)?;
        }
        for &(child_def, child_entry) in &children {
            self.emit_schema(child_def, child_entry)?;
        }

        let mut run = self.prepare_stream(def, entry, children)?;

        self.state.set_currently_syncing(Some(def.name));
        self.emit_state()?;

        self.fetch_stream(&mut run).await?;
        self.commit_stream(&run)?;

        self.state.set_currently_syncing(None);
        self.emit_state()?;

        tracing::info!("FINISHED syncing: {}, total_records: {}", def.name, run.count);
        Ok(())
    }

    fn prepare_stream(
        &self,
        def: &'static StreamDef,
        entry: &'a CatalogEntry,
        children: Vec<(&'static StreamDef, &'a CatalogEntry)>,
    ) -> anyhow::Result<StreamRun> {
        let emit_records = entry.is_selected();
        let own_start = match def.bookmark_field {
            Some(bf) => self.resolve_bookmark(def.name, bf)?,
            None => None,
        };

        let mut child_ctxs = Vec::with_capacity(children.len());
        for (child_def, child_entry) in children {
            let start = match child_def.bookmark_field {
                Some(bf) => self.resolve_bookmark(child_def.name, bf)?,
                None => None,
            };
            let (parent_scoped_key, parent_scoped_start) = match def.bookmark_field {
                Some(parent_bf) => {
                    let key = format!("{}_{}", def.name, parent_bf);
                    let resolved = self.resolve_bookmark(child_def.name, &key)?;
                    (Some(key), resolved)
                }
                None => (None, None),
            };
            child_ctxs.push(ChildCtx {
                def: child_def,
                date_fields: transform::date_fields(&child_entry.schema),
                selected_fields: child_entry.selected_fields(),
                start,
                parent_scoped_key,
                parent_scoped_start,
                candidate: None,
                count: 0,
            });
        }

        // The fetch window must cover the stream itself (when selected) and
        // every incremental child's parent-scoped progress; the oldest bound
        // wins, and an unbounded participant makes the window unbounded.
        let mut bounds: Vec<Option<i64>> = Vec::new();
        if emit_records && def.is_incremental() {
            bounds.push(own_start);
        }
        for ctx in &child_ctxs {
            if ctx.def.is_incremental() {
                bounds.push(ctx.parent_scoped_start);
            }
        }
        let window_start = bounds
            .into_iter()
            .reduce(|a, b| match (a, b) {
                (Some(x), Some(y)) => Some(x.min(y)),
                _ => None,
            })
            .flatten();

        Ok(StreamRun {
            def,
            date_fields: transform::date_fields(&entry.schema),
            selected_fields: entry.selected_fields(),
            emit_records,
            own_start,
            window_start,
            candidate: None,
            count: 0,
            children: child_ctxs,
        })
    }

    /// Resolve a stored bookmark to epoch seconds, falling back to the
    /// configured start date.
    fn resolve_bookmark(&self, stream: &str, key: &str) -> anyhow::Result<Option<i64>> {
        match self.state.get_bookmark(stream, key) {
            Some(value) => {
                let epoch = transform::to_epoch_seconds(value)
                    .with_context(|| format!("{stream}: invalid stored bookmark {key}"))?;
                Ok(Some(epoch))
            }
            None => Ok(self.start_date),
        }
    }

    async fn fetch_stream(&mut self, run: &mut StreamRun) -> anyhow::Result<()> {
        let mut token: Option<PageToken> = None;
        loop {
            let query = PageQuery {
                stream: run.def,
                token,
                modified_since: run.window_start.filter(|_| run.def.is_incremental()),
                parent_id: None,
            };
            let page = self.source.fetch_page(&query).await?;
            let next = page.next;
            for mut record in page.records {
                transform::normalize_record_dates(&mut record, &run.date_fields);
                self.process_record(run, record).await?;
            }
            match next {
                Some(t) => token = Some(t),
                None => break,
            }
        }
        Ok(())
    }

    async fn process_record(
        &mut self,
        run: &mut StreamRun,
        record: Map<String, Value>,
    ) -> anyhow::Result<()> {
        if let Some(bookmark_field) = run.def.bookmark_field {
            let Some(raw) = record.get(bookmark_field) else {
                tracing::warn!(
                    "{}: skipping record without {bookmark_field}",
                    run.def.name
                );
                return Ok(());
            };
            let rec_epoch = transform::to_epoch_seconds(raw).with_context(|| {
                format!("{}: unparseable {bookmark_field} value", run.def.name)
            })?;
            if run.window_start.is_some_and(|bound| rec_epoch < bound) {
                return Ok(());
            }
            run.candidate = max_opt(run.candidate, Some(rec_epoch));
        }

        if run.emit_records {
            self.emit_record(run.def.name, &record, &run.selected_fields)?;
            run.count += 1;
        }

        for child in run.children.iter_mut() {
            self.sync_child(child, &record).await?;
        }
        Ok(())
    }

    async fn sync_child(
        &mut self,
        ctx: &mut ChildCtx,
        parent_record: &Map<String, Value>,
    ) -> anyhow::Result<()> {
        let Some(parent_id) = parent_record.get("id") else {
            tracing::warn!(
                "{}: parent record has no id, skipping child fetch",
                ctx.def.name
            );
            return Ok(());
        };

        let mut token: Option<PageToken> = None;
        loop {
            let query = PageQuery {
                stream: ctx.def,
                token,
                modified_since: ctx.start.filter(|_| ctx.def.is_incremental()),
                parent_id: Some(parent_id.clone()),
            };
            let page = self.source.fetch_page(&query).await?;
            let next = page.next;
            for mut record in page.records {
                transform::normalize_record_dates(&mut record, &ctx.date_fields);
                if let Some(bookmark_field) = ctx.def.bookmark_field {
                    let Some(raw) = record.get(bookmark_field) else {
                        tracing::warn!(
                            "{}: skipping record without {bookmark_field}",
                            ctx.def.name
                        );
                        continue;
                    };
                    let rec_epoch = transform::to_epoch_seconds(raw).with_context(|| {
                        format!("{}: unparseable {bookmark_field} value", ctx.def.name)
                    })?;
                    if ctx.start.is_some_and(|bound| rec_epoch < bound) {
                        continue;
                    }
                    ctx.candidate = max_opt(ctx.candidate, Some(rec_epoch));
                }
                self.emit_record(ctx.def.name, &record, &ctx.selected_fields)?;
                ctx.count += 1;
            }
            match next {
                Some(t) => token = Some(t),
                None => break,
            }
        }
        Ok(())
    }

    /// Commit the run's bookmark candidates. Full-table streams never touch
    /// bookmark state.
    fn commit_stream(&mut self, run: &StreamRun) -> anyhow::Result<()> {
        if let Some(bookmark_field) = run.def.bookmark_field {
            if run.emit_records {
                if let Some(epoch) = max_opt(run.candidate, run.own_start) {
                    let value = Value::String(transform::to_rfc3339_utc(epoch)?);
                    self.state.write_bookmark(run.def.name, bookmark_field, value);
                }
            }
            for child in &run.children {
                let Some(key) = &child.parent_scoped_key else {
                    continue;
                };
                if let Some(epoch) = max_opt(run.candidate, child.parent_scoped_start) {
                    let value = Value::String(transform::to_rfc3339_utc(epoch)?);
                    self.state.write_bookmark(child.def.name, key, value);
                }
            }
        }

        for child in &run.children {
            if let Some(bookmark_field) = child.def.bookmark_field {
                if let Some(epoch) = max_opt(child.candidate, child.start) {
                    let value = Value::String(transform::to_rfc3339_utc(epoch)?);
                    self.state.write_bookmark(child.def.name, bookmark_field, value);
                }
            }
            if child.count > 0 {
                tracing::info!("{}: {} records", child.def.name, child.count);
            }
        }
        Ok(())
    }

    fn emit_schema(&mut self, def: &'static StreamDef, entry: &CatalogEntry) -> anyhow::Result<()> {
        let bookmark_properties = def.bookmark_field.map(|bf| vec![bf.to_string()]);
        self.sink.emit(&Message::schema(
            def.name,
            entry.schema.clone(),
            &entry.key_properties,
            bookmark_properties,
        ))
    }

    fn emit_record(
        &mut self,
        stream: &str,
        record: &Map<String, Value>,
        selected: &BTreeSet<String>,
    ) -> anyhow::Result<()> {
        let payload = transform::project_record(record, selected);
        self.sink.emit(&Message::record(stream, payload))
    }

    fn emit_state(&mut self) -> anyhow::Result<()> {
        let value = self.state.to_value()?;
        self.sink.emit(&Message::state(value))
    }
}
