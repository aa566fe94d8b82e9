//! Singer protocol support for copper-sync
//!
//! Implements the message and catalog documents of the Singer convention:
//! an extraction tool emits line-delimited SCHEMA / RECORD / STATE JSON
//! messages on stdout, and a downstream loader consumes them in order.
//!
//! # Architecture
//!
//! - [`Message`] - the three message kinds with their wire representation
//! - [`MessageSink`] / [`JsonLinesEmitter`] - line-delimited message output
//! - [`Catalog`] / [`CatalogEntry`] - the discoverable stream document with
//!   operator-editable selection metadata
//!
//! # Ordering contract
//!
//! The emitter itself is order-agnostic; the sync driver guarantees that a
//! stream's SCHEMA message precedes all of its RECORD messages and that a
//! STATE message only ever reflects committed bookmarks.

mod catalog;
mod emitter;
mod message;


pub use catalog::{
    standard_metadata, write_metadata, Catalog, CatalogEntry, MetadataEntry, INCLUSION_AUTOMATIC,
    INCLUSION_AVAILABLE, INCLUSION_UNSUPPORTED,
};
pub use emitter::{JsonLinesEmitter, MessageSink};
pub use message::Message;
