//! Bookmark state management for copper-sync
//!
//! Provides the replication-state document that records, per stream, how far
//! incremental extraction has progressed.
//!
//! # Architecture
//!
//! This crate provides a storage-agnostic state model that:
//! - Defines [`BookmarkState`], the state document emitted in STATE messages
//! - Supports loading prior state, per-stream merging, and serialization
//! - Guarantees a byte-stable round-trip for any state blob this tool emits
//! - Provides state-file reading/writing for CLI use
//!
//! The state layout follows the Singer convention:
//!
//! ```json
//! {
//!     "bookmarks": {
//!         "leads": { "date_modified": "2020-01-05T00:00:00Z" }
//!     },
//!     "currently_syncing": "leads"
//! }
//! ```
//!
//! Bookmark values are opaque JSON values at this layer; the sync driver owns
//! the comparison semantics (timestamps compared in epoch seconds).

mod file;
mod state;


pub use file::{read_state_file, write_state_file};
pub use state::{BookmarkState, StreamBookmarks};
