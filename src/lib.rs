//! copper-sync library
//!
//! A tool for extracting Copper CRM data over the developer REST API and
//! emitting it as a Singer-style stream of SCHEMA / RECORD / STATE messages.
//!
//! # Features
//!
//! - Discovery: a deterministic catalog of every extractable stream with its
//!   JSON schema and selection metadata
//! - Full-table and incremental replication with per-stream bookmarks
//! - Parent/child streams (people and opportunities under companies,
//!   pipeline stages under pipelines)
//! - Bounded retry with rate-limit backoff against the remote API
//! - Resumable state: bookmarks only ever move forward, and interrupted runs
//!   re-sync only the in-flight stream's window
//!
//! # Components
//!
//! - [`registry`] - the static stream table (endpoints, keys, replication)
//! - [`discover`] - catalog construction from the registry
//! - [`client`] - the authenticated, retrying Copper API client
//! - [`sync`] - the sequential sync driver
//! - [`config`] - config-file loading and validation
//! - [`transform`] - date normalization and field projection

pub mod client;
pub mod config;
pub mod discover;
pub mod registry;
pub mod schema;
pub mod sync;
pub mod testing;
pub mod transform;

pub use client::{ClientError, CopperClient, Page, PageQuery, RemoteSource};
pub use config::{Config, ConfigError};
pub use discover::{discover, DiscoveryError};
pub use sync::Syncer;
