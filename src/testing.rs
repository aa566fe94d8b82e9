//! Test infrastructure for driver and protocol testing.
//!
//! Provides a scriptable remote source that runs through the real retry
//! policy, a message sink that records everything emitted, and catalog
//! helpers for selecting streams the way an operator would.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use singer::{write_metadata, Catalog, Message, MessageSink};

use crate::client::{with_retries, AttemptError, ClientError, Page, PageQuery, PageToken, RemoteSource};
use crate::discover;

/// A scripted remote source. Pages are queued per stream and handed out one
/// per fetch; failures are injected either as transient errors (consumed by
/// the retry policy) or as rejections (fatal immediately).
#[derive(Default)]
pub struct MockSource {
    pages: Mutex<HashMap<String, VecDeque<Page>>>,
    transient_failures: Mutex<HashMap<String, u32>>,
    rejections: Mutex<HashMap<String, (u16, String)>>,
    fetches: Mutex<Vec<String>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a page of records for a stream. `has_next` controls whether the
    /// page carries a token to the following page.
    pub fn push_page(&self, stream: &str, records: Vec<Value>, has_next: bool) {
        let records = records
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        let mut pages = self.pages.lock().expect("pages lock");
        let queue = pages.entry(stream.to_string()).or_default();
        let next = has_next.then(|| PageToken(queue.len() as u64 + 2));
        queue.push_back(Page { records, next });
    }

    /// Fail the next `times` attempts against a stream with a transient
    /// error before serving pages normally.
    pub fn fail_transiently(&self, stream: &str, times: u32) {
        self.transient_failures
            .lock()
            .expect("failures lock")
            .insert(stream.to_string(), times);
    }

    /// Reject every request against a stream with the given HTTP status.
    pub fn reject(&self, stream: &str, status: u16, message: &str) {
        self.rejections
            .lock()
            .expect("rejections lock")
            .insert(stream.to_string(), (status, message.to_string()));
    }

    /// Number of page fetches issued against a stream (attempts inside the
    /// retry loop are not counted).
    pub fn fetch_count(&self, stream: &str) -> usize {
        self.fetches
            .lock()
            .expect("fetches lock")
            .iter()
            .filter(|s| s.as_str() == stream)
            .count()
    }

    async fn attempt(&self, query: &PageQuery) -> Result<Page, AttemptError> {
        let name = query.stream.name;
        if let Some((status, message)) = self.rejections.lock().expect("rejections lock").get(name) {
            return Err(AttemptError::Fatal {
                status: *status,
                message: message.clone(),
            });
        }
        {
            let mut failures = self.transient_failures.lock().expect("failures lock");
            if let Some(remaining) = failures.get_mut(name) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(AttemptError::Transient {
                        retry_after: None,
                        source: anyhow::anyhow!("simulated transient failure"),
                    });
                }
            }
        }
        let page = self
            .pages
            .lock()
            .expect("pages lock")
            .get_mut(name)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default();
        Ok(page)
    }
}

#[async_trait]
impl RemoteSource for MockSource {
    async fn fetch_page(&self, query: &PageQuery) -> Result<Page, ClientError> {
        self.fetches
            .lock()
            .expect("fetches lock")
            .push(query.stream.name.to_string());
        with_retries(query.stream.name, || self.attempt(query)).await
    }
}

/// Captures every emitted message for assertions.
#[derive(Default)]
pub struct RecordingSink {
    pub messages: Vec<Message>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The message kinds in emission order, for ordering assertions.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.messages
            .iter()
            .map(|m| match m {
                Message::Schema { .. } => "SCHEMA",
                Message::Record { .. } => "RECORD",
                Message::State { .. } => "STATE",
            })
            .collect()
    }

    /// Record payloads emitted for a stream, in order.
    pub fn records_for(&self, stream: &str) -> Vec<&Value> {
        self.messages
            .iter()
            .filter_map(|m| match m {
                Message::Record {
                    stream: s, record, ..
                } if s == stream => Some(record),
                _ => None,
            })
            .collect()
    }

    /// The last STATE payload, if any was emitted.
    pub fn last_state(&self) -> Option<&Value> {
        self.messages.iter().rev().find_map(|m| match m {
            Message::State { value } => Some(value),
            _ => None,
        })
    }
}

impl MessageSink for RecordingSink {
    fn emit(&mut self, message: &Message) -> anyhow::Result<()> {
        self.messages.push(message.clone());
        Ok(())
    }
}

/// Build a discovery catalog with the given streams marked selected.
pub fn catalog_with_selected(streams: &[&str]) -> Catalog {
    let mut catalog = discover::discover().expect("discovery");
    for entry in &mut catalog.streams {
        if streams.contains(&entry.tap_stream_id.as_str()) {
            write_metadata(&mut entry.metadata, &[], "selected", serde_json::json!(true));
        }
    }
    catalog
}
