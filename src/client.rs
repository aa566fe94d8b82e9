//! Remote client for the Copper developer API.
//!
//! Performs authenticated HTTP calls and classifies failures: transient
//! conditions (timeouts, 5xx, rate limiting) are retried with bounded
//! exponential backoff, honoring the server's `Retry-After` hint when one is
//! given; other 4xx responses are a caller/config problem and fail
//! immediately.
//!
//! Pagination tokens are opaque outside this module. The sync driver passes
//! a token back unchanged on the next call; `None` means no more pages.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::config::Config;
use crate::registry::{HttpMethod, StreamDef};

/// Copper developer API base URL.
pub const BASE_URL: &str = "https://api.copper.com/developer_api/v1";

/// Retry budget per page fetch, counting the first attempt.
pub const MAX_ATTEMPTS: u32 = 5;

const BACKOFF_BASE_SECS: u64 = 2;

/// Failure classification for a page fetch. Both variants are unrecoverable
/// for the owning stream.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The API rejected the request (4xx other than rate limiting). Not
    /// retried.
    #[error("{stream}: request rejected with HTTP {status}: {message}")]
    RequestRejected {
        stream: String,
        status: u16,
        message: String,
    },

    /// Transient failures persisted past the retry budget.
    #[error("{stream}: retries exhausted after {attempts} attempts")]
    RetryExhausted {
        stream: String,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },
}

impl ClientError {
    /// The stream the failure belongs to.
    pub fn stream(&self) -> &str {
        match self {
            ClientError::RequestRejected { stream, .. }
            | ClientError::RetryExhausted { stream, .. } => stream,
        }
    }
}

/// Opaque pagination token. Only the client interprets its contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken(pub(crate) u64);

/// One decoded page of raw records.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<Map<String, Value>>,
    /// Token for the next page; `None` means the stream is exhausted.
    pub next: Option<PageToken>,
}

/// Parameters for a single page fetch.
#[derive(Debug, Clone)]
pub struct PageQuery {
    pub stream: &'static StreamDef,
    /// Token from the previous page, passed back unchanged.
    pub token: Option<PageToken>,
    /// Lower bound for incremental search bodies, in epoch seconds.
    pub modified_since: Option<i64>,
    /// Parent record id for child stream fetches.
    pub parent_id: Option<Value>,
}

/// Seam between the sync driver and the network. Tests substitute a
/// scripted source.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn fetch_page(&self, query: &PageQuery) -> Result<Page, ClientError>;
}

/// Outcome of a single HTTP attempt, before retry classification.
#[derive(Debug)]
pub(crate) enum AttemptError {
    /// 4xx other than 429: do not retry.
    Fatal { status: u16, message: String },
    /// Worth retrying; `retry_after` carries the server's backoff hint.
    Transient {
        retry_after: Option<Duration>,
        source: anyhow::Error,
    },
}

/// Drive an attempt closure through the retry policy: transient failures
/// back off exponentially (or as the server directs) until the budget is
/// spent; fatal failures return immediately.
pub(crate) async fn with_retries<T, F, Fut>(stream: &str, mut attempt_fn: F) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, AttemptError>>,
{
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match attempt_fn().await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Fatal { status, message }) => {
                return Err(ClientError::RequestRejected {
                    stream: stream.to_string(),
                    status,
                    message,
                });
            }
            Err(AttemptError::Transient {
                retry_after,
                source,
            }) => {
                if attempts >= MAX_ATTEMPTS {
                    return Err(ClientError::RetryExhausted {
                        stream: stream.to_string(),
                        attempts,
                        source,
                    });
                }
                let wait = retry_after
                    .unwrap_or_else(|| Duration::from_secs(BACKOFF_BASE_SECS.pow(attempts)));
                tracing::warn!(
                    "{stream}: transient failure (attempt {attempts}/{MAX_ATTEMPTS}), retrying in {wait:?}: {source}"
                );
                tokio::time::sleep(wait).await;
            }
        }
    }
}

/// Authenticated Copper API client.
pub struct CopperClient {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
    account_email: String,
    page_size: u32,
}

impl CopperClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {e}"))?;
        Ok(Self {
            http,
            base_url: BASE_URL.to_string(),
            api_token: config.api_token.clone(),
            account_email: config.account_email.clone(),
            page_size: config.page_size,
        })
    }

    /// Override the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn search_body(&self, query: &PageQuery) -> Value {
        let page_number = query.token.as_ref().map(|t| t.0).unwrap_or(1);
        let mut body = Map::new();
        body.insert("page_number".to_string(), json!(page_number));
        body.insert("page_size".to_string(), json!(self.page_size));
        if let Some(bookmark_field) = query.stream.bookmark_field {
            body.insert("sort_by".to_string(), json!(bookmark_field));
            body.insert("sort_direction".to_string(), json!("asc"));
            if let Some(since) = query.modified_since {
                body.insert("minimum_modified_date".to_string(), json!(since));
            }
        }
        if let (Some(filter), Some(id)) = (query.stream.parent_filter, &query.parent_id) {
            let value = if filter.list { json!([id]) } else { id.clone() };
            body.insert(filter.field.to_string(), value);
        }
        Value::Object(body)
    }

    async fn attempt(&self, query: &PageQuery) -> Result<Value, AttemptError> {
        let url = format!("{}/{}", self.base_url, query.stream.path);
        let request = match query.stream.method {
            HttpMethod::Get => self.http.get(&url),
            HttpMethod::Post => self.http.post(&url).json(&self.search_body(query)),
        };
        let response = request
            .header("X-PW-AccessToken", &self.api_token)
            .header("X-PW-UserEmail", &self.account_email)
            .header("X-PW-Application", "developer_api")
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AttemptError::Transient {
                retry_after: None,
                source: anyhow::anyhow!("Request to {url} failed: {e}"),
            })?;

        let status = response.status();
        if status.is_success() {
            return response.json().await.map_err(|e| AttemptError::Transient {
                retry_after: None,
                source: anyhow::anyhow!("Failed to decode response from {url}: {e}"),
            });
        }

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(AttemptError::Transient {
                retry_after,
                source: anyhow::anyhow!("HTTP 429: rate limited by {url}"),
            });
        }

        if status.is_server_error() {
            return Err(AttemptError::Transient {
                retry_after: None,
                source: anyhow::anyhow!("HTTP {status} from {url}"),
            });
        }

        let message = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|v| {
                v.get("message")
                    .or_else(|| v.get("error"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Unknown Error")
                    .to_string()
            });
        Err(AttemptError::Fatal {
            status: status.as_u16(),
            message,
        })
    }

    /// Decode a response body into records plus the next-page token.
    fn extract_page(&self, query: &PageQuery, body: Value) -> Result<Page, ClientError> {
        let def = query.stream;
        let rows: Vec<Value> = match body {
            Value::Array(items) => items,
            Value::Object(mut obj) => {
                if let Some(key) = def.data_key {
                    match obj.remove(key) {
                        Some(Value::Array(items)) => items,
                        Some(other) => vec![other],
                        None => Vec::new(),
                    }
                } else {
                    // Single-object endpoints (account).
                    vec![Value::Object(obj)]
                }
            }
            other => {
                return Err(ClientError::RequestRejected {
                    stream: def.name.to_string(),
                    status: 200,
                    message: format!("unexpected response shape: {other}"),
                });
            }
        };

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            match row {
                Value::Object(map) => records.push(map),
                other => {
                    tracing::warn!("{}: skipping non-object record ({other})", def.name);
                }
            }
        }

        // Search endpoints advance by page number until a short page; GET
        // endpoints return everything at once.
        let page_number = query.token.as_ref().map(|t| t.0).unwrap_or(1);
        let next = if def.is_search() && records.len() as u32 >= self.page_size {
            Some(PageToken(page_number + 1))
        } else {
            None
        };

        Ok(Page { records, next })
    }
}

#[async_trait]
impl RemoteSource for CopperClient {
    async fn fetch_page(&self, query: &PageQuery) -> Result<Page, ClientError> {
        let body = with_retries(query.stream.name, || self.attempt(query)).await?;
        self.extract_page(query, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn test_client() -> CopperClient {
        let config = Config {
            api_token: "token".to_string(),
            account_email: "ops@example.com".to_string(),
            start_date: None,
            request_timeout_secs: 30,
            page_size: 2,
        };
        CopperClient::new(&config).unwrap()
    }

    fn query_for(stream: &str) -> PageQuery {
        PageQuery {
            stream: registry::get(stream).unwrap(),
            token: None,
            modified_since: None,
            parent_id: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_recover_below_the_ceiling() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, ClientError> = with_retries("leads", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 3 {
                    Err(AttemptError::Transient {
                        retry_after: None,
                        source: anyhow::anyhow!("HTTP 503"),
                    })
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhaust_at_the_ceiling() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, ClientError> = with_retries("leads", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(AttemptError::Transient {
                    retry_after: None,
                    source: anyhow::anyhow!("HTTP 503"),
                })
            }
        })
        .await;

        match result.unwrap_err() {
            ClientError::RetryExhausted { stream, attempts, .. } => {
                assert_eq!(stream, "leads");
                assert_eq!(attempts, MAX_ATTEMPTS);
            }
            other => panic!("expected RetryExhausted, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, ClientError> = with_retries("leads", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(AttemptError::Fatal {
                    status: 401,
                    message: "bad token".to_string(),
                })
            }
        })
        .await;

        match result.unwrap_err() {
            ClientError::RequestRejected { stream, status, message } => {
                assert_eq!(stream, "leads");
                assert_eq!(status, 401);
                assert_eq!(message, "bad token");
            }
            other => panic!("expected RequestRejected, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_extract_page_from_search_array() {
        let client = test_client();
        let query = query_for("leads");
        let body = serde_json::json!([{"id": 1}, {"id": 2}]);

        let page = client.extract_page(&query, body).unwrap();
        assert_eq!(page.records.len(), 2);
        // Full page: a next token pointing at page 2.
        assert_eq!(page.next, Some(PageToken(2)));
    }

    #[test]
    fn test_extract_page_short_page_terminates() {
        let client = test_client();
        let mut query = query_for("leads");
        query.token = Some(PageToken(3));
        let body = serde_json::json!([{"id": 5}]);

        let page = client.extract_page(&query, body).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.next, None);
    }

    #[test]
    fn test_extract_page_with_data_key() {
        let client = test_client();
        let query = query_for("tags");
        let body = serde_json::json!({"tags": [{"id": 1, "name": "vip"}]});

        let page = client.extract_page(&query, body).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.next, None);
    }

    #[test]
    fn test_extract_page_single_object() {
        let client = test_client();
        let query = query_for("account");
        let body = serde_json::json!({"id": 9, "name": "Example Inc"});

        let page = client.extract_page(&query, body).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0]["name"], "Example Inc");
        assert_eq!(page.next, None);
    }

    #[test]
    fn test_extract_page_rejects_scalar_body() {
        let client = test_client();
        let query = query_for("leads");
        let result = client.extract_page(&query, serde_json::json!(7));
        assert!(matches!(result, Err(ClientError::RequestRejected { .. })));
    }

    #[test]
    fn test_search_body_for_incremental_stream() {
        let client = test_client();
        let mut query = query_for("leads");
        query.modified_since = Some(1_577_836_800);
        query.token = Some(PageToken(4));

        let body = client.search_body(&query);
        assert_eq!(body["page_number"], 4);
        assert_eq!(body["page_size"], 2);
        assert_eq!(body["sort_by"], "date_modified");
        assert_eq!(body["sort_direction"], "asc");
        assert_eq!(body["minimum_modified_date"], 1_577_836_800);
    }

    #[test]
    fn test_search_body_with_parent_filter() {
        let client = test_client();
        let mut query = query_for("people");
        query.parent_id = Some(serde_json::json!(77));

        let body = client.search_body(&query);
        assert_eq!(body["company_ids"], serde_json::json!([77]));

        let mut query = query_for("pipeline_stages");
        query.parent_id = Some(serde_json::json!(5));
        let body = client.search_body(&query);
        assert_eq!(body["pipeline_id"], 5);
        // Full-table search bodies carry no sort or lower bound.
        assert!(body.get("sort_by").is_none());
    }
}
