//! Host services backing the capability handlers.
//!
//! The bridge never talks to the network or to persistent storage itself:
//! it goes through the [`HttpTransport`] and [`StoreBackend`] traits so the
//! host application decides how requests are sent and where values live.

use crate::error::{RuntimeError, RuntimeResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Network request as declared by runner code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRequest {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub params: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub body: Option<String>,
    /// Timeout in milliseconds.
    #[serde(default)]
    pub timeout: Option<f64>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl NetworkRequest {
    /// The request's own timeout, or `default` when absent or not positive.
    pub fn effective_timeout(&self, default: Duration) -> Duration {
        self.timeout
            .filter(|ms| ms.is_finite() && *ms > 0.0)
            .map(|ms| Duration::from_millis(ms as u64))
            .unwrap_or(default)
    }

    /// Resolve into the concrete request handed to the transport.
    pub fn prepare(self, default_timeout: Duration) -> HttpRequest {
        let timeout = self.effective_timeout(default_timeout);
        HttpRequest {
            url: self.url,
            method: self.method.to_uppercase(),
            headers: self.headers.unwrap_or_default(),
            params: self.params.unwrap_or_default(),
            body: self.body,
            timeout,
        }
    }
}

/// Fully resolved HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub params: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout: Duration,
}

/// Response delivered back to runner code. Non-2xx statuses are still responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkResponse {
    pub data: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
}

/// Classification of a request that produced no response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    Timeout,
    Connect,
    InvalidRequest,
    Body,
    Other,
}

impl NetworkErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkErrorKind::Timeout => "timeout",
            NetworkErrorKind::Connect => "connect",
            NetworkErrorKind::InvalidRequest => "invalid_request",
            NetworkErrorKind::Body => "body",
            NetworkErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request failed before a response was received.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct NetworkError {
    pub kind: NetworkErrorKind,
    pub message: String,
}

impl NetworkError {
    pub fn new(kind: NetworkErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Sends HTTP requests on behalf of runners.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<NetworkResponse, NetworkError>;
}

/// Default transport backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn classify(err: &reqwest::Error) -> NetworkErrorKind {
    if err.is_timeout() {
        NetworkErrorKind::Timeout
    } else if err.is_connect() {
        NetworkErrorKind::Connect
    } else if err.is_builder() {
        NetworkErrorKind::InvalidRequest
    } else if err.is_body() || err.is_decode() {
        NetworkErrorKind::Body
    } else {
        NetworkErrorKind::Other
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<NetworkResponse, NetworkError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|_| {
            NetworkError::new(
                NetworkErrorKind::InvalidRequest,
                format!("unsupported method '{}'", request.method),
            )
        })?;

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout);
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| NetworkError::new(classify(&e), e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();
        let data = response
            .text()
            .await
            .map_err(|e| NetworkError::new(NetworkErrorKind::Body, e.to_string()))?;

        Ok(NetworkResponse {
            data,
            status,
            headers,
        })
    }
}

/// Key/value storage shared by all runners; keys arrive already scoped.
pub trait StoreBackend: Send + Sync {
    fn get(&self, key: &str) -> RuntimeResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> RuntimeResult<()>;
    fn remove(&self, key: &str) -> RuntimeResult<()>;
}

/// In-memory store; every operation holds the lock for its whole duration.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl StoreBackend for MemoryStore {
    fn get(&self, key: &str) -> RuntimeResult<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> RuntimeResult<()> {
        if key.is_empty() {
            return Err(RuntimeError::Store("key cannot be empty".to_string()));
        }
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> RuntimeResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// Log level for runner logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse a script-supplied level; unknown names fall back to `Info`.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

/// Services shared by every context the host creates.
#[derive(Clone)]
pub struct HostServices {
    pub transport: Arc<dyn HttpTransport>,
    pub store: Arc<dyn StoreBackend>,
}

impl HostServices {
    pub fn new(transport: Arc<dyn HttpTransport>, store: Arc<dyn StoreBackend>) -> Self {
        Self { transport, store }
    }
}

impl Default for HostServices {
    fn default() -> Self {
        Self {
            transport: Arc::new(ReqwestTransport::new()),
            store: Arc::new(MemoryStore::new()),
        }
    }
}

impl fmt::Debug for HostServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostServices").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_timeout_overrides_default() {
        let request = NetworkRequest {
            url: "https://example.com".to_string(),
            method: "get".to_string(),
            headers: None,
            params: None,
            body: None,
            timeout: Some(5000.0),
        };
        let prepared = request.prepare(Duration::from_secs(30));
        assert_eq!(prepared.timeout, Duration::from_millis(5000));
        assert_eq!(prepared.method, "GET");
    }

    #[test]
    fn test_missing_or_invalid_timeout_uses_default() {
        let mut request = NetworkRequest {
            url: "https://example.com".to_string(),
            method: "GET".to_string(),
            headers: None,
            params: None,
            body: None,
            timeout: None,
        };
        let default = Duration::from_secs(30);
        assert_eq!(request.effective_timeout(default), default);

        request.timeout = Some(-1.0);
        assert_eq!(request.effective_timeout(default), default);
    }

    #[test]
    fn test_memory_store_operations() {
        let store = MemoryStore::new();
        store.set("key1", "value1").unwrap();
        assert_eq!(store.get("key1").unwrap(), Some("value1".to_string()));
        assert_eq!(store.get("missing").unwrap(), None);

        store.remove("key1").unwrap();
        assert!(store.is_empty());
        assert!(store.set("", "x").is_err());
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!(LogLevel::parse("WARN"), LogLevel::Warn);
        assert_eq!(LogLevel::parse("verbose"), LogLevel::Info);
    }
}
