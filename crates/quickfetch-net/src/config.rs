// crates/quickfetch-net/src/config.rs
//! Shared service configuration

use crate::error::FetchError;
use crate::request::{Method, RequestBuilder};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Hook run against every builder immediately before it is frozen
pub type BeforeRequestHook = Arc<dyn Fn(&mut RequestBuilder) + Send + Sync>;

/// Global observer invoked after the per-request failure callback
pub type FailureHook = Arc<dyn Fn(&FetchError, bool) + Send + Sync>;

/// Global observer of every raw response body, invoked before the
/// liveness gate
pub type ResponseHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Configuration shared by every request issued through one
/// [`HttpService`](crate::HttpService).
///
/// Constructed once at startup and handed to the service; there is no
/// ambient global state. Defaults mirror a permissive mobile client:
/// 30 second timeouts, one retry on connection failure, UTF-8.
#[derive(Clone)]
pub struct ServiceConfig {
    /// Prefix joined onto relative request URLs
    pub base_url: String,
    /// Method used when a builder does not pick one
    pub default_method: Method,
    /// Headers added to every request that sends defaults
    pub headers: BTreeMap<String, String>,
    /// Parameters added to every request that sends defaults
    pub params: BTreeMap<String, String>,
    /// Connection-establishment timeout
    pub connect_timeout: Duration,
    /// Timeout for reading response data
    pub read_timeout: Duration,
    /// Write timeout; kept for configuration parity, the transport does
    /// not expose a separate write knob
    pub write_timeout: Duration,
    /// Retry once after a connection-establishment failure
    pub retry_on_connection_failure: bool,
    /// Charset advertised for uploaded file parts
    pub encoding: String,
    /// Default directory for downloaded files
    pub cache_dir: PathBuf,
    /// Disk budget for the download directory; advisory, not enforced
    /// by the transport
    pub cache_size: u64,
    /// Responses larger than this are replaced by a diagnostic
    /// placeholder string instead of being buffered
    pub max_body_bytes: u64,
    /// Accept invalid TLS certificates (off by default, unlike the
    /// trust-everything clients this replaces)
    pub accept_invalid_certs: bool,
    /// Hook run before every request is frozen
    pub before_request: Option<BeforeRequestHook>,
    /// Hook run on every failure, after the per-request callback
    pub on_failure: Option<FailureHook>,
    /// Hook observing every raw response body
    pub on_response: Option<ResponseHook>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            default_method: Method::Get,
            headers: BTreeMap::new(),
            params: BTreeMap::new(),
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            retry_on_connection_failure: true,
            encoding: "utf-8".to_string(),
            cache_dir: std::env::temp_dir().join("quickfetch"),
            cache_size: 10 * 1024 * 1024,
            max_body_bytes: 10 * 1024 * 1024,
            accept_invalid_certs: false,
            before_request: None,
            on_failure: None,
            on_response: None,
        }
    }
}

impl ServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn default_method(mut self, method: Method) -> Self {
        self.default_method = method;
        self
    }

    /// Adds a header sent with every request that sends defaults
    pub fn add_header(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.headers.insert(key.into(), value.to_string());
        self
    }

    /// Adds a parameter sent with every request that sends defaults
    pub fn add_param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn retry_on_connection_failure(mut self, retry: bool) -> Self {
        self.retry_on_connection_failure = retry;
        self
    }

    pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn cache_size(mut self, bytes: u64) -> Self {
        self.cache_size = bytes;
        self
    }

    pub fn max_body_bytes(mut self, bytes: u64) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    pub fn on_before_request(
        mut self,
        hook: impl Fn(&mut RequestBuilder) + Send + Sync + 'static,
    ) -> Self {
        self.before_request = Some(Arc::new(hook));
        self
    }

    pub fn on_failure(
        mut self,
        hook: impl Fn(&FetchError, bool) + Send + Sync + 'static,
    ) -> Self {
        self.on_failure = Some(Arc::new(hook));
        self
    }

    pub fn on_response(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_response = Some(Arc::new(hook));
        self
    }
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("base_url", &self.base_url)
            .field("default_method", &self.default_method)
            .field("headers", &self.headers)
            .field("params", &self.params)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("retry_on_connection_failure", &self.retry_on_connection_failure)
            .field("encoding", &self.encoding)
            .field("cache_dir", &self.cache_dir)
            .field("cache_size", &self.cache_size)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish_non_exhaustive()
    }
}
