// crates/quickfetch-net/src/request.rs
//! Fluent request builder and the frozen request descriptor

use crate::binder::Binder;
use crate::dispatch::{Lifecycle, Outcome};
use crate::error::{FetchError, FetchResult};
use crate::progress::TransferProgress;
use crate::registry::TaskHandle;
use crate::service::HttpService;
use crate::util;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// HTTP method supported by the wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// Owner binding and observers attached to one request, shared between
/// the worker and the dispatcher jobs it posts.
pub(crate) struct Callbacks {
    pub(crate) binder: Option<Arc<dyn Binder>>,
    pub(crate) lifecycle: Option<Arc<dyn Fn(Lifecycle) + Send + Sync>>,
    pub(crate) progress: Option<Arc<dyn Fn(TransferProgress) + Send + Sync>>,
}

impl Callbacks {
    /// Whether completion callbacks may be delivered
    pub(crate) fn is_alive(&self) -> bool {
        self.binder.as_ref().map(|b| b.is_alive()).unwrap_or(true)
    }

    /// Owner scope label prefixing the registry key, empty when unbound
    pub(crate) fn scope_prefix(&self) -> &str {
        self.binder.as_ref().map(|b| b.scope()).unwrap_or("")
    }

    pub(crate) fn emit(&self, event: Lifecycle) {
        if let Some(observer) = &self.lifecycle {
            observer(event);
        }
    }
}

/// Frozen request descriptor, consumed by exactly one dispatch
pub struct Request {
    pub(crate) method: Method,
    /// Absolute URL after base joining, without GET query parameters
    pub(crate) url: String,
    pub(crate) headers: BTreeMap<String, String>,
    pub(crate) params: BTreeMap<String, String>,
    /// Form key and local path per attached file; keys may repeat
    pub(crate) files: Vec<(String, PathBuf)>,
    pub(crate) tag: Option<String>,
    pub(crate) resumable: bool,
    pub(crate) range_start: u64,
    pub(crate) range_end: u64,
    pub(crate) download_dir: Option<PathBuf>,
    pub(crate) file_name: Option<String>,
    pub(crate) ignore_duplicate_body: bool,
    pub(crate) callbacks: Arc<Callbacks>,
}

impl Request {
    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }
}

/// Chainable accumulator for one request.
///
/// Obtained from [`HttpService::request`]; every setter returns the
/// builder, and a terminal call ([`fetch_text`](Self::fetch_text),
/// [`fetch_json`](Self::fetch_json), [`download`](Self::download))
/// freezes it and submits the request. Nothing happens until then.
pub struct RequestBuilder {
    service: HttpService,
    url: String,
    method: Method,
    headers: BTreeMap<String, String>,
    params: BTreeMap<String, String>,
    files: Vec<(String, PathBuf)>,
    send_defaults: bool,
    tag: Option<String>,
    binder: Option<Arc<dyn Binder>>,
    resumable: bool,
    range_start: u64,
    range_end: u64,
    download_dir: Option<PathBuf>,
    file_name: Option<String>,
    ignore_duplicate_body: bool,
    on_lifecycle: Option<Arc<dyn Fn(Lifecycle) + Send + Sync>>,
    on_progress: Option<Arc<dyn Fn(TransferProgress) + Send + Sync>>,
}

impl RequestBuilder {
    pub(crate) fn new(service: HttpService, url: impl Into<String>, method: Method) -> Self {
        Self {
            service,
            url: url.into(),
            method,
            headers: BTreeMap::new(),
            params: BTreeMap::new(),
            files: Vec::new(),
            send_defaults: true,
            tag: None,
            binder: None,
            resumable: true,
            range_start: 0,
            range_end: 0,
            download_dir: None,
            file_name: None,
            ignore_duplicate_body: false,
            on_lifecycle: None,
            on_progress: None,
        }
    }

    pub fn get(mut self) -> Self {
        self.method = Method::Get;
        self
    }

    pub fn post(mut self) -> Self {
        self.method = Method::Post;
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Tags the request for later [`cancel_by_tag`](HttpService::cancel_by_tag)
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Binds the request to an owner; callbacks are dropped once the
    /// owner retires, and the owner scope becomes cancellable as a group
    pub fn binder(mut self, binder: impl Binder + 'static) -> Self {
        self.binder = Some(Arc::new(binder));
        self
    }

    pub fn add_header(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.headers.insert(key.into(), value.to_string());
        self
    }

    pub fn add_param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    pub fn add_params<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: ToString,
    {
        for (k, v) in params {
            self.params.insert(k.into(), v.to_string());
        }
        self
    }

    /// Attaches a file for multipart upload under the given form key
    pub fn add_file(mut self, key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.files.push((key.into(), path.into()));
        self
    }

    /// Attaches several files under the same form key
    pub fn add_files(
        mut self,
        key: impl Into<String>,
        paths: impl IntoIterator<Item = PathBuf>,
    ) -> Self {
        let key = key.into();
        for path in paths {
            self.files.push((key.clone(), path));
        }
        self
    }

    /// Whether the service's default headers and parameters are merged in
    /// (default true)
    pub fn send_default_params(mut self, send: bool) -> Self {
        self.send_defaults = send;
        self
    }

    /// Enables or disables resumable downloading (default enabled)
    pub fn resumable(mut self, resumable: bool) -> Self {
        self.resumable = resumable;
        self
    }

    /// Explicit resume byte range. A zero start is auto-detected from the
    /// existing local file; a zero end is probed from the remote.
    pub fn range(mut self, start: u64, end: u64) -> Self {
        self.resumable = true;
        self.range_start = start;
        self.range_end = end;
        self
    }

    /// Target directory for downloads; defaults to the configured cache dir
    pub fn download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = Some(dir.into());
        self
    }

    /// Target file name for downloads; derived from the URL when unset
    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// Skip the success callback when the body textually equals the
    /// previous body received for the same URL
    pub fn ignore_duplicate_body(mut self, ignore: bool) -> Self {
        self.ignore_duplicate_body = ignore;
        self
    }

    /// By-reference parameter insert, for the before-request hook which
    /// only sees `&mut RequestBuilder`
    pub fn insert_param(&mut self, key: impl Into<String>, value: impl ToString) {
        self.params.insert(key.into(), value.to_string());
    }

    /// By-reference header insert, for the before-request hook
    pub fn insert_header(&mut self, key: impl Into<String>, value: impl ToString) {
        self.headers.insert(key.into(), value.to_string());
    }

    /// Observes `Started`/`Ended` events for this request
    pub fn on_lifecycle(mut self, observer: impl Fn(Lifecycle) + Send + Sync + 'static) -> Self {
        self.on_lifecycle = Some(Arc::new(observer));
        self
    }

    /// Observes throttled transfer progress for uploads and downloads
    pub fn on_progress(
        mut self,
        observer: impl Fn(TransferProgress) + Send + Sync + 'static,
    ) -> Self {
        self.on_progress = Some(Arc::new(observer));
        self
    }

    /// Submits the request and delivers the body as raw text
    pub fn fetch_text<F>(self, on_outcome: F) -> TaskHandle
    where
        F: FnOnce(Outcome<String>) + Send + 'static,
    {
        let service = self.service.clone();
        service.submit_fetch(self, |body| Ok::<_, serde_json::Error>(body.to_owned()), on_outcome)
    }

    /// Submits the request and decodes the body as JSON into `T`
    pub fn fetch_json<T, F>(self, on_outcome: F) -> TaskHandle
    where
        T: DeserializeOwned + Send + 'static,
        F: FnOnce(Outcome<T>) + Send + 'static,
    {
        let service = self.service.clone();
        service.submit_fetch(self, |body| serde_json::from_str::<T>(body), on_outcome)
    }

    /// Submits a file download, resumable by default, and delivers the
    /// path of the written file
    pub fn download<F>(self, on_outcome: F) -> TaskHandle
    where
        F: FnOnce(Outcome<PathBuf>) + Send + 'static,
    {
        let service = self.service.clone();
        service.submit_download(self, on_outcome)
    }

    /// Runs the configured before-request hook and freezes the builder
    /// into an immutable descriptor, merging defaults and joining the URL
    pub(crate) fn freeze(mut self) -> FetchResult<Request> {
        let config = self.service.config().clone();
        if let Some(hook) = &config.before_request {
            hook(&mut self);
        }

        let url = util::join_url(&config.base_url, &self.url);
        if !util::is_absolute_http(&url) {
            return Err(FetchError::InvalidUrl(url));
        }

        let mut headers = self.headers;
        let mut params = self.params;
        if self.send_defaults {
            // Request-local values win over configured defaults.
            for (k, v) in &config.headers {
                headers.entry(k.clone()).or_insert_with(|| v.clone());
            }
            for (k, v) in &config.params {
                params.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }

        Ok(Request {
            method: self.method,
            url,
            headers,
            params,
            files: self.files,
            tag: self.tag,
            resumable: self.resumable,
            range_start: self.range_start,
            range_end: self.range_end,
            download_dir: self.download_dir,
            file_name: self.file_name,
            ignore_duplicate_body: self.ignore_duplicate_body,
            callbacks: Arc::new(Callbacks {
                binder: self.binder,
                lifecycle: self.on_lifecycle,
                progress: self.on_progress,
            }),
        })
    }
}
