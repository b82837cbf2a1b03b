// crates/quickfetch-net/src/service.rs
//! Request dispatch, response delivery and the cancellation surface

use crate::config::ServiceConfig;
use crate::dispatch::{Dispatcher, Lifecycle, Outcome};
use crate::download;
use crate::error::{FetchError, FetchResult};
use crate::progress::TransferProgress;
use crate::registry::{TaskHandle, TaskRegistry};
use crate::request::{Callbacks, Method, Request, RequestBuilder};
use crate::upload;
use crate::util;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

const MAX_REDIRECTS: usize = 10;

/// The fetch service: one shared transport client, task registry and
/// serial callback dispatcher.
///
/// Cheap to clone; clones share every piece of state. Must be created
/// within a Tokio runtime, which also hosts the callback dispatcher.
#[derive(Clone)]
pub struct HttpService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    config: ServiceConfig,
    http: reqwest::Client,
    registry: TaskRegistry,
    dispatcher: Dispatcher,
    /// Previous body per URL, for duplicate-body suppression
    last_bodies: Mutex<HashMap<String, String>>,
}

impl HttpService {
    /// Builds the underlying transport client from the configuration
    pub fn new(config: ServiceConfig) -> FetchResult<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .user_agent(format!("quickfetch/{}", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .cookie_store(true);
        if config.accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder.build().map_err(FetchError::Http)?;

        Ok(Self {
            inner: Arc::new(ServiceInner {
                config,
                http,
                registry: TaskRegistry::new(),
                dispatcher: Dispatcher::new(),
                last_bodies: Mutex::new(HashMap::new()),
            }),
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    /// The in-flight task registry
    pub fn registry(&self) -> &TaskRegistry {
        &self.inner.registry
    }

    /// Starts a fluent request builder for the given URL (absolute, or
    /// relative to the configured base URL)
    pub fn request(&self, url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(self.clone(), url, self.inner.config.default_method)
    }

    /// Cancels and removes at most one task carrying the tag; returns
    /// whether a cancellation occurred
    pub fn cancel_by_tag(&self, tag: &str) -> bool {
        self.inner.registry.cancel_by_tag(tag)
    }

    /// Cancels every task bound to the given owner scope
    pub fn cancel_by_owner(&self, binder: &dyn crate::Binder) {
        self.inner.registry.cancel_by_owner(binder.scope());
    }

    /// Cancels every outstanding task
    pub fn cancel_all(&self) {
        self.inner.registry.cancel_all();
    }

    /// Registry key for a frozen request: owner scope prefix, method, the
    /// full URL and the serialized form body. Deterministic because the
    /// parameter maps are ordered.
    pub(crate) fn derive_key(&self, request: &Request) -> String {
        let scope = request.callbacks.scope_prefix();
        match request.method {
            Method::Get => format!(
                "{}GET {}",
                scope,
                util::format_get(&request.url, &request.params)
            ),
            Method::Post => format!(
                "{}POST {} {{{}}}",
                scope,
                request.url,
                util::format_query(&request.params)
            ),
        }
    }

    pub(crate) fn post_progress(&self, callbacks: &Arc<Callbacks>, event: TransferProgress) {
        if let Some(observer) = callbacks.progress.clone() {
            self.inner.dispatcher.post(move || observer(event));
        }
    }

    /// Posts a success value followed by `Ended`; liveness must already
    /// have been checked by the caller
    pub(crate) fn deliver_value<T, F>(&self, callbacks: &Arc<Callbacks>, value: T, on_outcome: F)
    where
        T: Send + 'static,
        F: FnOnce(Outcome<T>) + Send + 'static,
    {
        let callbacks = Arc::clone(callbacks);
        self.inner.dispatcher.post(move || {
            on_outcome(Outcome::Success(value));
            callbacks.emit(Lifecycle::Ended);
        });
    }

    /// Submits a text/JSON request: registers the task, emits `Started`,
    /// and spawns the worker racing the transport against cancellation
    pub(crate) fn submit_fetch<T, D, F>(
        &self,
        builder: RequestBuilder,
        decode: D,
        on_outcome: F,
    ) -> TaskHandle
    where
        T: Send + 'static,
        D: FnOnce(&str) -> Result<T, serde_json::Error> + Send + 'static,
        F: FnOnce(Outcome<T>) + Send + 'static,
    {
        let request = match builder.freeze() {
            Ok(request) => request,
            Err(error) => return self.reject(error, on_outcome),
        };
        let key = self.derive_key(&request);
        let handle = TaskHandle::new(request.tag.clone());
        self.inner.registry.register(key.clone(), handle.clone());
        request.callbacks.emit(Lifecycle::Started);

        let service = self.clone();
        let worker = handle.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = worker.cancelled() => Err(FetchError::Cancelled),
                result = service.send(&request) => result,
            };
            match result {
                Ok(response) => {
                    service
                        .finish_success(&key, &request, response, decode, on_outcome)
                        .await
                }
                Err(error) => {
                    service.finish_failure(&key, &request.callbacks, error, on_outcome)
                }
            }
        });
        handle
    }

    /// Submits a resumable download; see [`download`](crate::download)
    /// for the coordinator itself
    pub(crate) fn submit_download<F>(&self, builder: RequestBuilder, on_outcome: F) -> TaskHandle
    where
        F: FnOnce(Outcome<PathBuf>) + Send + 'static,
    {
        let request = match builder.freeze() {
            Ok(request) => request,
            Err(error) => return self.reject(error, on_outcome),
        };
        let key = self.derive_key(&request);
        let handle = TaskHandle::new(request.tag.clone());
        self.inner.registry.register(key.clone(), handle.clone());
        request.callbacks.emit(Lifecycle::Started);

        let service = self.clone();
        let worker = handle.clone();
        tokio::spawn(download::run(service, request, key, worker, on_outcome));
        handle
    }

    /// Failure path for requests rejected before registration (bad URL):
    /// the outcome is still delivered on the dispatcher
    fn reject<T, F>(&self, error: FetchError, on_outcome: F) -> TaskHandle
    where
        T: Send + 'static,
        F: FnOnce(Outcome<T>) + Send + 'static,
    {
        log::warn!("rejecting request before dispatch: {}", error);
        let handle = TaskHandle::new(None);
        let is_connect = error.is_connect();
        let hook = self.inner.config.on_failure.clone();
        self.inner.dispatcher.post(move || {
            let error = Arc::new(error);
            on_outcome(Outcome::Failure {
                error: Arc::clone(&error),
                is_connect,
            });
            if let Some(hook) = hook {
                hook(&error, is_connect);
            }
        });
        handle
    }

    /// Sends the request, retrying exactly once after a
    /// connection-establishment failure when configured. Multipart bodies
    /// are never replayed.
    pub(crate) async fn send(&self, request: &Request) -> FetchResult<reqwest::Response> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.build_and_send(request).await {
                Err(error)
                    if error.is_connect()
                        && attempt == 1
                        && self.inner.config.retry_on_connection_failure
                        && request.files.is_empty() =>
                {
                    log::debug!("retrying once after connect failure: {}", error);
                }
                other => return other,
            }
        }
    }

    async fn build_and_send(&self, request: &Request) -> FetchResult<reqwest::Response> {
        let started = Instant::now();
        let mut meters = Vec::new();

        let mut builder = if request.files.is_empty() {
            match request.method {
                Method::Get => self
                    .inner
                    .http
                    .get(util::format_get(&request.url, &request.params)),
                Method::Post => self.inner.http.post(&request.url).form(&request.params),
            }
        } else {
            // File attachments always go out as a multipart POST.
            let parts = upload::multipart_form(self, request).await?;
            meters = parts.meters;
            self.inner.http.post(&request.url).multipart(parts.form)
        };

        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if request.resumable && request.range_end != 0 {
            builder = builder.header(
                "RANGE",
                format!("bytes={}-{}", request.range_start, request.range_end),
            );
        }

        log::debug!("---- {} {}", request.method.as_str(), request.url);
        let response = builder.send().await?;
        log::debug!(
            "---- response {} in {} ms",
            response.status(),
            started.elapsed().as_millis()
        );

        for meter in meters {
            if let Ok(mut meter) = meter.lock() {
                if let Some(event) = meter.finish() {
                    self.post_progress(&request.callbacks, event);
                }
            }
        }
        Ok(response)
    }

    /// Failure finalization: remove the task, gate on liveness, then post
    /// one job invoking the per-request callback, the global failure hook
    /// and `Ended`, in that order
    pub(crate) fn finish_failure<T, F>(
        &self,
        key: &str,
        callbacks: &Arc<Callbacks>,
        error: FetchError,
        on_outcome: F,
    ) where
        T: Send + 'static,
        F: FnOnce(Outcome<T>) + Send + 'static,
    {
        self.inner.registry.remove(key);
        if !callbacks.is_alive() {
            log::debug!("binder retired, dropping failure: {}", error);
            return;
        }
        let is_connect = error.is_connect();
        let hook = self.inner.config.on_failure.clone();
        let callbacks = Arc::clone(callbacks);
        self.inner.dispatcher.post(move || {
            let error = Arc::new(error);
            on_outcome(Outcome::Failure {
                error: Arc::clone(&error),
                is_connect,
            });
            if let Some(hook) = hook {
                hook(&error, is_connect);
            }
            callbacks.emit(Lifecycle::Ended);
        });
    }

    /// Success finalization: remove the task, read the body under the
    /// size guard, run the raw-response hook, gate on liveness, then post
    /// one job applying duplicate suppression, decoding and callbacks
    async fn finish_success<T, D, F>(
        &self,
        key: &str,
        request: &Request,
        response: reqwest::Response,
        decode: D,
        on_outcome: F,
    ) where
        T: Send + 'static,
        D: FnOnce(&str) -> Result<T, serde_json::Error> + Send + 'static,
        F: FnOnce(Outcome<T>) + Send + 'static,
    {
        self.inner.registry.remove(key);

        let body = match read_body_guarded(response, self.inner.config.max_body_bytes).await {
            Ok(body) => body,
            Err(error) => {
                return self.finish_failure(key, &request.callbacks, error, on_outcome);
            }
        };

        // The raw-response hook sees every body, even for retired owners.
        if let Some(hook) = &self.inner.config.on_response {
            hook(&body);
        }

        if !request.callbacks.is_alive() {
            log::debug!("binder retired, dropping response for {}", request.url);
            return;
        }

        let inner = Arc::clone(&self.inner);
        let callbacks = Arc::clone(&request.callbacks);
        let url = request.url.clone();
        let suppress = request.ignore_duplicate_body;
        self.inner.dispatcher.post(move || {
            if suppress {
                let mut last = inner
                    .last_bodies
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                if last.get(&url).is_some_and(|previous| *previous == body) {
                    log::debug!("ignoring duplicate body for {}", url);
                    callbacks.emit(Lifecycle::Ended);
                    return;
                }
                last.insert(url, body.clone());
            }
            match decode(&body) {
                Ok(value) => on_outcome(Outcome::Success(value)),
                Err(error) => on_outcome(Outcome::Parse { body, error }),
            }
            callbacks.emit(Lifecycle::Ended);
        });
    }
}

/// Reads the body as text, substituting a diagnostic placeholder instead
/// of buffering bodies beyond the configured cap
async fn read_body_guarded(response: reqwest::Response, cap: u64) -> FetchResult<String> {
    if let Some(len) = response.content_length() {
        if len > cap {
            return Ok(oversize_placeholder(len));
        }
    }
    let bytes = response.bytes().await?;
    if bytes.len() as u64 > cap {
        return Ok(oversize_placeholder(bytes.len() as u64));
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn oversize_placeholder(len: u64) -> String {
    format!("response body too large: {} bytes", len)
}
