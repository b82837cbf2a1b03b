// crates/quickfetch-net/src/lib.rs
//! Fluent convenience layer over reqwest: GET/POST builders, multipart
//! uploads and resumable downloads with throttled progress, plus
//! lifecycle-aware cancellation of in-flight tasks.

mod binder;
mod config;
mod dispatch;
mod download;
mod error;
mod progress;
mod registry;
mod request;
mod service;
mod upload;
mod util;

pub use binder::{Binder, LifecycleHandle};
pub use config::{BeforeRequestHook, FailureHook, ResponseHook, ServiceConfig};
pub use dispatch::{Lifecycle, Outcome};
pub use error::{FetchError, FetchResult};
pub use progress::{ProgressMeter, TransferProgress};
pub use registry::{TaskHandle, TaskRegistry};
pub use request::{Method, Request, RequestBuilder};
pub use service::HttpService;
