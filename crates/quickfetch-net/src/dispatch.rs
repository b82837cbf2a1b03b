// crates/quickfetch-net/src/dispatch.rs
//! Serial callback executor and the request outcome type

use crate::error::FetchError;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Lifecycle events surrounding a single request.
///
/// `Started` is delivered synchronously at the terminal builder call,
/// before the transport call is issued. `Ended` always follows the
/// outcome (or the duplicate-body suppression) on the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Started,
    Ended,
}

/// Final result of a request, delivered through a single callback.
///
/// Parse failures are a distinct arm rather than a `Failure`: the body
/// arrived intact, it just did not decode into the requested type.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The decoded (or raw) response value
    Success(T),
    /// Transport or IO failure; `is_connect` marks connection-establishment
    /// failures specifically
    Failure {
        error: Arc<FetchError>,
        is_connect: bool,
    },
    /// The body was received but failed to decode
    Parse {
        body: String,
        error: serde_json::Error,
    },
}

impl<T> Outcome<T> {
    /// Returns true for the `Success` arm
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Serial executor for completion callbacks.
///
/// All outcome, progress and end-of-lifecycle callbacks are posted here
/// and run one at a time on a single task, in posting order. This is the
/// stand-in for a main-thread message queue: callback code never runs on
/// the worker that produced the result, and never concurrently with
/// another callback.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Job>,
}

impl Dispatcher {
    /// Spawns the draining task. Must be called within a Tokio runtime.
    pub(crate) fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job();
            }
            log::trace!("dispatcher drained and shut down");
        });
        Self { tx }
    }

    /// Posts a job onto the serial queue. Jobs posted after the owning
    /// service is dropped are silently discarded.
    pub(crate) fn post(&self, job: impl FnOnce() + Send + 'static) {
        let _ = self.tx.send(Box::new(job));
    }
}
