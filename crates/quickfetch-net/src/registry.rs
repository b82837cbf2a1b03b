// crates/quickfetch-net/src/registry.rs
//! In-flight task bookkeeping and cancellation

use std::collections::HashMap;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Handle to one in-flight request.
///
/// Cloning is cheap; every clone controls the same underlying task.
/// Cancelling a handle whose task already finished is a no-op.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    token: CancellationToken,
    tag: Option<String>,
}

impl TaskHandle {
    pub(crate) fn new(tag: Option<String>) -> Self {
        Self {
            token: CancellationToken::new(),
            tag,
        }
    }

    /// Requests cooperative cancellation of the task
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The cancellation tag supplied at build time, if any
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub(crate) async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

/// Mutex-guarded map from derived request key to its in-flight handle.
///
/// The map is mutated from worker completion paths and from cancellation
/// calls alike; all access goes through these methods. At most one entry
/// exists per key, and a duplicate key silently replaces the prior handle.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<String, TaskHandle>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, TaskHandle>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Inserts or overwrites the handle for a key
    pub fn register(&self, key: impl Into<String>, handle: TaskHandle) {
        self.lock().insert(key.into(), handle);
    }

    /// Removes the entry for a key; absent keys are a no-op
    pub fn remove(&self, key: &str) {
        self.lock().remove(key);
    }

    /// Cancels and removes at most one entry carrying the given tag.
    /// Returns whether a cancellation occurred. An empty tag never matches.
    pub fn cancel_by_tag(&self, tag: &str) -> bool {
        if tag.is_empty() {
            return false;
        }
        let mut tasks = self.lock();
        let key = tasks.iter().find_map(|(key, handle)| {
            (handle.tag() == Some(tag) && !handle.is_cancelled()).then(|| key.clone())
        });
        match key {
            Some(key) => {
                if let Some(handle) = tasks.remove(&key) {
                    handle.cancel();
                }
                true
            }
            None => false,
        }
    }

    /// Cancels every entry whose key starts with the owner scope label.
    ///
    /// Entries stay in the map; their workers remove them as the
    /// cancellation lands. This mirrors the historical behavior of the
    /// tag path removing eagerly while the owner path does not.
    pub fn cancel_by_owner(&self, scope: &str) {
        if scope.is_empty() {
            return;
        }
        for (key, handle) in self.lock().iter() {
            if key.starts_with(scope) && !handle.is_cancelled() {
                handle.cancel();
            }
        }
    }

    /// Cancels every non-cancelled entry and clears the map
    pub fn cancel_all(&self) {
        let mut tasks = self.lock();
        for handle in tasks.values() {
            if !handle.is_cancelled() {
                handle.cancel();
            }
        }
        tasks.clear();
    }

    /// Whether any tracked task carries the given tag
    pub fn contains_tag(&self, tag: &str) -> bool {
        self.lock().values().any(|h| h.tag() == Some(tag))
    }

    /// Number of tracked tasks
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the registry tracks no tasks
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
