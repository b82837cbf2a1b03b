// crates/quickfetch-net/src/binder.rs
//! Owner liveness checks for callback gating

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An owning screen (or any other scope) a request can be bound to.
///
/// Completion callbacks are only delivered while the binder reports
/// itself alive; a retired binder silently swallows them. The scope label
/// also prefixes the task-registry key, enabling
/// [`cancel_by_owner`](crate::HttpService::cancel_by_owner).
pub trait Binder: Send + Sync {
    /// Stable label identifying the owner scope
    fn scope(&self) -> &str;

    /// Whether completion callbacks may still be delivered
    fn is_alive(&self) -> bool;
}

/// Shipped [`Binder`] implementation backed by a shared atomic flag.
///
/// A handle mirrors an activity: it is alive until [`retire`](Self::retire)
/// is called. A [`child`](Self::child) mirrors a fragment attached to a
/// host screen: it is alive only while its own flag and every ancestor's
/// flag still hold.
#[derive(Clone)]
pub struct LifecycleHandle {
    scope: String,
    alive: Arc<AtomicBool>,
    parent: Option<Arc<LifecycleHandle>>,
}

impl LifecycleHandle {
    /// Creates a live handle with the given scope label
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            alive: Arc::new(AtomicBool::new(true)),
            parent: None,
        }
    }

    /// Creates a child handle that is alive only while this handle
    /// (and its own ancestors) remain alive
    pub fn child(&self, scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            alive: Arc::new(AtomicBool::new(true)),
            parent: Some(Arc::new(self.clone())),
        }
    }

    /// Marks the owner as gone. Clones of this handle observe the change
    /// immediately; pending callbacks gated on it are dropped.
    pub fn retire(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

impl Binder for LifecycleHandle {
    fn scope(&self) -> &str {
        &self.scope
    }

    fn is_alive(&self) -> bool {
        if !self.alive.load(Ordering::SeqCst) {
            return false;
        }
        match &self.parent {
            Some(parent) => parent.is_alive(),
            None => true,
        }
    }
}
