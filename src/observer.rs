//! Observability hooks for resolution and disposal events.
//!
//! Observers are the only side channel of the container: errors are
//! always returned to the caller, never swallowed, and observers merely
//! see them pass by. Calls are made synchronously during resolution, so
//! implementations should stay lightweight.

use std::sync::Arc;
use std::time::Duration;

use crate::error::DiError;
use crate::key::Key;

/// Observer of container events.
///
/// All methods default to no-ops, so implementations only override what
/// they care about.
///
/// # Examples
///
/// ```rust
/// use armature_di::{ContainerObserver, Key, Lifetime, Resolver, ServiceCollection};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// #[derive(Default)]
/// struct Counter(AtomicUsize);
///
/// impl ContainerObserver for Counter {
///     fn on_resolved(&self, _key: &Key, _duration: Duration) {
///         self.0.fetch_add(1, Ordering::Relaxed);
///     }
/// }
///
/// struct Config;
///
/// let counter = Arc::new(Counter::default());
/// let mut services = ServiceCollection::new();
/// services.observe(counter.clone());
/// services.add(Lifetime::Transient, || Config);
///
/// let container = services.build().unwrap();
/// container.get::<Config>().unwrap();
/// assert_eq!(counter.0.load(Ordering::Relaxed), 1);
/// ```
pub trait ContainerObserver: Send + Sync {
    /// A service resolved successfully.
    fn on_resolved(&self, key: &Key, duration: Duration) {
        let _ = (key, duration);
    }

    /// A resolution failed.
    fn on_error(&self, key: &Key, error: &DiError) {
        let _ = (key, error);
    }

    /// A tracked instance was disposed; `error` is `None` on success.
    fn on_dispose(&self, key: &Key, error: Option<&(dyn std::error::Error + Send + Sync)>) {
        let _ = (key, error);
    }
}

/// Fan-out over the registered observers.
#[derive(Default, Clone)]
pub(crate) struct Observers {
    list: Vec<Arc<dyn ContainerObserver>>,
}

impl Observers {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, observer: Arc<dyn ContainerObserver>) {
        self.list.push(observer);
    }

    pub(crate) fn has_observers(&self) -> bool {
        !self.list.is_empty()
    }

    pub(crate) fn resolved(&self, key: &Key, duration: Duration) {
        for observer in &self.list {
            observer.on_resolved(key, duration);
        }
    }

    pub(crate) fn error(&self, key: &Key, error: &DiError) {
        for observer in &self.list {
            observer.on_error(key, error);
        }
    }

    pub(crate) fn dispose(
        &self,
        key: &Key,
        error: Option<&(dyn std::error::Error + Send + Sync)>,
    ) {
        for observer in &self.list {
            observer.on_dispose(key, error);
        }
    }
}

/// Observer that forwards events to [`tracing`].
///
/// Resolutions log at `debug`, failures and failed disposals at `warn`.
pub struct TracingObserver;

impl ContainerObserver for TracingObserver {
    fn on_resolved(&self, key: &Key, duration: Duration) {
        tracing::debug!(service = %key, ?duration, "service resolved");
    }

    fn on_error(&self, key: &Key, error: &DiError) {
        tracing::warn!(service = %key, %error, "service resolution failed");
    }

    fn on_dispose(&self, key: &Key, error: Option<&(dyn std::error::Error + Send + Sync)>) {
        match error {
            None => tracing::debug!(service = %key, "service disposed"),
            Some(err) => tracing::warn!(service = %key, %err, "service disposal failed"),
        }
    }
}
