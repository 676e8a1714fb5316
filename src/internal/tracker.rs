//! Instance tracking for scope disposal.

use parking_lot::Mutex;

use crate::analyzer::AnyArc;
use crate::error::DisposalFailure;
use crate::key::Key;
use crate::observer::Observers;
use crate::traits::dispose::DisposerFn;

struct TrackedInstance {
    key: Key,
    value: AnyArc,
    disposer: DisposerFn,
}

/// Remembers every disposable instance a scope created, in creation
/// order, so the scope can dispose them in reverse when it closes.
/// Instances without a disposal hook are not tracked; dropping them is
/// enough.
#[derive(Default)]
pub(crate) struct InstanceTracker {
    entries: Mutex<Vec<TrackedInstance>>,
}

impl InstanceTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends an instance to the creation list.
    pub(crate) fn track(&self, key: Key, value: AnyArc, disposer: DisposerFn) {
        self.entries.lock().push(TrackedInstance {
            key,
            value,
            disposer,
        });
    }

    /// Disposes every tracked instance in reverse creation order,
    /// collecting failures. Instances after a failing hook are still
    /// disposed.
    pub(crate) fn dispose_all(&self, observers: &Observers) -> Vec<DisposalFailure> {
        let entries = std::mem::take(&mut *self.entries.lock());
        let mut failures = Vec::new();
        for entry in entries.into_iter().rev() {
            match (entry.disposer)(&entry.value) {
                Ok(()) => observers.dispose(&entry.key, None),
                Err(err) => {
                    observers.dispose(&entry.key, Some(err.as_ref()));
                    failures.push(DisposalFailure {
                        type_name: entry.key.display_name(),
                        source: err,
                    });
                }
            }
        }
        failures
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
