use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use tracing::warn;

/// One mutex per cache entry digest.
///
/// Entries for unrelated sources never contend; two requests for the same
/// stale source serialise over check, regenerate, write and mtime sync.
#[derive(Debug, Default)]
pub(crate) struct KeyedLocks {
    slots: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Handle to the mutex guarding `key`, created on first use.
    pub(crate) fn slot(&self, key: &str) -> Arc<Mutex<()>> {
        if let Some(existing) = self.slots.get(key) {
            return Arc::clone(existing.value());
        }
        Arc::clone(self.slots.entry(key.to_string()).or_default().value())
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}

pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                op,
                target_module = target,
                lock_kind = "mutex.lock",
                result = "poisoned_recovered",
                hint = "entry may be regenerated again after panic in another thread",
                "Recovered from poisoned cache entry lock"
            );
            poisoned.into_inner()
        }
    }
}
