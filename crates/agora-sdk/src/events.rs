//! Local event fan-out
//!
//! Same-process "this subject changed" notifications keyed by a plain string,
//! normally the path of a rated object. Events carry no payload: listeners
//! re-read authoritative state from the resource API when notified.

use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

type Callback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    listeners: DashMap<String, Vec<(u64, Callback)>>,
}

impl Registry {
    fn remove(&self, key: &str, id: u64) {
        let now_empty = match self.listeners.get_mut(key) {
            Some(mut entry) => {
                entry.retain(|(listener, _)| *listener != id);
                entry.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.listeners.remove_if(key, |_, listeners| listeners.is_empty());
        }
    }
}

/// Keyed registry of payload-free callbacks.
///
/// Clones share the registry. One instance is owned by the application root
/// and handed to every component that publishes or listens.
#[derive(Clone, Default)]
pub struct EventManager {
    registry: Arc<Registry>,
}

impl fmt::Debug for EventManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventManager")
            .field("keys", &self.registry.listeners.len())
            .finish()
    }
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `key`. The callback stays registered until
    /// the returned [`Subscription`] is dropped or turned off.
    pub fn on<F>(&self, key: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let key = key.into();
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .listeners
            .entry(key.clone())
            .or_default()
            .push((id, Arc::new(callback)));

        Subscription {
            registry: Arc::downgrade(&self.registry),
            key,
            id,
        }
    }

    /// Call every callback registered for `key`, synchronously and in
    /// registration order.
    pub fn trigger(&self, key: &str) {
        self.fire(key, None);
    }

    /// Like [`trigger`](Self::trigger), skipping the callback of `origin`.
    ///
    /// Used by a component that has already refreshed itself and only needs
    /// to notify its siblings.
    pub fn trigger_others(&self, key: &str, origin: &Subscription) {
        self.fire(key, Some(origin.id));
    }

    fn fire(&self, key: &str, skip: Option<u64>) {
        // Snapshot first so callbacks may (un)register without deadlocking
        let callbacks: Vec<Callback> = match self.registry.listeners.get(key) {
            Some(entry) => entry
                .iter()
                .filter(|(id, _)| Some(*id) != skip)
                .map(|(_, cb)| Arc::clone(cb))
                .collect(),
            None => return,
        };

        trace!(key, listeners = callbacks.len(), "trigger");
        for callback in callbacks {
            callback();
        }
    }

    /// Number of callbacks currently registered for `key`
    pub fn listeners(&self, key: &str) -> usize {
        self.registry
            .listeners
            .get(key)
            .map(|entry| entry.len())
            .unwrap_or(0)
    }
}

/// Registration handle returned by [`EventManager::on`]; unregisters on drop
pub struct Subscription {
    registry: Weak<Registry>,
    key: String,
    id: u64,
}

impl Subscription {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Unregister now
    pub fn off(self) {}
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.key, self.id);
        }
    }
}
