//! Rate item bookkeeping shared by all widgets of one client

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Per (subject, object) slot holding the path of the rate item once known.
///
/// Creating a rate item happens while holding the slot, so concurrent casts
/// from several widgets on the same object create at most one item.
pub type RateItemSlot = Arc<Mutex<Option<String>>>;

#[derive(Debug, Default)]
pub struct RateItemRegistry {
    slots: DashMap<(String, String), RateItemSlot>,
}

impl RateItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot for `subject` rating `object`
    pub fn slot(&self, subject: &str, object: &str) -> RateItemSlot {
        self.slots
            .entry((subject.to_string(), object.to_string()))
            .or_default()
            .clone()
    }

    /// Record an item found by a lookup, unless a creation holds the slot
    pub fn remember(&self, subject: &str, object: &str, item_path: &str) {
        let slot = self.slot(subject, object);
        let Ok(mut known) = slot.try_lock() else {
            return;
        };
        if known.is_none() {
            *known = Some(item_path.to_string());
        }
    }

    /// Forget every item, e.g. after the user changed
    pub fn clear(&self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn item_in(registry: &RateItemRegistry, subject: &str, object: &str) -> Option<String> {
        let slot = registry.slot(subject, object);
        let item = slot.lock().await.clone();
        item
    }

    #[tokio::test]
    async fn test_slot_shared_per_pair() {
        let registry = RateItemRegistry::new();
        let a = registry.slot("/u/1/", "/p/1/");
        let b = registry.slot("/u/1/", "/p/1/");
        let other = registry.slot("/u/2/", "/p/1/");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &other));

        *a.lock().await = Some("/rates/rate_0000000/".into());
        assert_eq!(
            item_in(&registry, "/u/1/", "/p/1/").await.as_deref(),
            Some("/rates/rate_0000000/")
        );
        assert_eq!(item_in(&registry, "/u/2/", "/p/1/").await, None);
    }

    #[tokio::test]
    async fn test_remember_does_not_override() {
        let registry = RateItemRegistry::new();
        registry.remember("/u/1/", "/p/1/", "/rates/rate_0000003/");
        registry.remember("/u/1/", "/p/1/", "/rates/rate_0000007/");
        assert_eq!(
            item_in(&registry, "/u/1/", "/p/1/").await.as_deref(),
            Some("/rates/rate_0000003/")
        );

        registry.clear();
        assert_eq!(item_in(&registry, "/u/1/", "/p/1/").await, None);
    }

    #[tokio::test]
    async fn test_remember_skips_slot_under_creation() {
        let registry = RateItemRegistry::new();
        let slot = registry.slot("/u/1/", "/p/1/");
        let mut creating = slot.lock().await;

        registry.remember("/u/1/", "/p/1/", "/rates/rate_0000003/");
        assert!(creating.is_none());

        *creating = Some("/rates/rate_0000004/".into());
        drop(creating);
        assert_eq!(
            item_in(&registry, "/u/1/", "/p/1/").await.as_deref(),
            Some("/rates/rate_0000004/")
        );
    }
}
