//! Low-latency cache of in-flight orders.
//!
//! Advisory only: readers must treat a hit as a hint and the store as the
//! source of truth for status. Entries expire after a TTL and are removed
//! eagerly when an order reaches a terminal status.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::models::Order;

#[derive(Debug, Clone)]
struct CacheEntry {
    order: Order,
    expires_at: Instant,
}

/// TTL key-value view of recent order state.
#[derive(Debug)]
pub struct OrderCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
}

impl OrderCache {
    /// Create a cache whose entries live `default_ttl` unless overridden.
    #[must_use]
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Insert or replace the entry for `order`, with an optional TTL
    /// override.
    pub fn set(&self, order: Order, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let entry = CacheEntry {
            expires_at: Instant::now() + ttl,
            order,
        };
        self.entries.write().insert(entry.order.id.clone(), entry);
    }

    /// Fetch an unexpired entry. Expired entries are dropped on read.
    #[must_use]
    pub fn get(&self, order_id: &str) -> Option<Order> {
        let expired = {
            let entries = self.entries.read();
            match entries.get(order_id) {
                None => return None,
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Some(entry.order.clone());
                }
                Some(_) => true,
            }
        };

        if expired {
            self.entries.write().remove(order_id);
        }
        None
    }

    /// Remove an entry. Removing an absent key is a no-op.
    pub fn delete(&self, order_id: &str) {
        self.entries.write().remove(order_id);
    }

    /// Whether an unexpired entry exists.
    #[must_use]
    pub fn exists(&self, order_id: &str) -> bool {
        self.get(order_id).is_some()
    }

    /// Reset the TTL of an existing entry; returns false when absent or
    /// already expired.
    pub fn refresh_ttl(&self, order_id: &str, ttl: Duration) -> bool {
        let mut entries = self.entries.write();
        match entries.get_mut(order_id) {
            Some(entry) if entry.expires_at > Instant::now() => {
                entry.expires_at = Instant::now() + ttl;
                true
            }
            _ => false,
        }
    }

    /// Number of entries currently held, including not-yet-swept expired
    /// ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewOrder;
    use rust_decimal_macros::dec;

    fn order() -> Order {
        Order::new(NewOrder {
            token_in: "SOL".to_string(),
            token_out: "USDC".to_string(),
            amount_in: 1_000,
            slippage: dec!(0.01),
        })
    }

    #[test]
    fn set_and_get() {
        let cache = OrderCache::new(Duration::from_secs(60));
        let order = order();
        let id = order.id.clone();

        cache.set(order, None);

        assert!(cache.exists(&id));
        assert_eq!(cache.get(&id).unwrap().id, id);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = OrderCache::new(Duration::from_millis(10));
        let order = order();
        let id = order.id.clone();
        cache.set(order, None);

        std::thread::sleep(Duration::from_millis(20));

        assert!(cache.get(&id).is_none());
        assert!(!cache.exists(&id));
        // The expired entry was swept on read.
        assert!(cache.is_empty());
    }

    #[test]
    fn per_entry_ttl_overrides_default() {
        let cache = OrderCache::new(Duration::from_millis(5));
        let order = order();
        let id = order.id.clone();
        cache.set(order, Some(Duration::from_secs(60)));

        std::thread::sleep(Duration::from_millis(10));

        assert!(cache.exists(&id));
    }

    #[test]
    fn delete_is_idempotent() {
        let cache = OrderCache::new(Duration::from_secs(60));
        let order = order();
        let id = order.id.clone();
        cache.set(order, None);

        cache.delete(&id);
        cache.delete(&id);

        assert!(!cache.exists(&id));
    }

    #[test]
    fn refresh_ttl_extends_life() {
        let cache = OrderCache::new(Duration::from_millis(30));
        let order = order();
        let id = order.id.clone();
        cache.set(order, None);

        std::thread::sleep(Duration::from_millis(15));
        assert!(cache.refresh_ttl(&id, Duration::from_secs(60)));
        std::thread::sleep(Duration::from_millis(30));

        assert!(cache.exists(&id));
    }

    #[test]
    fn refresh_ttl_on_missing_entry_fails() {
        let cache = OrderCache::new(Duration::from_secs(60));
        assert!(!cache.refresh_ttl("missing", Duration::from_secs(1)));
    }
}
