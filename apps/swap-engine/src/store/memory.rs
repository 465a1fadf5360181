//! In-memory order store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::error::EngineError;
use crate::models::{NewOrder, Order, OrderPatch, OrderStatus, StatusHistoryEntry};

use super::OrderStore;

/// Order store backed by process memory.
///
/// Holds the order map and the history log behind one lock so a status
/// update and its history append are a single atomic step, matching what
/// a transactional backing store would do.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    inner: RwLock<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
    orders: HashMap<String, Order>,
    history: Vec<StatusHistoryEntry>,
}

impl InMemoryOrderStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of orders held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().orders.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().orders.is_empty()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, fields: NewOrder) -> Result<Order, EngineError> {
        let order = Order::new(fields);

        let mut inner = self.inner.write();
        inner.history.push(StatusHistoryEntry {
            order_id: order.id.clone(),
            status: OrderStatus::Pending,
            timestamp: order.created_at,
            metadata: None,
        });
        inner.orders.insert(order.id.clone(), order.clone());

        Ok(order)
    }

    async fn update_status(
        &self,
        order_id: &str,
        status: OrderStatus,
        patch: OrderPatch,
    ) -> Result<Order, EngineError> {
        let mut inner = self.inner.write();

        let Some(order) = inner.orders.get_mut(order_id) else {
            return Err(EngineError::system(format!(
                "storage: order {order_id} not found"
            ))
            .non_retryable()
            .with_context("order_id", order_id));
        };

        if !order.status.can_transition_to(status) {
            tracing::warn!(
                order_id,
                from = %order.status,
                to = %status,
                "status transition outside the state machine"
            );
        }

        let now = Utc::now();
        order.status = status;
        order.updated_at = now;
        if status == OrderStatus::Confirmed {
            order.confirmed_at = Some(now);
        }

        if let Some(venue) = patch.venue {
            order.venue = Some(venue);
        }
        if let Some(tx_hash) = patch.tx_hash {
            order.tx_hash = Some(tx_hash);
        }
        if let Some(price) = patch.executed_price {
            order.executed_price = Some(price);
        }
        if let Some(amount_in) = patch.executed_amount_in {
            order.executed_amount_in = Some(amount_in);
        }
        if let Some(amount_out) = patch.executed_amount_out {
            order.executed_amount_out = Some(amount_out);
        }
        if let Some(reason) = patch.failure_reason {
            order.failure_reason = Some(reason);
        }

        let updated = order.clone();
        inner.history.push(StatusHistoryEntry {
            order_id: order_id.to_string(),
            status,
            timestamp: now,
            metadata: patch.history_metadata,
        });

        Ok(updated)
    }

    async fn find_by_id(&self, order_id: &str) -> Result<Option<Order>, EngineError> {
        Ok(self.inner.read().orders.get(order_id).cloned())
    }

    async fn find_recent(&self, limit: usize) -> Result<Vec<Order>, EngineError> {
        let inner = self.inner.read();
        let mut orders: Vec<Order> = inner.orders.values().cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders.truncate(limit);
        Ok(orders)
    }

    async fn status_history(
        &self,
        order_id: &str,
    ) -> Result<Vec<StatusHistoryEntry>, EngineError> {
        let inner = self.inner.read();
        Ok(inner
            .history
            .iter()
            .filter(|e| e.order_id == order_id)
            .cloned()
            .collect())
    }
}
