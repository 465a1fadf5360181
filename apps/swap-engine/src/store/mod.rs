//! Order persistence ports and implementations.

mod cache;
mod memory;

use async_trait::async_trait;

use crate::error::EngineError;
use crate::models::{NewOrder, Order, OrderPatch, OrderStatus, StatusHistoryEntry};

pub use cache::OrderCache;
pub use memory::InMemoryOrderStore;

/// Durable record of every order plus its append-only status history.
///
/// The relational substrate behind this port is an external collaborator;
/// implementations must keep the status-history append atomic with the
/// order mutation and maintain `updated_at` on every write.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a fresh order in `Pending` and append its first history
    /// entry.
    ///
    /// # Errors
    ///
    /// `SYSTEM` on backing-store failure.
    async fn create(&self, fields: NewOrder) -> Result<Order, EngineError>;

    /// Apply `status` and the non-`None` fields of `patch`, setting
    /// `confirmed_at` iff the new status is `Confirmed`, and append a
    /// history entry.
    ///
    /// The pipeline worker is the sole writer per order, so illegal
    /// transitions are logged rather than rejected.
    ///
    /// # Errors
    ///
    /// `SYSTEM` when the order does not exist or the backing store fails.
    async fn update_status(
        &self,
        order_id: &str,
        status: OrderStatus,
        patch: OrderPatch,
    ) -> Result<Order, EngineError>;

    /// Look up one order.
    ///
    /// # Errors
    ///
    /// `SYSTEM` on backing-store failure.
    async fn find_by_id(&self, order_id: &str) -> Result<Option<Order>, EngineError>;

    /// Most recent orders, newest first.
    ///
    /// # Errors
    ///
    /// `SYSTEM` on backing-store failure.
    async fn find_recent(&self, limit: usize) -> Result<Vec<Order>, EngineError>;

    /// The order's status history, oldest first.
    ///
    /// # Errors
    ///
    /// `SYSTEM` on backing-store failure.
    async fn status_history(&self, order_id: &str)
    -> Result<Vec<StatusHistoryEntry>, EngineError>;
}
