//! Order lifecycle types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Venue;

/// Order status in the processing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Accepted by the submission endpoint, waiting for a worker.
    Pending,
    /// A worker is acquiring quotes from the venues.
    Routing,
    /// A venue has been chosen; the swap is being prepared.
    Building,
    /// The swap was handed to the venue adapter.
    Submitted,
    /// The swap executed and the output met the slippage floor.
    Confirmed,
    /// Processing ended without a confirmed swap.
    Failed,
}

impl OrderStatus {
    /// Returns true for statuses that end the pipeline.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }

    /// Returns true if the order is still moving through the pipeline.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// `Failed` is reachable from any non-terminal state; the forward
    /// path is strictly `Pending -> Routing -> Building -> Submitted ->
    /// Confirmed`.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        match (self, next) {
            (Self::Pending, Self::Routing)
            | (Self::Routing, Self::Building)
            | (Self::Building, Self::Submitted)
            | (Self::Submitted, Self::Confirmed) => true,
            (from, Self::Failed) => from.is_active(),
            _ => false,
        }
    }

    /// Status tag for logging and wire messages.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Routing => "routing",
            Self::Building => "building",
            Self::Submitted => "submitted",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fields supplied by the submission endpoint when creating an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    /// Input token identifier.
    pub token_in: String,
    /// Output token identifier.
    pub token_out: String,
    /// Input amount in smallest units.
    pub amount_in: u64,
    /// Slippage tolerance, already defaulted and clamped by the endpoint.
    pub slippage: Decimal,
}

/// A swap order and everything learned about it so far.
///
/// Nullable fields fill in as the pipeline advances: `venue` after
/// routing, `tx_hash` after submission, the executed fields and
/// `confirmed_at` after confirmation, `failure_reason` on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Unique order identifier (also the queue job identifier).
    pub id: String,
    /// Input token identifier.
    pub token_in: String,
    /// Output token identifier.
    pub token_out: String,
    /// Input amount in smallest units.
    pub amount_in: u64,
    /// Slippage tolerance as a fraction.
    pub slippage: Decimal,
    /// Current pipeline status.
    pub status: OrderStatus,
    /// Venue chosen by the router.
    pub venue: Option<Venue>,
    /// Transaction identifier returned by the venue.
    pub tx_hash: Option<String>,
    /// Realized price in output units per input unit.
    pub executed_price: Option<Decimal>,
    /// Input amount actually consumed.
    pub executed_amount_in: Option<u64>,
    /// Output amount actually produced.
    pub executed_amount_out: Option<u64>,
    /// Why the order failed, when it did.
    pub failure_reason: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Confirmation timestamp, set iff the order confirmed.
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Create a fresh `Pending` order with a generated identifier.
    #[must_use]
    pub fn new(fields: NewOrder) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            token_in: fields.token_in,
            token_out: fields.token_out,
            amount_in: fields.amount_in,
            slippage: fields.slippage,
            status: OrderStatus::Pending,
            venue: None,
            tx_hash: None,
            executed_price: None,
            executed_amount_in: None,
            executed_amount_out: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            confirmed_at: None,
        }
    }
}

/// Partial update applied alongside a status transition.
#[derive(Debug, Clone, Default)]
pub struct OrderPatch {
    /// Chosen venue (set when entering `Building`).
    pub venue: Option<Venue>,
    /// Transaction identifier (set when entering `Submitted`).
    pub tx_hash: Option<String>,
    /// Realized price (set when entering `Confirmed`).
    pub executed_price: Option<Decimal>,
    /// Realized input amount.
    pub executed_amount_in: Option<u64>,
    /// Realized output amount.
    pub executed_amount_out: Option<u64>,
    /// Failure reason (set when entering `Failed`).
    pub failure_reason: Option<String>,
    /// Structured payload recorded on the status-history entry.
    pub history_metadata: Option<serde_json::Value>,
}

/// One row of the append-only status-history log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
    /// Order this entry belongs to.
    pub order_id: String,
    /// Status entered at `timestamp`.
    pub status: OrderStatus,
    /// When the transition was recorded.
    pub timestamp: DateTime<Utc>,
    /// Optional structured payload (e.g. the routing decision).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}
