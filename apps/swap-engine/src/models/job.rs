//! Queue job payload.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Order;

/// A unit of work on the swap queue.
///
/// The job identifier equals the order identifier, which is what makes
/// enqueueing idempotent: the queue refuses a second job for an order it
/// is already tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapJob {
    /// Order identifier (doubles as the job identifier).
    pub order_id: String,
    /// Input token identifier.
    pub token_in: String,
    /// Output token identifier.
    pub token_out: String,
    /// Input amount in smallest units.
    pub amount_in: u64,
    /// Slippage tolerance as a fraction.
    pub slippage: Decimal,
    /// Delivery attempt counter, incremented by the queue on each pickup.
    pub attempt: u32,
}

impl SwapJob {
    /// Build the job for a freshly created order.
    #[must_use]
    pub fn for_order(order: &Order) -> Self {
        Self {
            order_id: order.id.clone(),
            token_in: order.token_in.clone(),
            token_out: order.token_out.clone(),
            amount_in: order.amount_in,
            slippage: order.slippage,
            attempt: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewOrder;
    use rust_decimal_macros::dec;

    #[test]
    fn job_mirrors_order_fields() {
        let order = Order::new(NewOrder {
            token_in: "SOL".to_string(),
            token_out: "USDC".to_string(),
            amount_in: 5_000,
            slippage: dec!(0.01),
        });

        let job = SwapJob::for_order(&order);
        assert_eq!(job.order_id, order.id);
        assert_eq!(job.token_in, "SOL");
        assert_eq!(job.token_out, "USDC");
        assert_eq!(job.amount_in, 5_000);
        assert_eq!(job.slippage, dec!(0.01));
        assert_eq!(job.attempt, 0);
    }
}
