//! Mock venue adapter for tests and the `mock` venue implementation.
//!
//! Returns deterministic quotes and fills without network calls, with
//! knobs for scripting the failure scenarios the pipeline has to handle:
//! delayed quotes (router timeouts), outright quote failures (circuit
//! breaker trips), and fixed swap outputs (slippage breaches).

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::models::{Quote, SwapParams, SwapResult, Venue};

use super::{VenueAdapter, VenueError};

/// Scriptable in-memory venue.
pub struct MockVenueAdapter {
    venue: Venue,
    price: RwLock<Decimal>,
    fee: RwLock<Decimal>,
    quote_delay: RwLock<Option<Duration>>,
    quote_failures_remaining: AtomicU32,
    swap_failures_remaining: AtomicU32,
    /// Fixed swap output; when unset, swaps fill at the quoted raw price.
    swap_output: RwLock<Option<u64>>,
    swap_counter: AtomicU64,
}

impl MockVenueAdapter {
    /// Create a mock venue with price 1.0 and a 25 bps fee.
    #[must_use]
    pub fn new(venue: Venue) -> Self {
        Self {
            venue,
            price: RwLock::new(Decimal::ONE),
            // 25 bps, a typical pool fee
            fee: RwLock::new(Decimal::new(25, 4)),
            quote_delay: RwLock::new(None),
            quote_failures_remaining: AtomicU32::new(0),
            swap_failures_remaining: AtomicU32::new(0),
            swap_output: RwLock::new(None),
            swap_counter: AtomicU64::new(1),
        }
    }

    /// Set the raw price and proportional fee for future quotes.
    pub fn set_pricing(&self, price: Decimal, fee: Decimal) {
        *self.price.write() = price;
        *self.fee.write() = fee;
    }

    /// Delay every quote by `delay` (drives router timeouts in tests).
    pub fn set_quote_delay(&self, delay: Option<Duration>) {
        *self.quote_delay.write() = delay;
    }

    /// Fail the next `n` quote calls with a network error.
    pub fn fail_next_quotes(&self, n: u32) {
        self.quote_failures_remaining.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` swap calls with a network error.
    pub fn fail_next_swaps(&self, n: u32) {
        self.swap_failures_remaining.store(n, Ordering::SeqCst);
    }

    /// Force every swap to produce exactly `amount_out` units.
    ///
    /// Outputs below the caller's floor surface as slippage breaches,
    /// exactly like a real venue refusing to fill under the minimum.
    pub fn set_swap_output(&self, amount_out: u64) {
        *self.swap_output.write() = Some(amount_out);
    }

    /// Clear a previously scripted swap output.
    pub fn clear_swap_output(&self) {
        *self.swap_output.write() = None;
    }

    fn take_scripted_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl VenueAdapter for MockVenueAdapter {
    fn venue(&self) -> Venue {
        self.venue
    }

    async fn quote(
        &self,
        token_in: &str,
        token_out: &str,
        amount_in: u64,
    ) -> Result<Quote, VenueError> {
        let delay = *self.quote_delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if Self::take_scripted_failure(&self.quote_failures_remaining) {
            return Err(VenueError::Network(format!(
                "{} quote endpoint unavailable",
                self.venue
            )));
        }

        Ok(Quote {
            venue: self.venue,
            amount_in,
            price: *self.price.read(),
            fee: *self.fee.read(),
            pool_id: format!("{}-{token_in}-{token_out}", self.venue),
        })
    }

    async fn swap(&self, params: &SwapParams) -> Result<SwapResult, VenueError> {
        if Self::take_scripted_failure(&self.swap_failures_remaining) {
            return Err(VenueError::Network(format!(
                "{} swap endpoint unavailable",
                self.venue
            )));
        }

        let amount_out = match *self.swap_output.read() {
            Some(fixed) => fixed,
            None => (Decimal::from(params.amount_in) * *self.price.read())
                .floor()
                .to_u64()
                .unwrap_or(0),
        };

        if amount_out < params.min_amount_out {
            return Err(VenueError::SlippageExceeded {
                venue: self.venue,
                received: amount_out,
                minimum: params.min_amount_out,
            });
        }

        let seq = self.swap_counter.fetch_add(1, Ordering::SeqCst);
        let executed_price = if params.amount_in == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(amount_out) / Decimal::from(params.amount_in)
        };
        let fee_amount = (Decimal::from(amount_out) * *self.fee.read())
            .floor()
            .to_u64()
            .unwrap_or(0);

        Ok(SwapResult {
            tx_hash: format!("{}-tx-{seq}", self.venue),
            executed_price,
            amount_in: params.amount_in,
            amount_out,
            fee_amount,
            timestamp: Utc::now(),
        })
    }

    async fn health_check(&self) -> Result<(), VenueError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn params(min_amount_out: u64) -> SwapParams {
        SwapParams {
            venue: Venue::Orca,
            token_in: "SOL".to_string(),
            token_out: "USDC".to_string(),
            amount_in: 1_000_000,
            min_amount_out,
            pool_id: "orca-SOL-USDC".to_string(),
        }
    }

    #[tokio::test]
    async fn quotes_reflect_configured_pricing() {
        let mock = MockVenueAdapter::new(Venue::Orca);
        mock.set_pricing(dec!(1.01), dec!(0.002));

        let quote = mock.quote("SOL", "USDC", 1_000_000).await.unwrap();
        assert_eq!(quote.price, dec!(1.01));
        assert_eq!(quote.fee, dec!(0.002));
        assert_eq!(quote.estimated_output(), dec!(1010000.00));
    }

    #[tokio::test]
    async fn scripted_quote_failures_are_consumed() {
        let mock = MockVenueAdapter::new(Venue::Orca);
        mock.fail_next_quotes(2);

        assert!(mock.quote("SOL", "USDC", 1).await.is_err());
        assert!(mock.quote("SOL", "USDC", 1).await.is_err());
        assert!(mock.quote("SOL", "USDC", 1).await.is_ok());
    }

    #[tokio::test]
    async fn default_swap_fills_at_quoted_price() {
        let mock = MockVenueAdapter::new(Venue::Orca);
        mock.set_pricing(dec!(1.01), dec!(0.002));

        let result = mock.swap(&params(999_900)).await.unwrap();
        assert_eq!(result.amount_out, 1_010_000);
        assert!(result.amount_out >= 999_900);
        assert_eq!(result.amount_in, 1_000_000);
    }

    #[tokio::test]
    async fn scripted_output_below_floor_breaches_slippage() {
        let mock = MockVenueAdapter::new(Venue::Orca);
        mock.set_swap_output(999_000);

        let err = mock.swap(&params(999_900)).await.unwrap_err();
        match err {
            VenueError::SlippageExceeded {
                venue,
                received,
                minimum,
            } => {
                assert_eq!(venue, Venue::Orca);
                assert_eq!(received, 999_000);
                assert_eq!(minimum, 999_900);
            }
            other => panic!("expected slippage error, got {other}"),
        }
    }

    #[tokio::test]
    async fn tx_hashes_are_sequential_per_venue() {
        let mock = MockVenueAdapter::new(Venue::Raydium);
        let r1 = mock.swap(&params(0)).await.unwrap();
        let r2 = mock.swap(&params(0)).await.unwrap();
        assert_eq!(r1.tx_hash, "raydium-tx-1");
        assert_eq!(r2.tx_hash, "raydium-tx-2");
    }
}
