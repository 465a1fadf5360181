//! Quote routing across venues.
//!
//! Fans a quote request out to every venue concurrently, tolerates
//! partial failure, and picks the quote with the greatest effective
//! price. Routing fails only when no venue answers.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use rust_decimal::Decimal;

use crate::error::EngineError;
use crate::models::{Quote, Venue};
use crate::venue::{GuardedVenue, VenueRegistry};

/// Sentinel identifier clients may use for the native token.
pub const NATIVE_TOKEN: &str = "SOL";

/// Canonical mint of the wrapped native token.
pub const WRAPPED_NATIVE_MINT: &str = "So11111111111111111111111111111111111111112";

/// Rewrite the native-token sentinel to its wrapped mint.
#[must_use]
pub fn rewrite_native_token(token: &str) -> &str {
    if token == NATIVE_TOKEN {
        WRAPPED_NATIVE_MINT
    } else {
        token
    }
}

/// Routes quote requests and selects the best venue.
#[derive(Clone)]
pub struct QuoteRouter {
    registry: VenueRegistry,
    quote_timeout: Duration,
}

impl QuoteRouter {
    /// Create a router over `registry` with a per-venue quote timeout.
    #[must_use]
    pub const fn new(registry: VenueRegistry, quote_timeout: Duration) -> Self {
        Self {
            registry,
            quote_timeout,
        }
    }

    /// Request quotes from all venues concurrently.
    ///
    /// Venues that fail or exceed `quote_timeout` are dropped with a
    /// warning; the surviving quotes come back in venue preference
    /// order.
    ///
    /// # Errors
    ///
    /// `ROUTING` when every venue failed or timed out.
    pub async fn get_quotes(
        &self,
        token_in: &str,
        token_out: &str,
        amount_in: u64,
    ) -> Result<Vec<Quote>, EngineError> {
        let token_in = rewrite_native_token(token_in);
        let token_out = rewrite_native_token(token_out);

        let calls = self.registry.all().iter().map(|venue| {
            let venue = Arc::clone(venue);
            async move { Self::quote_one(&venue, token_in, token_out, amount_in, self.quote_timeout).await }
        });

        let quotes: Vec<Quote> = join_all(calls).await.into_iter().flatten().collect();

        if quotes.is_empty() {
            return Err(EngineError::routing(format!(
                "all venues failed to quote {token_in}/{token_out}"
            ))
            .with_context("token_in", token_in)
            .with_context("token_out", token_out)
            .with_context("amount_in", amount_in.to_string()));
        }

        Ok(quotes)
    }

    /// Pick the quote with the strictly greatest effective price.
    ///
    /// Ties go to the earlier venue in the configured order.
    ///
    /// # Errors
    ///
    /// `ROUTING` when `quotes` is empty.
    pub fn select_best(&self, quotes: &[Quote]) -> Result<Quote, EngineError> {
        fn rank(venue: Venue) -> usize {
            Venue::ORDER
                .iter()
                .position(|&v| v == venue)
                .unwrap_or(usize::MAX)
        }

        let mut best: Option<&Quote> = None;
        for quote in quotes {
            let better = match best {
                None => true,
                Some(current) => {
                    quote.effective_price() > current.effective_price()
                        || (quote.effective_price() == current.effective_price()
                            && rank(quote.venue) < rank(current.venue))
                }
            };
            if better {
                best = Some(quote);
            }
        }

        let Some(winner) = best else {
            return Err(EngineError::routing("no quotes available to select from"));
        };

        self.log_comparison(quotes, winner);
        Ok(winner.clone())
    }

    async fn quote_one(
        venue: &GuardedVenue,
        token_in: &str,
        token_out: &str,
        amount_in: u64,
        quote_timeout: Duration,
    ) -> Option<Quote> {
        let started = std::time::Instant::now();
        let outcome =
            tokio::time::timeout(quote_timeout, venue.quote(token_in, token_out, amount_in)).await;
        crate::metrics::record_quote_latency(venue.venue(), started.elapsed());

        match outcome {
            Ok(Ok(quote)) => {
                tracing::debug!(
                    venue = %quote.venue,
                    price = %quote.price,
                    fee = %quote.fee,
                    "quote received"
                );
                Some(quote)
            }
            Ok(Err(err)) => {
                tracing::warn!(
                    venue = %venue.venue(),
                    error = %err,
                    "venue dropped from routing: quote failed"
                );
                None
            }
            Err(_) => {
                tracing::warn!(
                    venue = %venue.venue(),
                    timeout_ms = quote_timeout.as_millis() as u64,
                    "venue dropped from routing: quote timed out"
                );
                None
            }
        }
    }

    /// Log the full comparison behind a routing decision.
    fn log_comparison(&self, quotes: &[Quote], winner: &Quote) {
        let field = |venue: Venue| -> String {
            quotes
                .iter()
                .find(|q| q.venue == venue)
                .map_or_else(
                    || "unavailable".to_string(),
                    |q| {
                        format!(
                            "price={} fee={} effective={} estimated_out={}",
                            q.price,
                            q.fee,
                            q.effective_price(),
                            q.estimated_output()
                        )
                    },
                )
        };

        let runner_up: Option<Decimal> = quotes
            .iter()
            .filter(|q| q.venue != winner.venue)
            .map(Quote::effective_price)
            .max();
        let edge = runner_up.map(|p| winner.effective_price() - p);

        tracing::info!(
            orca = %field(Venue::Orca),
            raydium = %field(Venue::Raydium),
            winner = %winner.venue,
            winner_effective = %winner.effective_price(),
            edge = %edge.map_or_else(|| "n/a".to_string(), |e| e.to_string()),
            "venue comparison complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::CircuitBreakerConfig;
    use crate::venue::MockVenueAdapter;
    use rust_decimal_macros::dec;

    fn router_with_mocks() -> (QuoteRouter, Arc<MockVenueAdapter>, Arc<MockVenueAdapter>) {
        let orca = Arc::new(MockVenueAdapter::new(Venue::Orca));
        let raydium = Arc::new(MockVenueAdapter::new(Venue::Raydium));
        let registry = VenueRegistry::new(
            vec![orca.clone(), raydium.clone()],
            &CircuitBreakerConfig::default(),
        );
        (
            QuoteRouter::new(registry, Duration::from_millis(100)),
            orca,
            raydium,
        )
    }

    #[test]
    fn native_sentinel_is_rewritten() {
        assert_eq!(rewrite_native_token("SOL"), WRAPPED_NATIVE_MINT);
        assert_eq!(rewrite_native_token("USDC"), "USDC");
        assert_eq!(rewrite_native_token(WRAPPED_NATIVE_MINT), WRAPPED_NATIVE_MINT);
    }

    #[tokio::test]
    async fn collects_quotes_from_both_venues() {
        let (router, orca, raydium) = router_with_mocks();
        orca.set_pricing(dec!(1.00), dec!(0.0025));
        raydium.set_pricing(dec!(1.01), dec!(0.002));

        let quotes = router.get_quotes("SOL", "USDC", 1_000_000).await.unwrap();
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].venue, Venue::Orca);
        assert_eq!(quotes[1].venue, Venue::Raydium);
    }

    #[tokio::test]
    async fn timed_out_venue_is_dropped() {
        let (router, orca, _raydium) = router_with_mocks();
        orca.set_quote_delay(Some(Duration::from_secs(5)));

        let quotes = router.get_quotes("SOL", "USDC", 1_000_000).await.unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].venue, Venue::Raydium);
    }

    #[tokio::test]
    async fn failing_venue_is_dropped() {
        let (router, orca, _raydium) = router_with_mocks();
        orca.fail_next_quotes(1);

        let quotes = router.get_quotes("SOL", "USDC", 1_000_000).await.unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].venue, Venue::Raydium);
    }

    #[tokio::test]
    async fn all_venues_failing_is_a_routing_error() {
        let (router, orca, raydium) = router_with_mocks();
        orca.fail_next_quotes(1);
        raydium.fail_next_quotes(1);

        let err = router
            .get_quotes("SOL", "USDC", 1_000_000)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Routing);
        assert!(err.retryable());
    }

    #[tokio::test]
    async fn select_best_prefers_higher_effective_price() {
        let (router, orca, raydium) = router_with_mocks();
        orca.set_pricing(dec!(1.00), dec!(0.0025));
        raydium.set_pricing(dec!(1.01), dec!(0.002));

        let quotes = router.get_quotes("SOL", "USDC", 1_000_000).await.unwrap();
        let best = router.select_best(&quotes).unwrap();
        assert_eq!(best.venue, Venue::Raydium);
    }

    #[tokio::test]
    async fn select_best_breaks_ties_by_venue_order() {
        let (router, orca, raydium) = router_with_mocks();
        orca.set_pricing(dec!(1.00), dec!(0.002));
        raydium.set_pricing(dec!(1.00), dec!(0.002));

        let quotes = router.get_quotes("SOL", "USDC", 1_000_000).await.unwrap();
        let best = router.select_best(&quotes).unwrap();
        assert_eq!(best.venue, Venue::Orca);
    }

    #[tokio::test]
    async fn tie_break_ignores_slice_order() {
        let (router, _, _) = router_with_mocks();
        let quote = |venue| Quote {
            venue,
            amount_in: 1_000_000,
            price: dec!(1.00),
            fee: dec!(0.002),
            pool_id: "pool".to_string(),
        };

        // Raydium listed first, but Orca is earlier in the configured
        // order and wins the tie.
        let best = router
            .select_best(&[quote(Venue::Raydium), quote(Venue::Orca)])
            .unwrap();
        assert_eq!(best.venue, Venue::Orca);
    }

    #[tokio::test]
    async fn select_best_on_empty_input_is_a_routing_error() {
        let (router, _, _) = router_with_mocks();
        let err = router.select_best(&[]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Routing);
    }

    #[tokio::test]
    async fn fee_can_flip_the_winner() {
        let (router, orca, raydium) = router_with_mocks();
        // Raydium's raw price is higher, but its fee eats the edge.
        orca.set_pricing(dec!(1.000), dec!(0.0005));
        raydium.set_pricing(dec!(1.001), dec!(0.0100));

        let quotes = router.get_quotes("SOL", "USDC", 1_000_000).await.unwrap();
        let best = router.select_best(&quotes).unwrap();
        assert_eq!(best.venue, Venue::Orca);
    }
}
