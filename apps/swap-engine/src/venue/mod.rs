//! Venue adapters and the breaker-guarded registry.
//!
//! A venue answers `quote` and performs `swap`; everything else about it
//! is its own business. Two implementations exist: [`MockVenueAdapter`]
//! for tests and the `mock` runtime configuration, and
//! [`HttpVenueAdapter`] for a real venue gateway speaking JSON over
//! HTTP. Every adapter is wrapped in a [`GuardedVenue`] carrying its own
//! circuit breaker before the router or executor ever sees it.

mod guard;
mod http;
mod mock;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Quote, SwapParams, SwapResult, Venue};
use crate::resilience::CircuitBreakerConfig;

pub use guard::{GuardedVenue, VenueCallError};
pub use http::HttpVenueAdapter;
pub use mock::MockVenueAdapter;

/// Errors produced by a venue adapter.
#[derive(Debug, Clone, Error)]
pub enum VenueError {
    /// The venue could not produce at least `min_amount_out`.
    #[error("slippage exceeded on {venue}: output {received} below minimum {minimum}")]
    SlippageExceeded {
        /// Venue that rejected the swap.
        venue: Venue,
        /// Output the venue would have produced.
        received: u64,
        /// The caller's floor.
        minimum: u64,
    },

    /// No pool exists for the requested pair.
    #[error("no {venue} pool for pair {token_in}/{token_out}")]
    PoolNotFound {
        /// Venue queried.
        venue: Venue,
        /// Input token.
        token_in: String,
        /// Output token.
        token_out: String,
    },

    /// Transport-level failure talking to the venue.
    #[error("venue network error: {0}")]
    Network(String),

    /// The venue answered but rejected the request.
    #[error("venue rejected request: {0}")]
    Rejected(String),
}

/// A liquidity source that can quote and execute swaps.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    /// Which venue this adapter fronts.
    fn venue(&self) -> Venue;

    /// Quote a swap of `amount_in` units of `token_in` into `token_out`.
    ///
    /// # Errors
    ///
    /// Returns a [`VenueError`] when no pool exists or the venue is
    /// unreachable.
    async fn quote(
        &self,
        token_in: &str,
        token_out: &str,
        amount_in: u64,
    ) -> Result<Quote, VenueError>;

    /// Execute a swap under the caller's `min_amount_out` floor.
    ///
    /// # Errors
    ///
    /// Returns [`VenueError::SlippageExceeded`] when the produced output
    /// would fall below the floor, or another [`VenueError`] on failure.
    async fn swap(&self, params: &SwapParams) -> Result<SwapResult, VenueError>;

    /// Lightweight connectivity check.
    ///
    /// # Errors
    ///
    /// Returns a [`VenueError`] when the venue is unreachable.
    async fn health_check(&self) -> Result<(), VenueError>;
}

/// All guarded venues, in the configured preference order.
#[derive(Clone)]
pub struct VenueRegistry {
    venues: Vec<Arc<GuardedVenue>>,
}

impl VenueRegistry {
    /// Wrap each adapter with its own circuit breaker.
    #[must_use]
    pub fn new(adapters: Vec<Arc<dyn VenueAdapter>>, breaker_config: &CircuitBreakerConfig) -> Self {
        let venues = adapters
            .into_iter()
            .map(|adapter| Arc::new(GuardedVenue::new(adapter, breaker_config.clone())))
            .collect();
        Self { venues }
    }

    /// Registry of default mock venues (used for `implementation=mock`).
    #[must_use]
    pub fn mock(breaker_config: &CircuitBreakerConfig) -> Self {
        Self::new(
            vec![
                Arc::new(MockVenueAdapter::new(Venue::Orca)),
                Arc::new(MockVenueAdapter::new(Venue::Raydium)),
            ],
            breaker_config,
        )
    }

    /// All guarded venues in preference order.
    #[must_use]
    pub fn all(&self) -> &[Arc<GuardedVenue>] {
        &self.venues
    }

    /// Look up the guarded venue for a tag.
    #[must_use]
    pub fn get(&self, venue: Venue) -> Option<Arc<GuardedVenue>> {
        self.venues.iter().find(|v| v.venue() == venue).cloned()
    }
}
