//! Circuit-breaker wrapper around a venue adapter.

use std::sync::Arc;

use thiserror::Error;

use crate::models::{Quote, SwapParams, SwapResult, Venue};
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitBreakerState};

use super::{VenueAdapter, VenueError};

/// Failure of a guarded venue call.
#[derive(Debug, Error)]
pub enum VenueCallError {
    /// The breaker rejected the call without reaching the venue.
    #[error("circuit breaker {state} for venue {venue}")]
    CircuitOpen {
        /// Venue whose breaker rejected the call.
        venue: Venue,
        /// Breaker state at rejection time.
        state: CircuitBreakerState,
    },

    /// The venue was called and failed.
    #[error(transparent)]
    Venue(#[from] VenueError),
}

/// A venue adapter paired with its own circuit breaker.
///
/// Every call goes through the breaker: rejected outright while OPEN,
/// recorded as success/failure otherwise. Quote and swap share one
/// breaker per venue, so a flood of quote failures also protects the
/// swap path.
pub struct GuardedVenue {
    adapter: Arc<dyn VenueAdapter>,
    breaker: CircuitBreaker,
}

impl GuardedVenue {
    /// Wrap `adapter` with a fresh breaker.
    #[must_use]
    pub fn new(adapter: Arc<dyn VenueAdapter>, breaker_config: CircuitBreakerConfig) -> Self {
        let breaker = CircuitBreaker::new(adapter.venue().as_str(), breaker_config);
        Self { adapter, breaker }
    }

    /// The wrapped venue's tag.
    #[must_use]
    pub fn venue(&self) -> Venue {
        self.adapter.venue()
    }

    /// The breaker guarding this venue (for tests and health surfaces).
    #[must_use]
    pub const fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Breaker counters for operator surfaces.
    #[must_use]
    pub fn breaker_metrics(&self) -> CircuitBreakerMetrics {
        self.breaker.metrics()
    }

    /// Quote through the breaker.
    ///
    /// # Errors
    ///
    /// [`VenueCallError::CircuitOpen`] when the breaker rejects the call,
    /// otherwise the adapter's own failure.
    pub async fn quote(
        &self,
        token_in: &str,
        token_out: &str,
        amount_in: u64,
    ) -> Result<Quote, VenueCallError> {
        self.admit()?;

        match self.adapter.quote(token_in, token_out, amount_in).await {
            Ok(quote) => {
                self.breaker.record_success();
                Ok(quote)
            }
            Err(err) => {
                self.breaker.record_failure();
                Err(err.into())
            }
        }
    }

    /// Swap through the breaker.
    ///
    /// # Errors
    ///
    /// [`VenueCallError::CircuitOpen`] when the breaker rejects the call,
    /// otherwise the adapter's own failure.
    pub async fn swap(&self, params: &SwapParams) -> Result<SwapResult, VenueCallError> {
        self.admit()?;

        match self.adapter.swap(params).await {
            Ok(result) => {
                self.breaker.record_success();
                Ok(result)
            }
            Err(err) => {
                self.breaker.record_failure();
                Err(err.into())
            }
        }
    }

    /// Health-check the adapter directly (not breaker-recorded).
    ///
    /// # Errors
    ///
    /// The adapter's own failure.
    pub async fn health_check(&self) -> Result<(), VenueError> {
        self.adapter.health_check().await
    }

    fn admit(&self) -> Result<(), VenueCallError> {
        if self.breaker.is_call_permitted() {
            Ok(())
        } else {
            let state = self.breaker.state();
            tracing::warn!(
                venue = %self.venue(),
                %state,
                "venue call rejected by circuit breaker"
            );
            Err(VenueCallError::CircuitOpen {
                venue: self.venue(),
                state,
            })
        }
    }
}
