//! Slippage-protected swap execution.
//!
//! Turns a winning quote into a swap with a hard output floor:
//! `min_amount_out = floor(estimated_output * (1 - slippage))`. Flooring
//! is mandatory so a fractional smallest-unit amount can never be asked
//! of a venue.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::error::EngineError;
use crate::models::{Quote, SwapParams, SwapResult};
use crate::venue::{VenueCallError, VenueError, VenueRegistry};

/// Slippage bounds and defaults.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Tolerance applied when a request omits slippage.
    pub default_slippage: Decimal,
    /// Upper bound any request may ask for.
    pub max_slippage: Decimal,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            default_slippage: Decimal::new(5, 3),
            max_slippage: Decimal::new(5, 2),
        }
    }
}

/// Executes swaps against the guarded venue registry.
#[derive(Clone)]
pub struct SwapExecutor {
    registry: VenueRegistry,
    settings: ExecutorSettings,
}

impl SwapExecutor {
    /// Create an executor over `registry`.
    #[must_use]
    pub const fn new(registry: VenueRegistry, settings: ExecutorSettings) -> Self {
        Self { registry, settings }
    }

    /// The configured slippage bounds.
    #[must_use]
    pub const fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Apply the default for an absent tolerance and enforce the bounds.
    ///
    /// # Errors
    ///
    /// `VALIDATION` when the tolerance falls outside `[0, max_slippage]`.
    pub fn resolve_slippage(&self, slippage: Option<Decimal>) -> Result<Decimal, EngineError> {
        let slippage = slippage.unwrap_or(self.settings.default_slippage);

        if slippage < Decimal::ZERO {
            return Err(EngineError::validation(
                "slippage must be greater than or equal to 0",
            ));
        }
        if slippage > self.settings.max_slippage {
            return Err(EngineError::validation(format!(
                "slippage must not exceed {}",
                self.settings.max_slippage
            )));
        }

        Ok(slippage)
    }

    /// The minimum acceptable output for `quote` under `slippage`.
    #[must_use]
    pub fn min_amount_out(quote: &Quote, slippage: Decimal) -> u64 {
        (quote.estimated_output() * (Decimal::ONE - slippage))
            .floor()
            .to_u64()
            .unwrap_or(0)
    }

    /// Execute the swap described by `quote` under `slippage`.
    ///
    /// # Errors
    ///
    /// - `VALIDATION` when `slippage` is out of bounds (never retried);
    /// - `EXECUTION` when the venue fails, carrying the venue tag and a
    ///   "slippage" marker when the floor was breached;
    /// - non-retryable `SYSTEM` when the venue's circuit breaker is open
    ///   or the venue is unknown.
    pub async fn execute_swap(
        &self,
        quote: &Quote,
        token_in: &str,
        token_out: &str,
        amount_in: u64,
        slippage: Option<Decimal>,
    ) -> Result<SwapResult, EngineError> {
        let slippage = self.resolve_slippage(slippage)?;
        let min_amount_out = Self::min_amount_out(quote, slippage);

        let Some(venue) = self.registry.get(quote.venue) else {
            return Err(EngineError::system(format!(
                "no adapter registered for venue {}",
                quote.venue
            ))
            .non_retryable());
        };

        let params = SwapParams {
            venue: quote.venue,
            token_in: token_in.to_string(),
            token_out: token_out.to_string(),
            amount_in,
            min_amount_out,
            pool_id: quote.pool_id.clone(),
        };

        tracing::info!(
            venue = %quote.venue,
            amount_in,
            min_amount_out,
            slippage = %slippage,
            estimated_output = %quote.estimated_output(),
            "executing swap"
        );

        let started = std::time::Instant::now();
        let result = venue.swap(&params).await;
        crate::metrics::record_swap_latency(quote.venue, started.elapsed());

        match result {
            Ok(result) => {
                let estimated = quote.estimated_output();
                let realized_slippage = if estimated.is_zero() {
                    Decimal::ZERO
                } else {
                    (estimated - Decimal::from(result.amount_out)) / estimated
                };
                tracing::info!(
                    venue = %quote.venue,
                    tx_hash = %result.tx_hash,
                    amount_out = result.amount_out,
                    executed_price = %result.executed_price,
                    realized_slippage = %realized_slippage,
                    "swap executed"
                );
                Ok(result)
            }
            Err(err) => Err(Self::translate_swap_error(err, quote)),
        }
    }

    fn translate_swap_error(err: VenueCallError, quote: &Quote) -> EngineError {
        match err {
            VenueCallError::CircuitOpen { venue, state } => {
                EngineError::system(format!("circuit breaker {state} for venue {venue}"))
                    .non_retryable()
                    .with_context("venue", venue.as_str())
            }
            VenueCallError::Venue(venue_err) => {
                let is_slippage = matches!(venue_err, VenueError::SlippageExceeded { .. })
                    || venue_err.to_string().to_lowercase().contains("slippage");

                let message = if is_slippage {
                    // Keep the venue tag in the message: it becomes the
                    // order's failure reason.
                    match &venue_err {
                        VenueError::SlippageExceeded { .. } => venue_err.to_string(),
                        other => format!("slippage exceeded on {}: {other}", quote.venue),
                    }
                } else {
                    format!("swap failed on {}: {venue_err}", quote.venue)
                };

                EngineError::execution(message).with_context("venue", quote.venue.as_str())
            }
        }
    }
}
