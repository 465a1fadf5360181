//! Venue, quote, and swap value objects.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A liquidity venue that can quote and execute swaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    /// Orca concentrated-liquidity pools.
    Orca,
    /// Raydium AMM pools.
    Raydium,
}

impl Venue {
    /// All venues in the configured preference order.
    ///
    /// The first venue wins effective-price ties during routing.
    pub const ORDER: [Self; 2] = [Self::Orca, Self::Raydium];

    /// Venue tag for logging and wire messages.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Orca => "orca",
            Self::Raydium => "raydium",
        }
    }
}

impl std::fmt::Display for Venue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A price quote from a single venue for a specific swap request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    /// Venue that produced this quote.
    pub venue: Venue,
    /// Input amount the quote was requested for (smallest units).
    pub amount_in: u64,
    /// Raw price in output units per input unit, before fees.
    pub price: Decimal,
    /// Proportional fee charged by the venue (e.g. 0.0025).
    pub fee: Decimal,
    /// Opaque pool identifier for the venue's liquidity pool.
    pub pool_id: String,
}

impl Quote {
    /// Price after the venue's proportional fee is deducted.
    #[must_use]
    pub fn effective_price(&self) -> Decimal {
        self.price * (Decimal::ONE - self.fee)
    }

    /// Estimated output at the raw price, in smallest units of the
    /// output token.
    #[must_use]
    pub fn estimated_output(&self) -> Decimal {
        Decimal::from(self.amount_in) * self.price
    }
}

/// Parameters for executing a swap on a venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapParams {
    /// Target venue.
    pub venue: Venue,
    /// Input token mint.
    pub token_in: String,
    /// Output token mint.
    pub token_out: String,
    /// Input amount in smallest units.
    pub amount_in: u64,
    /// Minimum acceptable output in smallest units. The venue must fail
    /// with a slippage signal if it cannot produce at least this much.
    pub min_amount_out: u64,
    /// Pool identifier from the quote being executed.
    pub pool_id: String,
}

/// Result of a successfully executed swap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapResult {
    /// On-chain transaction identifier.
    pub tx_hash: String,
    /// Realized price in output units per input unit.
    pub executed_price: Decimal,
    /// Input amount consumed (smallest units).
    pub amount_in: u64,
    /// Output amount produced (smallest units, >= `min_amount_out`).
    pub amount_out: u64,
    /// Fee charged by the venue (smallest units of the output token).
    pub fee_amount: u64,
    /// Execution timestamp.
    pub timestamp: DateTime<Utc>,
}

/// The routing comparison attached to `building` status events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingDecision {
    /// Venue that won the comparison.
    pub selected_venue: Venue,
    /// Orca's effective price, if Orca answered.
    pub venue_a_price: Option<Decimal>,
    /// Raydium's effective price, if Raydium answered.
    pub venue_b_price: Option<Decimal>,
}

impl RoutingDecision {
    /// Build a decision record from the quotes that were compared.
    #[must_use]
    pub fn from_quotes(quotes: &[Quote], selected: Venue) -> Self {
        let price_for = |venue: Venue| {
            quotes
                .iter()
                .find(|q| q.venue == venue)
                .map(Quote::effective_price)
        };

        Self {
            selected_venue: selected,
            venue_a_price: price_for(Venue::Orca),
            venue_b_price: price_for(Venue::Raydium),
        }
    }
}
