//! HTTP venue adapter for the `real` venue implementation.
//!
//! Speaks a small JSON contract with a venue gateway: `POST /v1/quote`
//! and `POST /v1/swap`, authenticated with the engine's signing key as a
//! bearer token. Transaction construction and signing happen inside the
//! gateway; this adapter is only the request/response framing.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Quote, SwapParams, SwapResult, Venue};

use super::{VenueAdapter, VenueError};

/// Request timeout for venue gateway calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct QuoteRequest<'a> {
    venue: Venue,
    token_in: &'a str,
    token_out: &'a str,
    amount_in: u64,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    price: Decimal,
    fee: Decimal,
    pool_id: String,
}

#[derive(Debug, Deserialize)]
struct SwapResponse {
    tx_hash: String,
    executed_price: Decimal,
    amount_in: u64,
    amount_out: u64,
    fee_amount: u64,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct GatewayError {
    code: String,
    message: String,
}

/// Venue adapter backed by an HTTP gateway.
pub struct HttpVenueAdapter {
    venue: Venue,
    client: reqwest::Client,
    base_url: String,
    signing_key: String,
}

impl HttpVenueAdapter {
    /// Create an adapter for `venue` rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`VenueError::Rejected`] when the signing key is empty or
    /// [`VenueError::Network`] when the HTTP client cannot be built.
    pub fn new(
        venue: Venue,
        base_url: impl Into<String>,
        signing_key: impl Into<String>,
    ) -> Result<Self, VenueError> {
        let signing_key = signing_key.into();
        if signing_key.is_empty() {
            return Err(VenueError::Rejected(
                "signing key is required for the real venue implementation".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| VenueError::Network(e.to_string()))?;

        Ok(Self {
            venue,
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            signing_key,
        })
    }

    async fn post<T: serde::de::DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, VenueError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.signing_key)
            .json(body)
            .send()
            .await
            .map_err(|e| VenueError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| VenueError::Network(format!("malformed gateway response: {e}")));
        }

        // Error bodies carry a code we can use for typed signals; fall
        // back to the raw text when the body is not our error shape.
        let body_text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<GatewayError>(&body_text) {
            Ok(err) if err.code == "SLIPPAGE_EXCEEDED" => Err(VenueError::Rejected(format!(
                "slippage exceeded on {}: {}",
                self.venue, err.message
            ))),
            Ok(err) if err.code == "POOL_NOT_FOUND" => Err(VenueError::Rejected(err.message)),
            Ok(err) => Err(VenueError::Rejected(format!("{}: {}", err.code, err.message))),
            Err(_) => Err(VenueError::Network(format!(
                "gateway returned {status}: {body_text}"
            ))),
        }
    }
}

#[async_trait]
impl VenueAdapter for HttpVenueAdapter {
    fn venue(&self) -> Venue {
        self.venue
    }

    async fn quote(
        &self,
        token_in: &str,
        token_out: &str,
        amount_in: u64,
    ) -> Result<Quote, VenueError> {
        let request = QuoteRequest {
            venue: self.venue,
            token_in,
            token_out,
            amount_in,
        };

        let response: QuoteResponse = self.post("/v1/quote", &request).await?;

        Ok(Quote {
            venue: self.venue,
            amount_in,
            price: response.price,
            fee: response.fee,
            pool_id: response.pool_id,
        })
    }

    async fn swap(&self, params: &SwapParams) -> Result<SwapResult, VenueError> {
        let response: SwapResponse = self.post("/v1/swap", params).await?;

        // The floor holds regardless of what the gateway enforced.
        if response.amount_out < params.min_amount_out {
            return Err(VenueError::SlippageExceeded {
                venue: self.venue,
                received: response.amount_out,
                minimum: params.min_amount_out,
            });
        }

        Ok(SwapResult {
            tx_hash: response.tx_hash,
            executed_price: response.executed_price,
            amount_in: response.amount_in,
            amount_out: response.amount_out,
            fee_amount: response.fee_amount,
            timestamp: response.timestamp,
        })
    }

    async fn health_check(&self) -> Result<(), VenueError> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| VenueError::Network(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(VenueError::Network(format!(
                "gateway health check returned {}",
                response.status()
            )))
        }
    }
}
