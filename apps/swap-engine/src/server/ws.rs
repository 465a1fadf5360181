//! WebSocket submission endpoint.
//!
//! A client upgrades `GET /v1/swap`, sends one JSON request frame, and
//! receives a stream of status updates until the order settles:
//!
//! ```text
//! -> { "tokenIn": "SOL", "tokenOut": "USDC", "amount": 1000000, "slippage": 0.01 }
//! <- { "orderId": "...", "status": "pending", "timestamp": ... }
//! <- { "orderId": "...", "status": "routing", ... }
//! ...
//! ```
//!
//! Invalid submissions receive a single error frame and the stream is
//! closed before any side effect (no order row, no job).

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::models::{NewOrder, OrderStatus, SwapJob};
use crate::stream::StatusUpdate;

use super::http::SharedState;

/// Swap submission request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    /// Input token identifier.
    pub token_in: String,
    /// Output token identifier.
    pub token_out: String,
    /// Input amount in smallest units.
    pub amount: f64,
    /// Optional slippage tolerance.
    pub slippage: Option<f64>,
}

/// Error frame sent before closing a rejected stream.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorFrame {
    error: ErrorBody,
    timestamp_ms: i64,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

impl ErrorFrame {
    fn new(code: &str, message: &str) -> Self {
        Self {
            error: ErrorBody {
                code: code.to_string(),
                message: message.to_string(),
            },
            timestamp_ms: Utc::now().timestamp_millis(),
        }
    }
}

/// Validate a submission against the configured slippage bound.
///
/// Pure so it can be tested directly; every rule has its own message.
///
/// # Errors
///
/// `VALIDATION` with the first violated rule's message.
pub fn validate_request(request: &SwapRequest, max_slippage: Decimal) -> Result<(), EngineError> {
    if request.token_in.trim().is_empty() {
        return Err(EngineError::validation("tokenIn must be a non-empty string"));
    }
    if request.token_out.trim().is_empty() {
        return Err(EngineError::validation(
            "tokenOut must be a non-empty string",
        ));
    }
    if request.token_in == request.token_out {
        return Err(EngineError::validation(
            "tokenIn and tokenOut must be different",
        ));
    }
    if !request.amount.is_finite() {
        return Err(EngineError::validation("amount must be a finite number"));
    }
    if request.amount <= 0.0 {
        return Err(EngineError::validation("amount must be greater than 0"));
    }
    if request.amount.fract() != 0.0 {
        return Err(EngineError::validation(
            "amount must be a whole number of smallest units",
        ));
    }
    if let Some(slippage) = request.slippage {
        if !slippage.is_finite() {
            return Err(EngineError::validation("slippage must be a finite number"));
        }
        if slippage < 0.0 {
            return Err(EngineError::validation(
                "slippage must be greater than or equal to 0",
            ));
        }
        let Some(slippage) = Decimal::from_f64(slippage) else {
            return Err(EngineError::validation("slippage must be a finite number"));
        };
        if slippage > max_slippage {
            return Err(EngineError::validation(format!(
                "slippage must not exceed {max_slippage}"
            )));
        }
    }
    Ok(())
}

/// Upgrade handler for `GET /v1/swap`.
pub async fn swap_ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> Response {
    ws.on_upgrade(move |socket| handle_swap_socket(socket, state))
}

async fn handle_swap_socket(mut socket: WebSocket, state: SharedState) {
    // First text frame is the submission.
    let raw = loop {
        match socket.recv().await {
            Some(Ok(Message::Text(text))) => break text,
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Ok(Message::Binary(_))) => {
                reject(&mut socket, "request body must be a text frame").await;
                return;
            }
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
        }
    };

    let request: SwapRequest = match serde_json::from_str(raw.as_str()) {
        Ok(request) => request,
        Err(err) => {
            reject(&mut socket, &format!("invalid request body: {err}")).await;
            return;
        }
    };

    if let Err(err) = validate_request(&request, state.executor_settings.max_slippage) {
        tracing::info!(error = %err, "submission rejected");
        reject(&mut socket, err.message()).await;
        return;
    }

    // Validation guarantees a whole, positive amount.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let amount_in = request.amount as u64;
    let slippage = request
        .slippage
        .and_then(Decimal::from_f64)
        .unwrap_or(state.executor_settings.default_slippage);

    let order = match state
        .store
        .create(NewOrder {
            token_in: request.token_in,
            token_out: request.token_out,
            amount_in,
            slippage,
        })
        .await
    {
        Ok(order) => order,
        Err(err) => {
            tracing::error!(error = %err, "order creation failed");
            let frame = ErrorFrame::new("SYSTEM_ERROR", err.message());
            send_json(&mut socket, &frame).await;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    tracing::info!(
        order_id = %order.id,
        token_in = %order.token_in,
        token_out = %order.token_out,
        amount_in = order.amount_in,
        slippage = %order.slippage,
        "order accepted"
    );

    state.cache.set(order.clone(), None);

    // Attach before the job can produce transitions, then emit the
    // initial pending through the hub so this subscriber's stream starts
    // at `pending` exactly once.
    let (subscriber_id, mut updates) = state.hub.attach(&order.id);
    state.hub.emit(&order.id, OrderStatus::Pending, None);
    state.queue.enqueue(SwapJob::for_order(&order));
    crate::metrics::record_order_submitted();

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(update) => {
                    if !forward(&mut socket, &update).await {
                        state.hub.detach(&order.id, subscriber_id);
                        return;
                    }
                }
                // Hub side closed: order settled or engine shutting down.
                None => {
                    let _ = socket.send(Message::Close(None)).await;
                    return;
                }
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Text(_) | Message::Binary(_))) => {}
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    tracing::debug!(order_id = %order.id, "client disconnected");
                    state.hub.detach(&order.id, subscriber_id);
                    return;
                }
            },
        }
    }
}

async fn reject(socket: &mut WebSocket, message: &str) {
    let frame = ErrorFrame::new("VALIDATION_ERROR", message);
    send_json(socket, &frame).await;
    let _ = socket.send(Message::Close(None)).await;
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, value: &T) -> bool {
    match serde_json::to_string(value) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(err) => {
            tracing::error!(error = %err, "failed to serialize frame");
            false
        }
    }
}

async fn forward(socket: &mut WebSocket, update: &StatusUpdate) -> bool {
    send_json(socket, update).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request(token_in: &str, token_out: &str, amount: f64, slippage: Option<f64>) -> SwapRequest {
        SwapRequest {
            token_in: token_in.to_string(),
            token_out: token_out.to_string(),
            amount,
            slippage,
        }
    }

    fn message_of(result: Result<(), EngineError>) -> String {
        result.unwrap_err().message().to_string()
    }

    #[test]
    fn valid_requests_pass() {
        assert!(validate_request(&request("SOL", "USDC", 1_000_000.0, None), dec!(0.05)).is_ok());
        assert!(
            validate_request(&request("SOL", "USDC", 1.0, Some(0.0)), dec!(0.05)).is_ok()
        );
        assert!(
            validate_request(&request("SOL", "USDC", 1.0, Some(0.05)), dec!(0.05)).is_ok()
        );
    }

    #[test]
    fn empty_tokens_have_distinct_messages() {
        assert_eq!(
            message_of(validate_request(&request("", "USDC", 1.0, None), dec!(0.05))),
            "tokenIn must be a non-empty string"
        );
        assert_eq!(
            message_of(validate_request(&request("SOL", "  ", 1.0, None), dec!(0.05))),
            "tokenOut must be a non-empty string"
        );
    }

    #[test]
    fn identical_tokens_are_rejected() {
        assert_eq!(
            message_of(validate_request(&request("A", "A", 100.0, None), dec!(0.05))),
            "tokenIn and tokenOut must be different"
        );
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        assert_eq!(
            message_of(validate_request(&request("A", "B", 0.0, None), dec!(0.05))),
            "amount must be greater than 0"
        );
        assert_eq!(
            message_of(validate_request(&request("A", "B", -5.0, None), dec!(0.05))),
            "amount must be greater than 0"
        );
    }

    #[test]
    fn non_finite_amounts_are_rejected() {
        assert_eq!(
            message_of(validate_request(
                &request("A", "B", f64::INFINITY, None),
                dec!(0.05)
            )),
            "amount must be a finite number"
        );
        assert_eq!(
            message_of(validate_request(&request("A", "B", f64::NAN, None), dec!(0.05))),
            "amount must be a finite number"
        );
    }

    #[test]
    fn fractional_amounts_are_rejected() {
        assert_eq!(
            message_of(validate_request(&request("A", "B", 10.5, None), dec!(0.05))),
            "amount must be a whole number of smallest units"
        );
    }

    #[test]
    fn slippage_bounds_are_enforced() {
        assert_eq!(
            message_of(validate_request(
                &request("A", "B", 1.0, Some(-0.1)),
                dec!(0.05)
            )),
            "slippage must be greater than or equal to 0"
        );
        assert_eq!(
            message_of(validate_request(
                &request("A", "B", 1.0, Some(0.06)),
                dec!(0.05)
            )),
            "slippage must not exceed 0.05"
        );
        assert_eq!(
            message_of(validate_request(
                &request("A", "B", 1.0, Some(f64::NAN)),
                dec!(0.05)
            )),
            "slippage must be a finite number"
        );
    }

    #[test]
    fn validation_errors_are_not_retryable() {
        let err = validate_request(&request("A", "A", 1.0, None), dec!(0.05)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
        assert!(!err.retryable());
    }

    #[test]
    fn request_deserializes_from_camel_case() {
        let request: SwapRequest = serde_json::from_str(
            r#"{"tokenIn":"SOL","tokenOut":"USDC","amount":1000000,"slippage":0.01}"#,
        )
        .unwrap();
        assert_eq!(request.token_in, "SOL");
        assert_eq!(request.token_out, "USDC");
        assert!((request.amount - 1_000_000.0).abs() < f64::EPSILON);
        assert_eq!(request.slippage, Some(0.01));
    }

    #[test]
    fn error_frame_has_the_wire_shape() {
        let frame = ErrorFrame::new("VALIDATION_ERROR", "tokenIn and tokenOut must be different");
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(
            json["error"]["message"],
            "tokenIn and tokenOut must be different"
        );
        assert!(json["timestampMs"].as_i64().unwrap() > 0);
    }
}
