//! Axum router: health, metrics, and order read endpoints.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, ErrorKind};
use crate::executor::ExecutorSettings;
use crate::metrics::get_metrics_handle;
use crate::queue::{QueueMetrics, WorkQueue};
use crate::resilience::CircuitBreakerMetrics;
use crate::store::{OrderCache, OrderStore};
use crate::stream::StatusStreamHub;
use crate::venue::VenueRegistry;

/// Shared state behind every handler.
pub struct AppState {
    /// Order store.
    pub store: Arc<dyn OrderStore>,
    /// Order cache.
    pub cache: Arc<OrderCache>,
    /// Work queue.
    pub queue: Arc<WorkQueue>,
    /// Status stream hub.
    pub hub: Arc<StatusStreamHub>,
    /// Slippage bounds used by submission validation.
    pub executor_settings: ExecutorSettings,
    /// Guarded venues (for breaker health reporting).
    pub registry: VenueRegistry,
    /// Process start time.
    pub started_at: Instant,
}

/// Arc-wrapped state as used by the router.
pub type SharedState = Arc<AppState>;

/// Build the router with all endpoints.
#[must_use]
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/metrics", get(metrics_handler))
        .route("/v1/swap", get(super::ws::swap_ws_handler))
        .route("/v1/orders", get(recent_orders_handler))
        .route("/v1/orders/{id}", get(order_handler))
        .route("/v1/orders/{id}/history", get(order_history_handler))
        .with_state(state)
}

/// Health payload.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    uptime_secs: u64,
    queue: QueueMetrics,
    venues: Vec<CircuitBreakerMetrics>,
    subscribers: usize,
}

async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp_millis(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        queue: state.queue.metrics(),
        venues: state
            .registry
            .all()
            .iter()
            .map(|v| v.breaker_metrics())
            .collect(),
        subscribers: state.hub.total_subscribers(),
    };

    Json(response)
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

/// Query parameters for the recent-orders listing.
#[derive(Debug, Deserialize)]
struct RecentParams {
    limit: Option<usize>,
}

const DEFAULT_RECENT_LIMIT: usize = 50;
const MAX_RECENT_LIMIT: usize = 500;

async fn recent_orders_handler(
    State(state): State<SharedState>,
    Query(params): Query<RecentParams>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_RECENT_LIMIT)
        .min(MAX_RECENT_LIMIT);
    let orders = state.store.find_recent(limit).await?;
    Ok(Json(orders))
}

async fn order_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    // The cache is advisory; fall through to the store on a miss.
    if let Some(order) = state.cache.get(&id) {
        return Ok(Json(order));
    }

    match state.store.find_by_id(&id).await? {
        Some(order) => Ok(Json(order)),
        None => Err(ApiError::NotFound(id)),
    }
}

async fn order_history_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if state.store.find_by_id(&id).await?.is_none() {
        return Err(ApiError::NotFound(id));
    }
    let history = state.store.status_history(&id).await?;
    Ok(Json(history))
}

/// Handler-level error with an HTTP mapping.
#[derive(Debug)]
pub enum ApiError {
    /// No order with the given identifier.
    NotFound(String),
    /// An engine error bubbled up.
    Engine(EngineError),
}

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        Self::Engine(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            Self::NotFound(id) => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({
                    "error": { "code": "NOT_FOUND", "message": format!("order {id} not found") },
                    "timestampMs": Utc::now().timestamp_millis(),
                })),
            )
                .into_response(),
            Self::Engine(error) => {
                let status = match error.kind() {
                    ErrorKind::Validation => StatusCode::BAD_REQUEST,
                    ErrorKind::Routing | ErrorKind::Execution => StatusCode::BAD_GATEWAY,
                    ErrorKind::System => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (
                    status,
                    Json(serde_json::json!({
                        "error": {
                            "code": format!("{}_ERROR", error.kind()),
                            "message": error.message(),
                        },
                        "timestampMs": Utc::now().timestamp_millis(),
                    })),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewOrder;
    use crate::resilience::CircuitBreakerConfig;
    use crate::store::InMemoryOrderStore;
    use axum::body::Body;
    use axum::http::Request;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use tower::ServiceExt;

    fn make_state() -> SharedState {
        let registry = VenueRegistry::mock(&CircuitBreakerConfig::default());
        Arc::new(AppState {
            store: Arc::new(InMemoryOrderStore::new()),
            cache: Arc::new(OrderCache::new(Duration::from_secs(60))),
            queue: Arc::new(WorkQueue::new(crate::resilience::RetryPolicy::default())),
            hub: Arc::new(StatusStreamHub::new()),
            executor_settings: ExecutorSettings::default(),
            registry,
            started_at: Instant::now(),
        })
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok_with_timestamp() {
        let app = create_router(make_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert!(json["timestamp"].as_i64().unwrap() > 0);
        assert_eq!(json["venues"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn liveness_returns_ok() {
        let app = create_router(make_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn order_lookup_round_trips() {
        let state = make_state();
        let order = state
            .store
            .create(NewOrder {
                token_in: "SOL".to_string(),
                token_out: "USDC".to_string(),
                amount_in: 1_000,
                slippage: dec!(0.01),
            })
            .await
            .unwrap();

        let app = create_router(Arc::clone(&state));
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/v1/orders/{}", order.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["id"], order.id);
        assert_eq!(json["status"], "pending");
    }

    #[tokio::test]
    async fn unknown_order_is_404() {
        let app = create_router(make_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/orders/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn recent_orders_respects_limit() {
        let state = make_state();
        for _ in 0..5 {
            state
                .store
                .create(NewOrder {
                    token_in: "SOL".to_string(),
                    token_out: "USDC".to_string(),
                    amount_in: 1_000,
                    slippage: dec!(0.01),
                })
                .await
                .unwrap();
        }

        let app = create_router(Arc::clone(&state));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/orders?limit=3")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let json = body_json(response).await;
        assert_eq!(json.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn order_history_lists_entries_in_order() {
        let state = make_state();
        let order = state
            .store
            .create(NewOrder {
                token_in: "SOL".to_string(),
                token_out: "USDC".to_string(),
                amount_in: 1_000,
                slippage: dec!(0.01),
            })
            .await
            .unwrap();
        state
            .store
            .update_status(
                &order.id,
                crate::models::OrderStatus::Routing,
                crate::models::OrderPatch::default(),
            )
            .await
            .unwrap();

        let app = create_router(Arc::clone(&state));
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/v1/orders/{}/history", order.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let json = body_json(response).await;
        let entries = json.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["status"], "pending");
        assert_eq!(entries[1]["status"], "routing");
    }
}
