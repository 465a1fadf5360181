//! HTTP server: submission endpoint, health, and order reads.

mod http;
mod ws;

pub use http::{AppState, SharedState, create_router};
pub use ws::{SwapRequest, validate_request};
