//! Swap Engine - Order-Execution Core
//!
//! An order-execution engine for token swaps across two liquidity
//! venues. Orders enter through a WebSocket submission endpoint, wait on
//! a durable work queue, and are driven by a bounded worker pool through
//! the state machine `pending -> routing -> building -> submitted ->
//! confirmed | failed`, with every transition persisted and streamed
//! back to subscribers in real time.
//!
//! # Modules
//!
//! - [`models`]: core domain types (orders, quotes, jobs)
//! - [`venue`]: venue adapters and the breaker-guarded registry
//! - [`router`]: quote fan-out and best-venue selection
//! - [`executor`]: slippage-protected swap execution
//! - [`queue`]: the durable work-queue contract
//! - [`pipeline`]: the worker pool and per-order state machine
//! - [`stream`]: live status fan-out to subscribers
//! - [`server`]: HTTP/WebSocket surface
//! - [`resilience`]: retry helper and circuit breakers

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod queue;
pub mod resilience;
pub mod router;
pub mod server;
pub mod store;
pub mod stream;
pub mod telemetry;
pub mod venue;

// Re-export commonly used types
pub use config::EngineConfig;
pub use error::{CriticalErrorBus, EngineError, ErrorKind};
pub use executor::SwapExecutor;
pub use models::{Order, OrderStatus, Quote, SwapJob, Venue};
pub use pipeline::{PipelineWorker, WorkerPool};
pub use queue::WorkQueue;
pub use router::QuoteRouter;
pub use store::{InMemoryOrderStore, OrderCache, OrderStore};
pub use stream::StatusStreamHub;
