//! Engine error values with retry semantics.
//!
//! Every failure inside the pipeline is represented by an [`EngineError`]
//! carrying a kind, a human-readable message, a context map, a timestamp,
//! and a `retryable` flag. The worker is the single place that inspects
//! the flag and decides retry-vs-terminate; lower layers only classify.
//!
//! # Kinds
//!
//! | Kind | Retryable | Meaning |
//! |------|-----------|---------|
//! | `VALIDATION` | no | Caller-supplied input is malformed or out of bounds |
//! | `ROUTING` | yes | Quote acquisition failed (timeouts, all venues down) |
//! | `EXECUTION` | yes | Swap execution failed (slippage, network jitter) |
//! | `SYSTEM` | default yes | Store/cache/queue/breaker failures |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

/// Classification of an engine failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Caller input violates a bound. Never retried.
    Validation,
    /// Quote acquisition failed. Retried.
    Routing,
    /// Swap execution failed. Retried.
    Execution,
    /// Infrastructure failure. Retried unless flagged otherwise.
    System,
}

impl ErrorKind {
    /// Wire/reason string for this kind.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::Routing => "ROUTING",
            Self::Execution => "EXECUTION",
            Self::System => "SYSTEM",
        }
    }

    /// Whether errors of this kind are retried by default.
    #[must_use]
    pub const fn default_retryable(&self) -> bool {
        !matches!(self, Self::Validation)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason())
    }
}

/// A classified engine failure.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub struct EngineError {
    kind: ErrorKind,
    message: String,
    context: Vec<(String, String)>,
    timestamp: DateTime<Utc>,
    retryable: bool,
}

impl EngineError {
    /// Create an error of the given kind with its default retryability.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: Vec::new(),
            timestamp: Utc::now(),
            retryable: kind.default_retryable(),
        }
    }

    /// A `VALIDATION` error (never retryable).
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// A `ROUTING` error.
    #[must_use]
    pub fn routing(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Routing, message)
    }

    /// An `EXECUTION` error.
    #[must_use]
    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Execution, message)
    }

    /// A `SYSTEM` error.
    #[must_use]
    pub fn system(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::System, message)
    }

    /// Classify a foreign error message and wrap it.
    ///
    /// The substring heuristic is intentionally isolated here; internal
    /// layers construct already-classified errors and never go through it.
    #[must_use]
    pub fn from_unclassified(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(classify_message(&message), message)
    }

    /// Mark this error as not worth retrying.
    #[must_use]
    pub fn non_retryable(mut self) -> Self {
        self.retryable = false;
        self
    }

    /// Attach a context key/value pair.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.push((key.into(), value.into()));
        self
    }

    /// The error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Context pairs attached to the error.
    #[must_use]
    pub fn context(&self) -> &[(String, String)] {
        &self.context
    }

    /// When the error was created.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Whether the retry helper may replay the failed operation.
    #[must_use]
    pub const fn retryable(&self) -> bool {
        self.retryable
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind.reason(), self.message)
    }
}

/// Classify an unknown error message by substring heuristic.
#[must_use]
pub fn classify_message(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();

    if lower.contains("validation") || lower.contains("invalid") || lower.contains("required") {
        return ErrorKind::Validation;
    }

    if lower.contains("quote") || lower.contains("routing") {
        return ErrorKind::Routing;
    }

    if lower.contains("transaction") || lower.contains("swap") || lower.contains("slippage") {
        return ErrorKind::Execution;
    }

    ErrorKind::System
}

/// Channel capacity for critical-error fan-out.
const CRITICAL_BUS_CAPACITY: usize = 256;

/// Process-wide fan-out for `SYSTEM` errors.
///
/// The worker publishes infrastructure failures here so an operator task
/// can surface them independently of per-order status streams. Publishing
/// never blocks; with no subscriber the error is dropped.
#[derive(Debug, Clone)]
pub struct CriticalErrorBus {
    tx: broadcast::Sender<EngineError>,
}

impl Default for CriticalErrorBus {
    fn default() -> Self {
        Self::new()
    }
}

impl CriticalErrorBus {
    /// Create a new bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tx: broadcast::channel(CRITICAL_BUS_CAPACITY).0,
        }
    }

    /// Publish an error if it is `SYSTEM`-kind; returns whether it was
    /// published to at least one subscriber.
    pub fn publish(&self, error: &EngineError) -> bool {
        if error.kind() != ErrorKind::System {
            return false;
        }
        self.tx.send(error.clone()).is_ok()
    }

    /// Subscribe to critical errors.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineError> {
        self.tx.subscribe()
    }
}
