//! Core domain types: orders, quotes, swaps, and queue jobs.

mod job;
mod order;
mod quote;

pub use job::SwapJob;
pub use order::{NewOrder, Order, OrderPatch, OrderStatus, StatusHistoryEntry};
pub use quote::{Quote, RoutingDecision, SwapParams, SwapResult, Venue};
