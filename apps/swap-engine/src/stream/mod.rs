//! Live status fan-out to subscribed clients.
//!
//! The hub maps order identifiers to sets of subscribers and pushes every
//! state transition to all of them. Subscribers are bounded mpsc senders;
//! a subscriber whose channel is closed is pruned on the next emission,
//! and the submission endpoint detaches explicitly on disconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::models::{OrderStatus, RoutingDecision};

/// Capacity of each subscriber's channel.
const SUBSCRIBER_CHANNEL_CAPACITY: usize = 64;

/// Payload attached to selected status updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusData {
    /// Transaction identifier (`submitted` and `confirmed`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Realized price (`confirmed`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_price: Option<Decimal>,
    /// Failure description (`failed`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Venue comparison (`building`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_decision: Option<RoutingDecision>,
}

/// One status transition as sent to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    /// Order the update belongs to.
    pub order_id: String,
    /// Status entered.
    pub status: OrderStatus,
    /// Milliseconds since the epoch.
    pub timestamp: i64,
    /// Status-specific payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<StatusData>,
}

impl StatusUpdate {
    /// Build an update stamped with the current time.
    #[must_use]
    pub fn now(order_id: impl Into<String>, status: OrderStatus, data: Option<StatusData>) -> Self {
        Self {
            order_id: order_id.into(),
            status,
            timestamp: Utc::now().timestamp_millis(),
            data,
        }
    }
}

/// Handle identifying one subscriber on one order.
pub type SubscriberId = u64;

#[derive(Debug)]
struct Subscriber {
    id: SubscriberId,
    tx: mpsc::Sender<StatusUpdate>,
}

/// Fan-out hub for order status streams.
#[derive(Debug, Default)]
pub struct StatusStreamHub {
    subscribers: RwLock<HashMap<String, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl StatusStreamHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for `order_id`.
    ///
    /// Returns the subscriber handle (for [`detach`](Self::detach)) and
    /// the receiving end of its channel. The channel closes when the
    /// subscriber is detached, the order completes, or the hub shuts
    /// down.
    #[must_use]
    pub fn attach(&self, order_id: &str) -> (SubscriberId, mpsc::Receiver<StatusUpdate>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.subscribers
            .write()
            .entry(order_id.to_string())
            .or_default()
            .push(Subscriber { id, tx });

        tracing::debug!(order_id, subscriber_id = id, "subscriber attached");
        (id, rx)
    }

    /// Send a status update to every subscriber of `order_id`.
    ///
    /// Subscribers whose channel is closed are pruned. Returns the number
    /// of subscribers the update was delivered to.
    pub fn emit(&self, order_id: &str, status: OrderStatus, data: Option<StatusData>) -> usize {
        let update = StatusUpdate::now(order_id, status, data);

        let mut subscribers = self.subscribers.write();
        let Some(entries) = subscribers.get_mut(order_id) else {
            return 0;
        };

        let mut delivered = 0;
        entries.retain(|subscriber| match subscriber.tx.try_send(update.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    order_id,
                    subscriber_id = subscriber.id,
                    "subscriber channel full, dropping update"
                );
                crate::metrics::record_stream_message_dropped();
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(
                    order_id,
                    subscriber_id = subscriber.id,
                    "pruning closed subscriber"
                );
                false
            }
        });

        if entries.is_empty() {
            subscribers.remove(order_id);
        }

        crate::metrics::record_stream_messages_sent(delivered as u64);
        delivered
    }

    /// Remove one subscriber; its channel closes. Removes the order's
    /// mapping when the set becomes empty.
    pub fn detach(&self, order_id: &str, subscriber_id: SubscriberId) {
        let mut subscribers = self.subscribers.write();
        if let Some(entries) = subscribers.get_mut(order_id) {
            entries.retain(|s| s.id != subscriber_id);
            if entries.is_empty() {
                subscribers.remove(order_id);
            }
        }
    }

    /// Drop every subscriber of `order_id` (order completion).
    pub fn detach_all(&self, order_id: &str) {
        self.subscribers.write().remove(order_id);
    }

    /// Drop every subscriber of every order (process shutdown).
    pub fn close_all(&self) {
        let mut subscribers = self.subscribers.write();
        let total: usize = subscribers.values().map(Vec::len).sum();
        subscribers.clear();
        tracing::info!(closed = total, "status stream hub closed");
    }

    /// Number of subscribers currently attached to `order_id`.
    #[must_use]
    pub fn subscriber_count(&self, order_id: &str) -> usize {
        self.subscribers
            .read()
            .get(order_id)
            .map_or(0, Vec::len)
    }

    /// Total subscribers across all orders.
    #[must_use]
    pub fn total_subscribers(&self) -> usize {
        self.subscribers.read().values().map(Vec::len).sum()
    }
}
