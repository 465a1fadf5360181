//! The order-processing pipeline.
//!
//! A pool of up to `concurrency` workers drains the queue. Each worker
//! owns one order from pickup to terminal status and drives the state
//! machine:
//!
//! ```text
//! pending -> routing -> building -> submitted -> confirmed
//!     \         \           \           \
//!      +---------+-----------+-----------+--> failed
//! ```
//!
//! Every transition is persisted (store + cache) and emitted on the
//! status hub. The quote phase and the swap phase are each wrapped by
//! the retry helper; when attempts are exhausted or the error is
//! non-retryable the worker marks the order `failed` and emits the
//! failure. Only when the worker cannot even record a terminal status
//! (the store itself failing) does the job error back to the queue for
//! backoff re-delivery.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{CriticalErrorBus, EngineError, ErrorKind};
use crate::executor::SwapExecutor;
use crate::models::{
    Order, OrderPatch, OrderStatus, Quote, RoutingDecision, SwapJob, SwapResult,
};
use crate::queue::WorkQueue;
use crate::resilience::{RetryPolicy, retry_with_backoff};
use crate::router::QuoteRouter;
use crate::store::{OrderCache, OrderStore};
use crate::stream::{StatusData, StatusStreamHub};

/// Everything a worker needs to process jobs.
pub struct PipelineWorker {
    store: Arc<dyn OrderStore>,
    cache: Arc<OrderCache>,
    queue: Arc<WorkQueue>,
    router: QuoteRouter,
    executor: SwapExecutor,
    hub: Arc<StatusStreamHub>,
    critical: CriticalErrorBus,
    retry: RetryPolicy,
}

impl PipelineWorker {
    /// Wire a worker against the shared components.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn OrderStore>,
        cache: Arc<OrderCache>,
        queue: Arc<WorkQueue>,
        router: QuoteRouter,
        executor: SwapExecutor,
        hub: Arc<StatusStreamHub>,
        critical: CriticalErrorBus,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            cache,
            queue,
            router,
            executor,
            hub,
            critical,
            retry,
        }
    }

    /// Process one job to a terminal order status.
    ///
    /// # Errors
    ///
    /// Returns an error only when a terminal status could not be
    /// persisted; the queue then owns re-delivery.
    pub async fn process_job(&self, job: &SwapJob) -> Result<(), EngineError> {
        let Some(order) = self.store.find_by_id(&job.order_id).await? else {
            return Err(EngineError::system(format!(
                "job references unknown order {}",
                job.order_id
            ))
            .non_retryable());
        };

        // A re-delivered job may find the order already settled.
        if order.status.is_terminal() {
            tracing::debug!(order_id = %job.order_id, status = %order.status, "order already terminal");
            return Ok(());
        }

        tracing::info!(
            order_id = %job.order_id,
            attempt = job.attempt,
            token_in = %job.token_in,
            token_out = %job.token_out,
            amount_in = job.amount_in,
            "processing order"
        );

        self.transition(&job.order_id, OrderStatus::Routing, OrderPatch::default(), None)
            .await?;

        let Some((best, decision)) = self.routing_phase(job).await? else {
            return Ok(());
        };

        self.transition(
            &job.order_id,
            OrderStatus::Building,
            OrderPatch {
                venue: Some(best.venue),
                history_metadata: serde_json::to_value(&decision).ok(),
                ..OrderPatch::default()
            },
            Some(StatusData {
                routing_decision: Some(decision),
                ..StatusData::default()
            }),
        )
        .await?;

        let Some(result) = self.swap_phase(job, &best).await? else {
            return Ok(());
        };

        self.transition(
            &job.order_id,
            OrderStatus::Submitted,
            OrderPatch {
                tx_hash: Some(result.tx_hash.clone()),
                ..OrderPatch::default()
            },
            Some(StatusData {
                tx_hash: Some(result.tx_hash.clone()),
                ..StatusData::default()
            }),
        )
        .await?;

        self.transition(
            &job.order_id,
            OrderStatus::Confirmed,
            OrderPatch {
                executed_price: Some(result.executed_price),
                executed_amount_in: Some(result.amount_in),
                executed_amount_out: Some(result.amount_out),
                ..OrderPatch::default()
            },
            Some(StatusData {
                tx_hash: Some(result.tx_hash.clone()),
                executed_price: Some(result.executed_price),
                ..StatusData::default()
            }),
        )
        .await?;

        self.settle(&job.order_id, OrderStatus::Confirmed);
        tracing::info!(
            order_id = %job.order_id,
            venue = %best.venue,
            tx_hash = %result.tx_hash,
            amount_out = result.amount_out,
            "order confirmed"
        );
        Ok(())
    }

    /// Acquire quotes and pick the winner; `None` means the order was
    /// failed terminally.
    async fn routing_phase(
        &self,
        job: &SwapJob,
    ) -> Result<Option<(Quote, RoutingDecision)>, EngineError> {
        let quotes = retry_with_backoff(&self.retry, "quote", |_| {
            self.router
                .get_quotes(&job.token_in, &job.token_out, job.amount_in)
        })
        .await;

        let quotes = match quotes {
            Ok(quotes) => quotes,
            Err(err) => {
                self.fail_order(&job.order_id, &err).await?;
                return Ok(None);
            }
        };

        match self.router.select_best(&quotes) {
            Ok(best) => {
                let decision = RoutingDecision::from_quotes(&quotes, best.venue);
                Ok(Some((best, decision)))
            }
            Err(err) => {
                self.fail_order(&job.order_id, &err).await?;
                Ok(None)
            }
        }
    }

    /// Execute the swap; `None` means the order was failed terminally.
    async fn swap_phase(
        &self,
        job: &SwapJob,
        best: &Quote,
    ) -> Result<Option<SwapResult>, EngineError> {
        let result = retry_with_backoff(&self.retry, "swap", |_| {
            self.executor.execute_swap(
                best,
                &job.token_in,
                &job.token_out,
                job.amount_in,
                Some(job.slippage),
            )
        })
        .await;

        match result {
            Ok(result) => Ok(Some(result)),
            Err(err) => {
                self.fail_order(&job.order_id, &err).await?;
                Ok(None)
            }
        }
    }

    /// Persist a transition, refresh the cache, and emit it.
    async fn transition(
        &self,
        order_id: &str,
        status: OrderStatus,
        patch: OrderPatch,
        data: Option<StatusData>,
    ) -> Result<Order, EngineError> {
        let updated = self.store.update_status(order_id, status, patch).await?;
        self.cache.set(updated.clone(), None);
        self.hub.emit(order_id, status, data);
        tracing::debug!(order_id, status = %status, "status transition");
        Ok(updated)
    }

    /// Mark the order failed and emit the terminal event.
    async fn fail_order(&self, order_id: &str, err: &EngineError) -> Result<(), EngineError> {
        if err.kind() == ErrorKind::System {
            self.critical.publish(err);
        }

        tracing::warn!(order_id, kind = %err.kind(), error = %err, "order failed");

        self.transition(
            order_id,
            OrderStatus::Failed,
            OrderPatch {
                failure_reason: Some(err.message().to_string()),
                ..OrderPatch::default()
            },
            Some(StatusData {
                error: Some(err.message().to_string()),
                ..StatusData::default()
            }),
        )
        .await?;

        self.settle(order_id, OrderStatus::Failed);
        Ok(())
    }

    /// Terminal bookkeeping: drop the cache entry and the subscribers.
    fn settle(&self, order_id: &str, status: OrderStatus) {
        self.cache.delete(order_id);
        self.hub.detach_all(order_id);
        crate::metrics::record_order_terminal(status);
        crate::metrics::record_queue_depth(&self.queue.metrics());
    }
}

/// Pool of workers draining the queue.
pub struct WorkerPool {
    worker: Arc<PipelineWorker>,
    concurrency: usize,
}

impl WorkerPool {
    /// Create a pool around a shared worker.
    #[must_use]
    pub fn new(worker: Arc<PipelineWorker>, concurrency: usize) -> Self {
        Self {
            worker,
            concurrency: concurrency.max(1),
        }
    }

    /// Spawn the worker tasks. They run until `shutdown` fires and the
    /// queue hands them nothing further.
    #[must_use]
    pub fn spawn(&self, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        (0..self.concurrency)
            .map(|worker_id| {
                let worker = Arc::clone(&self.worker);
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    tracing::debug!(worker_id, "worker started");
                    worker_loop(&worker, worker_id, shutdown).await;
                    tracing::debug!(worker_id, "worker stopped");
                })
            })
            .collect()
    }
}

async fn worker_loop(worker: &PipelineWorker, worker_id: usize, shutdown: CancellationToken) {
    while let Some(job) = worker.queue.next_job(&shutdown).await {
        let order_id = job.order_id.clone();
        match worker.process_job(&job).await {
            Ok(()) => worker.queue.complete(&order_id),
            Err(err) => {
                if err.kind() == ErrorKind::System {
                    worker.critical.publish(&err);
                }
                tracing::error!(
                    worker_id,
                    order_id = %order_id,
                    attempt = job.attempt,
                    error = %err,
                    "job processing errored"
                );

                if err.retryable() {
                    if !worker.queue.retry_later(job) {
                        best_effort_fail(worker, &order_id, &err).await;
                    }
                } else {
                    worker.queue.complete(&order_id);
                    best_effort_fail(worker, &order_id, &err).await;
                }
            }
        }
        crate::metrics::record_queue_depth(&worker.queue.metrics());
    }
}

/// Last-resort attempt to leave a terminal record once re-delivery is
/// off the table.
async fn best_effort_fail(worker: &PipelineWorker, order_id: &str, err: &EngineError) {
    if let Err(fail_err) = worker.fail_order(order_id, err).await {
        tracing::error!(
            order_id,
            error = %fail_err,
            "could not record terminal failure"
        );
    }
}
