//! Queue polling
//!
//! One poller per queue binding. Each tick receives a bounded batch and runs
//! the handler once per message. A message is deleted only after its handler
//! succeeded; a failed message stays in the queue for redelivery and does not
//! affect the rest of the batch. Receive failures count as an empty batch.

use super::client::{MessagingClient, QueueMessage};
use super::envelope::unwrap_notification;
use crate::config::MessagingSettings;
use crate::core::handler::{invoke_guarded, HandlerRef, Invocation, RuntimeContext, Trigger};
use crate::error::{MessagingError, PollError};
use crate::metrics::Metrics;
use crate::models::QueueSpec;
use backon::{ExponentialBuilder, Retryable};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const DELETE_ATTEMPTS: usize = 3;

/// A queue binding with its URL resolved at setup
#[derive(Debug, Clone)]
pub struct QueueBindingRuntime {
    pub spec: QueueSpec,
    pub queue_url: String,
    pub handler: HandlerRef,
}

/// Outcome of one poll tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub received: usize,
    pub processed: usize,
    pub failed: usize,
    pub errors: Vec<PollError>,
}

pub struct QueuePoller {
    binding: QueueBindingRuntime,
    client: Arc<dyn MessagingClient>,
    max_messages: u32,
    interval: Duration,
    timeout: Option<Duration>,
    metrics: Option<Arc<Metrics>>,
}

impl QueuePoller {
    pub fn new(
        binding: QueueBindingRuntime,
        client: Arc<dyn MessagingClient>,
        settings: &MessagingSettings,
    ) -> Self {
        Self {
            binding,
            client,
            max_messages: settings.max_messages_per_poll.clamp(1, 10),
            interval: Duration::from_secs(settings.poll_interval_seconds.max(1)),
            timeout: None,
            metrics: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn binding(&self) -> &QueueBindingRuntime {
        &self.binding
    }

    /// Receive one batch and dispatch every message in it
    pub async fn tick(&self, ctx: &RuntimeContext) -> PollReport {
        let mut report = PollReport::default();

        let messages = match self.receive().await {
            Ok(messages) => messages,
            Err(err) => {
                warn!(queue = self.binding.spec.queue_name(), error = %err, "poller: receive failed");
                self.count_poll_error();
                report.errors.push(err);
                return report;
            }
        };

        report.received = messages.len();
        if !messages.is_empty() {
            debug!(
                queue = self.binding.spec.queue_name(),
                count = messages.len(),
                "poller: received batch"
            );
        }

        for message in messages {
            match self.process(ctx, &message).await {
                Ok(true) => report.processed += 1,
                Ok(false) => report.failed += 1,
                Err(err) => {
                    report.processed += 1;
                    report.errors.push(err);
                }
            }
        }

        report
    }

    async fn receive(&self) -> Result<Vec<QueueMessage>, PollError> {
        self.client
            .receive_messages(&self.binding.queue_url, self.max_messages, 0)
            .await
            .map_err(|source| PollError::Receive {
                queue_url: self.binding.queue_url.clone(),
                source,
            })
    }

    /// `Ok(true)` when handled and deleted, `Ok(false)` when the handler failed
    async fn process(&self, ctx: &RuntimeContext, message: &QueueMessage) -> Result<bool, PollError> {
        let body = unwrap_notification(&message.body);
        let invocation = Invocation::new(Trigger::Queue(body), ctx.clone());

        if let Err(err) = invoke_guarded(&self.binding.handler, invocation, self.timeout).await {
            error!(
                queue = self.binding.spec.queue_name(),
                handler = self.binding.handler.name(),
                message_id = %message.message_id,
                error = %err,
                "poller: handler failed, message left for redelivery"
            );
            if let Some(metrics) = &self.metrics {
                metrics.queue_messages_failed_total.inc();
                metrics.record_handler_failure("queue");
            }
            return Ok(false);
        }

        if let Some(metrics) = &self.metrics {
            metrics.queue_messages_processed_total.inc();
        }

        self.delete(message).await.inspect_err(|err| {
            error!(queue = self.binding.spec.queue_name(), error = %err, "poller: delete failed");
            self.count_poll_error();
        })
    }

    async fn delete(&self, message: &QueueMessage) -> Result<bool, PollError> {
        let client = &self.client;
        let queue_url = self.binding.queue_url.as_str();
        let receipt_handle = message.receipt_handle.as_str();

        (|| client.delete_message(queue_url, receipt_handle))
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(50))
                    .with_max_times(DELETE_ATTEMPTS - 1),
            )
            .notify(|err: &MessagingError, after: Duration| {
                warn!(
                    queue_url,
                    error = %err,
                    retry_in_ms = after.as_millis() as u64,
                    "poller: delete failed, retrying"
                );
            })
            .await
            .map(|_| true)
            .map_err(|source| PollError::Delete {
                queue_url: queue_url.to_string(),
                message_id: message.message_id.clone(),
                source,
            })
    }

    fn count_poll_error(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.poll_errors_total.inc();
        }
    }

    /// Poll every interval until `shutdown` is cancelled
    pub fn spawn(self, ctx: RuntimeContext, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                queue = self.binding.spec.queue_name(),
                queue_url = %self.binding.queue_url,
                interval_s = self.interval.as_secs(),
                "poller: started"
            );

            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        self.tick(&ctx).await;
                    }
                }
            }

            info!(queue = self.binding.spec.queue_name(), "poller: stopped");
        })
    }
}
