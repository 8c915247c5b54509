//! Background tasks dispatched through the shared server

use crate::core::handler::{invoke_guarded, HandlerRef, Invocation, RuntimeContext, Trigger};
use crate::metrics::Metrics;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// `{identifier, data}` as queued by `ServerHandle::dispatch`
#[derive(Debug, Clone, PartialEq)]
pub struct TaskEnvelope {
    pub identifier: String,
    pub data: Value,
}

pub type TaskSender = mpsc::UnboundedSender<TaskEnvelope>;
pub type TaskReceiver = mpsc::UnboundedReceiver<TaskEnvelope>;

/// Workers draining the task channel
pub struct TaskPool {
    bindings: Arc<Vec<(String, HandlerRef)>>,
    workers: usize,
    timeout: Option<Duration>,
    metrics: Option<Arc<Metrics>>,
}

impl TaskPool {
    pub fn new(bindings: Vec<(String, HandlerRef)>, workers: usize) -> Self {
        Self {
            bindings: Arc::new(bindings),
            workers: workers.max(1),
            timeout: None,
            metrics: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<Metrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Spawn the workers; each exits when `shutdown` fires or the channel closes
    pub fn spawn(
        self,
        receiver: TaskReceiver,
        ctx: RuntimeContext,
        shutdown: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        let receiver = Arc::new(Mutex::new(receiver));
        info!(workers = self.workers, tasks = self.bindings.len(), "tasks: starting workers");

        (0..self.workers)
            .map(|worker| {
                let receiver = receiver.clone();
                let bindings = self.bindings.clone();
                let metrics = self.metrics.clone();
                let ctx = ctx.clone();
                let shutdown = shutdown.clone();
                let timeout = self.timeout;

                tokio::spawn(async move {
                    loop {
                        let next = {
                            let mut rx = receiver.lock().await;
                            tokio::select! {
                                _ = shutdown.cancelled() => None,
                                task = rx.recv() => task,
                            }
                        };
                        let Some(task) = next else { break };
                        run_task(&bindings, task, &ctx, timeout, metrics.as_deref()).await;
                    }
                    debug!(worker, "tasks: worker stopped");
                })
            })
            .collect()
    }
}

async fn run_task(
    bindings: &[(String, HandlerRef)],
    task: TaskEnvelope,
    ctx: &RuntimeContext,
    timeout: Option<Duration>,
    metrics: Option<&Metrics>,
) {
    let mut matched = false;
    for (identifier, handler) in bindings {
        if *identifier != task.identifier {
            continue;
        }
        matched = true;
        let invocation = Invocation::new(Trigger::Task(task.data.clone()), ctx.clone());
        if let Err(e) = invoke_guarded(handler, invocation, timeout).await {
            error!(
                task = %task.identifier,
                handler = handler.name(),
                error = %e,
                "tasks: handler failed, task dropped"
            );
            if let Some(metrics) = metrics {
                metrics.record_handler_failure("task");
            }
        }
    }

    if !matched {
        warn!(task = %task.identifier, "tasks: no handler for task identifier");
    } else if let Some(metrics) = metrics {
        metrics.tasks_run_total.inc();
    }
}
