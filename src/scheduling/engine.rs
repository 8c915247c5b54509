//! Scheduler engine
//!
//! Each schedule binding becomes a `ScheduleEntry` that owns its state. When
//! spawned, every entry gets its own tick loop, so a slow handler only delays
//! its own binding. Within a loop an invocation always runs to completion
//! before the next tick is evaluated.

use super::clock::Clock;
use super::evaluator::should_run;
use super::invoker::ScheduledInvoker;
use super::state::ScheduleState;
use crate::config::RuntimeSettings;
use crate::core::handler::{HandlerResult, RuntimeContext};
use crate::core::registry::CapabilityBinding;
use crate::metrics::Metrics;
use crate::models::SchedulePolicy;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// One scheduled binding with its exclusively owned state
pub struct ScheduleEntry {
    policy: SchedulePolicy,
    state: ScheduleState,
    invoker: ScheduledInvoker,
}

impl ScheduleEntry {
    pub fn new(policy: SchedulePolicy, invoker: ScheduledInvoker) -> Self {
        Self {
            policy,
            state: ScheduleState::new(),
            invoker,
        }
    }

    pub fn policy(&self) -> &SchedulePolicy {
        &self.policy
    }

    pub fn state(&self) -> &ScheduleState {
        &self.state
    }

    pub fn handler_name(&self) -> &str {
        self.invoker.handler().name()
    }

    /// Evaluate against `clock` and invoke if due; `None` when not due
    pub async fn run_if_due(&mut self, clock: &dyn Clock, ctx: &RuntimeContext) -> Option<HandlerResult> {
        if !should_run(&self.policy, &self.state, &clock.now()) {
            return None;
        }
        debug!(
            handler = self.handler_name(),
            kind = %self.policy.kind(),
            "scheduler: binding due"
        );
        Some(self.invoker.invoke(&mut self.state, ctx.clone()).await)
    }
}

pub struct SchedulerEngine {
    entries: Vec<ScheduleEntry>,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl SchedulerEngine {
    pub fn new(clock: Arc<dyn Clock>, tick_interval: Duration) -> Self {
        Self {
            entries: Vec::new(),
            clock,
            tick_interval,
            metrics: None,
        }
    }

    /// Build one entry per `Schedule` binding, in declaration order
    pub fn from_bindings(
        bindings: &[CapabilityBinding],
        clock: Arc<dyn Clock>,
        settings: &RuntimeSettings,
    ) -> Self {
        let timeout = match settings.handler_timeout_seconds {
            0 => None,
            seconds => Some(Duration::from_secs(seconds)),
        };
        let tick = Duration::from_millis(settings.scheduler_tick_millis.max(1));

        let mut engine = Self::new(clock.clone(), tick);
        for binding in bindings {
            if let CapabilityBinding::Schedule { policy, handler } = binding {
                let invoker = ScheduledInvoker::new(handler.clone(), clock.clone())
                    .with_failure_policy(settings.schedule_failure_policy)
                    .with_timeout(timeout);
                engine.push(ScheduleEntry::new(*policy, invoker));
            }
        }
        engine
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn push(&mut self, entry: ScheduleEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One evaluation pass over every entry; returns how many were invoked
    pub async fn tick(&mut self, ctx: &RuntimeContext) -> usize {
        let mut invoked = 0;
        for entry in &mut self.entries {
            if let Some(result) = entry.run_if_due(self.clock.as_ref(), ctx).await {
                record(self.metrics.as_deref(), &result);
                invoked += 1;
            }
        }
        invoked
    }

    /// Start one tick loop per entry; loops exit when `shutdown` is cancelled
    pub fn spawn(self, ctx: RuntimeContext, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        info!(
            entries = self.entries.len(),
            tick_ms = self.tick_interval.as_millis() as u64,
            "scheduler: starting"
        );

        self.entries
            .into_iter()
            .map(|mut entry| {
                let clock = self.clock.clone();
                let metrics = self.metrics.clone();
                let ctx = ctx.clone();
                let shutdown = shutdown.clone();
                let period = self.tick_interval;

                tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                    loop {
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = ticker.tick() => {
                                if let Some(result) = entry.run_if_due(clock.as_ref(), &ctx).await {
                                    record(metrics.as_deref(), &result);
                                }
                            }
                        }
                    }

                    debug!(handler = entry.handler_name(), "scheduler: tick loop stopped");
                })
            })
            .collect()
    }
}

fn record(metrics: Option<&Metrics>, result: &HandlerResult) {
    let Some(metrics) = metrics else {
        return;
    };
    metrics.scheduled_invocations_total.inc();
    if result.is_err() {
        metrics.record_handler_failure("schedule");
    }
}
