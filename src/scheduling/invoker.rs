use super::clock::Clock;
use super::state::ScheduleState;
use crate::config::ScheduleFailurePolicy;
use crate::core::handler::{invoke_guarded, HandlerRef, HandlerResult, Invocation, RuntimeContext, Trigger};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Runs a scheduled handler and records the invocation in its state
#[derive(Clone)]
pub struct ScheduledInvoker {
    handler: HandlerRef,
    clock: Arc<dyn Clock>,
    failure_policy: ScheduleFailurePolicy,
    timeout: Option<Duration>,
}

impl ScheduledInvoker {
    pub fn new(handler: HandlerRef, clock: Arc<dyn Clock>) -> Self {
        Self {
            handler,
            clock,
            failure_policy: ScheduleFailurePolicy::Advance,
            timeout: None,
        }
    }

    pub fn with_failure_policy(mut self, policy: ScheduleFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn handler(&self) -> &HandlerRef {
        &self.handler
    }

    /// Call the handler, then set `previous_invocation` to the clock's time
    ///
    /// Under `ScheduleFailurePolicy::Advance` the state moves even when the
    /// handler fails; under `Retry` only a successful run is recorded.
    pub async fn invoke(&self, state: &mut ScheduleState, ctx: RuntimeContext) -> HandlerResult {
        let result = invoke_guarded(
            &self.handler,
            Invocation::new(Trigger::Schedule, ctx),
            self.timeout,
        )
        .await;

        let record = result.is_ok() || self.failure_policy == ScheduleFailurePolicy::Advance;
        if record {
            state.record_invocation(self.clock.now().timestamp());
        }

        match &result {
            Ok(_) => debug!(handler = self.handler.name(), "scheduler: invocation finished"),
            Err(e) => error!(
                handler = self.handler.name(),
                error = %e,
                recorded = record,
                "scheduler: invocation failed"
            ),
        }

        result
    }
}
