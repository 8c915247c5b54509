//! Start/shutdown hooks and termination signals

use crate::core::handler::{invoke_guarded, HandlerRef, Invocation, RuntimeContext, Trigger};
use crate::core::registry::CapabilityBinding;
use crate::models::HookEvent;
use std::time::Duration;
use tracing::{error, info};

pub struct LifecycleCoordinator {
    on_start: Vec<HandlerRef>,
    on_shutdown: Vec<HandlerRef>,
    timeout: Option<Duration>,
}

impl LifecycleCoordinator {
    pub fn from_bindings(bindings: &[CapabilityBinding], timeout: Option<Duration>) -> Self {
        let mut on_start = Vec::new();
        let mut on_shutdown = Vec::new();
        for binding in bindings {
            if let CapabilityBinding::LifecycleHook { event, handler } = binding {
                match event {
                    HookEvent::OnStart => on_start.push(handler.clone()),
                    HookEvent::OnShutdown => on_shutdown.push(handler.clone()),
                }
            }
        }
        Self {
            on_start,
            on_shutdown,
            timeout,
        }
    }

    /// Run every hook for `event` in declaration order; returns how many failed
    pub async fn fire(&self, event: HookEvent, ctx: &RuntimeContext) -> usize {
        let hooks = match event {
            HookEvent::OnStart => &self.on_start,
            HookEvent::OnShutdown => &self.on_shutdown,
        };

        let mut failed = 0;
        for hook in hooks {
            let invocation = Invocation::new(Trigger::Hook(event), ctx.clone());
            if let Err(e) = invoke_guarded(hook, invocation, self.timeout).await {
                error!(hook = hook.name(), event = %event, error = %e, "lifecycle: hook failed");
                failed += 1;
            }
        }

        if !hooks.is_empty() {
            info!(event = %event, hooks = hooks.len(), failed, "lifecycle: hooks fired");
        }
        failed
    }
}

/// Resolves on SIGINT, or SIGTERM on unix
pub async fn wait_for_termination() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "lifecycle: unable to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "lifecycle: unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("lifecycle: received SIGINT"),
        _ = terminate => info!("lifecycle: received SIGTERM"),
    }
}
