//! Composition root
//!
//! Startup order: scan the service, provision queues, compose the transport
//! (binding the listener), build the scheduler and pollers, fire `onStart`
//! hooks, then start serving and ticking. Shutdown fires `onShutdown` hooks
//! before stopping the loops and closing the listener.

use crate::config::{AppConfig, AwsEnvironment};
use crate::core::handler::RuntimeContext;
use crate::core::lifecycle::{wait_for_termination, LifecycleCoordinator};
use crate::core::registry::{CapabilityBinding, CapabilityRegistry, Service};
use crate::error::{ConfigurationError, RuntimeError};
use crate::messaging::{MessagingClient, Publisher, QueueBindingRuntime, QueuePoller, QueueProvisioner};
use crate::metrics::Metrics;
use crate::models::{CapabilityKind, HookEvent};
use crate::scheduling::{Clock, SchedulerEngine, SystemClock};
use crate::transport::ServerTopology;
use crate::transport::TransportComposer;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct Runtime<S: Service> {
    service: Arc<S>,
    config: Option<AppConfig>,
    clock: Arc<dyn Clock>,
    messaging: Option<Arc<dyn MessagingClient>>,
    aws: Option<AwsEnvironment>,
}

impl<S: Service> Runtime<S> {
    pub fn new(service: S) -> Self {
        Self {
            service: Arc::new(service),
            config: None,
            clock: Arc::new(SystemClock),
            messaging: None,
            aws: None,
        }
    }

    /// Use `config` as is; environment overrides are not applied
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_messaging(mut self, client: Arc<dyn MessagingClient>) -> Self {
        self.messaging = Some(client);
        self
    }

    pub fn with_aws_environment(mut self, aws: AwsEnvironment) -> Self {
        self.aws = Some(aws);
        self
    }

    /// Run the full startup sequence
    pub async fn start(self) -> Result<RunningRuntime, RuntimeError> {
        let registry = CapabilityRegistry::scan(self.service.clone())?;
        let config = match self.config {
            Some(config) => config,
            None => self.service.config().with_env_overrides()?,
        };
        let metrics = Arc::new(Metrics::new()?);
        let timeout = match config.runtime.handler_timeout_seconds {
            0 => None,
            seconds => Some(Duration::from_secs(seconds)),
        };

        info!(
            service = %config.runtime.service_name,
            handlers = registry.handlers().len(),
            "runtime: starting"
        );

        let queues = provision_queues(&registry, &config, self.messaging.as_ref(), self.aws).await?;

        let publisher = self.messaging.clone().map(Publisher::new);
        let mut transport = TransportComposer::new(config.clone())
            .with_metrics(metrics.clone())
            .compose(&registry, publisher)
            .await?;
        let ctx = transport.ctx.clone();

        let scheduler = SchedulerEngine::from_bindings(
            registry.bindings_of(CapabilityKind::Schedule),
            self.clock.clone(),
            &config.runtime,
        )
        .with_metrics(metrics.clone());

        let pollers: Vec<QueuePoller> = match &self.messaging {
            Some(client) => queues
                .into_iter()
                .map(|binding| {
                    QueuePoller::new(binding, client.clone(), &config.messaging)
                        .with_timeout(timeout)
                        .with_metrics(metrics.clone())
                })
                .collect(),
            None => Vec::new(),
        };

        let lifecycle = LifecycleCoordinator::from_bindings(
            registry.bindings_of(CapabilityKind::Hook),
            timeout,
        );
        lifecycle.fire(HookEvent::OnStart, &ctx).await;

        let shutdown = CancellationToken::new();
        let mut handles = transport.launch(shutdown.clone());
        if !scheduler.is_empty() {
            handles.extend(scheduler.spawn(ctx.clone(), shutdown.clone()));
        }
        for poller in pollers {
            handles.push(poller.spawn(ctx.clone(), shutdown.clone()));
        }

        info!(
            service = %config.runtime.service_name,
            addr = ?transport.local_addr,
            tasks = handles.len(),
            "runtime: started"
        );

        Ok(RunningRuntime {
            topology: transport.topology,
            local_addr: transport.local_addr,
            ctx,
            metrics,
            lifecycle,
            shutdown,
            handles,
        })
    }

    /// Start, wait for SIGINT/SIGTERM, then shut down
    pub async fn run(self) -> Result<(), RuntimeError> {
        let running = self.start().await?;
        wait_for_termination().await;
        running.shutdown().await;
        Ok(())
    }
}

async fn provision_queues(
    registry: &CapabilityRegistry,
    config: &AppConfig,
    client: Option<&Arc<dyn MessagingClient>>,
    aws: Option<AwsEnvironment>,
) -> Result<Vec<QueueBindingRuntime>, RuntimeError> {
    let bindings = registry.bindings_of(CapabilityKind::Queue);
    if bindings.is_empty() {
        return Ok(Vec::new());
    }

    let client = client.ok_or(ConfigurationError::MissingMessagingClient)?;
    let aws = match aws {
        Some(aws) => aws,
        None => AwsEnvironment::from_env()?,
    };
    let provisioner = QueueProvisioner::new(client.clone(), config.messaging.clone(), aws);

    let mut queues = Vec::with_capacity(bindings.len());
    for binding in bindings {
        if let CapabilityBinding::Queue { spec, handler } = binding {
            let provisioned = provisioner.setup(spec).await?;
            queues.push(QueueBindingRuntime {
                spec: spec.clone(),
                queue_url: provisioned.queue_url,
                handler: handler.clone(),
            });
        }
    }
    Ok(queues)
}

/// A started runtime
pub struct RunningRuntime {
    topology: ServerTopology,
    local_addr: Option<SocketAddr>,
    ctx: RuntimeContext,
    metrics: Arc<Metrics>,
    lifecycle: LifecycleCoordinator,
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl RunningRuntime {
    /// Address of the shared listener, if one was bound
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn topology(&self) -> ServerTopology {
        self.topology
    }

    pub fn context(&self) -> &RuntimeContext {
        &self.ctx
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Fire `onShutdown` hooks, stop every loop and close the listener
    pub async fn shutdown(self) {
        info!("runtime: shutting down");
        self.lifecycle.fire(HookEvent::OnShutdown, &self.ctx).await;
        self.shutdown.cancel();

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        for mut handle in self.handles {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                warn!("runtime: task did not stop in time, aborting");
                handle.abort();
            }
        }
        info!("runtime: stopped");
    }
}
