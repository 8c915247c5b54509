//! Server topology and the single shared listener
//!
//! The topology is derived from the registry: HTTP, WebSocket and task
//! bindings all attach to one server. A listener is bound only when at least
//! one of them exists, and never more than once per runtime.

use super::http::{create_router, HttpState, WsMount};
use super::task::{TaskEnvelope, TaskPool, TaskReceiver, TaskSender};
use super::websocket::{ConnectionId, ConnectionRegistry, WsState};
use crate::config::AppConfig;
use crate::core::handler::RuntimeContext;
use crate::core::registry::{CapabilityBinding, CapabilityRegistry};
use crate::error::{HandlerError, RuntimeError, SetupError};
use crate::messaging::Publisher;
use crate::metrics::Metrics;
use crate::models::capability::validate_http_path;
use crate::models::CapabilityKind;
use axum::Router;
use serde::Serialize;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Transport kinds attached to the shared listener
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerTopology {
    pub http: bool,
    pub websocket: bool,
    pub task: bool,
}

impl ServerTopology {
    pub fn from_registry(registry: &CapabilityRegistry) -> Self {
        Self {
            http: registry.has(CapabilityKind::Http),
            websocket: registry.has(CapabilityKind::WebSocket),
            task: registry.has(CapabilityKind::Task),
        }
    }

    pub fn needs_listener(&self) -> bool {
        self.http || self.websocket || self.task
    }

    pub fn kinds(&self) -> Vec<CapabilityKind> {
        [
            (self.http, CapabilityKind::Http),
            (self.websocket, CapabilityKind::WebSocket),
            (self.task, CapabilityKind::Task),
        ]
        .into_iter()
        .filter_map(|(active, kind)| active.then_some(kind))
        .collect()
    }
}

/// The shared server as seen from handlers
#[derive(Clone)]
pub struct ServerHandle {
    tasks: Option<TaskSender>,
    connections: ConnectionRegistry,
}

impl ServerHandle {
    /// A handle plus the receiving end of its task channel, when tasks are enabled
    pub fn new(task_capacity: bool) -> (Self, Option<TaskReceiver>) {
        let (tasks, receiver) = if task_capacity {
            let (tx, rx) = mpsc::unbounded_channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        (
            Self {
                tasks,
                connections: ConnectionRegistry::new(),
            },
            receiver,
        )
    }

    /// Queue `{identifier, data}` for the task workers
    pub fn dispatch<T: Serialize + ?Sized>(&self, identifier: &str, data: &T) -> Result<(), HandlerError> {
        let tasks = self
            .tasks
            .as_ref()
            .ok_or_else(|| HandlerError::msg("no task bindings are registered"))?;
        let envelope = TaskEnvelope {
            identifier: identifier.to_string(),
            data: serde_json::to_value(data)?,
        };
        tasks
            .send(envelope)
            .map_err(|_| HandlerError::msg("task workers have shut down"))
    }

    /// Send a text frame to an open WebSocket connection
    pub async fn push(&self, connection: ConnectionId, text: impl Into<String>) -> bool {
        self.connections.push(connection, text).await
    }

    /// Currently open WebSocket connections
    pub async fn connections(&self) -> Vec<ConnectionId> {
        self.connections.ids().await
    }

    pub(crate) fn connection_registry(&self) -> &ConnectionRegistry {
        &self.connections
    }
}

impl fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerHandle")
            .field("tasks", &self.tasks.is_some())
            .finish()
    }
}

/// Result of composing the transport for one runtime
///
/// The listener is already bound; nothing is served until `launch`.
pub struct ComposedTransport {
    pub topology: ServerTopology,
    pub ctx: RuntimeContext,
    pub local_addr: Option<SocketAddr>,
    pending: Option<PendingServer>,
}

struct PendingServer {
    listener: TcpListener,
    router: Router,
    tasks: Option<(TaskPool, TaskReceiver)>,
}

impl ComposedTransport {
    /// Start serving and start the task workers
    pub fn launch(&mut self, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        let Some(pending) = self.pending.take() else {
            return Vec::new();
        };

        let mut handles = Vec::new();
        if let Some((pool, receiver)) = pending.tasks {
            handles.extend(pool.spawn(receiver, self.ctx.clone(), shutdown.clone()));
        }

        let listener = pending.listener;
        let router = pending.router;
        handles.push(tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "transport: server terminated with error");
            }
        }));

        if let Some(addr) = self.local_addr {
            info!(addr = %addr, kinds = ?self.topology.kinds(), "transport: serving");
        }
        handles
    }
}

pub struct TransportComposer {
    config: AppConfig,
    metrics: Option<Arc<Metrics>>,
}

impl TransportComposer {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the runtime context and, if the topology needs one, bind the listener
    pub async fn compose(
        &self,
        registry: &CapabilityRegistry,
        publisher: Option<Publisher>,
    ) -> Result<ComposedTransport, RuntimeError> {
        let topology = ServerTopology::from_registry(registry);

        if !topology.needs_listener() {
            info!("transport: no http, websocket or task bindings, no listener");
            return Ok(ComposedTransport {
                topology,
                ctx: RuntimeContext::new(None, publisher),
                local_addr: None,
                pending: None,
            });
        }

        if topology.websocket {
            validate_http_path(&self.config.transport.websocket_path)?;
        }

        let (server, task_receiver) = ServerHandle::new(topology.task);
        let ctx = RuntimeContext::new(Some(server.clone()), publisher);
        let timeout = self.handler_timeout();

        let websocket = topology.websocket.then(|| WsMount {
            path: self.config.transport.websocket_path.clone(),
            state: WsState {
                bindings: Arc::new(
                    registry
                        .bindings_of(CapabilityKind::WebSocket)
                        .iter()
                        .filter_map(|b| match b {
                            CapabilityBinding::WebSocket { event, handler } => {
                                Some((*event, handler.clone()))
                            }
                            _ => None,
                        })
                        .collect(),
                ),
                connections: server.connection_registry().clone(),
                ctx: ctx.clone(),
                timeout,
                metrics: self.metrics.clone(),
            },
        });

        let router = create_router(
            registry.bindings_of(CapabilityKind::Http),
            websocket,
            HttpState {
                ctx: ctx.clone(),
                timeout,
                metrics: self.metrics.clone(),
            },
            self.config.transport.expose_metrics,
        )?;

        let tasks = task_receiver.map(|receiver| {
            let bindings = registry
                .bindings_of(CapabilityKind::Task)
                .iter()
                .filter_map(|b| match b {
                    CapabilityBinding::Task {
                        identifier,
                        handler,
                    } => Some((identifier.clone(), handler.clone())),
                    _ => None,
                })
                .collect();
            let pool = TaskPool::new(bindings, self.config.runtime.task_workers)
                .with_timeout(timeout)
                .with_metrics(self.metrics.clone());
            (pool, receiver)
        });

        let listener = self.bind().await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, kinds = ?topology.kinds(), "transport: listener bound");

        Ok(ComposedTransport {
            topology,
            ctx,
            local_addr: Some(local_addr),
            pending: Some(PendingServer {
                listener,
                router,
                tasks,
            }),
        })
    }

    async fn bind(&self) -> Result<TcpListener, SetupError> {
        let addr = format!("{}:{}", self.config.transport.host, self.config.transport.port);
        let bound = TcpListener::bind(&addr).await;
        bound.map_err(|source| SetupError::Bind { addr, source })
    }

    fn handler_timeout(&self) -> Option<Duration> {
        match self.config.runtime.handler_timeout_seconds {
            0 => None,
            seconds => Some(Duration::from_secs(seconds)),
        }
    }
}
