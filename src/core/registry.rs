//! Capability registry
//!
//! A service declares its handlers once through `Service::declare`. Markers are
//! validated as they are attached, so a malformed declaration fails the scan
//! before anything starts serving. The scan result is cached per method and per
//! kind; lookups afterwards are plain slice borrows.

use crate::config::AppConfig;
use crate::core::handler::{HandlerFn, HandlerRef, HandlerResult, Invocation};
use crate::error::ConfigurationError;
use crate::models::capability::{route_shape, validate_http_path};
use crate::models::{
    CapabilityKind, HookEvent, HttpMethod, QueueSpec, SchedulePolicy, WebSocketEvent,
};
use futures_util::FutureExt;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

/// A user service whose handlers the runtime dispatches to
pub trait Service: Send + Sync + Sized + 'static {
    /// Declare every handler and the markers attached to it
    fn declare(decl: &mut Declarations<Self>) -> Result<(), ConfigurationError>;

    /// Base configuration; environment overrides are applied on top
    fn config(&self) -> AppConfig {
        AppConfig::default()
    }
}

/// Metadata attached to one handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Http { method: HttpMethod, path: String },
    WebSocket(WebSocketEvent),
    Task(String),
    Schedule(SchedulePolicy),
    Queue(QueueSpec),
    Hook(HookEvent),
}

impl Marker {
    pub fn http(method: &str, path: &str) -> Result<Self, ConfigurationError> {
        Ok(Marker::Http {
            method: method.parse()?,
            path: validate_http_path(path)?,
        })
    }

    pub fn websocket(event: &str) -> Result<Self, ConfigurationError> {
        Ok(Marker::WebSocket(event.parse()?))
    }

    pub fn task(identifier: &str) -> Result<Self, ConfigurationError> {
        if identifier.trim().is_empty() {
            return Err(ConfigurationError::EmptyTaskIdentifier);
        }
        Ok(Marker::Task(identifier.to_string()))
    }

    pub fn queue(topic: &str, queue: &str, dlq: Option<&str>) -> Result<Self, ConfigurationError> {
        Ok(Marker::Queue(QueueSpec::new(topic, queue, dlq)?))
    }

    pub fn kind(&self) -> CapabilityKind {
        match self {
            Marker::Http { .. } => CapabilityKind::Http,
            Marker::WebSocket(_) => CapabilityKind::WebSocket,
            Marker::Task(_) => CapabilityKind::Task,
            Marker::Schedule(_) => CapabilityKind::Schedule,
            Marker::Queue(_) => CapabilityKind::Queue,
            Marker::Hook(_) => CapabilityKind::Hook,
        }
    }

    fn bind(&self, handler: &HandlerRef) -> CapabilityBinding {
        let handler = handler.clone();
        match self.clone() {
            Marker::Http { method, path } => CapabilityBinding::HttpRoute {
                method,
                path,
                handler,
            },
            Marker::WebSocket(event) => CapabilityBinding::WebSocket { event, handler },
            Marker::Task(identifier) => CapabilityBinding::Task {
                identifier,
                handler,
            },
            Marker::Schedule(policy) => CapabilityBinding::Schedule { policy, handler },
            Marker::Queue(spec) => CapabilityBinding::Queue { spec, handler },
            Marker::Hook(event) => CapabilityBinding::LifecycleHook { event, handler },
        }
    }
}

/// A handler paired with the trigger condition that invokes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityBinding {
    HttpRoute {
        method: HttpMethod,
        path: String,
        handler: HandlerRef,
    },
    WebSocket {
        event: WebSocketEvent,
        handler: HandlerRef,
    },
    Task {
        identifier: String,
        handler: HandlerRef,
    },
    Schedule {
        policy: SchedulePolicy,
        handler: HandlerRef,
    },
    Queue {
        spec: QueueSpec,
        handler: HandlerRef,
    },
    LifecycleHook {
        event: HookEvent,
        handler: HandlerRef,
    },
}

impl CapabilityBinding {
    pub fn kind(&self) -> CapabilityKind {
        match self {
            CapabilityBinding::HttpRoute { .. } => CapabilityKind::Http,
            CapabilityBinding::WebSocket { .. } => CapabilityKind::WebSocket,
            CapabilityBinding::Task { .. } => CapabilityKind::Task,
            CapabilityBinding::Schedule { .. } => CapabilityKind::Schedule,
            CapabilityBinding::Queue { .. } => CapabilityKind::Queue,
            CapabilityBinding::LifecycleHook { .. } => CapabilityKind::Hook,
        }
    }

    pub fn handler(&self) -> &HandlerRef {
        match self {
            CapabilityBinding::HttpRoute { handler, .. }
            | CapabilityBinding::WebSocket { handler, .. }
            | CapabilityBinding::Task { handler, .. }
            | CapabilityBinding::Schedule { handler, .. }
            | CapabilityBinding::Queue { handler, .. }
            | CapabilityBinding::LifecycleHook { handler, .. } => handler,
        }
    }
}

struct DeclaredMethod {
    handler: HandlerRef,
    markers: Vec<Marker>,
}

/// Collects handler declarations for one service instance
pub struct Declarations<S> {
    service: Arc<S>,
    methods: Vec<DeclaredMethod>,
}

impl<S: Service> Declarations<S> {
    pub(crate) fn new(service: Arc<S>) -> Self {
        Self {
            service,
            methods: Vec::new(),
        }
    }

    /// Register `f` under `name`; markers are attached through the returned builder
    pub fn method<F, Fut>(&mut self, name: &str, f: F) -> Result<MethodDecl<'_>, ConfigurationError>
    where
        F: Fn(Arc<S>, Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        if self.methods.iter().any(|m| m.handler.name() == name) {
            return Err(ConfigurationError::DuplicateHandler(name.to_string()));
        }

        let service = self.service.clone();
        let func: Arc<HandlerFn> = Arc::new(move |inv| f(service.clone(), inv).boxed());

        let index = self.methods.len();
        self.methods.push(DeclaredMethod {
            handler: HandlerRef::new(name, func),
            markers: Vec::new(),
        });

        Ok(MethodDecl {
            method: &mut self.methods[index],
        })
    }
}

/// Attaches markers to the method that was just declared
pub struct MethodDecl<'a> {
    method: &'a mut DeclaredMethod,
}

impl<'a> MethodDecl<'a> {
    pub fn mark(self, marker: Marker) -> Self {
        self.method.markers.push(marker);
        self
    }

    pub fn http(self, method: &str, path: &str) -> Result<Self, ConfigurationError> {
        Ok(self.mark(Marker::http(method, path)?))
    }

    pub fn websocket(self, event: &str) -> Result<Self, ConfigurationError> {
        Ok(self.mark(Marker::websocket(event)?))
    }

    pub fn task(self, identifier: &str) -> Result<Self, ConfigurationError> {
        Ok(self.mark(Marker::task(identifier)?))
    }

    pub fn schedule(self, policy: SchedulePolicy) -> Self {
        self.mark(Marker::Schedule(policy))
    }

    pub fn queue(self, topic: &str, queue: &str, dlq: Option<&str>) -> Result<Self, ConfigurationError> {
        Ok(self.mark(Marker::queue(topic, queue, dlq)?))
    }

    pub fn hook(self, event: HookEvent) -> Self {
        self.mark(Marker::Hook(event))
    }
}

/// Immutable result of scanning one service
pub struct CapabilityRegistry {
    handlers: Vec<HandlerRef>,
    markers: HashMap<String, Vec<Marker>>,
    by_kind: HashMap<CapabilityKind, Vec<CapabilityBinding>>,
}

impl CapabilityRegistry {
    /// Scan `service` once, validating and caching every declaration
    pub fn scan<S: Service>(service: Arc<S>) -> Result<Self, ConfigurationError> {
        let mut decl = Declarations::new(service);
        S::declare(&mut decl)?;

        let mut handlers = Vec::with_capacity(decl.methods.len());
        let mut markers = HashMap::with_capacity(decl.methods.len());
        let mut by_kind: HashMap<CapabilityKind, Vec<CapabilityBinding>> = HashMap::new();
        let mut routes = HashSet::new();
        let mut shapes: HashMap<String, String> = HashMap::new();

        for method in decl.methods {
            for marker in &method.markers {
                if let Marker::Http { method: verb, path } = marker {
                    let shape = route_shape(path);
                    if !routes.insert((*verb, shape.clone())) {
                        return Err(ConfigurationError::DuplicateRoute {
                            method: verb.to_string(),
                            path: path.clone(),
                        });
                    }
                    let existing = shapes.entry(shape).or_insert_with(|| path.clone());
                    if existing != path {
                        return Err(ConfigurationError::ConflictingRoute {
                            path: path.clone(),
                            existing: existing.clone(),
                        });
                    }
                }
                by_kind
                    .entry(marker.kind())
                    .or_default()
                    .push(marker.bind(&method.handler));
            }

            debug!(
                handler = method.handler.name(),
                markers = method.markers.len(),
                "registry: scanned handler"
            );
            markers.insert(method.handler.name().to_string(), method.markers);
            handlers.push(method.handler);
        }

        let registry = Self {
            handlers,
            markers,
            by_kind,
        };

        info!(
            handlers = registry.handlers.len(),
            http = registry.bindings_of(CapabilityKind::Http).len(),
            websocket = registry.bindings_of(CapabilityKind::WebSocket).len(),
            task = registry.bindings_of(CapabilityKind::Task).len(),
            schedule = registry.bindings_of(CapabilityKind::Schedule).len(),
            queue = registry.bindings_of(CapabilityKind::Queue).len(),
            hook = registry.bindings_of(CapabilityKind::Hook).len(),
            "registry: scan complete"
        );

        Ok(registry)
    }

    /// All bindings of `kind`, in declaration order
    pub fn bindings_of(&self, kind: CapabilityKind) -> &[CapabilityBinding] {
        self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has(&self, kind: CapabilityKind) -> bool {
        !self.bindings_of(kind).is_empty()
    }

    /// Markers declared on the handler named `method`
    pub fn markers_of(&self, method: &str) -> Option<&[Marker]> {
        self.markers.get(method).map(Vec::as_slice)
    }

    pub fn handler(&self, method: &str) -> Option<&HandlerRef> {
        self.handlers.iter().find(|h| h.name() == method)
    }

    pub fn handlers(&self) -> &[HandlerRef] {
        &self.handlers
    }
}
