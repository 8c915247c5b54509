//! Core runtime primitives: handlers, the capability registry, lifecycle and the composition root

pub mod handler;
pub mod lifecycle;
pub mod registry;
pub mod runtime;

pub use handler::{
    HandlerRef, HandlerResult, HttpRequest, Invocation, Reply, RuntimeContext, Trigger, WsFrame,
};
pub use lifecycle::LifecycleCoordinator;
pub use registry::{CapabilityBinding, CapabilityRegistry, Declarations, Marker, MethodDecl, Service};
pub use runtime::{Runtime, RunningRuntime};
