//! Switchyard
//!
//! A declarative runtime dispatcher. A service declares its handlers once,
//! each tagged with the capabilities that trigger it (HTTP routes, WebSocket
//! events, background tasks, schedules, queue subscriptions and lifecycle
//! hooks). `Runtime` scans the declarations, provisions queues, composes a
//! single shared listener and drives every loop until termination.

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod metrics;
pub mod models;
pub mod scheduling;
pub mod transport;

pub use crate::config::AppConfig;
pub use crate::core::{
    CapabilityBinding, CapabilityRegistry, Declarations, HttpRequest, Invocation, Reply, Runtime,
    RunningRuntime, RuntimeContext, Service, Trigger,
};
pub use crate::error::{
    ConfigurationError, HandlerError, MessagingError, PollError, RuntimeError, SetupError,
};
pub use crate::models::{HookEvent, SchedulePolicy};
