//! Error taxonomy for the runtime
//!
//! - `ConfigurationError`: invalid declarations or configuration, fatal before serving
//! - `SetupError`: listener or queue provisioning failure, fatal at startup
//! - `PollError`: receive/delete failure, logged and retried next tick
//! - `HandlerError`: a handler failed; recovered where it was invoked

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("invalid HTTP method: {0}")]
    InvalidHttpMethod(String),

    #[error("invalid HTTP path '{0}': paths must start with '/'")]
    InvalidHttpPath(String),

    #[error("invalid WebSocket event: {0}")]
    InvalidWebSocketEvent(String),

    #[error("{kind} schedule requires {field}")]
    MissingScheduleField {
        kind: &'static str,
        field: &'static str,
    },

    #[error("{field} out of range: {value} (must be below {limit})")]
    ScheduleFieldOutOfRange {
        field: &'static str,
        value: u32,
        limit: u32,
    },

    #[error("invalid {field} '{value}': must match ^[A-Za-z0-9_-]+")]
    InvalidResourceName { field: &'static str, value: String },

    #[error("task identifier must not be empty")]
    EmptyTaskIdentifier,

    #[error("handler '{0}' declared more than once")]
    DuplicateHandler(String),

    #[error("route {method} {path} is declared more than once")]
    DuplicateRoute { method: String, path: String },

    #[error("route {path} conflicts with {existing}: captures at the same position must share a name")]
    ConflictingRoute { path: String, existing: String },

    #[error("route GET {0} collides with the websocket endpoint")]
    WebSocketRouteConflict(String),

    #[error("environment variable {env_var}='{value}' is not a valid {expected}")]
    InvalidOverride {
        env_var: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("{0} must be set in the environment")]
    MissingEnvironment(&'static str),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("queue bindings require a messaging client")]
    MissingMessagingClient,
}

/// Failure reported by a messaging collaborator
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessagingError {
    #[error("{code}: {message}")]
    Service { code: String, message: String },

    #[error("messaging transport error: {0}")]
    Transport(String),

    #[error("failed to encode message to JSON: {0}")]
    Encode(String),
}

impl MessagingError {
    pub fn service(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The service error code, if the collaborator reported one
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Service { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encode(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("unable to bind listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to {step} '{resource}': {source}")]
    Provisioning {
        step: &'static str,
        resource: String,
        #[source]
        source: MessagingError,
    },

    #[error("missing attribute {attribute} for queue {queue_url}")]
    MissingQueueAttribute {
        attribute: &'static str,
        queue_url: String,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PollError {
    #[error("receive from {queue_url} failed: {source}")]
    Receive {
        queue_url: String,
        #[source]
        source: MessagingError,
    },

    #[error("delete of message {message_id} from {queue_url} failed: {source}")]
    Delete {
        queue_url: String,
        message_id: String,
        #[source]
        source: MessagingError,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("handler panicked: {0}")]
    Panicked(String),

    #[error("handler timed out after {0:?}")]
    TimedOut(Duration),
}

impl HandlerError {
    pub fn msg(message: impl std::fmt::Display) -> Self {
        Self::Failed(message.to_string())
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::Failed(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::Failed(message.to_string())
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for HandlerError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self::Failed(err.to_string())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Failed(err.to_string())
    }
}

impl From<MessagingError> for HandlerError {
    fn from(err: MessagingError) -> Self {
        Self::Failed(err.to_string())
    }
}

/// Top-level error returned by `Runtime::start` and `Runtime::run`
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("setup error: {0}")]
    Setup(#[from] SetupError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),
}
