//! Handler references, the invocation payload every handler receives, and the
//! guarded call used by every dispatcher.

use crate::error::HandlerError;
use crate::messaging::Publisher;
use crate::models::{HookEvent, WebSocketEvent};
use crate::transport::{ConnectionId, ServerHandle};
use axum::body::Bytes;
use axum::http::HeaderMap;
use axum::response::Response;
use futures_util::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

pub type HandlerResult = Result<Reply, HandlerError>;
pub type HandlerFuture = BoxFuture<'static, HandlerResult>;
pub type HandlerFn = dyn Fn(Invocation) -> HandlerFuture + Send + Sync;

/// A named handler bound to its service instance
///
/// Two references are equal when they carry the same name and point at the
/// same bound callable.
#[derive(Clone)]
pub struct HandlerRef {
    name: Arc<str>,
    func: Arc<HandlerFn>,
}

impl HandlerRef {
    pub fn new(name: impl Into<Arc<str>>, func: Arc<HandlerFn>) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }

    /// Wraps a plain closure, mostly useful in tests
    pub fn from_fn<F, Fut>(name: &str, f: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = HandlerResult> + Send + 'static,
    {
        Self::new(name, Arc::new(move |inv| f(inv).boxed()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, invocation: Invocation) -> HandlerFuture {
        (self.func)(invocation)
    }
}

impl PartialEq for HandlerRef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Arc::ptr_eq(&self.func, &other.func)
    }
}

impl Eq for HandlerRef {}

impl fmt::Debug for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HandlerRef").field(&self.name).finish()
    }
}

/// What caused a handler to run
#[derive(Debug, Clone)]
pub enum Trigger {
    Http(HttpRequest),
    WebSocket(WsFrame),
    Task(Value),
    Schedule,
    Queue(String),
    Hook(HookEvent),
}

#[derive(Debug, Clone)]
pub struct Invocation {
    pub trigger: Trigger,
    pub ctx: RuntimeContext,
}

impl Invocation {
    pub fn new(trigger: Trigger, ctx: RuntimeContext) -> Self {
        Self { trigger, ctx }
    }

    pub fn http(&self) -> Option<&HttpRequest> {
        match &self.trigger {
            Trigger::Http(request) => Some(request),
            _ => None,
        }
    }

    pub fn websocket(&self) -> Option<&WsFrame> {
        match &self.trigger {
            Trigger::WebSocket(frame) => Some(frame),
            _ => None,
        }
    }

    /// Task payload
    pub fn payload(&self) -> Option<&Value> {
        match &self.trigger {
            Trigger::Task(payload) => Some(payload),
            _ => None,
        }
    }

    /// Queue message body
    pub fn message(&self) -> Option<&str> {
        match &self.trigger {
            Trigger::Queue(body) => Some(body),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpRequest {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn text(&self) -> Result<&str, HandlerError> {
        std::str::from_utf8(&self.body).map_err(HandlerError::msg)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

#[derive(Debug, Clone)]
pub struct WsFrame {
    pub event: WebSocketEvent,
    pub connection: ConnectionId,
    /// Text of the frame for `message` events
    pub data: Option<String>,
}

/// Handler return value, normalised by the transport into status, headers and body
#[derive(Debug, Default)]
pub enum Reply {
    #[default]
    Empty,
    Text(String),
    Json(Value),
    /// Already in the transport's response shape; passed through untouched
    Response(Response),
}

impl Reply {
    pub fn text(body: impl Into<String>) -> Self {
        Reply::Text(body.into())
    }

    pub fn json<T: Serialize>(value: &T) -> Result<Self, HandlerError> {
        Ok(Reply::Json(serde_json::to_value(value)?))
    }
}

impl From<String> for Reply {
    fn from(body: String) -> Self {
        Reply::Text(body)
    }
}

impl From<&str> for Reply {
    fn from(body: &str) -> Self {
        Reply::Text(body.to_string())
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Reply::Json(value)
    }
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Reply::Response(response)
    }
}

impl From<()> for Reply {
    fn from(_: ()) -> Self {
        Reply::Empty
    }
}

/// Collaborators handed to every invocation
#[derive(Clone, Default)]
pub struct RuntimeContext {
    server: Option<ServerHandle>,
    publisher: Option<Publisher>,
}

impl RuntimeContext {
    pub fn new(server: Option<ServerHandle>, publisher: Option<Publisher>) -> Self {
        Self { server, publisher }
    }

    /// Context with no collaborators attached
    pub fn detached() -> Self {
        Self::default()
    }

    /// The shared server, when the service has HTTP, WebSocket or task bindings
    pub fn server(&self) -> Option<&ServerHandle> {
        self.server.as_ref()
    }

    pub fn publisher(&self) -> Option<&Publisher> {
        self.publisher.as_ref()
    }
}

impl fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("server", &self.server.is_some())
            .field("publisher", &self.publisher.is_some())
            .finish()
    }
}

/// Runs a handler, turning panics and timeouts into `HandlerError`s
///
/// A timed-out future is dropped, so the handler is cancelled at its next
/// suspension point.
pub async fn invoke_guarded(
    handler: &HandlerRef,
    invocation: Invocation,
    timeout: Option<Duration>,
) -> HandlerResult {
    let handler = handler.clone();
    let call = AssertUnwindSafe(async move { handler.call(invocation).await }).catch_unwind();

    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(outcome) => outcome,
            Err(_) => return Err(HandlerError::TimedOut(limit)),
        },
        None => call.await,
    };

    outcome.unwrap_or_else(|panic| Err(HandlerError::Panicked(panic_message(panic.as_ref()))))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
