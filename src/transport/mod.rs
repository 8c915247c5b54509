//! HTTP, WebSocket and background-task transport on one shared listener

pub mod composer;
pub mod http;
pub mod response;
pub mod task;
pub mod websocket;

pub use composer::{ComposedTransport, ServerHandle, ServerTopology, TransportComposer};
pub use task::TaskEnvelope;
pub use websocket::ConnectionId;
