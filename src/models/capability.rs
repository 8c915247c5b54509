//! Capability kinds and the validated metadata each marker carries

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CapabilityKind {
    Http,
    WebSocket,
    Task,
    Schedule,
    Queue,
    Hook,
}

impl CapabilityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityKind::Http => "http",
            CapabilityKind::WebSocket => "websocket",
            CapabilityKind::Task => "task",
            CapabilityKind::Schedule => "schedule",
            CapabilityKind::Queue => "queue",
            CapabilityKind::Hook => "hook",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            "PATCH" => Ok(HttpMethod::Patch),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            _ => Err(ConfigurationError::InvalidHttpMethod(s.to_string())),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebSocketEvent {
    Open,
    Message,
    Close,
}

impl WebSocketEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebSocketEvent::Open => "open",
            WebSocketEvent::Message => "message",
            WebSocketEvent::Close => "close",
        }
    }
}

impl FromStr for WebSocketEvent {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "open" => Ok(WebSocketEvent::Open),
            "message" => Ok(WebSocketEvent::Message),
            "close" => Ok(WebSocketEvent::Close),
            _ => Err(ConfigurationError::InvalidWebSocketEvent(s.to_string())),
        }
    }
}

impl fmt::Display for WebSocketEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookEvent {
    #[serde(rename = "onStart")]
    OnStart,
    #[serde(rename = "onShutdown")]
    OnShutdown,
}

impl HookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::OnStart => "onStart",
            HookEvent::OnShutdown => "onShutdown",
        }
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Topic/queue names attached to a queue marker
///
/// Every name must consist only of ASCII letters, digits, `_` and `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueSpec {
    topic_name: String,
    queue_name: String,
    dlq_name: Option<String>,
}

impl QueueSpec {
    pub fn new(
        topic_name: impl Into<String>,
        queue_name: impl Into<String>,
        dlq_name: Option<&str>,
    ) -> Result<Self, ConfigurationError> {
        let topic_name = validate_resource_name("topic name", topic_name.into())?;
        let queue_name = validate_resource_name("queue name", queue_name.into())?;
        let dlq_name = dlq_name
            .map(|name| validate_resource_name("dead-letter queue name", name.to_string()))
            .transpose()?;

        Ok(Self {
            topic_name,
            queue_name,
            dlq_name,
        })
    }

    pub fn topic_name(&self) -> &str {
        &self.topic_name
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn dlq_name(&self) -> Option<&str> {
        self.dlq_name.as_deref()
    }
}

fn validate_resource_name(field: &'static str, value: String) -> Result<String, ConfigurationError> {
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if valid {
        Ok(value)
    } else {
        Err(ConfigurationError::InvalidResourceName { field, value })
    }
}

/// Validates a route path and returns it unchanged
///
/// Segments are either literals or a single `{name}` / `{*name}` capture. A
/// catch-all is only allowed as the last segment, and literals may not start
/// with the `:` / `*` capture sigils of older router syntax.
pub(crate) fn validate_http_path(path: &str) -> Result<String, ConfigurationError> {
    let invalid = || ConfigurationError::InvalidHttpPath(path.to_string());

    if !path.starts_with('/') {
        return Err(invalid());
    }

    let segments: Vec<&str> = path.split('/').skip(1).collect();
    for (index, segment) in segments.iter().enumerate() {
        if segment.starts_with(':') || segment.starts_with('*') {
            return Err(invalid());
        }

        let has_braces = segment.contains('{') || segment.contains('}');
        if !has_braces {
            continue;
        }
        if segment.starts_with("{*") && index + 1 != segments.len() {
            return Err(invalid());
        }
        let name = segment
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .map(|s| s.strip_prefix('*').unwrap_or(s))
            .ok_or_else(invalid)?;
        let valid_name = !name.is_empty()
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_name {
            return Err(invalid());
        }
    }

    Ok(path.to_string())
}

/// Route shape with capture names erased, used to detect colliding routes
pub(crate) fn route_shape(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment.starts_with("{*") {
                "{*}"
            } else if segment.starts_with('{') {
                "{}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
