//! Runtime configuration
//!
//! Three sections (`runtime`, `transport`, `messaging`) with defaults, plus a
//! fixed table of environment overrides applied on top. An override only takes
//! effect when its variable is set and its `section.field` exists; the raw
//! value is coerced to the type the field already holds.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::env;
use url::Url;

/// Current deployment environment (`APP_ENV`, then `ENVIRONMENT`, default `sandbox`)
pub fn get_environment() -> String {
    env::var("APP_ENV")
        .or_else(|_| env::var("ENVIRONMENT"))
        .unwrap_or_else(|_| "sandbox".to_string())
        .to_lowercase()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub runtime: RuntimeSettings,
    pub transport: TransportSettings,
    pub messaging: MessagingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub service_name: String,
    pub task_workers: usize,
    pub scheduler_tick_millis: u64,
    /// 0 disables the per-invocation timeout
    pub handler_timeout_seconds: u64,
    pub schedule_failure_policy: ScheduleFailurePolicy,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            service_name: "default".to_string(),
            task_workers: 2,
            scheduler_tick_millis: 250,
            handler_timeout_seconds: 0,
            schedule_failure_policy: ScheduleFailurePolicy::Advance,
        }
    }
}

/// What a failed scheduled invocation does to `previous_invocation`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleFailurePolicy {
    /// Record the attempt regardless of outcome
    Advance,
    /// Record only successful runs, so a failing job is retried on the next eligible tick
    Retry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub host: String,
    pub port: u16,
    pub websocket_path: String,
    pub expose_metrics: bool,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 80,
            websocket_path: "/".to_string(),
            expose_metrics: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingSettings {
    pub poll_interval_seconds: u64,
    pub dlq_max_retry_count: u32,
    pub auto_create_resources: bool,
    pub max_messages_per_poll: u32,
}

impl Default for MessagingSettings {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 5,
            dlq_max_retry_count: 3,
            auto_create_resources: true,
            max_messages_per_poll: 5,
        }
    }
}

/// Maps an environment variable onto `section.field`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Override {
    pub section: &'static str,
    pub field: &'static str,
    pub env_var: &'static str,
}

impl Override {
    pub const fn new(section: &'static str, field: &'static str, env_var: &'static str) -> Self {
        Self {
            section,
            field,
            env_var,
        }
    }
}

pub const OVERRIDES: &[Override] = &[
    Override::new("runtime", "task_workers", "TASK_WORKERS"),
    Override::new("runtime", "service_name", "SERVICE_NAME"),
    Override::new("runtime", "handler_timeout_seconds", "HANDLER_TIMEOUT_SECONDS"),
    Override::new("transport", "port", "HTTP_PORT"),
    Override::new("messaging", "poll_interval_seconds", "SQS_POLL_TIME"),
    Override::new("messaging", "dlq_max_retry_count", "DLQ_MAX_RETRY_COUNT"),
    Override::new("messaging", "auto_create_resources", "AUTO_CREATE_RESOURCES"),
];

impl AppConfig {
    /// Defaults with the process environment applied
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Result<Self, ConfigurationError> {
        self.with_overrides(OVERRIDES, |name| env::var(name).ok())
    }

    /// Applies `overrides` in order, reading values through `lookup`
    pub fn with_overrides<F>(self, overrides: &[Override], lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = self;
        for item in overrides {
            if let Some(raw) = lookup(item.env_var) {
                config = config.apply_override(item, &raw)?;
            }
        }
        Ok(config)
    }

    fn apply_override(self, item: &Override, raw: &str) -> Result<Self, ConfigurationError> {
        let mut root = serde_json::to_value(&self).map_err(|e| ConfigurationError::InvalidValue {
            field: item.field,
            reason: e.to_string(),
        })?;

        let Some(slot) = root
            .get_mut(item.section)
            .and_then(|section| section.get_mut(item.field))
        else {
            return Ok(self);
        };

        *slot = coerce(item.env_var, raw, slot)?;

        serde_json::from_value(root).map_err(|e| ConfigurationError::InvalidValue {
            field: item.field,
            reason: e.to_string(),
        })
    }
}

fn coerce(env_var: &'static str, raw: &str, current: &Value) -> Result<Value, ConfigurationError> {
    let invalid = |expected: &'static str| ConfigurationError::InvalidOverride {
        env_var,
        value: raw.to_string(),
        expected,
    };

    match current {
        Value::Bool(_) => Ok(Value::Bool(parse_bool(raw))),
        Value::Number(n) if n.is_f64() => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| invalid("float")),
        Value::Number(_) => raw
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| invalid("integer")),
        _ => Ok(Value::String(raw.to_string())),
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Region, account and endpoint of the messaging service, as found in the environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AwsEnvironment {
    pub region: Option<String>,
    pub account_id: Option<String>,
    pub endpoint: Option<Url>,
}

impl AwsEnvironment {
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let endpoint = non_empty("AWS_ENDPOINT")
            .map(|raw| {
                Url::parse(&raw).map_err(|e| ConfigurationError::InvalidValue {
                    field: "AWS_ENDPOINT",
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            region: non_empty("AWS_REGION").or_else(|| non_empty("AWS_DEFAULT_REGION")),
            account_id: non_empty("AWS_ACCOUNT_ID"),
            endpoint,
        })
    }

    pub fn region(&self) -> Result<&str, ConfigurationError> {
        self.region
            .as_deref()
            .ok_or(ConfigurationError::MissingEnvironment("AWS_REGION"))
    }

    pub fn account_id(&self) -> Result<&str, ConfigurationError> {
        self.account_id
            .as_deref()
            .ok_or(ConfigurationError::MissingEnvironment("AWS_ACCOUNT_ID"))
    }
}
