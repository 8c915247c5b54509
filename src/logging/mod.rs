//! Logging initialization
//!
//! Production deployments log one JSON object per line; anything else gets
//! coloured human-readable output. `LOG_FORMAT=json|pretty` overrides the
//! choice, and `RUST_LOG` overrides the default `info` filter.

use crate::config::get_environment;
use std::env;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    /// Pick a format from the deployment environment and an optional explicit override
    pub fn select(environment: &str, explicit: Option<&str>) -> Self {
        match explicit.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("json") => return LogFormat::Json,
            Some("pretty") | Some("text") => return LogFormat::Pretty,
            _ => {}
        }

        if matches!(environment, "production" | "prod") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }

    pub fn from_env() -> Self {
        Self::select(&get_environment(), env::var("LOG_FORMAT").ok().as_deref())
    }
}

/// Install the global subscriber
///
/// Only the first call installs anything; later calls are no-ops.
pub fn init_logging() {
    let format = LogFormat::from_env();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_writer(std::io::stdout),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(true).with_ansi(true))
            .try_init(),
    };

    if installed.is_ok() {
        tracing::debug!(format = ?format, "logging initialized");
    }
}
