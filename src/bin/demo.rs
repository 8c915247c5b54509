//! Switchyard demo service
//!
//! Declares one handler of every capability kind and runs it against an
//! in-process broker, so it needs no external services:
//!
//! - `GET /hello/{name}` and `POST /echo` over HTTP
//! - a WebSocket echo on `/ws`
//! - a `greet` background task
//! - a heartbeat every minute at second 0
//! - a queue subscription on the `greetings` topic
//! - start and shutdown hooks

use dotenvy::dotenv;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use switchyard::config::AppConfig;
use switchyard::logging;
use switchyard::messaging::InMemoryBroker;
use switchyard::{
    ConfigurationError, Declarations, HookEvent, Invocation, Reply, Runtime,
    SchedulePolicy, Service,
};
use tracing::info;

#[derive(Default)]
struct Greeter {
    greeted: AtomicU64,
}

impl Service for Greeter {
    fn declare(decl: &mut Declarations<Self>) -> Result<(), ConfigurationError> {
        decl.method("hello", |svc: Arc<Greeter>, inv: Invocation| async move {
            let name = inv.http().and_then(|r| r.param("name")).unwrap_or("world");
            let count = svc.greeted.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(server) = inv.ctx.server() {
                server.dispatch("greet", &json!({ "name": name }))?;
            }
            Reply::json(&json!({ "greeting": format!("hello {name}"), "count": count }))
        })?
        .http("GET", "/hello/{name}")?;

        decl.method("echo", |_svc: Arc<Greeter>, inv: Invocation| async move {
            let body = inv.http().ok_or("not an http request")?.text()?.to_string();
            Ok(Reply::text(body))
        })?
        .http("POST", "/echo")?;

        decl.method("ws_echo", |_svc: Arc<Greeter>, inv: Invocation| async move {
            let frame = inv.websocket().ok_or("not a websocket frame")?;
            if let (Some(server), Some(data)) = (inv.ctx.server(), frame.data.as_deref()) {
                server.push(frame.connection, data).await;
            }
            Ok(Reply::Empty)
        })?
        .websocket("message")?;

        decl.method("greet", |_svc: Arc<Greeter>, inv: Invocation| async move {
            let payload = inv.payload().cloned().unwrap_or_default();
            if let Some(publisher) = inv.ctx.publisher() {
                publisher.publish_to_topic("greetings", &payload).await?;
            }
            Ok(Reply::Empty)
        })?
        .task("greet")?;

        decl.method("on_greeting", |_svc: Arc<Greeter>, inv: Invocation| async move {
            info!(message = inv.message().unwrap_or_default(), "demo: greeting received");
            Ok(Reply::Empty)
        })?
        .queue("greetings", "greetings-log", Some("greetings-dlq"))?;

        decl.method("heartbeat", |svc: Arc<Greeter>, _inv: Invocation| async move {
            info!(greeted = svc.greeted.load(Ordering::Relaxed), "demo: heartbeat");
            Ok(Reply::Empty)
        })?
        .schedule(SchedulePolicy::every_minute_at(0)?);

        decl.method("started", |_svc: Arc<Greeter>, _inv: Invocation| async move {
            info!("demo: service started");
            Ok(Reply::Empty)
        })?
        .hook(HookEvent::OnStart);

        decl.method("stopping", |svc: Arc<Greeter>, _inv: Invocation| async move {
            info!(greeted = svc.greeted.load(Ordering::Relaxed), "demo: service stopping");
            Ok(Reply::Empty)
        })?
        .hook(HookEvent::OnShutdown);

        Ok(())
    }

    fn config(&self) -> AppConfig {
        let mut config = AppConfig::default();
        config.runtime.service_name = "switchyard-demo".to_string();
        config.transport.port = 8080;
        config.transport.websocket_path = "/ws".to_string();
        config.transport.expose_metrics = true;
        config.messaging.poll_interval_seconds = 1;
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env if present
    dotenv().ok();

    logging::init_logging();

    let env = switchyard::config::get_environment();
    info!(environment = %env, "Starting switchyard demo");

    Runtime::new(Greeter::default())
        .with_messaging(Arc::new(InMemoryBroker::new()))
        .run()
        .await?;

    Ok(())
}
