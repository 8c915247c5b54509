//! Unit tests for transport composition

use serde_json::json;
use std::sync::Arc;
use switchyard::config::AppConfig;
use switchyard::core::{CapabilityRegistry, Declarations, Reply, Service};
use switchyard::models::{CapabilityKind, SchedulePolicy};
use switchyard::transport::{ServerHandle, ServerTopology, TransportComposer};
use switchyard::{ConfigurationError, RuntimeError};

struct ScheduleOnly;

impl Service for ScheduleOnly {
    fn declare(decl: &mut Declarations<Self>) -> Result<(), ConfigurationError> {
        decl.method("tick", |_, _| async { Ok(Reply::Empty) })?
            .schedule(SchedulePolicy::every_minute());
        Ok(())
    }
}

struct Mixed;

impl Service for Mixed {
    fn declare(decl: &mut Declarations<Self>) -> Result<(), ConfigurationError> {
        decl.method("root", |_, _| async { Ok(Reply::Empty) })?
            .http("GET", "/")?;
        decl.method("socket", |_, _| async { Ok(Reply::Empty) })?
            .websocket("message")?;
        Ok(())
    }
}

fn local_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.transport.host = "127.0.0.1".to_string();
    config.transport.port = 0;
    config
}

#[test]
fn topology_reflects_registered_kinds() {
    let registry = CapabilityRegistry::scan(Arc::new(Mixed)).unwrap();
    let topology = ServerTopology::from_registry(&registry);
    assert!(topology.needs_listener());
    assert_eq!(topology.kinds(), vec![CapabilityKind::Http, CapabilityKind::WebSocket]);

    let registry = CapabilityRegistry::scan(Arc::new(ScheduleOnly)).unwrap();
    assert!(!ServerTopology::from_registry(&registry).needs_listener());
}

#[tokio::test]
async fn schedule_only_service_binds_nothing() {
    let registry = CapabilityRegistry::scan(Arc::new(ScheduleOnly)).unwrap();
    let mut transport = TransportComposer::new(local_config())
        .compose(&registry, None)
        .await
        .unwrap();

    assert!(transport.local_addr.is_none());
    assert!(transport.ctx.server().is_none());
    assert!(transport.launch(tokio_util::sync::CancellationToken::new()).is_empty());
}

#[tokio::test]
async fn websocket_path_colliding_with_get_route_is_rejected() {
    let registry = CapabilityRegistry::scan(Arc::new(Mixed)).unwrap();
    let err = TransportComposer::new(local_config())
        .compose(&registry, None)
        .await
        .err()
        .unwrap();

    assert!(matches!(
        err,
        RuntimeError::Configuration(ConfigurationError::WebSocketRouteConflict(ref path)) if path == "/"
    ));
}

struct SocketOnly;

impl Service for SocketOnly {
    fn declare(decl: &mut Declarations<Self>) -> Result<(), ConfigurationError> {
        decl.method("socket", |_, _| async { Ok(Reply::Empty) })?
            .websocket("open")?;
        Ok(())
    }
}

#[tokio::test]
async fn websocket_path_without_leading_slash_is_rejected() {
    let mut config = local_config();
    config.transport.websocket_path = "ws".to_string();

    let registry = CapabilityRegistry::scan(Arc::new(SocketOnly)).unwrap();
    let err = TransportComposer::new(config)
        .compose(&registry, None)
        .await
        .err()
        .unwrap();

    assert!(matches!(
        err,
        RuntimeError::Configuration(ConfigurationError::InvalidHttpPath(ref path)) if path == "ws"
    ));
}

#[tokio::test]
async fn websocket_path_is_ignored_without_websocket_bindings() {
    let mut config = local_config();
    config.transport.websocket_path = "ws".to_string();

    let registry = CapabilityRegistry::scan(Arc::new(ScheduleOnly)).unwrap();
    assert!(TransportComposer::new(config).compose(&registry, None).await.is_ok());
}

#[tokio::test]
async fn dispatch_without_task_bindings_fails() {
    let (handle, receiver) = ServerHandle::new(false);
    assert!(receiver.is_none());
    assert!(handle.dispatch("anything", &json!({})).is_err());
}

#[tokio::test]
async fn dispatch_queues_an_envelope() {
    let (handle, receiver) = ServerHandle::new(true);
    let mut receiver = receiver.unwrap();

    handle.dispatch("resize", &json!({"w": 10})).unwrap();

    let envelope = receiver.recv().await.unwrap();
    assert_eq!(envelope.identifier, "resize");
    assert_eq!(envelope.data, json!({"w": 10}));
}

#[tokio::test]
async fn push_to_unknown_connection_reports_false() {
    let (handle, _) = ServerHandle::new(false);
    assert!(handle.connections().await.is_empty());
    let connection = switchyard::transport::websocket::ConnectionRegistry::new()
        .register()
        .await
        .0;
    assert!(!handle.push(connection, "hello").await);
}
