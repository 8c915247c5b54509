//! Unit tests for HTTP routing

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use switchyard::core::{CapabilityRegistry, Declarations, Reply, RuntimeContext, Service};
use switchyard::metrics::Metrics;
use switchyard::models::CapabilityKind;
use switchyard::transport::http::{create_router, HttpState};
use switchyard::{ConfigurationError, HandlerError};

struct Api;

impl Service for Api {
    fn declare(decl: &mut Declarations<Self>) -> Result<(), ConfigurationError> {
        decl.method("hello", |_, inv| async move {
            let request = inv.http().ok_or("not an http call")?;
            let name = request.param("name").unwrap_or("stranger");
            Ok(Reply::text(format!("hello {name}")))
        })?
        .http("GET", "/hello/{name}")?;

        decl.method("echo", |_, inv| async move {
            let request = inv.http().ok_or("not an http call")?;
            let body: Value = request.json()?;
            Ok(Reply::Json(json!({
                "received": body,
                "tag": request.query.get("tag"),
            })))
        })?
        .http("POST", "/echo")?;

        decl.method("boom", |_, _| async { Err(HandlerError::from("exploded")) })?
            .http("GET", "/boom")?;

        decl.method("slow", |_, _| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Reply::Empty)
        })?
        .http("GET", "/slow")?;

        Ok(())
    }
}

fn server(metrics: Option<Arc<Metrics>>, timeout: Option<Duration>) -> TestServer {
    let registry = CapabilityRegistry::scan(Arc::new(Api)).unwrap();
    let router = create_router(
        registry.bindings_of(CapabilityKind::Http),
        None,
        HttpState {
            ctx: RuntimeContext::detached(),
            timeout,
            metrics,
        },
        true,
    )
    .unwrap();
    TestServer::new(router).expect("start test server")
}

#[tokio::test]
async fn path_parameters_reach_the_handler() {
    let server = server(None, None);
    let response = server.get("/hello/ada").await;
    response.assert_status_ok();
    response.assert_text("hello ada");
    assert_eq!(response.header("content-type"), "text/plain; charset=utf-8");
}

#[tokio::test]
async fn json_body_and_query_are_decoded() {
    let server = server(None, None);
    let response = server
        .post("/echo")
        .add_query_param("tag", "x1")
        .json(&json!({"n": 5}))
        .await;

    response.assert_status_ok();
    response.assert_json(&json!({"received": {"n": 5}, "tag": "x1"}));
}

#[tokio::test]
async fn unknown_path_is_404() {
    let server = server(None, None);
    let response = server.get("/nope").await;
    response.assert_status(StatusCode::NOT_FOUND);
    response.assert_text("Not found");
}

#[tokio::test]
async fn unbound_method_on_known_path_is_405() {
    let server = server(None, None);
    let response = server.delete("/echo").await;
    response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
    response.assert_text("Method not allowed");
}

#[tokio::test]
async fn failing_handler_is_500_and_server_keeps_serving() {
    let server = server(None, None);
    let response = server.get("/boom").await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    response.assert_text("Internal Server Error");

    server.get("/hello/again").await.assert_status_ok();
}

#[tokio::test]
async fn malformed_json_is_a_handler_failure() {
    let server = server(None, None);
    let response = server.post("/echo").text("{not json").await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn handler_timeout_answers_500() {
    let server = server(None, Some(Duration::from_millis(20)));
    server
        .get("/slow")
        .await
        .assert_status(StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn metrics_endpoint_reports_requests() {
    let metrics = Arc::new(Metrics::new().unwrap());
    let server = server(Some(metrics.clone()), None);

    server.get("/hello/a").await.assert_status_ok();
    server.get("/boom").await;

    let response = server.get("/metrics").await;
    response.assert_status_ok();
    let text = response.text();
    assert!(text.contains("http_requests_total"));
    assert!(text.contains(r#"handler_failures_total{kind="http"} 1"#));
    assert!(metrics.http_requests_total.get() >= 2);
}

#[tokio::test]
async fn metrics_endpoint_is_absent_without_metrics() {
    let server = server(None, None);
    server.get("/metrics").await.assert_status(StatusCode::NOT_FOUND);
}
