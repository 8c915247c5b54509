//! HTTP routing on axum
//!
//! Routes come from `HttpRoute` bindings. An unknown path answers 404, a known
//! path with an unbound method answers 405, and a failing handler answers 500
//! for that request only.

use super::response::{internal_error, into_response, method_not_allowed, not_found, text};
use super::websocket::{upgrade, WsState};
use crate::core::handler::{invoke_guarded, HandlerRef, HttpRequest, Invocation, RuntimeContext, Trigger};
use crate::core::registry::CapabilityBinding;
use crate::error::ConfigurationError;
use crate::metrics::Metrics;
use crate::models::HttpMethod;
use axum::body::to_bytes;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{FromRequestParts, Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use axum::routing::{get, MethodFilter, MethodRouter};
use axum::Router;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceBuilder;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{error, warn, Level};

const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone)]
pub struct HttpState {
    pub ctx: RuntimeContext,
    pub timeout: Option<Duration>,
    pub metrics: Option<Arc<Metrics>>,
}

/// Optional WebSocket endpoint mounted on the same router
pub struct WsMount {
    pub path: String,
    pub state: WsState,
}

pub fn create_router(
    bindings: &[CapabilityBinding],
    websocket: Option<WsMount>,
    state: HttpState,
    expose_metrics: bool,
) -> Result<Router, ConfigurationError> {
    let mut paths: BTreeMap<String, Vec<(HttpMethod, HandlerRef)>> = BTreeMap::new();
    for binding in bindings {
        if let CapabilityBinding::HttpRoute {
            method,
            path,
            handler,
        } = binding
        {
            paths
                .entry(path.clone())
                .or_default()
                .push((*method, handler.clone()));
        }
    }

    if let Some(ws) = &websocket {
        let conflict = paths
            .get(&ws.path)
            .is_some_and(|routes| routes.iter().any(|(m, _)| *m == HttpMethod::Get));
        if conflict {
            return Err(ConfigurationError::WebSocketRouteConflict(ws.path.clone()));
        }
        paths.entry(ws.path.clone()).or_default();
    }

    let mut router = Router::new();
    for (path, routes) in paths {
        let mut method_router: MethodRouter = MethodRouter::new();

        for (method, handler) in routes {
            let state = state.clone();
            method_router = method_router.on(method_filter(method), move |request: Request| {
                dispatch(handler.clone(), state.clone(), request)
            });
        }

        if let Some(ws) = websocket.as_ref().filter(|ws| ws.path == path) {
            let ws_state = ws.state.clone();
            method_router = method_router.on(MethodFilter::GET, move |upgrade_request: WebSocketUpgrade| {
                upgrade(upgrade_request, ws_state.clone())
            });
        }

        router = router.route(&path, method_router);
    }

    if let Some(metrics) = state.metrics.clone().filter(|_| expose_metrics) {
        if bindings.iter().any(|b| matches!(b, CapabilityBinding::HttpRoute { path, .. } if path == "/metrics")) {
            warn!("http: /metrics is bound by a handler, metrics endpoint not mounted");
        } else {
            router = router.route(
                "/metrics",
                get(move || {
                    let metrics = metrics.clone();
                    async move {
                        metrics.export().map_err(|e| {
                            error!(error = %e, "http: metrics export failed");
                            StatusCode::INTERNAL_SERVER_ERROR
                        })
                    }
                }),
            );
        }
    }

    let mut router = router
        .fallback(|| async { not_found() })
        .method_not_allowed_fallback(|| async { method_not_allowed() });

    if let Some(metrics) = state.metrics.clone() {
        router = router.layer(axum::middleware::from_fn_with_state(
            metrics,
            metrics_middleware,
        ));
    }

    Ok(router.layer(
        ServiceBuilder::new().layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        ),
    ))
}

fn method_filter(method: HttpMethod) -> MethodFilter {
    match method {
        HttpMethod::Get => MethodFilter::GET,
        HttpMethod::Post => MethodFilter::POST,
        HttpMethod::Put => MethodFilter::PUT,
        HttpMethod::Delete => MethodFilter::DELETE,
        HttpMethod::Patch => MethodFilter::PATCH,
        HttpMethod::Head => MethodFilter::HEAD,
        HttpMethod::Options => MethodFilter::OPTIONS,
    }
}

async fn dispatch(handler: HandlerRef, state: HttpState, request: Request) -> Response {
    let (mut parts, body) = request.into_parts();

    let params = Path::<HashMap<String, String>>::from_request_parts(&mut parts, &())
        .await
        .map(|Path(params)| params)
        .unwrap_or_default();
    let query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
        .map(|Query(query)| query)
        .unwrap_or_default();

    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            warn!(path = %parts.uri.path(), error = %e, "http: unable to read request body");
            return text(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large");
        }
    };

    let request = HttpRequest {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        params,
        query,
        headers: parts.headers,
        body,
    };
    let method = request.method.clone();
    let path = request.path.clone();

    match invoke_guarded(
        &handler,
        Invocation::new(Trigger::Http(request), state.ctx.clone()),
        state.timeout,
    )
    .await
    {
        Ok(reply) => into_response(reply),
        Err(e) => {
            error!(
                handler = handler.name(),
                method = %method,
                path = %path,
                error = %e,
                "http: handler failed"
            );
            if let Some(metrics) = &state.metrics {
                metrics.record_handler_failure("http");
            }
            internal_error()
        }
    }
}

/// Middleware to track HTTP request metrics
async fn metrics_middleware(
    State(metrics): State<Arc<Metrics>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    metrics.http_requests_in_flight.inc();
    let response = next.run(request).await;
    let status = response.status();
    let duration = start.elapsed();
    metrics.http_requests_in_flight.dec();

    metrics.http_requests_total.inc();
    metrics
        .http_request_duration_seconds
        .observe(duration.as_secs_f64());

    if status.is_server_error() {
        error!(
            method = %method,
            path = %path,
            status = %status,
            duration_ms = duration.as_millis() as u64,
            "HTTP request error"
        );
    }

    response
}
