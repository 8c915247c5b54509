//! Handler replies to HTTP responses
//!
//! Every reply is first normalised to status, headers and body; only then is
//! an axum `Response` assembled.

use crate::core::handler::Reply;
use axum::body::Body;
use axum::http::header::{HeaderValue, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;

pub type Normalized = (StatusCode, HeaderMap, Body);

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

pub fn normalize(reply: Reply) -> Normalized {
    match reply {
        Reply::Response(response) => {
            let (parts, body) = response.into_parts();
            (parts.status, parts.headers, body)
        }
        Reply::Json(value) => (
            StatusCode::OK,
            content_type("application/json"),
            Body::from(value.to_string()),
        ),
        Reply::Text(text) => (StatusCode::OK, content_type(TEXT_PLAIN), Body::from(text)),
        Reply::Empty => (StatusCode::OK, content_type(TEXT_PLAIN), Body::empty()),
    }
}

pub fn into_response(reply: Reply) -> Response {
    build(normalize(reply))
}

pub fn text(status: StatusCode, body: &'static str) -> Response {
    build((status, content_type(TEXT_PLAIN), Body::from(body)))
}

pub fn not_found() -> Response {
    text(StatusCode::NOT_FOUND, "Not found")
}

pub fn method_not_allowed() -> Response {
    text(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

pub fn internal_error() -> Response {
    text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
}

fn content_type(value: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(value));
    headers
}

fn build((status, headers, body): Normalized) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
