//! Unit tests for handler references and guarded invocation

use serde_json::json;
use std::time::Duration;
use switchyard::core::handler::invoke_guarded;
use switchyard::core::{HandlerRef, HttpRequest, Invocation, Reply, RuntimeContext, Trigger};
use switchyard::HandlerError;

fn schedule_invocation() -> Invocation {
    Invocation::new(Trigger::Schedule, RuntimeContext::detached())
}

#[tokio::test]
async fn guarded_call_returns_handler_reply() {
    let handler = HandlerRef::from_fn("ok", |_| async { Ok(Reply::text("done")) });
    let reply = invoke_guarded(&handler, schedule_invocation(), None).await.unwrap();
    assert!(matches!(reply, Reply::Text(body) if body == "done"));
}

#[tokio::test]
async fn guarded_call_passes_errors_through() {
    let handler = HandlerRef::from_fn("fails", |_| async { Err(HandlerError::from("boom")) });
    let err = invoke_guarded(&handler, schedule_invocation(), None).await.unwrap_err();
    assert_eq!(err, HandlerError::Failed("boom".to_string()));
}

#[tokio::test]
async fn guarded_call_converts_panics() {
    let handler = HandlerRef::from_fn("panics", |_| async {
        if true {
            panic!("exploded");
        }
        Ok(Reply::Empty)
    });
    let err = invoke_guarded(&handler, schedule_invocation(), None).await.unwrap_err();
    assert_eq!(err, HandlerError::Panicked("exploded".to_string()));
}

#[tokio::test]
async fn guarded_call_times_out() {
    let handler = HandlerRef::from_fn("slow", |_| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Reply::Empty)
    });
    let limit = Duration::from_millis(20);
    let err = invoke_guarded(&handler, schedule_invocation(), Some(limit))
        .await
        .unwrap_err();
    assert_eq!(err, HandlerError::TimedOut(limit));
}

#[test]
fn handler_refs_compare_by_name_and_callable() {
    let a = HandlerRef::from_fn("a", |_| async { Ok(Reply::Empty) });
    let same = a.clone();
    let other = HandlerRef::from_fn("a", |_| async { Ok(Reply::Empty) });

    assert_eq!(a, same);
    assert_ne!(a, other);
    assert_eq!(a.name(), "a");
}

#[test]
fn invocation_accessors_match_trigger() {
    let task = Invocation::new(Trigger::Task(json!({"n": 1})), RuntimeContext::detached());
    assert_eq!(task.payload(), Some(&json!({"n": 1})));
    assert!(task.http().is_none());
    assert!(task.message().is_none());

    let queue = Invocation::new(Trigger::Queue("body".to_string()), RuntimeContext::detached());
    assert_eq!(queue.message(), Some("body"));
    assert!(queue.websocket().is_none());
}

#[test]
fn http_request_decodes_body() {
    let request = HttpRequest {
        method: "POST".to_string(),
        path: "/items/7".to_string(),
        params: [("id".to_string(), "7".to_string())].into_iter().collect(),
        body: br#"{"name":"widget"}"#.to_vec().into(),
        ..Default::default()
    };

    assert_eq!(request.param("id"), Some("7"));
    assert_eq!(request.text().unwrap(), r#"{"name":"widget"}"#);
    let value: serde_json::Value = request.json().unwrap();
    assert_eq!(value["name"], "widget");
}

#[test]
fn malformed_json_body_is_a_handler_error() {
    let request = HttpRequest {
        body: b"not json".to_vec().into(),
        ..Default::default()
    };
    assert!(request.json::<serde_json::Value>().is_err());
}

#[test]
fn detached_context_has_no_collaborators() {
    let ctx = RuntimeContext::detached();
    assert!(ctx.server().is_none());
    assert!(ctx.publisher().is_none());
}
