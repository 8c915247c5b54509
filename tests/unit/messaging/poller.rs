//! Unit tests for queue polling

use std::sync::{Arc, Mutex};
use std::time::Duration;
use switchyard::config::MessagingSettings;
use switchyard::core::{HandlerRef, Reply, RuntimeContext};
use switchyard::messaging::{InMemoryBroker, MessagingClient, QueueBindingRuntime, QueuePoller};
use switchyard::metrics::Metrics;
use switchyard::models::QueueSpec;
use switchyard::{HandlerError, MessagingError, PollError};
use tokio_util::sync::CancellationToken;

type Seen = Arc<Mutex<Vec<String>>>;

/// Handler that records every body and fails on `poison`
fn recording(seen: Seen) -> HandlerRef {
    HandlerRef::from_fn("consume", move |inv| {
        let seen = seen.clone();
        async move {
            let body = inv.message().unwrap_or_default().to_string();
            seen.lock().unwrap().push(body.clone());
            if body == "poison" {
                return Err(HandlerError::from("cannot handle poison"));
            }
            Ok(Reply::Empty)
        }
    })
}

async fn setup(seen: Seen) -> (Arc<InMemoryBroker>, QueuePoller) {
    let broker = Arc::new(InMemoryBroker::new());
    let queue_url = broker.create_queue("work").await.unwrap();
    let binding = QueueBindingRuntime {
        spec: QueueSpec::new("jobs", "work", None).unwrap(),
        queue_url,
        handler: recording(seen),
    };
    let poller = QueuePoller::new(binding, broker.clone(), &MessagingSettings::default());
    (broker, poller)
}

#[tokio::test]
async fn failed_message_does_not_block_the_rest_of_the_batch() {
    let seen = Seen::default();
    let (broker, poller) = setup(seen.clone()).await;
    let url = poller.binding().queue_url.clone();
    broker.send_message(&url, "poison").await.unwrap();
    broker.send_message(&url, "fine").await.unwrap();

    let report = poller.tick(&RuntimeContext::detached()).await;

    assert_eq!(report.received, 2);
    assert_eq!(report.processed, 1);
    assert_eq!(report.failed, 1);
    assert!(report.errors.is_empty());
    assert_eq!(*seen.lock().unwrap(), vec!["poison", "fine"]);
    // only the successful message was acknowledged
    assert_eq!(broker.queue_bodies("work"), vec!["poison"]);
}

#[tokio::test]
async fn empty_queue_yields_an_empty_report() {
    let (_broker, poller) = setup(Seen::default()).await;
    let report = poller.tick(&RuntimeContext::detached()).await;
    assert_eq!(report.received, 0);
    assert!(report.errors.is_empty());
}

#[tokio::test]
async fn notification_envelopes_are_unwrapped() {
    let seen = Seen::default();
    let (broker, poller) = setup(seen.clone()).await;
    let topic = broker.create_topic("jobs").await.unwrap();
    let attrs = broker
        .get_queue_attributes(&poller.binding().queue_url, &["QueueArn"])
        .await
        .unwrap();
    broker.subscribe(&topic, "sqs", &attrs["QueueArn"]).await.unwrap();
    broker.publish(&topic, r#"{"order":7}"#).await.unwrap();

    poller.tick(&RuntimeContext::detached()).await;

    assert_eq!(*seen.lock().unwrap(), vec![r#"{"order":7}"#]);
}

#[tokio::test]
async fn receive_failure_is_reported_and_skips_the_tick() {
    let seen = Seen::default();
    let (broker, poller) = setup(seen.clone()).await;
    broker.send_message(&poller.binding().queue_url, "fine").await.unwrap();
    broker.fail_next("receive_messages", MessagingError::Transport("timeout".to_string()));

    let report = poller.tick(&RuntimeContext::detached()).await;
    assert_eq!(report.received, 0);
    assert!(matches!(report.errors[..], [PollError::Receive { .. }]));
    assert!(seen.lock().unwrap().is_empty());

    // next tick recovers
    let report = poller.tick(&RuntimeContext::detached()).await;
    assert_eq!(report.processed, 1);
}

#[tokio::test]
async fn transient_delete_failure_is_retried() {
    let (broker, poller) = setup(Seen::default()).await;
    broker.send_message(&poller.binding().queue_url, "fine").await.unwrap();
    broker.fail_next("delete_message", MessagingError::Transport("reset".to_string()));

    let report = poller.tick(&RuntimeContext::detached()).await;

    assert_eq!(report.processed, 1);
    assert!(report.errors.is_empty());
    assert!(broker.queue_bodies("work").is_empty());
}

#[tokio::test]
async fn persistent_delete_failure_is_reported() {
    let (broker, poller) = setup(Seen::default()).await;
    broker.send_message(&poller.binding().queue_url, "fine").await.unwrap();
    for _ in 0..3 {
        broker.fail_next("delete_message", MessagingError::Transport("reset".to_string()));
    }

    let report = poller.tick(&RuntimeContext::detached()).await;

    assert_eq!(report.processed, 1);
    assert!(matches!(report.errors[..], [PollError::Delete { .. }]));
    assert_eq!(broker.queue_bodies("work"), vec!["fine"]);
    let deletes = broker.calls().iter().filter(|c| *c == "delete_message").count();
    assert_eq!(deletes, 3);
}

#[tokio::test]
async fn batch_size_is_capped_at_ten() {
    let broker = Arc::new(InMemoryBroker::new());
    let queue_url = broker.create_queue("work").await.unwrap();
    for i in 0..12 {
        broker.send_message(&queue_url, &i.to_string()).await.unwrap();
    }
    let binding = QueueBindingRuntime {
        spec: QueueSpec::new("jobs", "work", None).unwrap(),
        queue_url,
        handler: recording(Seen::default()),
    };
    let settings = MessagingSettings {
        max_messages_per_poll: 50,
        ..MessagingSettings::default()
    };
    let poller = QueuePoller::new(binding, broker.clone(), &settings);

    let report = poller.tick(&RuntimeContext::detached()).await;
    assert_eq!(report.received, 10);
    assert_eq!(broker.queue_bodies("work").len(), 2);
}

#[tokio::test]
async fn metrics_count_processed_and_failed_messages() {
    let (broker, poller) = setup(Seen::default()).await;
    let metrics = Arc::new(Metrics::new().unwrap());
    let poller = poller.with_metrics(metrics.clone());
    broker.send_message(&poller.binding().queue_url, "poison").await.unwrap();
    broker.send_message(&poller.binding().queue_url, "fine").await.unwrap();

    poller.tick(&RuntimeContext::detached()).await;

    assert_eq!(metrics.queue_messages_processed_total.get(), 1);
    assert_eq!(metrics.queue_messages_failed_total.get(), 1);
    assert_eq!(metrics.handler_failures_total.with_label_values(&["queue"]).get(), 1);
}

#[tokio::test]
async fn spawned_poller_stops_on_cancellation() {
    let seen = Seen::default();
    let (broker, poller) = setup(seen.clone()).await;
    broker.send_message(&poller.binding().queue_url, "fine").await.unwrap();

    let shutdown = CancellationToken::new();
    let handle = poller.spawn(RuntimeContext::detached(), shutdown.clone());

    // the first tick fires immediately
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("poller exits after cancellation")
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["fine"]);
}
