//! Unit tests for publishing from handlers

use serde_json::{json, Value};
use std::sync::Arc;
use switchyard::messaging::{InMemoryBroker, MessagingClient, Publisher};

#[tokio::test]
async fn publish_to_topic_creates_the_topic_and_encodes_json() {
    let broker = Arc::new(InMemoryBroker::new());
    let queue = broker.create_queue("audit").await.unwrap();
    let topic = broker.create_topic("events").await.unwrap();
    let attrs = broker.get_queue_attributes(&queue, &["QueueArn"]).await.unwrap();
    broker.subscribe(&topic, "sqs", &attrs["QueueArn"]).await.unwrap();

    let publisher = Publisher::new(broker.clone());
    publisher
        .publish_to_topic("events", &json!({"kind": "created", "id": 9}))
        .await
        .unwrap();

    let bodies = broker.queue_bodies("audit");
    assert_eq!(bodies.len(), 1);
    let envelope: Value = serde_json::from_str(&bodies[0]).unwrap();
    let inner: Value = serde_json::from_str(envelope["Message"].as_str().unwrap()).unwrap();
    assert_eq!(inner, json!({"kind": "created", "id": 9}));
}

#[tokio::test]
async fn publish_to_a_new_topic_without_subscribers_succeeds() {
    let broker = Arc::new(InMemoryBroker::new());
    let publisher = Publisher::new(broker.clone());

    publisher.publish_to_topic("lonely", "hello").await.unwrap();
    assert!(broker.topic_arn("lonely").is_some());
}

#[tokio::test]
async fn send_to_queue_resolves_the_url_by_name() {
    let broker = Arc::new(InMemoryBroker::new());
    broker.create_queue("direct").await.unwrap();
    let publisher = Publisher::new(broker.clone());

    publisher.send_to_queue("direct", &vec![1, 2, 3]).await.unwrap();

    assert_eq!(broker.queue_bodies("direct"), vec!["[1,2,3]"]);
    assert_eq!(broker.calls().last().map(String::as_str), Some("send_message"));
}

#[tokio::test]
async fn send_to_missing_queue_fails() {
    let broker = Arc::new(InMemoryBroker::new());
    let publisher = Publisher::new(broker);

    let err = publisher.send_to_queue("ghost", &1).await.unwrap_err();
    assert_eq!(err.code(), Some("AWS.SimpleQueueService.NonExistentQueue"));
}
