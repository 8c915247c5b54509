//! Unit tests for queue provisioning

use serde_json::Value;
use std::sync::Arc;
use switchyard::config::{AwsEnvironment, MessagingSettings};
use switchyard::messaging::provisioner::{allow_topic_policy, queue_url};
use switchyard::messaging::{InMemoryBroker, QueueProvisioner};
use switchyard::models::QueueSpec;
use switchyard::{ConfigurationError, MessagingError, RuntimeError, SetupError};
use url::Url;

fn aws() -> AwsEnvironment {
    AwsEnvironment {
        region: Some("eu-west-1".to_string()),
        account_id: Some("123456789012".to_string()),
        endpoint: None,
    }
}

fn spec() -> QueueSpec {
    QueueSpec::new("orders", "orders-worker", Some("orders-dlq")).unwrap()
}

#[tokio::test]
async fn disabled_auto_create_makes_no_calls() {
    let broker = Arc::new(InMemoryBroker::new());
    let settings = MessagingSettings {
        auto_create_resources: false,
        ..MessagingSettings::default()
    };
    let provisioner = QueueProvisioner::new(broker.clone(), settings, aws());

    let provisioned = provisioner.setup(&spec()).await.unwrap();

    assert!(broker.calls().is_empty());
    assert_eq!(
        provisioned.queue_url,
        "https://sqs.eu-west-1.amazonaws.com/123456789012/orders-worker"
    );
    assert_eq!(
        provisioned.dlq_url.as_deref(),
        Some("https://sqs.eu-west-1.amazonaws.com/123456789012/orders-dlq")
    );
    assert_eq!(provisioned.topic_arn, None);
}

#[test]
fn custom_endpoint_replaces_the_host() {
    let endpoint = Url::parse("http://localhost:4566").unwrap();
    assert_eq!(
        queue_url(Some(&endpoint), "eu-west-1", "000000000000", "jobs").unwrap(),
        "http://localhost:4566/000000000000/jobs"
    );
}

#[test]
fn resolve_requires_region_and_account() {
    let broker = Arc::new(InMemoryBroker::new());
    let provisioner = QueueProvisioner::new(broker, MessagingSettings::default(), AwsEnvironment::default());
    assert_eq!(
        provisioner.resolve(&spec()).unwrap_err(),
        ConfigurationError::MissingEnvironment("AWS_REGION")
    );
}

#[tokio::test]
async fn setup_creates_and_wires_every_resource() {
    let broker = Arc::new(InMemoryBroker::with_account("eu-west-1", "123456789012"));
    let provisioner = QueueProvisioner::new(broker.clone(), MessagingSettings::default(), aws());

    let provisioned = provisioner.setup(&spec()).await.unwrap();

    assert_eq!(
        broker.calls(),
        vec![
            "create_topic",
            "create_queue",
            "create_queue",
            "get_queue_attributes",
            "get_queue_attributes",
            "set_queue_attributes",
            "set_queue_attributes",
            "subscribe",
        ]
    );
    assert_eq!(provisioned.queue_url, broker.queue_url("orders-worker").unwrap());
    assert_eq!(provisioned.dlq_url, broker.queue_url("orders-dlq"));
    assert_eq!(provisioned.topic_arn, broker.topic_arn("orders"));

    let queue_arn = "arn:aws:sqs:eu-west-1:123456789012:orders-worker";
    assert_eq!(broker.subscriptions("orders"), vec![queue_arn.to_string()]);

    let redrive: Value =
        serde_json::from_str(&broker.queue_attribute("orders-worker", "RedrivePolicy").unwrap()).unwrap();
    assert_eq!(redrive["deadLetterTargetArn"], "arn:aws:sqs:eu-west-1:123456789012:orders-dlq");
    assert_eq!(redrive["maxReceiveCount"], 3);

    let policy: Value =
        serde_json::from_str(&broker.queue_attribute("orders-worker", "Policy").unwrap()).unwrap();
    assert_eq!(
        policy,
        allow_topic_policy(queue_arn, "arn:aws:sns:eu-west-1:123456789012:orders")
    );
}

#[tokio::test]
async fn setup_without_dlq_skips_the_redrive_policy() {
    let broker = Arc::new(InMemoryBroker::new());
    let provisioner = QueueProvisioner::new(broker.clone(), MessagingSettings::default(), aws());
    let spec = QueueSpec::new("orders", "orders-worker", None).unwrap();

    let provisioned = provisioner.setup(&spec).await.unwrap();

    assert_eq!(provisioned.dlq_url, None);
    assert!(broker.queue_attribute("orders-worker", "RedrivePolicy").is_none());
    assert!(broker.queue_attribute("orders-worker", "Policy").is_some());
}

#[tokio::test]
async fn setup_twice_leaves_one_set_of_resources() {
    let broker = Arc::new(InMemoryBroker::new());
    let provisioner = QueueProvisioner::new(broker.clone(), MessagingSettings::default(), aws());

    let first = provisioner.setup(&spec()).await.unwrap();
    let second = provisioner.setup(&spec()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(broker.subscriptions("orders").len(), 1);
}

#[tokio::test]
async fn failed_step_is_reported_as_setup_error() {
    let broker = Arc::new(InMemoryBroker::new());
    broker.fail_next(
        "subscribe",
        MessagingError::service("AuthorizationError", "not allowed"),
    );
    let provisioner = QueueProvisioner::new(broker.clone(), MessagingSettings::default(), aws());

    let err = provisioner.setup(&spec()).await.unwrap_err();
    match err {
        RuntimeError::Setup(SetupError::Provisioning { step, source, .. }) => {
            assert_eq!(step, "subscribe queue to");
            assert_eq!(source.code(), Some("AuthorizationError"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}
