//! The topic/queue service the runtime talks to

use crate::error::MessagingError;
use async_trait::async_trait;
use std::collections::HashMap;

/// A received message and the handle needed to acknowledge it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
}

/// Topic and queue operations
///
/// Topics are addressed by ARN once created, queues by URL.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Create-or-get a topic; returns its ARN
    async fn create_topic(&self, name: &str) -> Result<String, MessagingError>;

    /// Returns the message id
    async fn publish(&self, topic_arn: &str, message: &str) -> Result<String, MessagingError>;

    /// Returns the subscription ARN
    async fn subscribe(
        &self,
        topic_arn: &str,
        protocol: &str,
        endpoint: &str,
    ) -> Result<String, MessagingError>;

    /// Create-or-get a queue; returns its URL
    async fn create_queue(&self, name: &str) -> Result<String, MessagingError>;

    async fn get_queue_url(&self, name: &str) -> Result<String, MessagingError>;

    /// Unknown attribute names are dropped from the request, see [`retain_known_attributes`]
    async fn get_queue_attributes(
        &self,
        queue_url: &str,
        names: &[&str],
    ) -> Result<HashMap<String, String>, MessagingError>;

    /// Known service error codes are reported through [`set_attributes_error`]
    async fn set_queue_attributes(
        &self,
        queue_url: &str,
        attributes: HashMap<String, String>,
    ) -> Result<(), MessagingError>;

    /// Returns the message id
    async fn send_message(&self, queue_url: &str, body: &str) -> Result<String, MessagingError>;

    async fn receive_messages(
        &self,
        queue_url: &str,
        max_messages: u32,
        wait_seconds: u32,
    ) -> Result<Vec<QueueMessage>, MessagingError>;

    async fn delete_message(&self, queue_url: &str, receipt_handle: &str) -> Result<(), MessagingError>;
}

pub const QUEUE_ATTRIBUTE_NAMES: &[&str] = &[
    "All",
    "Policy",
    "VisibilityTimeout",
    "MaximumMessageSize",
    "MessageRetentionPeriod",
    "ApproximateNumberOfMessages",
    "ApproximateNumberOfMessagesNotVisible",
    "CreatedTimestamp",
    "LastModifiedTimestamp",
    "QueueArn",
    "ApproximateNumberOfMessagesDelayed",
    "DelaySeconds",
    "ReceiveMessageWaitTimeSeconds",
    "RedrivePolicy",
    "FifoQueue",
    "ContentBasedDeduplication",
    "KmsMasterKeyId",
    "KmsDataKeyReusePeriodSeconds",
    "DeduplicationScope",
    "FifoThroughputLimit",
    "RedriveAllowPolicy",
    "SqsManagedSseEnabled",
];

pub fn is_known_attribute(name: &str) -> bool {
    QUEUE_ATTRIBUTE_NAMES.contains(&name)
}

/// The requested names that are valid queue attributes, in request order
pub fn retain_known_attributes<'a>(names: &[&'a str]) -> Vec<&'a str> {
    names
        .iter()
        .copied()
        .filter(|name| is_known_attribute(name))
        .collect()
}

/// Rewrite a set-attributes failure with the description of its error code
pub fn set_attributes_error(err: MessagingError) -> MessagingError {
    let Some(code) = err.code() else {
        return err;
    };

    let message = match code {
        "InvalidAddress" => "The specified queue ID is invalid.",
        "InvalidAttributeName" => "The specified attribute does not exist.",
        "InvalidAttributeValue" => "A queue attribute value is invalid.",
        "InvalidSecurity" => "The request was not made over HTTPS or did not use SigV4.",
        "OverLimit" => {
            "This action violates a limit (e.g., too many permissions or inflight messages)."
        }
        "QueueDoesNotExist" => "The queue does not exist or the QueueUrl is incorrect.",
        "RequestThrottled" => "Request was throttled - too many requests.",
        "UnsupportedOperation" => "Unsupported operation attempted on the queue.",
        _ => {
            return MessagingError::service(
                code,
                format!("Failed to set queue attributes: {err}"),
            )
        }
    };

    MessagingError::service(code, message)
}
