//! In-process topic/queue broker
//!
//! Behaves like the hosted service where the runtime can observe it: topics fan
//! out to subscribed queues inside a notification envelope, a received message
//! stays in its queue until deleted, and once a queue's `RedrivePolicy`
//! `maxReceiveCount` is used up the message moves to the dead-letter queue.

use super::client::{
    is_known_attribute, retain_known_attributes, set_attributes_error, MessagingClient,
    QueueMessage,
};
use crate::error::MessagingError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Most recent calls kept in the call log
pub const CALL_LOG_LIMIT: usize = 256;

#[derive(Debug)]
struct Topic {
    name: String,
    subscriptions: Vec<String>,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    message_id: String,
    body: String,
    receive_count: u32,
    receipt_handle: Option<String>,
}

#[derive(Debug)]
struct Queue {
    name: String,
    arn: String,
    attributes: HashMap<String, String>,
    messages: VecDeque<StoredMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RedrivePolicy {
    dead_letter_target_arn: String,
    max_receive_count: u32,
}

#[derive(Debug, Default)]
struct BrokerState {
    topics: BTreeMap<String, Topic>,
    queues: BTreeMap<String, Queue>,
    calls: VecDeque<String>,
    failures: HashMap<String, VecDeque<MessagingError>>,
    sequence: u64,
}

impl BrokerState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.sequence += 1;
        format!("{prefix}-{:08}", self.sequence)
    }

    fn queue_mut(&mut self, queue_url: &str) -> Result<&mut Queue, MessagingError> {
        self.queues.get_mut(queue_url).ok_or_else(|| {
            MessagingError::service(
                "QueueDoesNotExist",
                format!("queue {queue_url} does not exist"),
            )
        })
    }

    fn queue_url_by_arn(&self, arn: &str) -> Option<String> {
        self.queues
            .iter()
            .find(|(_, queue)| queue.arn == arn)
            .map(|(url, _)| url.clone())
    }
}

pub struct InMemoryBroker {
    region: String,
    account_id: String,
    state: Mutex<BrokerState>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::with_account("us-east-1", "000000000000")
    }

    pub fn with_account(region: &str, account_id: &str) -> Self {
        Self {
            region: region.to_string(),
            account_id: account_id.to_string(),
            state: Mutex::new(BrokerState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record the call and return an injected failure, if one is queued
    fn enter(&self, operation: &str) -> Result<MutexGuard<'_, BrokerState>, MessagingError> {
        let mut state = self.state();
        if state.calls.len() == CALL_LOG_LIMIT {
            state.calls.pop_front();
        }
        state.calls.push_back(operation.to_string());
        if let Some(err) = state
            .failures
            .get_mut(operation)
            .and_then(VecDeque::pop_front)
        {
            debug!(operation, error = %err, "broker: injected failure");
            return Err(err);
        }
        Ok(state)
    }

    /// Make the next call to `operation` fail with `err`
    pub fn fail_next(&self, operation: &str, err: MessagingError) {
        self.state()
            .failures
            .entry(operation.to_string())
            .or_default()
            .push_back(err);
    }

    /// Operation names in call order, oldest first, up to `CALL_LOG_LIMIT`
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.iter().cloned().collect()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn topic_arn(&self, name: &str) -> Option<String> {
        self.state()
            .topics
            .iter()
            .find(|(_, topic)| topic.name == name)
            .map(|(arn, _)| arn.clone())
    }

    /// Queue ARNs subscribed to the topic named `topic_name`
    pub fn subscriptions(&self, topic_name: &str) -> Vec<String> {
        self.state()
            .topics
            .values()
            .find(|topic| topic.name == topic_name)
            .map(|topic| topic.subscriptions.clone())
            .unwrap_or_default()
    }

    pub fn queue_url(&self, name: &str) -> Option<String> {
        self.state()
            .queues
            .iter()
            .find(|(_, queue)| queue.name == name)
            .map(|(url, _)| url.clone())
    }

    pub fn queue_attribute(&self, queue_name: &str, attribute: &str) -> Option<String> {
        self.state()
            .queues
            .values()
            .find(|queue| queue.name == queue_name)
            .and_then(|queue| queue.attributes.get(attribute).cloned())
    }

    /// Bodies currently held by the queue named `queue_name`, oldest first
    pub fn queue_bodies(&self, queue_name: &str) -> Vec<String> {
        self.state()
            .queues
            .values()
            .find(|queue| queue.name == queue_name)
            .map(|queue| queue.messages.iter().map(|m| m.body.clone()).collect())
            .unwrap_or_default()
    }

    fn queue_arn_for(&self, name: &str) -> String {
        format!("arn:aws:sqs:{}:{}:{}", self.region, self.account_id, name)
    }

    fn queue_url_for(&self, name: &str) -> String {
        format!(
            "https://sqs.{}.amazonaws.com/{}/{}",
            self.region, self.account_id, name
        )
    }
}

#[async_trait]
impl MessagingClient for InMemoryBroker {
    async fn create_topic(&self, name: &str) -> Result<String, MessagingError> {
        let arn = format!("arn:aws:sns:{}:{}:{}", self.region, self.account_id, name);
        let mut state = self.enter("create_topic")?;
        state.topics.entry(arn.clone()).or_insert_with(|| Topic {
            name: name.to_string(),
            subscriptions: Vec::new(),
        });
        Ok(arn)
    }

    async fn publish(&self, topic_arn: &str, message: &str) -> Result<String, MessagingError> {
        let mut state = self.enter("publish")?;
        let subscriptions = state
            .topics
            .get(topic_arn)
            .map(|topic| topic.subscriptions.clone())
            .ok_or_else(|| {
                MessagingError::service("NotFound", format!("topic {topic_arn} does not exist"))
            })?;

        let message_id = state.next_id("sns");
        let envelope = json!({
            "Type": "Notification",
            "MessageId": message_id,
            "TopicArn": topic_arn,
            "Message": message,
            "Timestamp": chrono::Utc::now().to_rfc3339(),
        })
        .to_string();

        for queue_arn in subscriptions {
            let Some(url) = state.queue_url_by_arn(&queue_arn) else {
                continue;
            };
            let id = state.next_id("msg");
            if let Ok(queue) = state.queue_mut(&url) {
                queue.messages.push_back(StoredMessage {
                    message_id: id,
                    body: envelope.clone(),
                    receive_count: 0,
                    receipt_handle: None,
                });
            }
        }

        Ok(message_id)
    }

    async fn subscribe(
        &self,
        topic_arn: &str,
        protocol: &str,
        endpoint: &str,
    ) -> Result<String, MessagingError> {
        let mut state = self.enter("subscribe")?;
        if !protocol.eq_ignore_ascii_case("sqs") {
            return Err(MessagingError::service(
                "InvalidParameter",
                format!("unsupported protocol {protocol}"),
            ));
        }
        if state.queue_url_by_arn(endpoint).is_none() {
            return Err(MessagingError::service(
                "InvalidParameter",
                format!("no queue with ARN {endpoint}"),
            ));
        }

        let topic = state.topics.get_mut(topic_arn).ok_or_else(|| {
            MessagingError::service("NotFound", format!("topic {topic_arn} does not exist"))
        })?;
        if !topic.subscriptions.iter().any(|arn| arn == endpoint) {
            topic.subscriptions.push(endpoint.to_string());
        }

        let queue_name = endpoint.rsplit(':').next().unwrap_or(endpoint);
        Ok(format!("{topic_arn}:{queue_name}"))
    }

    async fn create_queue(&self, name: &str) -> Result<String, MessagingError> {
        let url = self.queue_url_for(name);
        let arn = self.queue_arn_for(name);
        let mut state = self.enter("create_queue")?;
        state.queues.entry(url.clone()).or_insert_with(|| Queue {
            name: name.to_string(),
            arn,
            attributes: HashMap::new(),
            messages: VecDeque::new(),
        });
        Ok(url)
    }

    async fn get_queue_url(&self, name: &str) -> Result<String, MessagingError> {
        let state = self.enter("get_queue_url")?;
        state
            .queues
            .iter()
            .find(|(_, queue)| queue.name == name)
            .map(|(url, _)| url.clone())
            .ok_or_else(|| {
                MessagingError::service(
                    "AWS.SimpleQueueService.NonExistentQueue",
                    format!("queue {name} does not exist"),
                )
            })
    }

    async fn get_queue_attributes(
        &self,
        queue_url: &str,
        names: &[&str],
    ) -> Result<HashMap<String, String>, MessagingError> {
        let names = retain_known_attributes(names);
        let mut state = self.enter("get_queue_attributes")?;
        let queue = state.queue_mut(queue_url)?;

        let mut all = queue.attributes.clone();
        all.insert("QueueArn".to_string(), queue.arn.clone());
        all.insert(
            "ApproximateNumberOfMessages".to_string(),
            queue.messages.len().to_string(),
        );

        if names.contains(&"All") {
            return Ok(all);
        }
        Ok(all
            .into_iter()
            .filter(|(name, _)| names.contains(&name.as_str()))
            .collect())
    }

    async fn set_queue_attributes(
        &self,
        queue_url: &str,
        attributes: HashMap<String, String>,
    ) -> Result<(), MessagingError> {
        let mut state = self.enter("set_queue_attributes").map_err(set_attributes_error)?;
        let queue = state.queue_mut(queue_url).map_err(set_attributes_error)?;

        if let Some(name) = attributes.keys().find(|name| !is_known_attribute(name)) {
            return Err(set_attributes_error(MessagingError::service(
                "InvalidAttributeName",
                name.clone(),
            )));
        }
        if let Some(raw) = attributes.get("RedrivePolicy") {
            serde_json::from_str::<RedrivePolicy>(raw).map_err(|e| {
                set_attributes_error(MessagingError::service("InvalidAttributeValue", e.to_string()))
            })?;
        }

        queue.attributes.extend(attributes);
        Ok(())
    }

    async fn send_message(&self, queue_url: &str, body: &str) -> Result<String, MessagingError> {
        let mut state = self.enter("send_message")?;
        let message_id = state.next_id("msg");
        state.queue_mut(queue_url)?.messages.push_back(StoredMessage {
            message_id: message_id.clone(),
            body: body.to_string(),
            receive_count: 0,
            receipt_handle: None,
        });
        Ok(message_id)
    }

    async fn receive_messages(
        &self,
        queue_url: &str,
        max_messages: u32,
        _wait_seconds: u32,
    ) -> Result<Vec<QueueMessage>, MessagingError> {
        let mut state = self.enter("receive_messages")?;

        let redrive = state
            .queue_mut(queue_url)?
            .attributes
            .get("RedrivePolicy")
            .and_then(|raw| serde_json::from_str::<RedrivePolicy>(raw).ok());
        let dlq_url = redrive
            .as_ref()
            .and_then(|policy| state.queue_url_by_arn(&policy.dead_letter_target_arn));

        let pending: Vec<StoredMessage> = state.queue_mut(queue_url)?.messages.drain(..).collect();
        let mut kept = VecDeque::with_capacity(pending.len());
        let mut dead = Vec::new();
        let mut received = Vec::new();

        for mut message in pending {
            if received.len() >= max_messages as usize {
                kept.push_back(message);
                continue;
            }

            let exhausted = match (&redrive, &dlq_url) {
                (Some(policy), Some(_)) => message.receive_count >= policy.max_receive_count,
                _ => false,
            };
            if exhausted {
                dead.push(message);
                continue;
            }

            message.receive_count += 1;
            let handle = state.next_id("rh");
            message.receipt_handle = Some(handle.clone());
            received.push(QueueMessage {
                message_id: message.message_id.clone(),
                receipt_handle: handle,
                body: message.body.clone(),
            });
            kept.push_back(message);
        }

        state.queue_mut(queue_url)?.messages = kept;

        if let Some(dlq_url) = dlq_url {
            if !dead.is_empty() {
                debug!(count = dead.len(), dlq = %dlq_url, "broker: redriving messages");
                let dlq = state.queue_mut(&dlq_url)?;
                for mut message in dead {
                    message.receive_count = 0;
                    message.receipt_handle = None;
                    dlq.messages.push_back(message);
                }
            }
        }

        Ok(received)
    }

    async fn delete_message(&self, queue_url: &str, receipt_handle: &str) -> Result<(), MessagingError> {
        let mut state = self.enter("delete_message")?;
        let queue = state.queue_mut(queue_url)?;
        let position = queue
            .messages
            .iter()
            .position(|m| m.receipt_handle.as_deref() == Some(receipt_handle))
            .ok_or_else(|| {
                MessagingError::service(
                    "ReceiptHandleIsInvalid",
                    format!("unknown receipt handle {receipt_handle}"),
                )
            })?;
        queue.messages.remove(position);
        Ok(())
    }
}
