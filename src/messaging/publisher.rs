use super::client::MessagingClient;
use crate::error::MessagingError;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Handle for publishing from inside handlers
#[derive(Clone)]
pub struct Publisher {
    client: Arc<dyn MessagingClient>,
}

impl Publisher {
    pub fn new(client: Arc<dyn MessagingClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<dyn MessagingClient> {
        &self.client
    }

    /// JSON-encode `data` and publish it to the topic named `topic_name`,
    /// creating the topic if needed. Returns the message id.
    pub async fn publish_to_topic<T: Serialize + ?Sized>(
        &self,
        topic_name: &str,
        data: &T,
    ) -> Result<String, MessagingError> {
        let payload = serde_json::to_string(data)?;
        let topic_arn = self.client.create_topic(topic_name).await?;
        let message_id = self.client.publish(&topic_arn, &payload).await?;
        debug!(topic = topic_name, message_id = %message_id, "publisher: published to topic");
        Ok(message_id)
    }

    /// JSON-encode `data` and send it to the queue named `queue_name`
    pub async fn send_to_queue<T: Serialize + ?Sized>(
        &self,
        queue_name: &str,
        data: &T,
    ) -> Result<String, MessagingError> {
        let payload = serde_json::to_string(data)?;
        let queue_url = self.client.get_queue_url(queue_name).await?;
        let message_id = self.client.send_message(&queue_url, &payload).await?;
        debug!(queue = queue_name, message_id = %message_id, "publisher: sent to queue");
        Ok(message_id)
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Publisher")
    }
}
