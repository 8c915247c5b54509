//! Topic/queue provisioning for queue bindings
//!
//! With `auto_create_resources` off the queue URL is derived from the region,
//! account and queue name without touching the network. Otherwise every step
//! is create-or-get, so running setup twice leaves the same resources behind.

use super::client::MessagingClient;
use crate::config::{AwsEnvironment, MessagingSettings};
use crate::error::{ConfigurationError, MessagingError, RuntimeError, SetupError};
use crate::models::QueueSpec;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use url::Url;

/// URLs (and, when created, the topic ARN) resolved for one queue binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedQueue {
    pub queue_url: String,
    pub dlq_url: Option<String>,
    pub topic_arn: Option<String>,
}

pub struct QueueProvisioner {
    client: Arc<dyn MessagingClient>,
    settings: MessagingSettings,
    aws: AwsEnvironment,
}

impl QueueProvisioner {
    pub fn new(client: Arc<dyn MessagingClient>, settings: MessagingSettings, aws: AwsEnvironment) -> Self {
        Self {
            client,
            settings,
            aws,
        }
    }

    pub async fn setup(&self, spec: &QueueSpec) -> Result<ProvisionedQueue, RuntimeError> {
        if !self.settings.auto_create_resources {
            let provisioned = self.resolve(spec)?;
            info!(
                queue = spec.queue_name(),
                queue_url = %provisioned.queue_url,
                "provisioner: resolved queue without creating resources"
            );
            return Ok(provisioned);
        }

        Ok(self.create(spec).await?)
    }

    /// Derive URLs from the environment; no calls are made to the client
    pub fn resolve(&self, spec: &QueueSpec) -> Result<ProvisionedQueue, ConfigurationError> {
        let region = self.aws.region()?;
        let account = self.aws.account_id()?;

        let url = queue_url(self.aws.endpoint.as_ref(), region, account, spec.queue_name())?;
        let dlq_url = spec
            .dlq_name()
            .map(|dlq| queue_url(self.aws.endpoint.as_ref(), region, account, dlq))
            .transpose()?;

        Ok(ProvisionedQueue {
            queue_url: url,
            dlq_url,
            topic_arn: None,
        })
    }

    async fn create(&self, spec: &QueueSpec) -> Result<ProvisionedQueue, SetupError> {
        let topic_arn = self
            .client
            .create_topic(spec.topic_name())
            .await
            .map_err(step("create topic", spec.topic_name()))?;

        let dlq_url = match spec.dlq_name() {
            Some(dlq) => Some(
                self.client
                    .create_queue(dlq)
                    .await
                    .map_err(step("create dead-letter queue", dlq))?,
            ),
            None => None,
        };

        let queue_url = self
            .client
            .create_queue(spec.queue_name())
            .await
            .map_err(step("create queue", spec.queue_name()))?;

        let queue_arn = self.queue_arn(&queue_url).await?;

        if let Some(dlq_url) = &dlq_url {
            let dlq_arn = self.queue_arn(dlq_url).await?;
            let redrive = json!({
                "deadLetterTargetArn": dlq_arn,
                "maxReceiveCount": self.settings.dlq_max_retry_count,
            });
            self.client
                .set_queue_attributes(
                    &queue_url,
                    HashMap::from([("RedrivePolicy".to_string(), redrive.to_string())]),
                )
                .await
                .map_err(step("set redrive policy on", &queue_url))?;
        }

        self.client
            .set_queue_attributes(
                &queue_url,
                HashMap::from([(
                    "Policy".to_string(),
                    allow_topic_policy(&queue_arn, &topic_arn).to_string(),
                )]),
            )
            .await
            .map_err(step("grant topic access to", &queue_url))?;

        self.client
            .subscribe(&topic_arn, "sqs", &queue_arn)
            .await
            .map_err(step("subscribe queue to", &topic_arn))?;

        info!(
            topic = spec.topic_name(),
            queue = spec.queue_name(),
            dlq = spec.dlq_name(),
            queue_url = %queue_url,
            "provisioner: queue ready"
        );

        Ok(ProvisionedQueue {
            queue_url,
            dlq_url,
            topic_arn: Some(topic_arn),
        })
    }

    async fn queue_arn(&self, queue_url: &str) -> Result<String, SetupError> {
        let mut attributes = self
            .client
            .get_queue_attributes(queue_url, &["QueueArn"])
            .await
            .map_err(step("read attributes of", queue_url))?;

        attributes
            .remove("QueueArn")
            .ok_or_else(|| SetupError::MissingQueueAttribute {
                attribute: "QueueArn",
                queue_url: queue_url.to_string(),
            })
    }
}

fn step<'a>(step: &'static str, resource: &'a str) -> impl FnOnce(MessagingError) -> SetupError + 'a {
    move |source| SetupError::Provisioning {
        step,
        resource: resource.to_string(),
        source,
    }
}

/// Resource policy letting `topic_arn` send to the queue
pub fn allow_topic_policy(queue_arn: &str, topic_arn: &str) -> serde_json::Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Sid": "Allow-SNS-SendMessage",
            "Effect": "Allow",
            "Principal": { "Service": "sns.amazonaws.com" },
            "Action": "SQS:SendMessage",
            "Resource": queue_arn,
            "Condition": {
                "ArnEquals": { "aws:SourceArn": topic_arn }
            }
        }]
    })
}

/// `https://sqs.{region}.amazonaws.com/{account}/{queue}`, or the same path under `endpoint`
pub fn queue_url(
    endpoint: Option<&Url>,
    region: &str,
    account_id: &str,
    queue_name: &str,
) -> Result<String, ConfigurationError> {
    let invalid = |reason: String| ConfigurationError::InvalidValue {
        field: "queue url",
        reason,
    };

    let mut url = match endpoint {
        Some(endpoint) => endpoint.clone(),
        None => Url::parse(&format!("https://sqs.{region}.amazonaws.com"))
            .map_err(|e| invalid(e.to_string()))?,
    };

    if url.cannot_be_a_base() {
        return Err(invalid(format!("{url} cannot be a base")));
    }

    url.path_segments_mut()
        .map_err(|_| invalid("endpoint cannot be a base".to_string()))?
        .pop_if_empty()
        .push(account_id)
        .push(queue_name);

    Ok(url.to_string())
}
