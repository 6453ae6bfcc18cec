use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_sqs::types::MessageSystemAttributeName;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of the "media uploaded, process this meal" event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealUploadedEvent {
    pub meal_id: Uuid,
}

/// One delivery of a queue message. `receive_count` starts at 1 and grows on
/// every redelivery of the same message.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub body: String,
    pub receipt: String,
    pub receive_count: u32,
}

/// Durable at-least-once transport between intake and the processor.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn publish(&self, event: &MealUploadedEvent) -> anyhow::Result<()>;

    /// Long-poll for a batch of deliveries; may return an empty batch.
    async fn receive(&self) -> anyhow::Result<Vec<QueueMessage>>;

    /// Remove the message for good (processed, duplicate, or poison).
    async fn ack(&self, receipt: &str) -> anyhow::Result<()>;

    /// Make the message visible again after `delay` for another attempt.
    async fn requeue(&self, receipt: &str, delay: Duration) -> anyhow::Result<()>;
}

pub struct SqsQueue {
    client: aws_sdk_sqs::Client,
    queue_url: String,
    wait_time_secs: i32,
}

impl SqsQueue {
    pub async fn new(queue_url: &str, wait_time_secs: i32) -> anyhow::Result<Self> {
        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;
        Ok(Self {
            client: aws_sdk_sqs::Client::new(&shared),
            queue_url: queue_url.to_string(),
            wait_time_secs,
        })
    }
}

#[async_trait]
impl WorkQueue for SqsQueue {
    async fn publish(&self, event: &MealUploadedEvent) -> anyhow::Result<()> {
        let body = serde_json::to_string(event)?;
        self.client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
            .context("sqs send_message")?;
        Ok(())
    }

    async fn receive(&self) -> anyhow::Result<Vec<QueueMessage>> {
        let out = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(10)
            .wait_time_seconds(self.wait_time_secs)
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .send()
            .await
            .context("sqs receive_message")?;

        let messages = out
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| {
                let receive_count = m
                    .attributes
                    .as_ref()
                    .and_then(|a| a.get(&MessageSystemAttributeName::ApproximateReceiveCount))
                    .and_then(|v| v.parse::<u32>().ok())
                    .unwrap_or(1);
                Some(QueueMessage {
                    body: m.body?,
                    receipt: m.receipt_handle?,
                    receive_count,
                })
            })
            .collect();
        Ok(messages)
    }

    async fn ack(&self, receipt: &str) -> anyhow::Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt)
            .send()
            .await
            .context("sqs delete_message")?;
        Ok(())
    }

    async fn requeue(&self, receipt: &str, delay: Duration) -> anyhow::Result<()> {
        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt)
            .visibility_timeout(delay.as_secs().min(i32::MAX as u64) as i32)
            .send()
            .await
            .context("sqs change_message_visibility")?;
        Ok(())
    }
}
