use hangar_core::prelude::*;

use aws_sdk_sqs::Client as SqsClient;
use aws_sdk_sqs::error::ProvideErrorMetadata;
use std::time::Duration;
use tracing::debug;

/// SQS limits a single receive to ten messages and a twenty second long poll.
const MAX_BATCH: usize = 10;
const MAX_WAIT: Duration = Duration::from_secs(20);

#[derive(Clone, Debug)]
pub struct SqsQueue {
    client: SqsClient,
}

impl SqsQueue {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: SqsClient::new(config),
        }
    }
}

impl WorkQueue for SqsQueue {
    async fn resolve(&self, name: &str) -> Result<QueueHandle, QueueError> {
        let output = self
            .client
            .get_queue_url()
            .queue_name(name)
            .send()
            .await
            .map_err(|e| match e.code() {
                Some("AWS.SimpleQueueService.NonExistentQueue" | "QueueDoesNotExist") => {
                    QueueError::NotFound(name.to_string())
                }
                _ => QueueError::System(format!("SQS get_queue_url failed for {name}: {e}")),
            })?;

        output
            .queue_url()
            .map(|url| QueueHandle(url.to_string()))
            .ok_or_else(|| QueueError::NotFound(name.to_string()))
    }

    async fn send(&self, queue: &QueueHandle, message: &JobMessage) -> Result<(), QueueError> {
        let body = serde_json::to_string(message)
            .map_err(|e| QueueError::MalformedMessage(e.to_string()))?;

        self.client
            .send_message()
            .queue_url(&queue.0)
            .message_body(body)
            .send()
            .await
            .map_err(|e| QueueError::System(format!("SQS send_message failed: {e}")))?;

        debug!("Sent job {} to {}", message.id, queue.0);
        Ok(())
    }

    async fn receive(
        &self,
        queue: &QueueHandle,
        max: usize,
        wait: Duration,
    ) -> Result<Vec<Delivery>, QueueError> {
        let max = max.clamp(1, MAX_BATCH) as i32;
        let wait = wait.min(MAX_WAIT).as_secs() as i32;

        let output = self
            .client
            .receive_message()
            .queue_url(&queue.0)
            .max_number_of_messages(max)
            .wait_time_seconds(wait)
            .send()
            .await
            .map_err(|e| QueueError::System(format!("SQS receive_message failed: {e}")))?;

        Ok(output
            .messages()
            .iter()
            .filter_map(|m| {
                Some(Delivery {
                    body: m.body()?.to_string(),
                    receipt: ReceiptHandle(m.receipt_handle()?.to_string()),
                })
            })
            .collect())
    }

    async fn delete(&self, queue: &QueueHandle, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(&queue.0)
            .receipt_handle(&receipt.0)
            .send()
            .await
            .map_err(|e| match e.code() {
                Some("ReceiptHandleIsInvalid") => QueueError::InvalidReceipt(receipt.0.clone()),
                _ => QueueError::System(format!("SQS delete_message failed: {e}")),
            })?;
        Ok(())
    }
}
