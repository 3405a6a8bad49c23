// Hopper
// Copyright 2025 The Hopper Authors
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! Queue storage backed by Amazon SQS.
//!
//! Queue names map directly to SQS queues, which must already exist.  SQS
//! assigns its own message ids, so the id returned by `push` is the one the
//! service chose, and `get` is unsupported because SQS cannot address an
//! individual message on the queue.

use crate::backend::{validate_queue_name, Backend, BackendError, BackendResult};
use crate::clocks::Clock;
use aws_config::BehaviorVersion;
use aws_sdk_sqs::types::QueueAttributeName;
use std::sync::Arc;

/// Queue storage backed by Amazon SQS, one SQS queue per queue name.
#[derive(Clone)]
pub struct SqsBackend {
    /// Shared SQS service client.
    client: aws_sdk_sqs::Client,

    /// Clock used to convert absolute delays into relative ones.
    clock: Arc<dyn Clock + Send + Sync>,
}

impl SqsBackend {
    /// Creates a new backend for the region named in `conn_str`, which has
    /// the form `sqs://region`.  Credentials come from the ambient AWS
    /// environment.
    pub async fn connect(
        conn_str: &str,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> BackendResult<Self> {
        let region = match conn_str.strip_prefix("sqs://") {
            Some(region) if !region.is_empty() => region.trim_end_matches('/').to_owned(),
            _ => {
                return Err(BackendError::InvalidDsn(
                    conn_str.to_owned(),
                    "Expected sqs://region".to_owned(),
                ))
            }
        };
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(region))
            .load()
            .await;
        Ok(Self { client: aws_sdk_sqs::Client::new(&config), clock })
    }

    /// Resolves `queue_name` to the URL of its SQS queue.
    async fn queue_url(&self, queue_name: &str) -> BackendResult<String> {
        validate_queue_name(queue_name)?;
        let response = self
            .client
            .get_queue_url()
            .queue_name(queue_name)
            .send()
            .await
            .map_err(|e| BackendError::Backend(e.to_string()))?;
        response
            .queue_url()
            .map(str::to_owned)
            .ok_or_else(|| BackendError::Backend(format!("No URL for queue {}", queue_name)))
    }
}

#[async_trait::async_trait]
impl Backend for SqsBackend {
    async fn len(&self, queue_name: &str) -> BackendResult<usize> {
        let queue_url = self.queue_url(queue_name).await?;
        let response = self
            .client
            .get_queue_attributes()
            .queue_url(queue_url)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessages)
            .send()
            .await
            .map_err(|e| BackendError::Backend(e.to_string()))?;
        let count = response
            .attributes()
            .and_then(|attrs| attrs.get(&QueueAttributeName::ApproximateNumberOfMessages))
            .map(String::as_str)
            .unwrap_or("0");
        count.parse::<usize>().map_err(|e| BackendError::Backend(e.to_string()))
    }

    async fn push(
        &self,
        queue_name: &str,
        task_id: &str,
        data: &str,
        delay_until: Option<i64>,
    ) -> BackendResult<String> {
        let queue_url = self.queue_url(queue_name).await?;
        let mut request =
            self.client.send_message().queue_url(queue_url).message_body(data.to_owned());
        if let Some(delay_until) = delay_until {
            let delay_seconds = delay_until - self.clock.now_ts();
            if delay_seconds > 0 {
                let delay_seconds = i32::try_from(delay_seconds)
                    .map_err(|e| BackendError::Backend(e.to_string()))?;
                request = request.delay_seconds(delay_seconds);
            }
        }
        let response =
            request.send().await.map_err(|e| BackendError::Backend(e.to_string()))?;
        // SQS assigns its own id to the message; honor it over ours.
        Ok(response.message_id().map(str::to_owned).unwrap_or_else(|| task_id.to_owned()))
    }

    async fn pop(&self, queue_name: &str) -> BackendResult<Option<String>> {
        let queue_url = self.queue_url(queue_name).await?;
        let response = self
            .client
            .receive_message()
            .queue_url(&queue_url)
            .max_number_of_messages(1)
            .send()
            .await
            .map_err(|e| BackendError::Backend(e.to_string()))?;
        let message = match response.messages().first() {
            Some(message) => message.clone(),
            None => return Ok(None),
        };
        if let Some(receipt_handle) = message.receipt_handle() {
            self.client
                .delete_message()
                .queue_url(&queue_url)
                .receipt_handle(receipt_handle)
                .send()
                .await
                .map_err(|e| BackendError::Backend(e.to_string()))?;
        }
        Ok(message.body().map(str::to_owned))
    }

    async fn get(&self, _queue_name: &str, _task_id: &str) -> BackendResult<Option<String>> {
        Err(BackendError::Unsupported("SQS cannot fetch a specific message off the queue"))
    }

    async fn drop_all(&self, queue_name: &str) -> BackendResult<()> {
        let queue_url = self.queue_url(queue_name).await?;
        self.client
            .purge_queue()
            .queue_url(queue_url)
            .send()
            .await
            .map_err(|e| BackendError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clocks::SystemClock;

    #[tokio::test]
    async fn test_connect_rejects_bad_dsn() {
        let clock = Arc::new(SystemClock::default());
        for conn_str in ["sqs://", "us-east-1", "sqs:us-east-1"] {
            match SqsBackend::connect(conn_str, clock.clone()).await {
                Err(BackendError::InvalidDsn(dsn, _)) => assert_eq!(conn_str, dsn),
                e => panic!("Unexpected result: {:?}", e),
            }
        }
    }
}
