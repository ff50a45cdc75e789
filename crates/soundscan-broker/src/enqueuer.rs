use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;

use soundscan_protocol::Request;

use crate::publisher::{BrokerPublisher, PublishError};

#[derive(Error, Debug)]
pub enum EnqueueError {
    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("Request serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Pluggable sink for normalized requests. Implementations are safe
/// under concurrent calls; `close` is idempotent.
#[async_trait]
pub trait Enqueuer: Send + Sync {
    async fn enqueue(&self, request: Request) -> Result<(), EnqueueError>;
    async fn close(&self) -> Result<(), EnqueueError>;
}

impl std::fmt::Debug for dyn Enqueuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Enqueuer")
    }
}

/// Drops every request after logging it. Used when no broker is
/// configured and in environments without network access.
pub struct NullEnqueuer;

#[async_trait]
impl Enqueuer for NullEnqueuer {
    async fn enqueue(&self, request: Request) -> Result<(), EnqueueError> {
        tracing::debug!(
            name = request.name(),
            message_type = %request.message_type(),
            "Dropping request (no enqueuer configured)"
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), EnqueueError> {
        Ok(())
    }
}

/// Serializes requests and hands them to the broker publisher. Stamps
/// `update_date` here so the field reflects publish-attempt time, and
/// returns the publisher's error unchanged; retrying is the publisher's
/// concern.
pub struct BrokerEnqueuer {
    publisher: BrokerPublisher,
}

impl BrokerEnqueuer {
    pub fn new(publisher: BrokerPublisher) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl Enqueuer for BrokerEnqueuer {
    async fn enqueue(&self, request: Request) -> Result<(), EnqueueError> {
        let payload = request.wire_body(Utc::now())?;
        self.publisher.publish(&payload).await?;
        tracing::debug!(
            name = request.name(),
            message_type = %request.message_type(),
            bytes = payload.len(),
            "Request published"
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), EnqueueError> {
        self.publisher.close().await?;
        Ok(())
    }
}
