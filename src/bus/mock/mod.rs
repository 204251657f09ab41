//! Mock message bus implementation for testing.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BusError, MessageBus, PublishOptions, Result};

/// A publication captured by [`MockBus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: String,
    pub options: PublishOptions,
}

/// Mock message bus for testing.
#[derive(Default)]
pub struct MockBus {
    options: PublishOptions,
    published: RwLock<Vec<Published>>,
    fail_on_publish: RwLock<bool>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: PublishOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub async fn set_fail_on_publish(&self, fail: bool) {
        *self.fail_on_publish.write().await = fail;
    }

    pub async fn published_count(&self) -> usize {
        self.published.read().await.len()
    }

    pub async fn published(&self) -> Vec<Published> {
        self.published.read().await.clone()
    }

    pub async fn take_published(&self) -> Vec<Published> {
        std::mem::take(&mut *self.published.write().await)
    }

    /// Payloads published to `topic`, in order.
    pub async fn payloads_for(&self, topic: &str) -> Vec<String> {
        self.published
            .read()
            .await
            .iter()
            .filter(|p| p.topic == topic)
            .map(|p| p.payload.clone())
            .collect()
    }
}

#[async_trait]
impl MessageBus for MockBus {
    async fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        if *self.fail_on_publish.read().await {
            return Err(BusError::Publish("Mock publish failure".to_string()));
        }
        self.published.write().await.push(Published {
            topic: topic.to_string(),
            payload: payload.to_string(),
            options: self.options,
        });
        Ok(())
    }
}
