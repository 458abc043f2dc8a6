//! Log-only publisher - reports transitions without a broker
//!
//! Used by `--dry-run` and handy when debugging detection on a player
//! without MQTT.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use super::{Publisher, StateMessage};

/// Logs every published message at info level
#[derive(Debug, Default)]
pub struct LogPublisher {
    published: AtomicU64,
}

impl LogPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages published so far
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Publisher for LogPublisher {
    fn name(&self) -> &str {
        "log"
    }

    async fn publish(&self, message: &StateMessage) {
        let n = self.published.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            "📣 [dry-run #{}] {} = '{}', {} = '{}'",
            n,
            message.source_topic,
            message.source_value,
            message.detail_topic,
            message.detail_value
        );
    }

    async fn shutdown(&self) -> Result<()> {
        info!("Log publisher shutdown ({} message(s))", self.published());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::Topics;
    use crate::state::AudioState;

    #[tokio::test]
    async fn test_log_publisher_lifecycle() {
        let publisher = LogPublisher::new();
        assert_eq!(publisher.name(), "log");

        let message = StateMessage::new(&Topics::new("s", "d"), &AudioState::idle());
        publisher.publish(&message).await;
        publisher.publish(&message).await;
        assert_eq!(publisher.published(), 2);

        assert!(publisher.shutdown().await.is_ok());
    }
}
