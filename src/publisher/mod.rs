//! Change publisher boundary
//!
//! A confirmed transition is handed to a [`Publisher`] as a
//! [`StateMessage`]: two topic/value pairs, absent values rendered as empty
//! strings. Publishing is fire-and-forget; implementations log their own
//! failures and never report them to the monitor loop.

use anyhow::Result;
use async_trait::async_trait;

use crate::config::MqttConfig;
use crate::state::AudioState;

pub mod log;
pub mod mqtt;

pub use log::LogPublisher;
pub use mqtt::MqttPublisher;

/// Destination topics for the two published values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub source: String,
    pub details: String,
}

impl Topics {
    pub fn new(source: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            details: details.into(),
        }
    }

    pub fn from_config(config: &MqttConfig) -> Self {
        Self::new(config.source_topic.clone(), config.details_topic.clone())
    }
}

/// What crosses the publish boundary for one confirmed state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateMessage {
    pub source_topic: String,
    pub source_value: String,
    pub detail_topic: String,
    pub detail_value: String,
}

impl StateMessage {
    pub fn new(topics: &Topics, state: &AudioState) -> Self {
        Self {
            source_topic: topics.source.clone(),
            source_value: state.source_label().to_string(),
            detail_topic: topics.details.clone(),
            detail_value: state.detail_label().to_string(),
        }
    }
}

/// Publisher trait - every bus integration implements this
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publisher name for logs (e.g. "mqtt", "log")
    fn name(&self) -> &str;

    /// Publish one state; failures are logged, never returned
    async fn publish(&self, message: &StateMessage);

    /// Flush and disconnect
    async fn shutdown(&self) -> Result<()>;
}
