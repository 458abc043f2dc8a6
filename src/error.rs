//! Error types for the resolver and the publish boundary

use thiserror::Error;

/// Internal failure while resolving a snapshot
///
/// Evidence readers never fail on missing evidence; this only covers
/// the machinery around them.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{reader} evidence task failed: {source}")]
    Task {
        reader: &'static str,
        #[source]
        source: tokio::task::JoinError,
    },
}

/// Failure handing a message to the bus client
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to queue publish on '{topic}': {source}")]
    Client {
        topic: String,
        #[source]
        source: rumqttc::ClientError,
    },
}
