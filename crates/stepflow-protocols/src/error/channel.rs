//! Event channel errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Commit failed: {0}")]
    CommitFailed(String),

    #[error("Delivery {offset} on {topic}/{partition} is not outstanding")]
    NotOutstanding {
        topic: String,
        partition: u32,
        offset: u64,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
