//! Event channel protocol definitions.
//!
//! A channel is a set of named topics, each split into partitions. Records
//! with the same key land on the same partition and are delivered in send
//! order. Delivery is at-least-once: a record is redelivered until the
//! consuming group commits past it.

use async_trait::async_trait;

use crate::error::ChannelError;

/// A record handed to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    pub key: String,
    pub payload: Vec<u8>,
}

/// Producer side of the channel.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Append `payload` to `topic` on the partition selected by `key`.
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), ChannelError>;
}

/// Consumer side of the channel, bound to one topic and consumer group.
///
/// At most one delivery per partition is outstanding; it must be committed
/// or rewound before later records of that partition are handed out.
#[async_trait]
pub trait EventSubscriber: Send {
    /// Wait for the next record of an assigned partition.
    async fn recv(&mut self) -> Result<Delivery, ChannelError>;

    /// Acknowledge `delivery`; the group will not see it again.
    async fn commit(&mut self, delivery: &Delivery) -> Result<(), ChannelError>;

    /// Release `delivery` without acknowledging it so it is delivered again.
    async fn rewind(&mut self, delivery: &Delivery) -> Result<(), ChannelError>;
}
