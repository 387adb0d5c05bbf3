//! In-process event broker.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::trace;

use stepflow_protocols::{ChannelError, Delivery, EventPublisher, EventSubscriber};

use crate::cursor::Cursors;
use crate::partition::{partition_for, PartitionAssignment};

#[derive(Debug, Clone)]
struct StoredRecord {
    key: String,
    payload: Vec<u8>,
}

#[derive(Default)]
struct BrokerState {
    /// topic -> partition -> records
    topics: HashMap<String, Vec<Vec<StoredRecord>>>,
    /// (group, topic, partition) -> next offset to deliver
    committed: HashMap<(String, String, u32), u64>,
}

struct BrokerInner {
    partitions: u32,
    state: Mutex<BrokerState>,
    notify: Notify,
}

/// In-process partitioned broker.
///
/// Cloning yields another handle to the same broker.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl MemoryBroker {
    /// Create a broker whose topics have `partitions` partitions.
    pub fn new(partitions: u32) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                partitions: partitions.max(1),
                state: Mutex::new(BrokerState::default()),
                notify: Notify::new(),
            }),
        }
    }

    pub fn partitions(&self) -> u32 {
        self.inner.partitions
    }

    /// Subscribe to `topic` as a member of `group`, starting at the group's
    /// committed offsets.
    pub fn subscribe(
        &self,
        topic: impl Into<String>,
        group: impl Into<String>,
        assignment: PartitionAssignment,
    ) -> MemorySubscriber {
        let topic = topic.into();
        let group = group.into();
        let cursors = {
            let state = self.inner.state.lock();
            Cursors::new(
                topic.clone(),
                assignment.partitions(self.inner.partitions),
                |p| {
                    state
                        .committed
                        .get(&(group.clone(), topic.clone(), p))
                        .copied()
                        .unwrap_or(0)
                },
            )
        };
        MemorySubscriber {
            broker: self.clone(),
            group,
            cursors,
        }
    }

    /// Every record published to `topic`, partition by partition.
    pub fn records(&self, topic: &str) -> Vec<Delivery> {
        let state = self.inner.state.lock();
        let Some(partitions) = state.topics.get(topic) else {
            return Vec::new();
        };
        partitions
            .iter()
            .enumerate()
            .flat_map(|(p, records)| {
                records.iter().enumerate().map(move |(offset, r)| Delivery {
                    topic: topic.to_string(),
                    partition: p as u32,
                    offset: offset as u64,
                    key: r.key.clone(),
                    payload: r.payload.clone(),
                })
            })
            .collect()
    }

    /// Committed offset of `group` on one partition of `topic`.
    pub fn committed(&self, group: &str, topic: &str, partition: u32) -> u64 {
        self.inner
            .state
            .lock()
            .committed
            .get(&(group.to_string(), topic.to_string(), partition))
            .copied()
            .unwrap_or(0)
    }

    fn fetch(&self, topic: &str, partition: u32, offset: u64) -> Option<StoredRecord> {
        let state = self.inner.state.lock();
        state
            .topics
            .get(topic)?
            .get(partition as usize)?
            .get(offset as usize)
            .cloned()
    }
}

#[async_trait]
impl EventPublisher for MemoryBroker {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), ChannelError> {
        let partition = partition_for(key, self.inner.partitions);
        {
            let mut state = self.inner.state.lock();
            let partitions = state
                .topics
                .entry(topic.to_string())
                .or_insert_with(|| vec![Vec::new(); self.inner.partitions as usize]);
            partitions[partition as usize].push(StoredRecord {
                key: key.to_string(),
                payload,
            });
            trace!(
                topic,
                key,
                partition,
                offset = partitions[partition as usize].len() - 1,
                "Published record"
            );
        }
        self.inner.notify.notify_waiters();
        Ok(())
    }
}

/// Subscriber handle on a [`MemoryBroker`] topic.
pub struct MemorySubscriber {
    broker: MemoryBroker,
    group: String,
    cursors: Cursors,
}

impl MemorySubscriber {
    fn try_next(&mut self) -> Option<Delivery> {
        let topic = self.cursors.topic().to_string();
        for (partition, offset) in self.cursors.ready() {
            if let Some(record) = self.broker.fetch(&topic, partition, offset) {
                self.cursors.take(partition, offset);
                return Some(Delivery {
                    topic,
                    partition,
                    offset,
                    key: record.key,
                    payload: record.payload,
                });
            }
        }
        None
    }
}

#[async_trait]
impl EventSubscriber for MemorySubscriber {
    async fn recv(&mut self) -> Result<Delivery, ChannelError> {
        let inner = self.broker.inner.clone();
        loop {
            let notified = inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(delivery) = self.try_next() {
                return Ok(delivery);
            }
            notified.await;
        }
    }

    async fn commit(&mut self, delivery: &Delivery) -> Result<(), ChannelError> {
        self.cursors.settle(delivery, true)?;
        let mut state = self.broker.inner.state.lock();
        let committed = state
            .committed
            .entry((self.group.clone(), delivery.topic.clone(), delivery.partition))
            .or_insert(0);
        *committed = (*committed).max(delivery.offset + 1);
        Ok(())
    }

    async fn rewind(&mut self, delivery: &Delivery) -> Result<(), ChannelError> {
        self.cursors.settle(delivery, false)
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
