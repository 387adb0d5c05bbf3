//! Read positions of one subscriber.

use std::collections::HashMap;

use stepflow_protocols::{ChannelError, Delivery};

/// Per-partition read position and outstanding delivery of one subscriber.
#[derive(Debug)]
pub(crate) struct Cursors {
    topic: String,
    partitions: Vec<u32>,
    positions: HashMap<u32, u64>,
    outstanding: HashMap<u32, u64>,
    next: usize,
}

impl Cursors {
    /// Start every owned partition at its committed offset.
    pub fn new(topic: impl Into<String>, partitions: Vec<u32>, committed: impl Fn(u32) -> u64) -> Self {
        let positions = partitions.iter().map(|p| (*p, committed(*p))).collect();
        Self {
            topic: topic.into(),
            partitions,
            positions,
            outstanding: HashMap::new(),
            next: 0,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Partitions without an outstanding delivery and the offset each would
    /// read next, rotating so no partition starves the others.
    pub fn ready(&self) -> Vec<(u32, u64)> {
        let count = self.partitions.len();
        (0..count)
            .map(|i| self.partitions[(self.next + i) % count])
            .filter(|p| !self.outstanding.contains_key(p))
            .map(|p| (p, self.positions.get(&p).copied().unwrap_or(0)))
            .collect()
    }

    /// Mark the record at `offset` of `partition` as handed out.
    pub fn take(&mut self, partition: u32, offset: u64) {
        self.outstanding.insert(partition, offset);
        if let Some(idx) = self.partitions.iter().position(|p| *p == partition) {
            self.next = (idx + 1) % self.partitions.len();
        }
    }

    /// Resolve an outstanding delivery. A committed delivery moves the
    /// position past it, a rewound one leaves the position on it.
    pub fn settle(&mut self, delivery: &Delivery, commit: bool) -> Result<(), ChannelError> {
        let outstanding = self.outstanding.get(&delivery.partition).copied();
        if delivery.topic != self.topic || outstanding != Some(delivery.offset) {
            return Err(ChannelError::NotOutstanding {
                topic: delivery.topic.clone(),
                partition: delivery.partition,
                offset: delivery.offset,
            });
        }
        self.outstanding.remove(&delivery.partition);
        let position = if commit { delivery.offset + 1 } else { delivery.offset };
        self.positions.insert(delivery.partition, position);
        Ok(())
    }
}
