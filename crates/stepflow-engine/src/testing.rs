//! Test doubles shared by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};

use stepflow_channel::MemoryBroker;
use stepflow_protocols::{ChannelError, EventPublisher};

/// Publisher that fails on demand and otherwise forwards to a broker.
pub(crate) struct FailingPublisher {
    inner: MemoryBroker,
    failing: AtomicBool,
    attempts: AtomicUsize,
}

impl FailingPublisher {
    pub(crate) fn new(inner: MemoryBroker) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
        }
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of publish calls seen, failed ones included.
    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventPublisher for FailingPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), ChannelError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ChannelError::PublishFailed("broker unavailable".to_string()));
        }
        self.inner.publish(topic, key, payload).await
    }
}

/// Publisher that parks every publish until the test releases it.
pub(crate) struct GatedPublisher {
    inner: MemoryBroker,
    entered: Notify,
    gate: Semaphore,
}

impl GatedPublisher {
    pub(crate) fn new(inner: MemoryBroker) -> Self {
        Self {
            inner,
            entered: Notify::new(),
            gate: Semaphore::new(0),
        }
    }

    /// Resolves once a publish call is parked at the gate.
    pub(crate) async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let one parked publish through.
    pub(crate) fn release(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl EventPublisher for GatedPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), ChannelError> {
        self.entered.notify_one();
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| ChannelError::PublishFailed(e.to_string()))?;
        permit.forget();
        self.inner.publish(topic, key, payload).await
    }
}
