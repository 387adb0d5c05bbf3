//! Completion consumption loop.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use stepflow_protocols::{CompletionEvent, Delivery, EventSubscriber};

use crate::error::Disposition;
use crate::progression::{Outcome, ProgressionEngine};

/// Consumer tuning.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Pause after a redelivery or transport error.
    pub redelivery_backoff: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            redelivery_backoff: Duration::from_millis(500),
        }
    }
}

/// Counters reported when the loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Events processed successfully, including duplicates and ignored ones.
    pub processed: u64,
    /// Events dropped after a permanent processing error.
    pub acknowledged_errors: u64,
    /// Events handed back for redelivery.
    pub redeliveries: u64,
    /// Payloads that were not valid completion events.
    pub malformed: u64,
    /// Failed recv, commit or rewind calls.
    pub transport_errors: u64,
}

/// Feeds completion events from a subscriber into the engine, one at a time.
pub struct CompletionConsumer {
    engine: Arc<ProgressionEngine>,
    subscriber: Box<dyn EventSubscriber>,
    config: ConsumerConfig,
    stats: ConsumerStats,
}

impl CompletionConsumer {
    pub fn new(
        engine: Arc<ProgressionEngine>,
        subscriber: Box<dyn EventSubscriber>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            engine,
            subscriber,
            config,
            stats: ConsumerStats::default(),
        }
    }

    /// Run until `cancel` fires. Cancellation is observed between events.
    pub async fn run(mut self, cancel: CancellationToken) -> ConsumerStats {
        info!("Completion consumer started");

        loop {
            let delivery = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = self.subscriber.recv() => received,
            };

            match delivery {
                Ok(delivery) => {
                    if !self.handle(&delivery).await {
                        self.backoff(&cancel).await;
                    }
                }
                Err(e) => {
                    self.stats.transport_errors += 1;
                    error!("Failed to receive completion: {}", e);
                    self.backoff(&cancel).await;
                }
            }
        }

        info!(
            processed = self.stats.processed,
            redeliveries = self.stats.redeliveries,
            "Completion consumer stopped"
        );
        self.stats
    }

    /// Process one delivery and settle it. Returns `false` when the loop
    /// should pause before the next receive.
    async fn handle(&mut self, delivery: &Delivery) -> bool {
        let event: CompletionEvent = match serde_json::from_slice(&delivery.payload) {
            Ok(event) => event,
            Err(e) => {
                self.stats.malformed += 1;
                error!(
                    partition = delivery.partition,
                    offset = delivery.offset,
                    payload = %String::from_utf8_lossy(&delivery.payload),
                    "Skipping unparseable completion: {}",
                    e
                );
                return self.commit(delivery).await;
            }
        };

        match self.engine.process_completion(&event).await {
            Ok(outcome) => {
                self.stats.processed += 1;
                log_outcome(&event, &outcome);
                self.commit(delivery).await
            }
            Err(e) => match e.disposition() {
                Disposition::Acknowledge => {
                    self.stats.acknowledged_errors += 1;
                    error!(
                        execution_id = %event.execution_id,
                        step = event.step,
                        "Dropping completion: {}",
                        e
                    );
                    self.commit(delivery).await
                }
                Disposition::Redeliver => {
                    self.stats.redeliveries += 1;
                    warn!(
                        execution_id = %event.execution_id,
                        step = event.step,
                        "Completion will be redelivered: {}",
                        e
                    );
                    if let Err(e) = self.subscriber.rewind(delivery).await {
                        self.stats.transport_errors += 1;
                        error!("Failed to rewind completion: {}", e);
                    }
                    false
                }
            },
        }
    }

    async fn commit(&mut self, delivery: &Delivery) -> bool {
        match self.subscriber.commit(delivery).await {
            Ok(()) => true,
            Err(e) => {
                self.stats.transport_errors += 1;
                error!(
                    partition = delivery.partition,
                    offset = delivery.offset,
                    "Failed to commit completion: {}",
                    e
                );
                false
            }
        }
    }

    async fn backoff(&mut self, cancel: &CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(self.config.redelivery_backoff) => {}
        }
    }
}

fn log_outcome(event: &CompletionEvent, outcome: &Outcome) {
    match outcome {
        Outcome::Duplicate | Outcome::Ignored(_) => debug!(
            execution_id = %event.execution_id,
            step = event.step,
            "Completion {}",
            outcome
        ),
        _ => info!(
            execution_id = %event.execution_id,
            step = event.step,
            "Completion {}",
            outcome
        ),
    }
}

#[cfg(test)]
#[path = "consumer_tests.rs"]
mod tests;
