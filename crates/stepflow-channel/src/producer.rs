//! Typed event publishing.

use std::sync::Arc;

use tracing::debug;

use stepflow_protocols::{ChannelError, CompletionEvent, EventPublisher, TaskEvent};

/// Topic names of the two logical channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    /// Task dispatch channel read by workers.
    pub tasks: String,
    /// Completion channel read by the progression engine.
    pub completions: String,
}

impl Topics {
    pub fn new(tasks: impl Into<String>, completions: impl Into<String>) -> Self {
        Self {
            tasks: tasks.into(),
            completions: completions.into(),
        }
    }
}

impl Default for Topics {
    fn default() -> Self {
        Self::new("task-queue", "task-completions")
    }
}

/// Serializes events to JSON and publishes them keyed by execution id.
#[derive(Clone)]
pub struct EventProducer {
    publisher: Arc<dyn EventPublisher>,
    topics: Topics,
}

impl EventProducer {
    pub fn new(publisher: Arc<dyn EventPublisher>, topics: Topics) -> Self {
        Self { publisher, topics }
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Publish a task event to the dispatch channel.
    pub async fn publish_task(&self, event: &TaskEvent) -> Result<(), ChannelError> {
        let payload = serde_json::to_vec(event)?;
        self.publisher
            .publish(&self.topics.tasks, &event.execution_id, payload)
            .await?;
        debug!(
            execution_id = %event.execution_id,
            step = event.step,
            task_type = %event.task_type,
            "Dispatched task"
        );
        Ok(())
    }

    /// Publish a completion event to the completion channel.
    pub async fn publish_completion(&self, event: &CompletionEvent) -> Result<(), ChannelError> {
        let payload = serde_json::to_vec(event)?;
        self.publisher
            .publish(&self.topics.completions, &event.execution_id, payload)
            .await
    }
}
