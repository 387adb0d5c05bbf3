//! Task and completion events.
//!
//! Both kinds travel as flat JSON objects keyed by execution identifier:
//!
//! ```json
//! {"execution_id":"…","workflow_id":1,"task_type":"generate_audio","step":2,
//!  "input":{"text":"hi"},"timestamp":"2024-05-01T12:00:00Z"}
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::instance::StepStatus;

/// Opaque key/value payload carried between steps.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Workers written against nil maps send `null` where no payload exists.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Payload, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Payload>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Work dispatched to an external task worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub execution_id: String,
    pub workflow_id: u64,
    pub task_type: String,
    /// 1-based step number.
    pub step: u8,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub input: Payload,
    pub timestamp: DateTime<Utc>,
}

impl TaskEvent {
    pub fn new(
        execution_id: impl Into<String>,
        workflow_id: u64,
        task_type: impl Into<String>,
        step: u8,
        input: Payload,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            workflow_id,
            task_type: task_type.into(),
            step,
            input,
            timestamp: Utc::now(),
        }
    }
}

/// Result tag of a completion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStatus {
    Success,
    Failed,
}

impl CompletionStatus {
    /// Ledger entry recorded for a step that finished with this status.
    pub fn step_status(&self) -> StepStatus {
        match self {
            CompletionStatus::Success => StepStatus::Completed,
            CompletionStatus::Failed => StepStatus::Failed,
        }
    }
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionStatus::Success => f.write_str("success"),
            CompletionStatus::Failed => f.write_str("failed"),
        }
    }
}

/// Result of executing a [`TaskEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub execution_id: String,
    pub workflow_id: u64,
    pub task_type: String,
    pub step: u8,
    pub status: CompletionStatus,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub output: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CompletionEvent {
    /// A successful completion of `task`.
    pub fn success(task: &TaskEvent, output: Payload) -> Self {
        Self {
            execution_id: task.execution_id.clone(),
            workflow_id: task.workflow_id,
            task_type: task.task_type.clone(),
            step: task.step,
            status: CompletionStatus::Success,
            output,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// A failed completion of `task`.
    pub fn failure(task: &TaskEvent, error: impl Into<String>) -> Self {
        Self {
            execution_id: task.execution_id.clone(),
            workflow_id: task.workflow_id,
            task_type: task.task_type.clone(),
            step: task.step,
            status: CompletionStatus::Failed,
            output: Payload::new(),
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == CompletionStatus::Failed
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
