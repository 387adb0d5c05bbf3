//! Workflow instances and their state machine.
//!
//! ```text
//! PENDING ──► RUNNING ──► COMPLETED
//!    │           │
//!    │           └──────► FAILED
//!    └──────────────────► COMPLETED | FAILED
//! ```
//!
//! Terminal states are absorbing and `current_step` never moves backwards.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ParseStatusError, StoreError};
use crate::workflow::WorkflowDefinition;

/// Status of a workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstanceStatus {
    /// Created, no step dispatched yet.
    Pending,
    /// At least one step dispatched.
    Running,
    Completed,
    Failed,
}

impl InstanceStatus {
    pub const TERMINAL: [InstanceStatus; 2] = [InstanceStatus::Completed, InstanceStatus::Failed];

    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Pending => "PENDING",
            InstanceStatus::Running => "RUNNING",
            InstanceStatus::Completed => "COMPLETED",
            InstanceStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InstanceStatus::Completed | InstanceStatus::Failed)
    }

    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_transition_to(&self, next: InstanceStatus) -> bool {
        use InstanceStatus::*;
        matches!(
            (self, next),
            (Pending, Running) | (Pending, Completed) | (Pending, Failed)
                | (Running, Completed) | (Running, Failed)
        )
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(InstanceStatus::Pending),
            "RUNNING" => Ok(InstanceStatus::Running),
            "COMPLETED" => Ok(InstanceStatus::Completed),
            "FAILED" => Ok(InstanceStatus::Failed),
            other => Err(ParseStatusError::new("instance", other)),
        }
    }
}

/// Outcome recorded for a single step in the status ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepStatus {
    Completed,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Completed => "COMPLETED",
            StepStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COMPLETED" => Ok(StepStatus::Completed),
            "FAILED" => Ok(StepStatus::Failed),
            other => Err(ParseStatusError::new("step", other)),
        }
    }
}

/// One row of an instance's step ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: u8,
    pub status: StepStatus,
    pub recorded_at: DateTime<Utc>,
}

/// One execution of a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub execution_id: String,
    pub workflow_id: u64,
    /// Trigger of the owning definition, used to resolve it while running.
    pub trigger: String,
    /// Step count of the owning definition when the instance was created.
    pub total_steps: u8,
    pub current_step: u8,
    pub status: InstanceStatus,
    /// Input the instance was started with.
    pub variables: serde_json::Value,
    /// Failure reason, kept for observability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowInstance {
    /// A fresh `PENDING` instance of `definition`.
    pub fn new(
        execution_id: impl Into<String>,
        definition: &WorkflowDefinition,
        variables: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            execution_id: execution_id.into(),
            workflow_id: definition.id,
            trigger: definition.trigger.clone(),
            total_steps: definition.total_steps,
            current_step: 0,
            status: InstanceStatus::Pending,
            variables,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record that `step` finished.
    ///
    /// Moves `current_step` forward (bounded by `total_steps`) and promotes
    /// `PENDING` to `RUNNING`. Terminal instances are left untouched.
    /// Returns whether the instance accepted the step.
    pub fn record_step(&mut self, step: u8, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.current_step = self.current_step.max(step.min(self.total_steps));
        if self.status == InstanceStatus::Pending {
            self.status = InstanceStatus::Running;
        }
        self.updated_at = now;
        true
    }

    /// Move to `next`.
    ///
    /// Re-applying the current status is a no-op and returns `Ok(false)`.
    /// A failure reason is only kept with `FAILED`.
    pub fn transition(
        &mut self,
        next: InstanceStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        if self.status == next {
            return Ok(false);
        }
        if !self.status.can_transition_to(next) {
            return Err(StoreError::InvalidTransition {
                execution_id: self.execution_id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next == InstanceStatus::Failed {
            self.error = reason.map(str::to_string);
        }
        self.updated_at = now;
        Ok(true)
    }
}

#[cfg(test)]
#[path = "instance_tests.rs"]
mod tests;
