//! Workflow definitions.
//!
//! A definition is a fixed, linear sequence of task types reachable through a
//! stable trigger name. Steps are numbered from 1 and resolved by position.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ParseStatusError, StoreError};

/// Lifecycle status of a workflow definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionStatus {
    #[default]
    Active,
    Inactive,
}

impl DefinitionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefinitionStatus::Active => "active",
            DefinitionStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for DefinitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DefinitionStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(DefinitionStatus::Active),
            "inactive" => Ok(DefinitionStatus::Inactive),
            other => Err(ParseStatusError::new("definition", other)),
        }
    }
}

/// A stored workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Store-assigned identifier.
    pub id: u64,

    /// Unique human-readable name.
    pub name: String,

    /// Unique event name that starts the workflow and resolves it afterwards.
    pub trigger: String,

    /// Number of steps; always equal to `step_task_types.len()`.
    pub total_steps: u8,

    /// Task type dispatched for each step, in order.
    pub step_task_types: Vec<String>,

    /// Opaque handler reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler_url: Option<String>,

    /// Message returned to callers that trigger the workflow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    pub status: DefinitionStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    /// Task type for a 1-based step number.
    pub fn task_type_for(&self, step: u8) -> Option<&str> {
        let index = usize::from(step).checked_sub(1)?;
        self.step_task_types.get(index).map(String::as_str)
    }

    pub fn is_active(&self) -> bool {
        self.status == DefinitionStatus::Active
    }
}

/// Input for creating a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorkflow {
    pub name: String,
    pub trigger: String,
    pub step_task_types: Vec<String>,
    #[serde(default)]
    pub handler_url: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl NewWorkflow {
    pub fn new(
        name: impl Into<String>,
        trigger: impl Into<String>,
        step_task_types: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            trigger: trigger.into(),
            step_task_types: step_task_types.into_iter().map(Into::into).collect(),
            handler_url: None,
            message: None,
        }
    }

    pub fn with_handler_url(mut self, url: impl Into<String>) -> Self {
        self.handler_url = Some(url.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Check the definition and return its step count.
    pub fn validate(&self) -> Result<u8, StoreError> {
        if self.name.trim().is_empty() {
            return Err(StoreError::Invalid("name cannot be empty".to_string()));
        }
        if self.trigger.trim().is_empty() {
            return Err(StoreError::Invalid("trigger cannot be empty".to_string()));
        }
        if self.step_task_types.is_empty() {
            return Err(StoreError::Invalid(
                "a workflow needs at least one step".to_string(),
            ));
        }
        if let Some(pos) = self.step_task_types.iter().position(|t| t.trim().is_empty()) {
            return Err(StoreError::Invalid(format!(
                "task type for step {} cannot be empty",
                pos + 1
            )));
        }
        u8::try_from(self.step_task_types.len()).map_err(|_| {
            StoreError::Invalid(format!(
                "a workflow can have at most {} steps",
                u8::MAX
            ))
        })
    }

    /// Build the stored form once the store has assigned an identifier.
    pub fn into_definition(self, id: u64, now: DateTime<Utc>) -> Result<WorkflowDefinition, StoreError> {
        let total_steps = self.validate()?;
        Ok(WorkflowDefinition {
            id,
            name: self.name,
            trigger: self.trigger,
            total_steps,
            step_task_types: self.step_task_types,
            handler_url: self.handler_url,
            message: self.message,
            status: DefinitionStatus::Active,
            created_at: now,
            updated_at: now,
        })
    }
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
