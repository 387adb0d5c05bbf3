//! Workflow start and status queries.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use stepflow_channel::EventProducer;
use stepflow_protocols::{
    DefinitionLookup, InstanceStatus, InstanceStore, Payload, StepRecord, StoreError, TaskEvent,
    WorkflowInstance,
};

use crate::error::TriggerError;

/// Acknowledgement returned when a workflow starts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerReceipt {
    pub execution_id: String,
    /// Name of the started workflow.
    pub workflow: String,
    pub status: InstanceStatus,
    pub message: String,
}

/// An instance together with its step ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionStatus {
    #[serde(flatten)]
    pub instance: WorkflowInstance,
    pub steps: Vec<StepRecord>,
}

/// Starts workflow instances and dispatches their first step.
pub struct TriggerService {
    definitions: Arc<dyn DefinitionLookup>,
    instances: Arc<dyn InstanceStore>,
    producer: EventProducer,
}

impl TriggerService {
    pub fn new(
        definitions: Arc<dyn DefinitionLookup>,
        instances: Arc<dyn InstanceStore>,
        producer: EventProducer,
    ) -> Self {
        Self {
            definitions,
            instances,
            producer,
        }
    }

    /// Start the workflow registered under `trigger` with a fresh execution id.
    pub async fn trigger(&self, trigger: &str, input: Payload) -> Result<TriggerReceipt, TriggerError> {
        let execution_id = Uuid::new_v4().to_string();
        self.trigger_with_id(&execution_id, trigger, input).await
    }

    /// Start the workflow registered under `trigger` as `execution_id`.
    pub async fn trigger_with_id(
        &self,
        execution_id: &str,
        trigger: &str,
        input: Payload,
    ) -> Result<TriggerReceipt, TriggerError> {
        if execution_id.trim().is_empty() {
            return Err(TriggerError::InvalidInput(
                "execution id cannot be empty".to_string(),
            ));
        }

        let definition = self
            .definitions
            .get_by_trigger(trigger)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => TriggerError::WorkflowNotFound(trigger.to_string()),
                other => TriggerError::Store(other),
            })?;
        if !definition.is_active() {
            return Err(TriggerError::Inactive(definition.trigger));
        }
        let first_task = definition
            .task_type_for(1)
            .ok_or_else(|| TriggerError::InvalidInput(format!("workflow '{}' has no steps", trigger)))?
            .to_string();

        let instance = WorkflowInstance::new(
            execution_id,
            &definition,
            serde_json::Value::Object(input.clone()),
        );
        self.instances.create(instance).await.map_err(|e| match e {
            StoreError::Conflict(_) => TriggerError::DuplicateExecution(execution_id.to_string()),
            other => TriggerError::Store(other),
        })?;

        let task = TaskEvent::new(execution_id, definition.id, &first_task, 1, input);
        self.producer.publish_task(&task).await?;

        let status = match self
            .instances
            .update_status(execution_id, InstanceStatus::Running, None)
            .await
        {
            Ok(instance) => instance.status,
            // A fast worker may already have moved the instance on.
            Err(StoreError::InvalidTransition { from, .. }) => from,
            Err(e) => {
                warn!(execution_id, "Failed to mark instance running: {}", e);
                InstanceStatus::Pending
            }
        };

        info!(
            execution_id,
            workflow = %definition.name,
            task_type = %first_task,
            "Workflow triggered"
        );

        Ok(TriggerReceipt {
            execution_id: execution_id.to_string(),
            workflow: definition.name,
            status,
            message: definition
                .message
                .unwrap_or_else(|| "Workflow started".to_string()),
        })
    }

    /// Current state of an execution.
    pub async fn status(&self, execution_id: &str) -> Result<ExecutionStatus, TriggerError> {
        let instance = self.instances.get(execution_id).await.map_err(|e| match e {
            StoreError::NotFound(_) => TriggerError::ExecutionNotFound(execution_id.to_string()),
            other => TriggerError::Store(other),
        })?;
        let steps = self.instances.steps(execution_id).await?;
        Ok(ExecutionStatus { instance, steps })
    }
}

#[cfg(test)]
#[path = "trigger_tests.rs"]
mod tests;
