//! In-memory store.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use stepflow_protocols::{
    CompletionLedger, DefinitionLookup, DefinitionStatus, DefinitionStore, InstanceStatus,
    InstanceStore, NewWorkflow, StepRecord, StepStatus, StoreError, WorkflowDefinition,
    WorkflowInstance,
};

#[derive(Default)]
struct MemoryState {
    definitions: Vec<WorkflowDefinition>,
    instances: HashMap<String, WorkflowInstance>,
    steps: HashMap<String, BTreeMap<u8, StepRecord>>,
    processed: HashSet<(String, u8)>,
}

/// In-memory implementation of every store protocol.
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn instance_not_found(execution_id: &str) -> StoreError {
    StoreError::NotFound(format!("instance {}", execution_id))
}

fn definition_not_found(trigger: &str) -> StoreError {
    StoreError::NotFound(format!("workflow with trigger {}", trigger))
}

#[async_trait]
impl InstanceStore for MemoryStore {
    async fn create(&self, instance: WorkflowInstance) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.instances.contains_key(&instance.execution_id) {
            return Err(StoreError::Conflict(format!(
                "instance {}",
                instance.execution_id
            )));
        }
        state.instances.insert(instance.execution_id.clone(), instance);
        Ok(())
    }

    async fn get(&self, execution_id: &str) -> Result<WorkflowInstance, StoreError> {
        let state = self.state.read().await;
        state
            .instances
            .get(execution_id)
            .cloned()
            .ok_or_else(|| instance_not_found(execution_id))
    }

    async fn update_step(
        &self,
        execution_id: &str,
        step: u8,
        status: StepStatus,
    ) -> Result<WorkflowInstance, StoreError> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let instance = state
            .instances
            .get_mut(execution_id)
            .ok_or_else(|| instance_not_found(execution_id))?;

        if !instance.record_step(step, now) {
            return Ok(instance.clone());
        }
        let updated = instance.clone();

        state.steps.entry(execution_id.to_string()).or_default().insert(
            step,
            StepRecord {
                step,
                status,
                recorded_at: now,
            },
        );
        Ok(updated)
    }

    async fn update_status(
        &self,
        execution_id: &str,
        status: InstanceStatus,
        reason: Option<&str>,
    ) -> Result<WorkflowInstance, StoreError> {
        let mut state = self.state.write().await;
        let instance = state
            .instances
            .get_mut(execution_id)
            .ok_or_else(|| instance_not_found(execution_id))?;
        instance.transition(status, reason, Utc::now())?;
        Ok(instance.clone())
    }

    async fn steps(&self, execution_id: &str) -> Result<Vec<StepRecord>, StoreError> {
        let state = self.state.read().await;
        if !state.instances.contains_key(execution_id) {
            return Err(instance_not_found(execution_id));
        }
        Ok(state
            .steps
            .get(execution_id)
            .map(|steps| steps.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl DefinitionLookup for MemoryStore {
    async fn get_by_trigger(&self, trigger: &str) -> Result<WorkflowDefinition, StoreError> {
        let state = self.state.read().await;
        state
            .definitions
            .iter()
            .find(|d| d.trigger == trigger)
            .cloned()
            .ok_or_else(|| definition_not_found(trigger))
    }
}

#[async_trait]
impl DefinitionStore for MemoryStore {
    async fn register(&self, workflow: NewWorkflow) -> Result<WorkflowDefinition, StoreError> {
        workflow.validate()?;
        let mut state = self.state.write().await;
        if let Some(existing) = state
            .definitions
            .iter()
            .find(|d| d.name == workflow.name || d.trigger == workflow.trigger)
        {
            return Err(StoreError::Conflict(format!(
                "workflow {} ({})",
                existing.name, existing.trigger
            )));
        }
        let id = state.definitions.len() as u64 + 1;
        let definition = workflow.into_definition(id, Utc::now())?;
        state.definitions.push(definition.clone());
        Ok(definition)
    }

    async fn list(&self) -> Result<Vec<WorkflowDefinition>, StoreError> {
        Ok(self.state.read().await.definitions.clone())
    }

    async fn set_status(
        &self,
        trigger: &str,
        status: DefinitionStatus,
    ) -> Result<WorkflowDefinition, StoreError> {
        let mut state = self.state.write().await;
        let definition = state
            .definitions
            .iter_mut()
            .find(|d| d.trigger == trigger)
            .ok_or_else(|| definition_not_found(trigger))?;
        if definition.status != status {
            definition.status = status;
            definition.updated_at = Utc::now();
        }
        Ok(definition.clone())
    }
}

#[async_trait]
impl CompletionLedger for MemoryStore {
    async fn is_processed(&self, execution_id: &str, step: u8) -> Result<bool, StoreError> {
        let state = self.state.read().await;
        Ok(state.processed.contains(&(execution_id.to_string(), step)))
    }

    async fn mark_processed(&self, execution_id: &str, step: u8) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.processed.insert((execution_id.to_string(), step));
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
