//! Persistence protocol definitions.
//!
//! Every operation is keyed by execution identifier (or trigger) and reports a
//! missing record as [`StoreError::NotFound`], distinguishable from transient
//! failures.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::instance::{InstanceStatus, StepRecord, StepStatus, WorkflowInstance};
use crate::workflow::{DefinitionStatus, NewWorkflow, WorkflowDefinition};

/// Durable record of workflow instances.
///
/// Updates are atomic single-record operations; the store itself enforces
/// step monotonicity and terminal absorption.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Insert a new instance. Fails with `Conflict` on a duplicate execution id.
    async fn create(&self, instance: WorkflowInstance) -> Result<(), StoreError>;

    /// Fetch an instance by execution id.
    async fn get(&self, execution_id: &str) -> Result<WorkflowInstance, StoreError>;

    /// Record a finished step and advance `current_step` to
    /// `max(current_step, min(step, total_steps))`.
    ///
    /// A terminal instance is returned unchanged.
    async fn update_step(
        &self,
        execution_id: &str,
        step: u8,
        status: StepStatus,
    ) -> Result<WorkflowInstance, StoreError>;

    /// Move the instance to `status`, keeping `reason` when it fails.
    async fn update_status(
        &self,
        execution_id: &str,
        status: InstanceStatus,
        reason: Option<&str>,
    ) -> Result<WorkflowInstance, StoreError>;

    /// Step ledger for an instance, ordered by step.
    async fn steps(&self, execution_id: &str) -> Result<Vec<StepRecord>, StoreError>;
}

/// Resolves workflow definitions by trigger name.
#[async_trait]
pub trait DefinitionLookup: Send + Sync {
    async fn get_by_trigger(&self, trigger: &str) -> Result<WorkflowDefinition, StoreError>;
}

/// Administrative access to workflow definitions.
#[async_trait]
pub trait DefinitionStore: DefinitionLookup {
    /// Validate and store a definition. Name and trigger must be unique.
    async fn register(&self, workflow: NewWorkflow) -> Result<WorkflowDefinition, StoreError>;

    /// All definitions, ordered by id.
    async fn list(&self) -> Result<Vec<WorkflowDefinition>, StoreError>;

    async fn set_status(
        &self,
        trigger: &str,
        status: DefinitionStatus,
    ) -> Result<WorkflowDefinition, StoreError>;
}

/// Ledger of completions whose effects have been fully applied.
#[async_trait]
pub trait CompletionLedger: Send + Sync {
    async fn is_processed(&self, execution_id: &str, step: u8) -> Result<bool, StoreError>;

    async fn mark_processed(&self, execution_id: &str, step: u8) -> Result<(), StoreError>;
}
