//! Completion handling.
//!
//! [`ProgressionEngine::process_completion`] records the finished step, then
//! either terminates the instance or dispatches the next step's task. Every
//! write it makes is idempotent, so a redelivered completion converges on the
//! same state.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use stepflow_channel::EventProducer;
use stepflow_protocols::{
    CompletionEvent, CompletionLedger, DefinitionLookup, InstanceStatus, InstanceStore,
    StoreError, TaskEvent, WorkflowInstance,
};

use crate::error::ProgressionError;

/// Why a completion was accepted without effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The instance already reached a terminal status.
    Terminal(InstanceStatus),
    /// A later step has already been recorded.
    Stale { current_step: u8 },
}

/// Result of processing one completion event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The next step's task was dispatched.
    Advanced { next_step: u8, task_type: String },
    /// The last step finished; the instance is `COMPLETED`.
    Completed,
    /// The step failed; the instance is `FAILED`.
    Failed,
    /// The completion was already fully processed.
    Duplicate,
    Ignored(IgnoreReason),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Advanced {
                next_step,
                task_type,
            } => write!(f, "advanced to step {} ({})", next_step, task_type),
            Outcome::Completed => f.write_str("completed"),
            Outcome::Failed => f.write_str("failed"),
            Outcome::Duplicate => f.write_str("duplicate"),
            Outcome::Ignored(IgnoreReason::Terminal(status)) => {
                write!(f, "ignored (instance already {})", status)
            }
            Outcome::Ignored(IgnoreReason::Stale { current_step }) => {
                write!(f, "ignored (instance already at step {})", current_step)
            }
        }
    }
}

/// Advances workflow instances in response to completion events.
pub struct ProgressionEngine {
    instances: Arc<dyn InstanceStore>,
    definitions: Arc<dyn DefinitionLookup>,
    ledger: Option<Arc<dyn CompletionLedger>>,
    producer: EventProducer,
}

impl ProgressionEngine {
    pub fn new(
        instances: Arc<dyn InstanceStore>,
        definitions: Arc<dyn DefinitionLookup>,
        producer: EventProducer,
    ) -> Self {
        Self {
            instances,
            definitions,
            ledger: None,
            producer,
        }
    }

    /// Skip completions already marked processed in `ledger`.
    pub fn with_ledger(mut self, ledger: Arc<dyn CompletionLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Apply one completion event.
    pub async fn process_completion(
        &self,
        event: &CompletionEvent,
    ) -> Result<Outcome, ProgressionError> {
        validate(event)?;

        if let Some(ledger) = &self.ledger {
            let seen = ledger
                .is_processed(&event.execution_id, event.step)
                .await
                .map_err(store_error)?;
            if seen {
                debug!(
                    execution_id = %event.execution_id,
                    step = event.step,
                    "Completion already processed"
                );
                return Ok(Outcome::Duplicate);
            }
        }

        let instance = self
            .instances
            .get(&event.execution_id)
            .await
            .map_err(|e| instance_error(e, &event.execution_id))?;

        if let Some(reason) = ignore_reason(&instance, event) {
            debug!(
                execution_id = %event.execution_id,
                step = event.step,
                ?reason,
                "Ignoring completion"
            );
            return Ok(Outcome::Ignored(reason));
        }

        if instance.workflow_id != event.workflow_id {
            warn!(
                execution_id = %event.execution_id,
                instance_workflow_id = instance.workflow_id,
                event_workflow_id = event.workflow_id,
                "Completion carries a different workflow id; using the instance's"
            );
        }

        let instance = self
            .instances
            .update_step(&event.execution_id, event.step, event.status.step_status())
            .await
            .map_err(|e| instance_error(e, &event.execution_id))?;
        if instance.status.is_terminal() {
            // Another processor finished the instance in between.
            return Ok(Outcome::Ignored(IgnoreReason::Terminal(instance.status)));
        }

        let outcome = if event.is_failed() {
            let reason = event.error.as_deref().unwrap_or("step failed");
            match self.terminate(event, InstanceStatus::Failed, Some(reason)).await? {
                Some(ignored) => return Ok(ignored),
                None => {
                    info!(
                        execution_id = %event.execution_id,
                        step = event.step,
                        reason,
                        "Workflow failed"
                    );
                    Outcome::Failed
                }
            }
        } else {
            self.advance(&instance, event).await?
        };

        if matches!(outcome, Outcome::Ignored(_)) {
            return Ok(outcome);
        }
        self.mark_processed(event).await;
        Ok(outcome)
    }

    async fn advance(
        &self,
        instance: &WorkflowInstance,
        event: &CompletionEvent,
    ) -> Result<Outcome, ProgressionError> {
        let definition = self
            .definitions
            .get_by_trigger(&instance.trigger)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => {
                    ProgressionError::DefinitionNotFound(instance.trigger.clone())
                }
                other => store_error(other),
            })?;

        let next_step = u16::from(event.step) + 1;
        if next_step > u16::from(definition.total_steps) {
            if let Some(ignored) = self
                .terminate(event, InstanceStatus::Completed, None)
                .await?
            {
                return Ok(ignored);
            }
            info!(
                execution_id = %event.execution_id,
                workflow = %definition.name,
                steps = definition.total_steps,
                "Workflow completed"
            );
            return Ok(Outcome::Completed);
        }

        // next_step <= total_steps <= u8::MAX here.
        let next_step = next_step as u8;
        let task_type = definition
            .task_type_for(next_step)
            .ok_or_else(|| ProgressionError::StepNotDefined {
                trigger: definition.trigger.clone(),
                step: next_step,
            })?
            .to_string();

        let task = TaskEvent::new(
            &event.execution_id,
            instance.workflow_id,
            &task_type,
            next_step,
            event.output.clone(),
        );
        self.producer
            .publish_task(&task)
            .await
            .map_err(ProgressionError::Publish)?;

        info!(
            execution_id = %event.execution_id,
            step = next_step,
            task_type = %task_type,
            "Dispatched next step"
        );
        Ok(Outcome::Advanced {
            next_step,
            task_type,
        })
    }

    /// Move the instance to a terminal status.
    ///
    /// Returns `Some(Ignored)` when a concurrent writer already terminated it.
    async fn terminate(
        &self,
        event: &CompletionEvent,
        status: InstanceStatus,
        reason: Option<&str>,
    ) -> Result<Option<Outcome>, ProgressionError> {
        match self
            .instances
            .update_status(&event.execution_id, status, reason)
            .await
        {
            Ok(_) => Ok(None),
            Err(StoreError::InvalidTransition { from, .. }) => {
                Ok(Some(Outcome::Ignored(IgnoreReason::Terminal(from))))
            }
            Err(e) => Err(instance_error(e, &event.execution_id)),
        }
    }

    async fn mark_processed(&self, event: &CompletionEvent) {
        let Some(ledger) = &self.ledger else {
            return;
        };
        if let Err(e) = ledger.mark_processed(&event.execution_id, event.step).await {
            // Effects are applied; a redelivery re-runs them idempotently.
            warn!(
                execution_id = %event.execution_id,
                step = event.step,
                error = %e,
                "Failed to mark completion processed"
            );
        }
    }
}

fn validate(event: &CompletionEvent) -> Result<(), ProgressionError> {
    if event.execution_id.trim().is_empty() {
        return Err(ProgressionError::Malformed(
            "execution_id must not be empty".to_string(),
        ));
    }
    if event.step == 0 {
        return Err(ProgressionError::Malformed(
            "step must be at least 1".to_string(),
        ));
    }
    Ok(())
}

fn ignore_reason(instance: &WorkflowInstance, event: &CompletionEvent) -> Option<IgnoreReason> {
    if instance.status.is_terminal() {
        return Some(IgnoreReason::Terminal(instance.status));
    }
    if event.step < instance.current_step {
        return Some(IgnoreReason::Stale {
            current_step: instance.current_step,
        });
    }
    None
}

fn instance_error(error: StoreError, execution_id: &str) -> ProgressionError {
    match error {
        StoreError::NotFound(_) => ProgressionError::InstanceNotFound(execution_id.to_string()),
        other => store_error(other),
    }
}

fn store_error(error: StoreError) -> ProgressionError {
    if error.is_corrupt() {
        ProgressionError::CorruptRecord(error)
    } else {
        ProgressionError::Persistence(error)
    }
}

#[cfg(test)]
#[path = "progression_tests.rs"]
mod tests;
