//! Engine errors and their handling policy.

use thiserror::Error;

use stepflow_protocols::{ChannelError, StoreError};

/// Broad class of a progression failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// A referenced instance or definition does not exist.
    NotFound,
    /// Persistence or channel failure that may succeed on retry.
    Transient,
    /// The event itself cannot be processed.
    Malformed,
    /// A stored record the event depends on cannot be decoded.
    Corrupt,
}

/// What the consumer does with the event after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Commit the event and move on.
    Acknowledge,
    /// Leave the event uncommitted so it is delivered again.
    Redeliver,
}

/// Failure while processing a completion event.
#[derive(Debug, Error)]
pub enum ProgressionError {
    #[error("Malformed completion event: {0}")]
    Malformed(String),

    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Workflow definition not found for trigger: {0}")]
    DefinitionNotFound(String),

    #[error("Workflow '{trigger}' defines no task type for step {step}")]
    StepNotDefined { trigger: String, step: u8 },

    #[error("Persistence failure: {0}")]
    Persistence(#[source] StoreError),

    #[error("Unreadable stored record: {0}")]
    CorruptRecord(#[source] StoreError),

    #[error("Publish failure: {0}")]
    Publish(#[source] ChannelError),
}

impl ProgressionError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ProgressionError::Malformed(_) => ErrorClass::Malformed,
            ProgressionError::InstanceNotFound(_)
            | ProgressionError::DefinitionNotFound(_)
            | ProgressionError::StepNotDefined { .. } => ErrorClass::NotFound,
            ProgressionError::CorruptRecord(_) => ErrorClass::Corrupt,
            ProgressionError::Persistence(_) | ProgressionError::Publish(_) => {
                ErrorClass::Transient
            }
        }
    }

    pub fn disposition(&self) -> Disposition {
        match self.class() {
            ErrorClass::Transient => Disposition::Redeliver,
            ErrorClass::NotFound | ErrorClass::Malformed | ErrorClass::Corrupt => {
                Disposition::Acknowledge
            }
        }
    }
}

/// Failure while starting a workflow or reading its state.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("Workflow not found for trigger: {0}")]
    WorkflowNotFound(String),

    #[error("Workflow '{0}' is inactive")]
    Inactive(String),

    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("Execution already exists: {0}")]
    DuplicateExecution(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to dispatch first step: {0}")]
    Dispatch(#[from] ChannelError),
}
