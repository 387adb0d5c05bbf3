//! Store errors.

use thiserror::Error;

use crate::instance::InstanceStatus;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    Conflict(String),

    #[error("Invalid status transition for {execution_id}: {from} -> {to}")]
    InvalidTransition {
        execution_id: String,
        from: InstanceStatus,
        to: InstanceStatus,
    },

    #[error("Invalid data: {0}")]
    Invalid(String),

    /// A stored record exists but cannot be decoded.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Query error: {0}")]
    QueryError(String),
}

impl StoreError {
    /// Whether the referenced record is missing, as opposed to any other failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// Whether retrying cannot help because the stored data itself is bad.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, StoreError::Corrupt(_))
    }
}

/// A status string that does not name a known status.
#[derive(Debug, Clone, Error)]
#[error("Unknown {kind} status: {value}")]
pub struct ParseStatusError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseStatusError {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}
