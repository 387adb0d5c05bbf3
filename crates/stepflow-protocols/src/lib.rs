//! # Stepflow Protocols
//!
//! Value types and protocol definitions (traits) shared by the stepflow crates.
//! Contains only interface definitions - no implementations.
//!
//! ## Core Traits
//!
//! - [`InstanceStore`] - Durable per-execution state, keyed by execution identifier
//! - [`DefinitionLookup`] - Resolves a workflow definition from its trigger name
//! - [`DefinitionStore`] - Administrative access to workflow definitions
//! - [`CompletionLedger`] - Processed-completion ledger keyed by (execution, step)
//! - [`EventPublisher`] / [`EventSubscriber`] - Partitioned event channel

pub mod channel;
pub mod error;
pub mod event;
pub mod instance;
pub mod store;
pub mod workflow;

pub use channel::{Delivery, EventPublisher, EventSubscriber};
pub use error::{ChannelError, ParseStatusError, StoreError};
pub use event::{CompletionEvent, CompletionStatus, Payload, TaskEvent};
pub use instance::{InstanceStatus, StepRecord, StepStatus, WorkflowInstance};
pub use store::{CompletionLedger, DefinitionLookup, DefinitionStore, InstanceStore};
pub use workflow::{DefinitionStatus, NewWorkflow, WorkflowDefinition};
