//! # Stepflow Engine
//!
//! Advances linear workflows by reacting to completion events.
//!
//! ## Architecture
//!
//! ```text
//!  TriggerService ──TaskEvent(step 1)──► task channel ──► workers
//!                                                           │
//!  CompletionConsumer ◄──CompletionEvent── completion channel
//!        │
//!        ▼
//!  ProgressionEngine ──► InstanceStore (record step, terminal status)
//!        └─────────────► task channel (TaskEvent for step + 1)
//! ```
//!
//! The consumer processes one completion at a time and acknowledges it only
//! once its effects are durable; processing is idempotent so redelivery is
//! always safe.

pub mod consumer;
pub mod error;
pub mod progression;
pub mod trigger;

#[cfg(test)]
mod testing;

pub use consumer::{CompletionConsumer, ConsumerConfig, ConsumerStats};
pub use error::{Disposition, ErrorClass, ProgressionError, TriggerError};
pub use progression::{IgnoreReason, Outcome, ProgressionEngine};
pub use trigger::{ExecutionStatus, TriggerReceipt, TriggerService};
