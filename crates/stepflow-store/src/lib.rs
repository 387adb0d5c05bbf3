//! # Stepflow Store
//!
//! Storage backends for workflow definitions, workflow instances and the
//! processed-completion ledger.
//!
//! - [`SqliteStore`] - durable backend on a single SQLite file
//! - [`MemoryStore`] - in-process backend for tests and ephemeral runs
//!
//! Both enforce the instance invariants themselves: `current_step` only moves
//! forward and never past the definition's step count, and terminal instances
//! absorb further updates.


mod memory;
mod schema;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
