//! # Stepflow Channel
//!
//! The event channel carrying task and completion events.
//!
//! Topics are split into partitions and a record's partition is chosen from
//! its key, so every event of one execution lands on one partition and is
//! read back in send order. Consumer groups track a committed offset per
//! partition; anything not committed is delivered again, including after a
//! restart of a durable backend.
//!
//! ## Backends
//!
//! - [`MemoryBroker`] - in-process, wakes subscribers on publish
//! - [`SqliteEventLog`] - durable log in a SQLite file, polled by subscribers
//!
//! [`EventProducer`] sits on top of either and speaks the typed events.

mod cursor;
mod memory;
mod partition;
mod producer;
mod sqlite;

pub use memory::{MemoryBroker, MemorySubscriber};
pub use partition::{partition_for, PartitionAssignment};
pub use producer::{EventProducer, Topics};
pub use sqlite::{SqliteEventLog, SqliteSubscriber};
