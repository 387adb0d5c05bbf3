//! Error types for the stepflow protocol layer.

mod channel;
mod store;

pub use channel::*;
pub use store::*;
