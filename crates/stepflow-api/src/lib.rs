//! # Stepflow API
//!
//! HTTP surface for workflow administration and triggering.
//!
//! ```text
//! /workflows
//!   POST   /workflows                    - Register workflow
//!   GET    /workflows                    - List workflows
//!   GET    /workflows/{trigger}          - Get workflow
//!   PUT    /workflows/{trigger}/status   - Activate or deactivate
//!   POST   /workflows/{trigger}/trigger  - Start an execution
//!
//! /executions
//!   GET    /executions/{execution_id}    - Execution state and step ledger
//!
//! /health
//! ```

pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use server::{ApiConfig, ApiServer};
pub use state::AppState;
