//! Shared handler state.

use std::sync::Arc;

use stepflow_engine::TriggerService;
use stepflow_protocols::DefinitionStore;

/// State shared by all routes.
#[derive(Clone)]
pub struct AppState {
    pub definitions: Arc<dyn DefinitionStore>,
    pub triggers: Arc<TriggerService>,
    /// Reported by the health endpoint.
    pub service_name: String,
}

impl AppState {
    pub fn new(
        definitions: Arc<dyn DefinitionStore>,
        triggers: Arc<TriggerService>,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            definitions,
            triggers,
            service_name: service_name.into(),
        }
    }
}
