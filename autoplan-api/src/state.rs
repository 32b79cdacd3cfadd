//! Shared application state for the API server.

use std::sync::Arc;

use autoplan::engine::Engine;
use autoplan::io::config::Settings;
use autoplan::planner::{OfflinePlanner, PlanProducer};
use autoplan::tools::{ToolRegistry, default_registry};

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub planner: Arc<dyn PlanProducer>,
}

impl AppState {
    /// State with the built-in tools and the offline planner.
    pub fn new(settings: Settings) -> Self {
        let planner = OfflinePlanner::new(&settings.planner.default_dataset);
        Self::with_parts(settings, default_registry(), Arc::new(planner))
    }

    pub fn with_parts(
        settings: Settings,
        registry: ToolRegistry,
        planner: Arc<dyn PlanProducer>,
    ) -> Self {
        Self {
            engine: Arc::new(Engine::from_settings(settings, registry)),
            planner,
        }
    }
}
