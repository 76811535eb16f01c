//! Application state: the orchestrator and everything it is wired to.
//!
//! Built once at startup and shared with every handler through `Arc`.
//! If no Gemini key is configured we still serve: every build falls back to
//! placeholder content.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::activities::Registry;
use crate::config::{load_config_from_env, AppConfig};
use crate::events::EventBus;
use crate::gemini::{DisabledClient, GeminiClient, GenerationClient};
use crate::orchestrator::BuildOrchestrator;
use crate::store::ActivityStore;

pub struct AppState {
    pub orchestrator: Arc<BuildOrchestrator>,
    pub config: AppConfig,
    /// Label of the generation backend in use, for health output.
    pub generator: String,
}

impl AppState {
    /// Build state from env: load config, pick a generation client, prepare the store.
    #[instrument(level = "info", skip_all)]
    pub fn from_env() -> Self {
        let mut config = load_config_from_env().unwrap_or_default();
        config.generation = config.generation.clone().with_env_overrides();
        config.generation.sampling = config.generation.sampling.clone().normalized();

        let client: Arc<dyn GenerationClient> = match GeminiClient::from_env(&config.generation) {
            Some(c) => {
                info!(target: "schoolpower_builder", model = %c.model, base = %c.base_url, "Gemini client enabled");
                Arc::new(c)
            }
            None => {
                warn!(target: "schoolpower_builder", "GEMINI_API_KEY not set; every build will use fallback content");
                Arc::new(DisabledClient)
            }
        };
        Self::with_client(config, client)
    }

    /// Wire state around an explicit client.
    pub fn with_client(config: AppConfig, client: Arc<dyn GenerationClient>) -> Self {
        let mut store = ActivityStore::in_memory(config.storage.clone());
        store.cleanup_if_needed();

        let generator = client.name().to_string();
        let orchestrator = Arc::new(BuildOrchestrator::new(
            Arc::new(Registry::default()),
            client,
            Arc::new(Mutex::new(store)),
            EventBus::new(),
            config.generation.sampling.clone(),
            config.batch.clone(),
        ));
        info!(
            target: "schoolpower_builder",
            %generator,
            window_size = config.batch.window_size,
            capacity_bytes = config.storage.capacity_bytes,
            "Application state ready"
        );
        Self { orchestrator, config, generator }
    }
}
