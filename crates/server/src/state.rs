//! Process wiring: collaborators are constructed once here and shared.

use std::sync::Arc;

use aisle_agents::AgentStages;
use aisle_config::AppConfig;
use aisle_llm::ChatCompletionsClient;
use aisle_registry::{Domain, Registry};
use aisle_runtime::{InMemoryCart, Orchestrator, OrchestratorConfig};
use aisle_search::{Dispatcher, StaticCatalog};
use aisle_session::{RemoteSessionStore, SessionManager, SessionStore};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn build(config: &AppConfig) -> Self {
        let registry = Arc::new(Registry::builtin());

        let mirror: Option<Arc<dyn SessionStore>> = config
            .session
            .store_url
            .as_deref()
            .map(|url| Arc::new(RemoteSessionStore::new(url)) as Arc<dyn SessionStore>);
        let sessions = Arc::new(SessionManager::new(config.interview.default_k_limit, mirror));

        // The API key is resolved here, at startup, never deeper in the stack.
        let api_key = std::env::var(&config.llm.api_key_env).ok();
        let completion = Arc::new(ChatCompletionsClient::new(&config.llm, api_key));
        let stages = AgentStages::new(completion, registry.clone());

        // Built-in catalogs serve until dedicated engines are wired in via
        // the backend connection strings.
        let mut dispatcher = Dispatcher::new(registry.clone(), config.search.min_results);
        for domain in Domain::known() {
            dispatcher.bind(
                *domain,
                Arc::new(StaticCatalog::sample(*domain)),
                config.search.backend_concurrency,
            );
        }

        let orchestrator = Orchestrator::new(
            registry,
            sessions,
            stages,
            Arc::new(dispatcher),
            Arc::new(InMemoryCart::default()),
            None,
            OrchestratorConfig::from_app(config),
        );

        Self { orchestrator: Arc::new(orchestrator) }
    }
}
