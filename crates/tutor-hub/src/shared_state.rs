//! Application state shared by every request handler.
//!
//! Built once at startup and cloned into the router. Everything inside is
//! behind `Arc`, so clones are cheap and observe the same sessions.

use std::sync::Arc;
use tracing::info;

use crate::{
    config::Config,
    conversation_db::ConversationDatabase,
    llm::{ChatBackend, LLMWorker},
    math_tutor::MathTutor,
    memory::SessionMemory,
    model_catalog::ModelCatalog,
    model_registry::ModelRegistry,
    session_engine::SessionController,
    smart_query::QueryService,
    speech::SpeechService,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: SessionController,
    pub math: MathTutor,
    pub query: QueryService,
    pub speech: SpeechService,
    pub catalog: Arc<ModelCatalog>,
    pub registry: Arc<ModelRegistry>,
    /// When this process started serving, reported by the version endpoint.
    pub started_at: String,
}

impl AppState {
    /// Wire the HTTP provider from configuration. Catalog endpoints take
    /// precedence over the configured provider for the models they serve.
    pub fn initialize(config: Config) -> anyhow::Result<Self> {
        let catalog = Arc::new(ModelCatalog::load_or_create(&config.models_config_path));
        let worker = LLMWorker::new(
            &config.llm_base_url,
            config.openai_api_key.clone(),
            config.generate_timeout(),
            config.stream_timeout(),
        )
        .with_catalog(catalog.clone());
        Self::assemble(config, Arc::new(worker), catalog)
    }

    /// Same as `initialize` with an explicit backend.
    pub fn from_parts(config: Config, backend: Arc<dyn ChatBackend>) -> anyhow::Result<Self> {
        let catalog = Arc::new(ModelCatalog::load_or_create(&config.models_config_path));
        Self::assemble(config, backend, catalog)
    }

    fn assemble(config: Config, backend: Arc<dyn ChatBackend>, catalog: Arc<ModelCatalog>) -> anyhow::Result<Self> {
        info!("Initializing application state");

        let db = Arc::new(ConversationDatabase::open(&config.data_root)?);
        let registry = Arc::new(ModelRegistry::new(config.model_defaults(), Some(catalog.clone())));

        let sessions = SessionController::new(db, SessionMemory::new(), backend.clone(), registry.clone());
        let hydrated = sessions.hydrate();
        let math = MathTutor::new(sessions.clone(), backend.clone(), registry.clone());
        let query = QueryService::new(backend.clone(), registry.clone());
        let speech = SpeechService::new(backend, registry.clone());

        info!("Application state ready ({} active sessions restored)", hydrated);
        Ok(Self {
            config: Arc::new(config),
            sessions,
            math,
            query,
            speech,
            catalog,
            registry,
            started_at: crate::conversation_db::now_timestamp(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ScriptedBackend, ScriptedReply};
    use crate::session_engine::CreateSession;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> Config {
        let mut config = Config::from_lookup(|_| None).unwrap();
        config.data_root = dir.path().join("data");
        config.models_config_path = dir.path().join("models.json");
        config
    }

    #[tokio::test]
    async fn test_restart_restores_active_sessions() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(ScriptedBackend::with_replies(vec![ScriptedReply::Text("Hi there!".into())]));

        let state = AppState::from_parts(test_config(&dir), backend.clone()).unwrap();
        let created = state
            .sessions
            .create(CreateSession { topic: "sports".into(), level: "B1".into(), ..Default::default() })
            .await
            .unwrap();
        assert!(dir.path().join("models.json").exists());

        let restarted = AppState::from_parts(test_config(&dir), backend).unwrap();
        let record = restarted.sessions.memory().get(&created.sid).unwrap();
        assert_eq!(record.messages.len(), 1);
        assert_eq!(record.metadata.topic, "sports");
    }
}
