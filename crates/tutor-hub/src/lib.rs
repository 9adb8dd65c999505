pub mod config;
pub mod conversation_db;
pub mod error;
pub mod llm;
pub mod math_tutor;
pub mod memory;
pub mod metrics;
pub mod model_catalog;
pub mod model_registry;
pub mod session_engine;
pub mod shared_state;
pub mod smart_query;
pub mod speech;
pub mod telemetry;
pub mod utils;

#[cfg(feature = "cli")]
pub mod api;
#[cfg(feature = "cli")]
pub mod server;

// Public API exports
pub use config::Config;
pub use conversation_db::{ConversationDatabase, Partition, SearchHit, SearchQuery};
pub use error::{PersistenceError, TutorError};
pub use llm::{ChatBackend, LLMWorker};
pub use math_tutor::MathTutor;
pub use memory::{SessionMemory, SessionRecord};
pub use session_engine::{SessionController, TurnEvent};
pub use shared_state::AppState;
pub use smart_query::QueryService;
pub use speech::SpeechService;

#[cfg(feature = "cli")]
pub use server::{build_router, run_server};
