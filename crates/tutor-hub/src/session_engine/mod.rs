//! Session lifecycle on top of the conversation database and an LLM backend.
pub mod controller;
pub mod prompts;
pub mod types;
pub use controller::SessionController;
pub use types::*;
