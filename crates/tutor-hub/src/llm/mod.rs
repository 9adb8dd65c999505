//! LLM provider seam: chat completion, schema-constrained JSON, streaming and speech.
pub mod llm_worker;
#[cfg(any(test, feature = "test-util"))]
pub mod scripted;
pub use llm_worker::LLMWorker;
#[cfg(any(test, feature = "test-util"))]
pub use scripted::{RecordedCall, ScriptedBackend, ScriptedReply};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Role/content pair sent to the provider. System prompts only live here,
/// never in persisted transcripts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    /// `data:` URLs of images attached to this message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self { role: role.to_string(), content: content.into(), images: Vec::new() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }

    pub fn with_image(mut self, data_url: impl Into<String>) -> Self {
        self.images.push(data_url.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Named JSON schema the reply must conform to.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub model: String,
    pub voice: String,
    pub speed: f32,
    pub input: String,
}

/// Stream of generated text fragments.
pub type TextStream = BoxStream<'static, anyhow::Result<String>>;

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Free-form completion text.
    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<String>;

    /// Completion constrained to `schema`. A reply that is not JSON comes back
    /// as a `Value::String` holding the raw text.
    async fn complete_json(
        &self,
        request: &CompletionRequest,
        schema: &OutputSchema,
    ) -> anyhow::Result<serde_json::Value>;

    /// Incremental completion; each item is a text delta.
    async fn stream(&self, request: &CompletionRequest) -> anyhow::Result<TextStream>;

    /// Synthesized audio (mp3).
    async fn synthesize_speech(&self, request: &SpeechRequest) -> anyhow::Result<Bytes>;
}
