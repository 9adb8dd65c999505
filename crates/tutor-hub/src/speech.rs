//! Text-to-speech for pronunciation practice.

use bytes::Bytes;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error};

use crate::error::TutorError;
use crate::llm::{ChatBackend, SpeechRequest};
use crate::metrics;
use crate::model_catalog::TTS_VOICES;
use crate::model_registry::ModelRegistry;

pub const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeechSpeed {
    Slow,
    #[default]
    Normal,
}

impl SpeechSpeed {
    pub fn factor(&self) -> f32 {
        match self {
            SpeechSpeed::Slow => 0.85,
            SpeechSpeed::Normal => 1.0,
        }
    }
}

impl FromStr for SpeechSpeed {
    type Err = TutorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slow" => Ok(SpeechSpeed::Slow),
            "" | "normal" => Ok(SpeechSpeed::Normal),
            other => Err(TutorError::Validation(format!("Unknown speed '{}'; expected slow or normal", other))),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PronounceRequest {
    pub text: String,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub speed: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Clone)]
pub struct SpeechService {
    backend: Arc<dyn ChatBackend>,
    registry: Arc<ModelRegistry>,
}

impl SpeechService {
    pub fn new(backend: Arc<dyn ChatBackend>, registry: Arc<ModelRegistry>) -> Self {
        Self { backend, registry }
    }

    /// Build the provider request, applying registry defaults and validating inputs.
    pub fn plan(&self, request: &PronounceRequest) -> Result<SpeechRequest, TutorError> {
        let text = request.text.trim();
        if text.is_empty() {
            return Err(TutorError::Validation("Text to pronounce must not be empty".to_string()));
        }
        let speed: SpeechSpeed = request.speed.as_deref().unwrap_or("normal").parse()?;
        let voice = match request.voice.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            Some(voice) => voice.to_ascii_lowercase(),
            None => self.registry.default_voice(),
        };
        if !TTS_VOICES.contains(&voice.as_str()) {
            return Err(TutorError::Validation(format!(
                "Unknown voice '{}'; expected one of {}",
                voice,
                TTS_VOICES.join(", ")
            )));
        }

        Ok(SpeechRequest {
            model: self.registry.resolve_tts(request.model.as_deref()),
            voice,
            speed: speed.factor(),
            input: text.to_string(),
        })
    }

    pub async fn pronounce(&self, request: &PronounceRequest) -> Result<Bytes, TutorError> {
        let speech = self.plan(request)?;
        debug!("Pronouncing {} chars with {}/{}", speech.input.chars().count(), speech.model, speech.voice);
        self.backend.synthesize_speech(&speech).await.map_err(|e| {
            metrics::inc_upstream_failures();
            error!("Speech synthesis failed: {}", e);
            TutorError::upstream(e)
        })
    }
}
