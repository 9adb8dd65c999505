//! One-shot English lookups: words, phrases, sentences and grammar questions.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::error::TutorError;
use crate::llm::{ChatBackend, ChatMessage, CompletionRequest, OutputSchema};
use crate::metrics;
use crate::model_registry::{ModelRegistry, FEATURE_ENGLISH};
use crate::session_engine::Level;

const QUERY_MAX_TOKENS: u32 = 800;
const QUERY_TEMPERATURE: f32 = 0.3;
const UNSTRUCTURED_TIP: &str =
    "Could not process the query as expected. The LLM did not return a structured response.";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SmartQuery {
    pub q: String,
    pub level: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Word,
    Phrase,
    Sentence,
    GrammarExplanation,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    #[serde(rename = "type")]
    pub kind: QueryKind,
    pub query: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub definitions: Vec<Definition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipa: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<Example>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grammar_tips: Option<String>,
    /// Always null; audio comes from the pronounce endpoint.
    #[serde(default)]
    pub audio_url: Option<String>,
}

impl QueryResult {
    fn unstructured(query: &str) -> Self {
        Self {
            kind: QueryKind::Unknown,
            query: query.to_string(),
            definitions: Vec::new(),
            ipa: None,
            examples: Vec::new(),
            translation: None,
            grammar_tips: Some(UNSTRUCTURED_TIP.to_string()),
            audio_url: None,
        }
    }
}

fn system_prompt(level: Option<Level>) -> String {
    let level = level.map_or_else(|| "B1 (default)".to_string(), |l| l.to_string());
    format!(
        "You are an English learning assistant. Analyze the user's query and provide detailed information.\n\
         Determine if the query is a single word, a phrase, a sentence, or a grammar question.\n\
         Target CEFR level for examples and explanations: {level}.\n\
         If the query is a word, provide definitions with part of speech, IPA and example sentences.\n\
         If the query is a phrase, explain its meaning and usage.\n\
         If the query is a sentence, translate it into Traditional Chinese and point out grammar.\n\
         Keep grammar_tips concise. If unsure, use type \"unknown\"."
    )
}

pub fn query_schema() -> OutputSchema {
    OutputSchema {
        name: "english_query_tool".to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "type": {"type": "string", "enum": ["word", "phrase", "sentence", "grammar_explanation", "unknown"]},
                "query": {"type": "string"},
                "definitions": {
                    "type": "array",
                    "items": {"type": "object", "properties": {"pos": {"type": "string"}, "text": {"type": "string"}}, "required": ["text"]}
                },
                "ipa": {"type": "string"},
                "examples": {
                    "type": "array",
                    "items": {"type": "object", "properties": {"text": {"type": "string"}, "level": {"type": "string"}}, "required": ["text"]}
                },
                "translation": {"type": "string"},
                "grammar_tips": {"type": "string"}
            },
            "required": ["type", "query"]
        }),
    }
}

/// Structured result, or the "unknown" placeholder when the reply has no usable shape.
pub fn parse_result(value: Value, query: &str) -> QueryResult {
    if !value.is_object() {
        return QueryResult::unstructured(query);
    }
    match serde_json::from_value::<QueryResult>(value) {
        Ok(mut result) => {
            result.audio_url = None;
            result
        }
        Err(e) => {
            warn!("Query reply did not match the expected shape: {}", e);
            QueryResult::unstructured(query)
        }
    }
}

#[derive(Clone)]
pub struct QueryService {
    backend: Arc<dyn ChatBackend>,
    registry: Arc<ModelRegistry>,
}

impl QueryService {
    pub fn new(backend: Arc<dyn ChatBackend>, registry: Arc<ModelRegistry>) -> Self {
        Self { backend, registry }
    }

    pub async fn query(&self, request: SmartQuery) -> Result<QueryResult, TutorError> {
        let q = request.q.trim();
        if q.is_empty() {
            return Err(TutorError::Validation("Query must not be empty".to_string()));
        }
        let level = request
            .level
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .map(str::parse::<Level>)
            .transpose()?;
        let model = self.registry.resolve_llm(FEATURE_ENGLISH, request.model.as_deref());
        debug!("Smart query with {}: {:?}", model, q);

        let completion = CompletionRequest {
            model,
            messages: vec![ChatMessage::system(system_prompt(level)), ChatMessage::user(q)],
            max_tokens: QUERY_MAX_TOKENS,
            temperature: QUERY_TEMPERATURE,
        };
        let value = self
            .backend
            .complete_json(&completion, &query_schema())
            .await
            .map_err(|e| {
                metrics::inc_upstream_failures();
                error!("Smart query failed: {}", e);
                TutorError::upstream(e)
            })?;
        Ok(parse_result(value, q))
    }
}
