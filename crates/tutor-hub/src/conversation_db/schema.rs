//! On-disk document shapes for conversation files and the global index

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::utils::TextUtils;

/// Current time as UTC RFC 3339 with microseconds and a `Z` suffix.
///
/// Every persisted timestamp comes from here so that string order equals
/// time order; search sorts on the raw strings.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Which half of the store a session lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Active,
    Archived,
}

impl Partition {
    /// Directory under the data root holding this partition's files.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Partition::Active => "conversations",
            Partition::Archived => "archived",
        }
    }

    pub fn other(&self) -> Partition {
        match self {
            Partition::Active => Partition::Archived,
            Partition::Archived => Partition::Active,
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Partition::Active => write!(f, "active"),
            Partition::Archived => write!(f, "archived"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionStep {
    pub step_number: u32,
    pub description: String,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_insight: Option<String>,
}

/// A worked math solution as stored in a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MathSolution {
    pub problem: String,
    pub domain: String,
    #[serde(default)]
    pub relevant_concepts: Vec<String>,
    #[serde(default)]
    pub solution_approach: String,
    pub steps: Vec<SolutionStep>,
    pub final_answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternative_methods: Option<Vec<String>>,
}

/// Message body: plain text, a tutor reply with its side channels, or a
/// worked math solution.
///
/// Serialized untagged so files keep the `string | object` shape. Variant
/// order matters: a solution object has no `response` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    PlainText(String),
    StructuredReply {
        #[serde(alias = "ai_response")]
        response: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hint: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        translation: Option<String>,
    },
    Solution(Box<MathSolution>),
}

impl MessageContent {
    /// The text a reader of the transcript should see.
    pub fn text(&self) -> &str {
        match self {
            MessageContent::PlainText(text) => text,
            MessageContent::StructuredReply { response, .. } => response,
            MessageContent::Solution(solution) => &solution.final_answer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
    pub timestamp: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::PlainText(text.into()),
            timestamp: now_timestamp(),
        }
    }

    pub fn assistant(content: MessageContent) -> Self {
        Self {
            role: Role::Assistant,
            content,
            timestamp: now_timestamp(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    /// Set when the session is ended; lets the index be rebuilt from files alone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<String>,
    /// Tutor that owns the session. Absent for language practice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
}

impl SessionMetadata {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Replace a missing or placeholder title with one built from topic, level and creation time.
    pub fn ensure_title(&mut self) {
        if TextUtils::is_placeholder_title(self.title.as_deref()) {
            self.title = Some(synthesize_title(
                &self.topic,
                &self.level,
                self.created_at.as_deref(),
            ));
        }
    }

    pub fn title_or_default(&self) -> &str {
        self.title.as_deref().unwrap_or(UNTITLED)
    }
}

const UNTITLED: &str = "Untitled conversation";

fn synthesize_title(topic: &str, level: &str, created_at: Option<&str>) -> String {
    let topic = topic.trim();
    let topic = if topic.is_empty() { UNTITLED } else { topic };
    let when = created_at
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|dt| dt.with_timezone(&Utc).format("%Y-%m-%d %H:%M").to_string())
        .or_else(|| created_at.map(str::to_string))
        .unwrap_or_else(|| Utc::now().format("%Y-%m-%d %H:%M").to_string());

    match level.trim() {
        "" => format!("{} - {}", topic, when),
        level => format!("{} ({}) - {}", topic, level, when),
    }
}

/// One `<partition>/<sid>.json` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationFile {
    #[serde(alias = "id")]
    pub sid: String,
    #[serde(default)]
    pub metadata: SessionMetadata,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at: String,
    pub updated_at: String,
}

/// Summary row kept in `index.json`; derived from a conversation file, never authored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub title: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub level: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub message_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
}

impl IndexEntry {
    pub fn from_parts(messages: &[Message], metadata: &SessionMetadata) -> Self {
        let now = now_timestamp();
        Self {
            title: metadata.title_or_default().to_string(),
            topic: metadata.topic.clone(),
            level: metadata.level.clone(),
            created_at: metadata.created_at.clone().unwrap_or_else(|| now.clone()),
            updated_at: metadata.updated_at.clone().unwrap_or(now),
            message_count: messages.len(),
            feature: metadata.feature.clone(),
        }
    }
}

/// `{"active": {sid: entry}, "archived": {sid: entry}}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationIndex {
    #[serde(default)]
    pub active: BTreeMap<String, IndexEntry>,
    #[serde(default)]
    pub archived: BTreeMap<String, IndexEntry>,
}

impl ConversationIndex {
    fn half_mut(&mut self, partition: Partition) -> &mut BTreeMap<String, IndexEntry> {
        match partition {
            Partition::Active => &mut self.active,
            Partition::Archived => &mut self.archived,
        }
    }

    /// Insert under `partition`, dropping any entry for the same id in the other half.
    pub fn upsert(&mut self, sid: &str, entry: IndexEntry, partition: Partition) {
        self.half_mut(partition.other()).remove(sid);
        self.half_mut(partition).insert(sid.to_string(), entry);
    }

    /// Remove the id from both halves; returns whether anything was removed.
    pub fn remove(&mut self, sid: &str) -> bool {
        let active = self.active.remove(sid).is_some();
        let archived = self.archived.remove(sid).is_some();
        active || archived
    }

    pub fn partition_of(&self, sid: &str) -> Option<Partition> {
        if self.archived.contains_key(sid) {
            Some(Partition::Archived)
        } else if self.active.contains_key(sid) {
            Some(Partition::Active)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.active.len() + self.archived.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.archived.is_empty()
    }
}

/// A search/list result row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub sid: String,
    pub title: String,
    pub topic: String,
    pub level: String,
    pub created_at: String,
    pub updated_at: String,
    pub message_count: usize,
    pub is_archived: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamps_are_fixed_width_utc() {
        let ts = now_timestamp();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2026-01-01T00:00:00.000000Z".len());
    }

    #[test]
    fn test_content_keeps_string_or_object_shape() {
        let plain = serde_json::to_value(MessageContent::PlainText("hi".into())).unwrap();
        assert_eq!(plain, serde_json::json!("hi"));

        let reply = MessageContent::StructuredReply {
            response: "Sure!".into(),
            hint: Some("Say thanks.".into()),
            translation: None,
        };
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value, serde_json::json!({"response": "Sure!", "hint": "Say thanks."}));
    }

    #[test]
    fn test_content_accepts_legacy_ai_response_field() {
        let content: MessageContent =
            serde_json::from_value(serde_json::json!({"ai_response": "Hello", "hint": "Wave"})).unwrap();
        assert_eq!(content.text(), "Hello");
    }

    #[test]
    fn test_solution_content_reads_back_as_solution() {
        let value = serde_json::json!({
            "problem": "x^2 - 5x + 6 = 0",
            "domain": "代數與函數",
            "relevant_concepts": ["因式分解"],
            "solution_approach": "factor",
            "steps": [{"step_number": 1, "description": "factor", "reasoning": "(x-2)(x-3)"}],
            "final_answer": "x = 2 or x = 3"
        });
        let content: MessageContent = serde_json::from_value(value).unwrap();
        assert!(matches!(content, MessageContent::Solution(_)));
        assert_eq!(content.text(), "x = 2 or x = 3");
    }

    #[test]
    fn test_ensure_title_synthesizes_from_topic_and_level() {
        let mut metadata = SessionMetadata {
            topic: "food".into(),
            level: "A2".into(),
            created_at: Some("2026-03-04T05:06:07.000000Z".into()),
            ..Default::default()
        };
        metadata.ensure_title();
        assert_eq!(metadata.title.as_deref(), Some("food (A2) - 2026-03-04 05:06"));
    }

    #[test]
    fn test_ensure_title_uses_placeholder_for_blank_topic() {
        let mut metadata = SessionMetadata { title: Some("Unknown".into()), ..Default::default() };
        metadata.ensure_title();
        assert!(metadata.title.unwrap().starts_with("Untitled conversation"));
    }

    #[test]
    fn test_ensure_title_keeps_real_title() {
        let mut metadata = SessionMetadata { title: Some("Ordering dinner".into()), ..Default::default() };
        metadata.ensure_title();
        assert_eq!(metadata.title.as_deref(), Some("Ordering dinner"));
    }

    #[test]
    fn test_index_upsert_keeps_one_partition() {
        let entry = IndexEntry {
            title: "t".into(),
            topic: String::new(),
            level: String::new(),
            created_at: now_timestamp(),
            updated_at: now_timestamp(),
            message_count: 1,
            feature: None,
        };
        let mut index = ConversationIndex::default();
        index.upsert("s1", entry.clone(), Partition::Active);
        index.upsert("s1", entry.clone(), Partition::Archived);
        assert_eq!(index.partition_of("s1"), Some(Partition::Archived));
        assert!(!index.active.contains_key("s1"));

        index.upsert("s1", entry, Partition::Active);
        assert!(!index.archived.contains_key("s1"));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_conversation_file_accepts_id_alias() {
        let doc: ConversationFile = serde_json::from_value(serde_json::json!({
            "id": "abc",
            "messages": [],
            "created_at": "2026-01-01T00:00:00.000000Z",
            "updated_at": "2026-01-01T00:00:00.000000Z"
        }))
        .unwrap();
        assert_eq!(doc.sid, "abc");
        assert!(doc.metadata.is_empty());
    }
}
