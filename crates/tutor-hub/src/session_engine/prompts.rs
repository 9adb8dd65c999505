//! Prompt text, reply schema and reply parsing for English practice sessions.

use serde_json::{json, Value};

use crate::conversation_db::{Message, MessageContent, Role};
use crate::llm::{ChatMessage, OutputSchema};
use crate::utils::TextUtils;

pub const OPENING_MAX_TOKENS: u32 = 150;
pub const TURN_MAX_TOKENS: u32 = 200;
pub const TEMPERATURE: f32 = 0.7;

pub const DEFAULT_HINT: &str = "Think about what to say next.";

pub fn opening_hint(topic: &str) -> String {
    format!("Try to respond to the AI's greeting about {}.", topic)
}

pub fn fallback_greeting(topic: &str) -> String {
    format!(
        "Hello! Let's practice talking about {}. What would you like to say first?",
        topic
    )
}

pub fn opening_system_prompt(topic: &str, level: &str) -> String {
    format!(
        "You are an AI English conversation partner.\n\
         The user wants to practice a conversation about \"{topic}\" at CEFR level {level}.\n\
         Start the conversation with a welcoming message and a first question or statement related to the topic.\n\
         Keep your responses concise and appropriate for the {level} level.\n\
         Avoid complex vocabulary or grammar unless appropriate for a higher level practice."
    )
}

pub fn turn_system_prompt(topic: &str, level: &str) -> String {
    format!(
        "You are an AI English conversation partner helping the user practice talking about \"{topic}\" \
         at CEFR level {level}.\n\
         Reply naturally to the user's last message and keep the conversation going.\n\
         Put your reply in \"response\", a one-sentence suggestion for the user's next message in \"hint\", \
         and, only when the user seems stuck, a short translation of your reply in \"translation\" (otherwise null).\n\
         Keep vocabulary and grammar appropriate for {level}."
    )
}

pub fn stream_system_prompt(topic: &str, level: &str) -> String {
    format!(
        "You are an AI English conversation partner helping the user practice talking about \"{topic}\" \
         at CEFR level {level}.\n\
         Reply naturally to the user's last message in plain text, then on a new line write \
         \"HINT:\" followed by a one-sentence suggestion for the user's next message."
    )
}

pub fn reply_schema() -> OutputSchema {
    OutputSchema {
        name: "tutor_reply".to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "response": {"type": "string"},
                "hint": {"type": "string"},
                "translation": {"type": ["string", "null"]}
            },
            "required": ["response", "hint", "translation"],
            "additionalProperties": false
        }),
    }
}

/// System prompt followed by the transcript as role/text pairs.
pub fn history_messages(system: String, history: &[Message]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatMessage::system(system));
    for message in history {
        let text = message.content.text().to_string();
        messages.push(match message.role {
            Role::User => ChatMessage::user(text),
            Role::Assistant => ChatMessage::assistant(text),
        });
    }
    messages
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReply {
    pub response: String,
    pub hint: String,
    pub translation: Option<String>,
}

impl ParsedReply {
    pub fn into_content(self) -> MessageContent {
        MessageContent::StructuredReply {
            response: self.response,
            hint: Some(self.hint),
            translation: self.translation,
        }
    }
}

fn non_blank(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Structured object or plain text with a `HINT:` marker. `None` when no reply text is present.
pub fn parse_reply(value: &Value) -> Option<ParsedReply> {
    match value {
        Value::Object(map) => {
            let response = non_blank(map.get("response").or_else(|| map.get("ai_response")))?;
            Some(ParsedReply {
                response,
                hint: non_blank(map.get("hint")).unwrap_or_else(|| DEFAULT_HINT.to_string()),
                translation: non_blank(map.get("translation")),
            })
        }
        Value::String(text) => parse_text_reply(text),
        _ => None,
    }
}

pub fn parse_text_reply(text: &str) -> Option<ParsedReply> {
    let (response, hint) = TextUtils::split_hint(text);
    if response.is_empty() {
        return None;
    }
    Some(ParsedReply {
        response,
        hint: hint.unwrap_or_else(|| DEFAULT_HINT.to_string()),
        translation: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_reply_parses() {
        let parsed = parse_reply(&json!({"response": "Sounds fun!", "hint": "Ask where.", "translation": null})).unwrap();
        assert_eq!(parsed.response, "Sounds fun!");
        assert_eq!(parsed.hint, "Ask where.");
        assert_eq!(parsed.translation, None);
    }

    #[test]
    fn test_plain_text_reply_splits_hint() {
        let parsed = parse_reply(&json!("I love pasta.\nHint: Name a dish you like.")).unwrap();
        assert_eq!(parsed.response, "I love pasta.");
        assert_eq!(parsed.hint, "Name a dish you like.");

        let parsed = parse_reply(&json!("No marker here")).unwrap();
        assert_eq!(parsed.hint, DEFAULT_HINT);
    }

    #[test]
    fn test_empty_replies_are_rejected() {
        assert!(parse_reply(&json!({"response": "  ", "hint": "x"})).is_none());
        assert!(parse_reply(&json!("")).is_none());
        assert!(parse_reply(&json!(42)).is_none());
    }

    #[test]
    fn test_history_starts_with_system_prompt() {
        let history = vec![
            Message::assistant(MessageContent::PlainText("Hi!".into())),
            Message::user("Hello"),
        ];
        let messages = history_messages(turn_system_prompt("food", "A2"), &history);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.contains("food"));
        assert_eq!(messages[1], ChatMessage::assistant("Hi!"));
        assert_eq!(messages[2], ChatMessage::user("Hello"));
    }

    #[test]
    fn test_canned_texts_mention_topic() {
        assert!(fallback_greeting("travel").contains("travel"));
        assert_eq!(opening_hint("travel"), "Try to respond to the AI's greeting about travel.");
    }
}
