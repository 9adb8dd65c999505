use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::conversation_db::{Message, Role};
use crate::error::TutorError;

/// CEFR proficiency level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
}

impl Level {
    pub const ALL: [Level; 6] = [Level::A1, Level::A2, Level::B1, Level::B2, Level::C1, Level::C2];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::A1 => "A1",
            Level::A2 => "A2",
            Level::B1 => "B1",
            Level::B2 => "B2",
            Level::C1 => "C1",
            Level::C2 => "C2",
        }
    }
}

impl FromStr for Level {
    type Err = TutorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Level::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                TutorError::Validation(format!("Unknown level '{}'; expected one of A1, A2, B1, B2, C1, C2", wanted))
            })
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateSession {
    pub topic: String,
    pub level: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedSession {
    pub sid: String,
    pub ai: String,
    pub hint: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnReply {
    pub ai: String,
    pub hint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
    pub feedback: Option<String>,
}

/// What a streaming turn delivers to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    Delta(String),
    /// The reply has been assembled and committed.
    Completed(TurnReply),
    /// The stream broke; no assistant message was stored.
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Ai,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptLine {
    pub speaker: Speaker,
    pub text: String,
}

impl From<&Message> for TranscriptLine {
    fn from(message: &Message) -> Self {
        let speaker = match message.role {
            Role::User => Speaker::User,
            Role::Assistant => Speaker::Ai,
        };
        Self { speaker, text: message.content.text().to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transcript {
    pub sid: String,
    pub topic: String,
    pub level: String,
    pub title: String,
    pub transcript: Vec<TranscriptLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchiveSummary {
    pub sid: String,
    pub title: String,
    pub topic: String,
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteOutcome {
    pub sid: String,
    /// False when nothing was stored for the id.
    pub deleted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation_db::MessageContent;

    #[test]
    fn test_level_parses_case_insensitively() {
        assert_eq!("b2".parse::<Level>().unwrap(), Level::B2);
        assert_eq!(" C1 ".parse::<Level>().unwrap().to_string(), "C1");
        assert!(matches!("Z9".parse::<Level>(), Err(TutorError::Validation(_))));
    }

    #[test]
    fn test_transcript_line_uses_reply_text() {
        let message = Message::assistant(MessageContent::StructuredReply {
            response: "Welcome!".into(),
            hint: Some("Say hi".into()),
            translation: None,
        });
        let line = TranscriptLine::from(&message);
        assert_eq!(line.speaker, Speaker::Ai);
        assert_eq!(line.text, "Welcome!");
        assert_eq!(serde_json::to_value(&line).unwrap()["speaker"], "ai");
    }
}
