//! In-process backend that replays queued replies and records every request.
//!
//! Drives the session, speech and router tests without network access.
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{ChatBackend, CompletionRequest, OutputSchema, SpeechRequest, TextStream};

#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Json(serde_json::Value),
    /// Deltas delivered in order by `stream`.
    Stream(Vec<String>),
    /// Deltas delivered, then a mid-stream error.
    StreamThenFail(Vec<String>, String),
    Audio(Bytes),
    Fail(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    Complete(CompletionRequest),
    CompleteJson(CompletionRequest, String),
    Stream(CompletionRequest),
    Speech(SpeechRequest),
}

#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<ScriptedReply>>,
    calls: Mutex<Vec<RecordedCall>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        let backend = Self::new();
        for reply in replies {
            backend.push(reply);
        }
        backend
    }

    pub fn push(&self, reply: ScriptedReply) {
        lock(&self.replies).push_back(reply);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.replies).len()
    }

    fn next(&self, call: RecordedCall) -> anyhow::Result<ScriptedReply> {
        lock(&self.calls).push(call);
        match lock(&self.replies).pop_front() {
            Some(ScriptedReply::Fail(message)) => Err(anyhow::anyhow!(message)),
            Some(reply) => Ok(reply),
            None => Err(anyhow::anyhow!("no scripted reply left")),
        }
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<String> {
        match self.next(RecordedCall::Complete(request.clone()))? {
            ScriptedReply::Text(text) => Ok(text),
            ScriptedReply::Json(value) => Ok(value.to_string()),
            ScriptedReply::Stream(parts) => Ok(parts.concat()),
            other => Err(anyhow::anyhow!("scripted {:?} cannot answer a completion", other)),
        }
    }

    async fn complete_json(
        &self,
        request: &CompletionRequest,
        schema: &OutputSchema,
    ) -> anyhow::Result<serde_json::Value> {
        match self.next(RecordedCall::CompleteJson(request.clone(), schema.name.clone()))? {
            ScriptedReply::Json(value) => Ok(value),
            ScriptedReply::Text(text) => {
                Ok(serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text)))
            }
            other => Err(anyhow::anyhow!("scripted {:?} cannot answer a JSON completion", other)),
        }
    }

    async fn stream(&self, request: &CompletionRequest) -> anyhow::Result<TextStream> {
        let (parts, failure) = match self.next(RecordedCall::Stream(request.clone()))? {
            ScriptedReply::Stream(parts) => (parts, None),
            ScriptedReply::StreamThenFail(parts, message) => (parts, Some(message)),
            ScriptedReply::Text(text) => (vec![text], None),
            other => return Err(anyhow::anyhow!("scripted {:?} cannot answer a stream", other)),
        };
        let items = parts
            .into_iter()
            .map(Ok)
            .chain(failure.map(|message| Err(anyhow::anyhow!(message))));
        Ok(Box::pin(futures::stream::iter(items.collect::<Vec<_>>())))
    }

    async fn synthesize_speech(&self, request: &SpeechRequest) -> anyhow::Result<Bytes> {
        match self.next(RecordedCall::Speech(request.clone()))? {
            ScriptedReply::Audio(bytes) => Ok(bytes),
            other => Err(anyhow::anyhow!("scripted {:?} cannot answer speech", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatMessage;
    use futures::StreamExt;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "m".into(),
            messages: vec![ChatMessage::user("hi")],
            max_tokens: 10,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn test_replies_are_consumed_in_order() {
        let backend = ScriptedBackend::with_replies([
            ScriptedReply::Text("one".into()),
            ScriptedReply::Fail("down".into()),
        ]);
        assert_eq!(backend.complete(&request()).await.unwrap(), "one");
        assert_eq!(backend.complete(&request()).await.unwrap_err().to_string(), "down");
        assert!(backend.complete(&request()).await.is_err());
        assert_eq!(backend.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_stream_then_fail_ends_with_error() {
        let backend = ScriptedBackend::with_replies([ScriptedReply::StreamThenFail(
            vec!["a".into()],
            "cut".into(),
        )]);
        let items: Vec<_> = backend.stream(&request()).await.unwrap().collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "a");
        assert!(items[1].is_err());
    }

    #[test]
    fn test_json_completion_accepts_plain_text() {
        let backend = ScriptedBackend::with_replies([
            ScriptedReply::Text("{\"response\": \"ok\"}".into()),
            ScriptedReply::Text("just words".into()),
        ]);
        let schema = OutputSchema { name: "s".into(), schema: serde_json::json!({}) };
        let parsed = tokio_test::block_on(backend.complete_json(&request(), &schema)).unwrap();
        assert_eq!(parsed["response"], "ok");
        let passthrough = tokio_test::block_on(backend.complete_json(&request(), &schema)).unwrap();
        assert_eq!(passthrough, serde_json::Value::String("just words".into()));
        assert_eq!(backend.remaining(), 0);
    }
}
