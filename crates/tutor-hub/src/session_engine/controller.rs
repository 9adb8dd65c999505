//! Session lifecycle: create, continue, stream, end, delete, and archive reads.
//!
//! Every commit writes the session's home partition through the database
//! (file plus index) and mirrors the same document into the other partition's
//! file. Persistence failures are logged and counted but never fail a turn.
//!
//! Callers must not run two turns on the same session concurrently.

use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::conversation_db::{
    now_timestamp, ConversationDatabase, ConversationStore, Message, MessageContent, Partition, SearchHit,
    SearchQuery, SessionMetadata,
};
use crate::error::{PersistenceError, TutorError};
use crate::llm::{ChatBackend, ChatMessage, CompletionRequest};
use crate::memory::{SessionMemory, SessionRecord};
use crate::metrics;
use crate::model_registry::{ModelRegistry, FEATURE_ENGLISH};
use crate::session_engine::prompts::{self, ParsedReply};
use crate::session_engine::types::*;

#[derive(Clone)]
pub struct SessionController {
    db: Arc<ConversationDatabase>,
    memory: SessionMemory,
    backend: Arc<dyn ChatBackend>,
    registry: Arc<ModelRegistry>,
}

impl SessionController {
    pub fn new(
        db: Arc<ConversationDatabase>,
        memory: SessionMemory,
        backend: Arc<dyn ChatBackend>,
        registry: Arc<ModelRegistry>,
    ) -> Self {
        Self { db, memory, backend, registry }
    }

    pub fn database(&self) -> &Arc<ConversationDatabase> {
        &self.db
    }

    pub fn memory(&self) -> &SessionMemory {
        &self.memory
    }

    /// Load active sessions and archived metadata from disk into memory.
    pub fn hydrate(&self) -> usize {
        let loaded = self.db.load_all_into_memory(&self.memory);
        metrics::set_active_sessions(self.memory.active_count());
        info!("Hydrated {} active sessions", loaded);
        loaded
    }

    pub(crate) fn validate_sid(sid: &str) -> Result<(), TutorError> {
        ConversationStore::validate_sid(sid).map_err(|e| TutorError::Validation(e.to_string()))
    }

    pub async fn create(&self, request: CreateSession) -> Result<CreatedSession, TutorError> {
        let level: Level = request.level.parse()?;
        let topic = request.topic.trim().to_string();
        let model = self.registry.resolve_llm(FEATURE_ENGLISH, request.model.as_deref());
        let sid = Uuid::new_v4().to_string();

        let opening = CompletionRequest {
            model: model.clone(),
            messages: vec![ChatMessage::system(prompts::opening_system_prompt(&topic, level.as_str()))],
            max_tokens: prompts::OPENING_MAX_TOKENS,
            temperature: prompts::TEMPERATURE,
        };
        let greeting = match self.backend.complete(&opening).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                warn!("Empty opening from {} for session {}; using fallback greeting", model, sid);
                prompts::fallback_greeting(&topic)
            }
            Err(e) => {
                metrics::inc_upstream_failures();
                warn!("Opening generation failed for session {}: {}; using fallback greeting", sid, e);
                prompts::fallback_greeting(&topic)
            }
        };
        let hint = prompts::opening_hint(&topic);

        let metadata = SessionMetadata {
            topic,
            level: level.to_string(),
            model,
            title: request.title,
            created_at: Some(now_timestamp()),
            ..Default::default()
        };
        let messages = vec![Message::assistant(MessageContent::StructuredReply {
            response: greeting.clone(),
            hint: Some(hint.clone()),
            translation: None,
        })];

        let metadata = self.commit(&sid, &messages, metadata, Partition::Active).await;
        let title = metadata.title_or_default().to_string();
        self.memory.put(&sid, SessionRecord { messages, metadata, home: Partition::Active });
        metrics::set_active_sessions(self.memory.active_count());

        info!("Created session {} ({})", sid, title);
        Ok(CreatedSession { sid, ai: greeting, hint, title })
    }

    /// The session's record from memory, or rehydrated from disk without
    /// changing which partition owns it.
    pub async fn checkout(&self, sid: &str) -> Result<SessionRecord, TutorError> {
        Self::validate_sid(sid)?;
        if let Some(record) = self.memory.get(sid) {
            return Ok(record);
        }

        let owned = sid.to_string();
        let recovered = self
            .db
            .blocking(move |db| recover_record(db, &owned))
            .await
            .map_err(|e| TutorError::Internal(e.to_string()))?;
        let Some(record) = recovered else {
            return Err(TutorError::session_not_found(sid));
        };

        info!("Rehydrated session {} from disk (home: {})", sid, record.home);
        self.memory.put(sid, record.clone());
        metrics::set_active_sessions(self.memory.active_count());
        Ok(record)
    }

    fn turn_request(&self, record: &SessionRecord, system: String) -> CompletionRequest {
        let model = if record.metadata.model.trim().is_empty() {
            self.registry.resolve_llm(FEATURE_ENGLISH, None)
        } else {
            record.metadata.model.clone()
        };
        CompletionRequest {
            model,
            messages: prompts::history_messages(system, &record.messages),
            max_tokens: prompts::TURN_MAX_TOKENS,
            temperature: prompts::TEMPERATURE,
        }
    }

    /// Append a user message and the tutor's reply. On provider failure nothing is stored.
    pub async fn append_turn(&self, sid: &str, user_text: &str) -> Result<TurnReply, TutorError> {
        let user_text = user_text.trim();
        if user_text.is_empty() {
            return Err(TutorError::Validation("Message text must not be empty".to_string()));
        }
        let mut record = self.checkout(sid).await?;
        record.messages.push(Message::user(user_text));

        let system = prompts::turn_system_prompt(&record.metadata.topic, &record.metadata.level);
        let request = self.turn_request(&record, system);
        let value = self
            .backend
            .complete_json(&request, &prompts::reply_schema())
            .await
            .map_err(|e| {
                metrics::inc_upstream_failures();
                error!("Turn generation failed for session {}: {}", sid, e);
                TutorError::upstream(e)
            })?;
        let reply = prompts::parse_reply(&value).ok_or_else(|| {
            metrics::inc_upstream_failures();
            TutorError::Upstream("LLM reply contained no response text".to_string())
        })?;

        Ok(self.finish_turn(sid, record, reply).await)
    }

    async fn finish_turn(&self, sid: &str, mut record: SessionRecord, reply: ParsedReply) -> TurnReply {
        let turn = TurnReply {
            ai: reply.response.clone(),
            hint: reply.hint.clone(),
            translation: reply.translation.clone(),
            feedback: None,
        };
        record.messages.push(Message::assistant(reply.into_content()));
        self.store(sid, record).await;
        metrics::inc_turns();
        turn
    }

    /// Commit the record and publish it to memory.
    pub(crate) async fn store(&self, sid: &str, mut record: SessionRecord) {
        record.metadata = self.commit(sid, &record.messages, record.metadata, record.home).await;
        if record.home == Partition::Archived {
            self.memory.put_archived(sid, record.metadata.clone());
        }
        self.memory.put(sid, record);
    }

    /// Streaming turn. The user message is committed before the provider is
    /// called; the reply is committed only once the stream completes.
    pub async fn stream_turn(
        &self,
        sid: &str,
        user_text: &str,
    ) -> Result<BoxStream<'static, TurnEvent>, TutorError> {
        let user_text = user_text.trim();
        if user_text.is_empty() {
            return Err(TutorError::Validation("Message text must not be empty".to_string()));
        }
        let mut record = self.checkout(sid).await?;
        record.messages.push(Message::user(user_text));
        self.store(sid, record.clone()).await;
        let record = self.memory.get(sid).unwrap_or(record);

        let system = prompts::stream_system_prompt(&record.metadata.topic, &record.metadata.level);
        let request = self.turn_request(&record, system);
        let mut deltas = self.backend.stream(&request).await.map_err(|e| {
            metrics::inc_upstream_failures();
            error!("Stream start failed for session {}: {}", sid, e);
            TutorError::upstream(e)
        })?;

        let controller = self.clone();
        let sid = sid.to_string();
        let events = async_stream::stream! {
            let mut full_text = String::new();
            while let Some(item) = deltas.next().await {
                match item {
                    Ok(delta) => {
                        full_text.push_str(&delta);
                        yield TurnEvent::Delta(delta);
                    }
                    Err(e) => {
                        metrics::inc_upstream_failures();
                        warn!("Stream for session {} broke after {} chars: {}", sid, full_text.len(), e);
                        yield TurnEvent::Failed(e.to_string());
                        return;
                    }
                }
            }
            match prompts::parse_text_reply(&full_text) {
                Some(reply) => {
                    let turn = controller.finish_turn(&sid, record, reply).await;
                    yield TurnEvent::Completed(turn);
                }
                None => {
                    metrics::inc_upstream_failures();
                    yield TurnEvent::Failed("LLM stream produced no reply text".to_string());
                }
            }
        };
        Ok(Box::pin(events))
    }

    /// Move the session to the archived partition and return its transcript.
    /// The active file is left on disk; the index entry moves.
    pub async fn end(&self, sid: &str) -> Result<Transcript, TutorError> {
        let mut record = self.checkout(sid).await?;
        record.metadata.archived_at = Some(now_timestamp());

        let owned = sid.to_string();
        let (messages, metadata) = (record.messages.clone(), record.metadata.clone());
        let saved = self
            .db
            .blocking(move |db| db.save(&owned, &messages, &metadata, Partition::Archived))
            .await
            .and_then(|saved| saved);
        let metadata = match saved {
            Ok(doc) => doc.metadata,
            Err(e) => {
                self.persistence_failed(sid, Partition::Archived, &e);
                record.metadata
            }
        };

        self.memory.take(sid);
        self.memory.put_archived(sid, metadata.clone());
        metrics::set_active_sessions(self.memory.active_count());
        info!("Ended session {} with {} messages", sid, record.messages.len());

        Ok(build_transcript(sid, &metadata, &record.messages))
    }

    /// Remove every trace of the session. Deleting an unknown id succeeds.
    pub async fn delete(&self, sid: &str) -> Result<DeleteOutcome, TutorError> {
        Self::validate_sid(sid)?;
        let held = self.memory.forget(sid);
        let owned = sid.to_string();
        let removed = self
            .db
            .blocking(move |db| db.remove_session(&owned))
            .await
            .and_then(|removed| removed)
            .map_err(|e| {
                metrics::inc_persistence_failures();
                error!("Failed to delete session {} ({}): {}", sid, e.kind(), e);
                TutorError::Internal(format!("Failed to delete session {}: {}", sid, e))
            })?;
        metrics::set_active_sessions(self.memory.active_count());
        info!("Deleted session {} (existed: {})", sid, held || removed);
        Ok(DeleteOutcome { sid: sid.to_string(), deleted: held || removed })
    }

    /// Transcript of the archived copy.
    pub async fn transcript(&self, sid: &str) -> Result<Transcript, TutorError> {
        Self::validate_sid(sid)?;
        let owned = sid.to_string();
        let (messages, metadata) = self
            .db
            .blocking(move |db| db.load(&owned, Partition::Archived))
            .await
            .map_err(|e| TutorError::Internal(e.to_string()))?;
        if messages.is_empty() && metadata.is_empty() {
            return Err(TutorError::NotFound(format!("Archived conversation {} not found", sid)));
        }
        Ok(build_transcript(sid, &metadata, &messages))
    }

    /// Ended sessions, most recently updated first.
    pub fn list_archives(&self) -> Vec<ArchiveSummary> {
        let mut items = self.memory.archived_snapshot();
        items.sort_by(|a, b| b.1.updated_at.cmp(&a.1.updated_at));
        items
            .into_iter()
            .map(|(sid, metadata)| ArchiveSummary {
                sid,
                title: metadata.title_or_default().to_string(),
                topic: metadata.topic,
                level: metadata.level,
            })
            .collect()
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, TutorError> {
        let query = query.clone();
        self.db
            .blocking(move |db| db.search(&query))
            .await
            .map_err(|e| TutorError::Internal(e.to_string()))
    }

    /// Save to `home` and mirror into the other partition. Returns the metadata
    /// as persisted, or a locally completed copy when the save failed.
    pub(crate) async fn commit(
        &self,
        sid: &str,
        messages: &[Message],
        metadata: SessionMetadata,
        home: Partition,
    ) -> SessionMetadata {
        let owned = sid.to_string();
        let pending = (messages.to_vec(), metadata.clone());
        let outcome = self
            .db
            .blocking(move |db| {
                let (messages, metadata) = pending;
                let saved = db.save(&owned, &messages, &metadata, home);
                let mirrored = saved.as_ref().ok().map(|doc| db.mirror(doc, home.other()));
                (saved, mirrored)
            })
            .await;
        let (saved, mirrored) = match outcome {
            Ok(pair) => pair,
            Err(e) => (Err(e), None),
        };

        if let Some(Err(e)) = mirrored {
            self.persistence_failed(sid, home.other(), &e);
        }
        match saved {
            Ok(doc) => doc.metadata,
            Err(e) => {
                self.persistence_failed(sid, home, &e);
                let mut metadata = metadata;
                metadata.created_at.get_or_insert_with(now_timestamp);
                metadata.updated_at = Some(now_timestamp());
                metadata.ensure_title();
                metadata
            }
        }
    }

    fn persistence_failed(&self, sid: &str, partition: Partition, err: &PersistenceError) {
        metrics::inc_persistence_failures();
        error!("Persisting {} copy of session {} failed ({}): {}", partition, sid, err.kind(), err);
    }
}

/// Disk recovery for `checkout`. The archived copy is preferred; its home is
/// archived when it was ended or no active copy exists.
fn recover_record(db: &ConversationDatabase, sid: &str) -> Option<SessionRecord> {
    let archived = match db.try_load(sid, Partition::Archived) {
        Ok(doc) => Some(doc),
        Err(PersistenceError::NotFound) => None,
        Err(e) => {
            warn!("Archived copy of {} unreadable ({}): {}", sid, e.kind(), e);
            None
        }
    };
    if let Some(doc) = archived {
        let home = if doc.metadata.archived_at.is_some() || !db.exists(sid, Partition::Active) {
            Partition::Archived
        } else {
            Partition::Active
        };
        return Some(SessionRecord { messages: doc.messages, metadata: doc.metadata, home });
    }
    match db.try_load(sid, Partition::Active) {
        Ok(doc) => Some(SessionRecord {
            messages: doc.messages,
            metadata: doc.metadata,
            home: Partition::Active,
        }),
        Err(e) => {
            debug!("Session {} not recoverable from disk: {}", sid, e);
            None
        }
    }
}

fn build_transcript(sid: &str, metadata: &SessionMetadata, messages: &[Message]) -> Transcript {
    Transcript {
        sid: sid.to_string(),
        topic: metadata.topic.clone(),
        level: metadata.level.clone(),
        title: metadata.title_or_default().to_string(),
        transcript: messages.iter().map(TranscriptLine::from).collect(),
    }
}
