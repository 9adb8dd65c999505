use dashmap::DashMap;
use std::sync::Arc;

use crate::conversation_db::{Message, Partition, SessionMetadata};

/// In-memory mirror of one hydrated session.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub messages: Vec<Message>,
    pub metadata: SessionMetadata,
    /// Partition whose index entry this session owns.
    pub home: Partition,
}

/// Process-wide session maps.
///
/// `active` holds full records of sessions being served; `archived` holds
/// only the metadata of ended sessions so archive listings never touch disk.
#[derive(Clone, Default)]
pub struct SessionMemory {
    active: Arc<DashMap<String, SessionRecord>>,
    archived: Arc<DashMap<String, SessionMetadata>>,
}

impl SessionMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, sid: &str) -> Option<SessionRecord> {
        self.active.get(sid).map(|r| r.clone())
    }

    pub fn contains(&self, sid: &str) -> bool {
        self.active.contains_key(sid)
    }

    pub fn put(&self, sid: &str, record: SessionRecord) {
        self.active.insert(sid.to_string(), record);
    }

    pub fn take(&self, sid: &str) -> Option<SessionRecord> {
        self.active.remove(sid).map(|(_, record)| record)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn archived_metadata(&self, sid: &str) -> Option<SessionMetadata> {
        self.archived.get(sid).map(|m| m.clone())
    }

    pub fn put_archived(&self, sid: &str, metadata: SessionMetadata) {
        self.archived.insert(sid.to_string(), metadata);
    }

    /// Snapshot of the archived map, ordered by id.
    pub fn archived_snapshot(&self) -> Vec<(String, SessionMetadata)> {
        let mut items: Vec<_> = self
            .archived
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        items.sort_by(|a, b| a.0.cmp(&b.0));
        items
    }

    /// Drop the session from every map; returns whether anything was held.
    pub fn forget(&self, sid: &str) -> bool {
        let active = self.active.remove(sid).is_some();
        let archived = self.archived.remove(sid).is_some();
        active || archived
    }
}
