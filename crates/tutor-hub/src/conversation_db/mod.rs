//! Conversation database - JSON file storage for transcripts plus a derived index
pub mod schema;
pub mod conversation_store;
pub mod index_store;
pub mod search;
pub use schema::*;
pub use conversation_store::ConversationStore;
pub use index_store::IndexStore;
pub use search::{search_index, SearchQuery, DEFAULT_SEARCH_LIMIT};

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::PersistenceError;
use crate::memory::{SessionMemory, SessionRecord};

/// Facade over the per-session files and the index.
///
/// `save` is the only path that touches both; `mirror` writes a file alone.
pub struct ConversationDatabase {
    pub conversations: ConversationStore,
    pub index: IndexStore,
    root: PathBuf,
}

impl ConversationDatabase {
    pub fn open(root: &Path) -> anyhow::Result<Self> {
        info!("Opening conversation database at: {}", root.display());
        let conversations = ConversationStore::new(root);
        conversations
            .ensure_dirs()
            .map_err(|e| anyhow::anyhow!("Failed to create data directories under {}: {}", root.display(), e))?;
        Ok(Self {
            conversations,
            index: IndexStore::new(root),
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run `f` on the blocking thread pool. Every store call made while
    /// serving requests goes through here; file writes fsync.
    pub async fn blocking<T, F>(self: &Arc<Self>, f: F) -> Result<T, PersistenceError>
    where
        F: FnOnce(&ConversationDatabase) -> T + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(self);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| PersistenceError::Io(format!("storage task failed: {}", e)))
    }

    /// Write the session's file in `partition` and refresh its index entry there.
    ///
    /// Fills in `created_at`, stamps `updated_at` and synthesizes a title when
    /// the given one is a placeholder. Returns the document as persisted.
    pub fn save(
        &self,
        sid: &str,
        messages: &[Message],
        metadata: &SessionMetadata,
        partition: Partition,
    ) -> Result<ConversationFile, PersistenceError> {
        let now = now_timestamp();
        let mut metadata = metadata.clone();
        let created_at = metadata.created_at.get_or_insert_with(|| now.clone()).clone();
        metadata.updated_at = Some(now.clone());
        metadata.ensure_title();

        let doc = ConversationFile {
            sid: sid.to_string(),
            metadata,
            messages: messages.to_vec(),
            created_at,
            updated_at: now,
        };
        self.conversations.write(&doc, partition)?;
        self.index.update_index(sid, &doc.messages, &doc.metadata, partition)?;
        Ok(doc)
    }

    /// Copy an already-saved document into `partition` without touching the index.
    pub fn mirror(&self, doc: &ConversationFile, partition: Partition) -> Result<(), PersistenceError> {
        self.conversations.write(doc, partition)
    }

    pub fn try_load(&self, sid: &str, partition: Partition) -> Result<ConversationFile, PersistenceError> {
        self.conversations.read(sid, partition)
    }

    /// Coalescing load: any failure reads as `([], {})` after being logged.
    pub fn load(&self, sid: &str, partition: Partition) -> (Vec<Message>, SessionMetadata) {
        match self.try_load(sid, partition) {
            Ok(doc) => (doc.messages, doc.metadata),
            Err(PersistenceError::NotFound) => (Vec::new(), SessionMetadata::default()),
            Err(e) => {
                warn!("Could not load {} conversation {} ({}): {}", partition, sid, e.kind(), e);
                (Vec::new(), SessionMetadata::default())
            }
        }
    }

    pub fn exists(&self, sid: &str, partition: Partition) -> bool {
        self.conversations.exists(sid, partition)
    }

    /// Remove both files and both index entries. Absent pieces are not errors.
    pub fn remove_session(&self, sid: &str) -> Result<bool, PersistenceError> {
        let active = self.conversations.remove(sid, Partition::Active)?;
        let archived = self.conversations.remove(sid, Partition::Archived)?;
        let indexed = self.index.remove(sid)?;
        Ok(active || archived || indexed)
    }

    /// Query the index only. A missing or unreadable index yields no results.
    pub fn search(&self, query: &SearchQuery) -> Vec<SearchHit> {
        let index = self.index.read_or_default();
        search_index(&index, query)
    }

    /// Reconstruct `index.json` from the files in both partitions.
    ///
    /// A session is archived when its archived copy carries `archived_at` or it
    /// has no active copy. The entry comes from whichever copy is newer.
    pub fn rebuild_index(&self) -> Result<ConversationIndex, PersistenceError> {
        let mut ids: BTreeSet<String> = BTreeSet::new();
        ids.extend(self.conversations.list_ids(Partition::Active)?);
        ids.extend(self.conversations.list_ids(Partition::Archived)?);

        let mut index = ConversationIndex::default();
        for sid in &ids {
            let active = self.readable(sid, Partition::Active);
            let archived = self.readable(sid, Partition::Archived);

            let (partition, doc) = match (active, archived) {
                (None, None) => continue,
                (Some(a), None) => (Partition::Active, a),
                (None, Some(b)) => (Partition::Archived, b),
                (Some(a), Some(b)) => {
                    let partition = if b.metadata.archived_at.is_some() {
                        Partition::Archived
                    } else {
                        Partition::Active
                    };
                    (partition, if b.updated_at > a.updated_at { b } else { a })
                }
            };

            let mut metadata = doc.metadata.clone();
            metadata.created_at.get_or_insert_with(|| doc.created_at.clone());
            metadata.updated_at.get_or_insert_with(|| doc.updated_at.clone());
            metadata.ensure_title();
            index.upsert(sid, IndexEntry::from_parts(&doc.messages, &metadata), partition);
        }

        self.index.replace(&index)?;
        info!(
            "Rebuilt conversation index: {} active, {} archived",
            index.active.len(),
            index.archived.len()
        );
        Ok(index)
    }

    fn readable(&self, sid: &str, partition: Partition) -> Option<ConversationFile> {
        match self.try_load(sid, partition) {
            Ok(doc) => Some(doc),
            Err(PersistenceError::NotFound) => None,
            Err(e) => {
                warn!("Skipping {} conversation {} during rebuild: {}", partition, sid, e);
                None
            }
        }
    }

    /// Startup hydration: full records for active sessions, metadata only for archived ones.
    ///
    /// Rebuilds the index first if it is missing or corrupt. Returns the number
    /// of active sessions loaded.
    pub fn load_all_into_memory(&self, memory: &SessionMemory) -> usize {
        let index = match self.index.read() {
            Ok(index) => index,
            Err(e) => {
                warn!("Conversation index unavailable ({}); rebuilding from files", e.kind());
                match self.rebuild_index() {
                    Ok(index) => index,
                    Err(e) => {
                        warn!("Index rebuild failed: {}", e);
                        ConversationIndex::default()
                    }
                }
            }
        };

        let mut loaded = 0;
        for sid in index.active.keys() {
            match self.try_load(sid, Partition::Active) {
                Ok(doc) => {
                    memory.put(
                        sid,
                        SessionRecord {
                            messages: doc.messages,
                            metadata: doc.metadata,
                            home: Partition::Active,
                        },
                    );
                    loaded += 1;
                }
                Err(e) => warn!("Active conversation {} not hydrated ({}): {}", sid, e.kind(), e),
            }
        }

        for (sid, entry) in &index.archived {
            memory.put_archived(
                sid,
                SessionMetadata {
                    topic: entry.topic.clone(),
                    level: entry.level.clone(),
                    title: Some(entry.title.clone()),
                    created_at: Some(entry.created_at.clone()),
                    updated_at: Some(entry.updated_at.clone()),
                    feature: entry.feature.clone(),
                    ..Default::default()
                },
            );
        }

        debug!("Hydrated {} active and {} archived sessions", loaded, index.archived.len());
        loaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open() -> (TempDir, ConversationDatabase) {
        let dir = TempDir::new().unwrap();
        let db = ConversationDatabase::open(dir.path()).unwrap();
        (dir, db)
    }

    fn metadata(topic: &str, level: &str) -> SessionMetadata {
        SessionMetadata {
            topic: topic.into(),
            level: level.into(),
            model: "gpt-5-mini".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_save_then_load_returns_saved_state() {
        let (_dir, db) = open();
        let messages = vec![Message::user("hello"), Message::assistant(MessageContent::PlainText("hi".into()))];
        let doc = db.save("s1", &messages, &metadata("food", "A2"), Partition::Active).unwrap();

        let (loaded, meta) = db.load("s1", Partition::Active);
        assert_eq!(loaded, messages);
        assert_eq!(meta, doc.metadata);
        assert!(meta.title.unwrap().contains("food"));
    }

    #[test]
    fn test_archived_save_moves_index_entry() {
        let (_dir, db) = open();
        let meta = metadata("food", "A2");
        db.save("s1", &[], &meta, Partition::Active).unwrap();
        db.save("s1", &[], &meta, Partition::Archived).unwrap();

        let index = db.index.read().unwrap();
        assert!(index.archived.contains_key("s1"));
        assert!(!index.active.contains_key("s1"));
    }

    #[test]
    fn test_mirror_leaves_index_alone() {
        let (_dir, db) = open();
        let doc = db.save("s1", &[Message::user("x")], &metadata("t", "B1"), Partition::Active).unwrap();
        db.mirror(&doc, Partition::Archived).unwrap();

        assert!(db.exists("s1", Partition::Archived));
        assert_eq!(db.index.read().unwrap().partition_of("s1"), Some(Partition::Active));
    }

    #[test]
    fn test_load_coalesces_missing_and_corrupt() {
        let (_dir, db) = open();
        let (messages, meta) = db.load("nope", Partition::Active);
        assert!(messages.is_empty() && meta.is_empty());

        let path = db.conversations.path_for("bad", Partition::Active).unwrap();
        std::fs::write(&path, b"[1, 2").unwrap();
        let (messages, meta) = db.load("bad", Partition::Active);
        assert!(messages.is_empty() && meta.is_empty());
        assert_eq!(db.try_load("bad", Partition::Active).unwrap_err().kind(), "corrupt");
    }

    #[test]
    fn test_remove_session_is_idempotent() {
        let (_dir, db) = open();
        let doc = db.save("s1", &[], &metadata("t", "B1"), Partition::Active).unwrap();
        db.mirror(&doc, Partition::Archived).unwrap();

        assert!(db.remove_session("s1").unwrap());
        assert!(!db.remove_session("s1").unwrap());
        assert!(!db.exists("s1", Partition::Active));
        assert!(!db.exists("s1", Partition::Archived));
        assert!(db.search(&SearchQuery::default()).is_empty());
    }

    #[test]
    fn test_search_without_index_then_save_recreates_it() {
        let (_dir, db) = open();
        db.save("s1", &[], &metadata("travel", "B1"), Partition::Active).unwrap();
        std::fs::remove_file(db.index.path()).unwrap();

        assert!(db.search(&SearchQuery::default()).is_empty());

        db.save("s2", &[], &metadata("math", "A1"), Partition::Active).unwrap();
        let hits = db.search(&SearchQuery::default());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].sid, "s2");
    }

    #[test]
    fn test_rebuild_classifies_by_archived_marker() {
        let (_dir, db) = open();
        let live = db.save("live", &[], &metadata("a", "B1"), Partition::Active).unwrap();
        db.mirror(&live, Partition::Archived).unwrap();

        let mut ended_meta = metadata("b", "B2");
        ended_meta.archived_at = Some(now_timestamp());
        let ended = db.save("ended", &[], &ended_meta, Partition::Archived).unwrap();
        db.mirror(&ended, Partition::Active).unwrap();

        db.save("orphan", &[], &metadata("c", "C1"), Partition::Archived).unwrap();
        std::fs::remove_file(db.index.path()).unwrap();

        let index = db.rebuild_index().unwrap();
        assert_eq!(index.partition_of("live"), Some(Partition::Active));
        assert_eq!(index.partition_of("ended"), Some(Partition::Archived));
        assert_eq!(index.partition_of("orphan"), Some(Partition::Archived));
        assert_eq!(db.index.read().unwrap(), index);
    }

    #[test]
    fn test_load_all_hydrates_active_only() {
        let (_dir, db) = open();
        db.save("a1", &[Message::user("hi")], &metadata("a", "B1"), Partition::Active).unwrap();
        db.save("z1", &[Message::user("bye")], &metadata("z", "B1"), Partition::Archived).unwrap();

        let memory = SessionMemory::new();
        assert_eq!(db.load_all_into_memory(&memory), 1);
        assert_eq!(memory.get("a1").unwrap().messages.len(), 1);
        assert!(memory.get("z1").is_none());
        assert_eq!(memory.archived_metadata("z1").unwrap().topic, "z");
    }

    #[test]
    fn test_load_all_rebuilds_missing_index() {
        let (_dir, db) = open();
        db.save("a1", &[], &metadata("a", "B1"), Partition::Active).unwrap();
        std::fs::remove_file(db.index.path()).unwrap();

        let memory = SessionMemory::new();
        assert_eq!(db.load_all_into_memory(&memory), 1);
        assert!(db.index.read().is_ok());
    }
}
