//! The global `index.json` summary.
//!
//! Every mutation is a read-merge-write cycle under one in-process lock, so
//! concurrent commits from different sessions never drop each other's entries.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::conversation_db::schema::*;
use crate::error::PersistenceError;
use crate::utils::{atomic_write_json, read_json};

pub const INDEX_FILE: &str = "index.json";

pub struct IndexStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl IndexStore {
    pub fn new(root: &Path) -> Self {
        Self {
            path: root.join(INDEX_FILE),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Strict read: a missing index is `NotFound`, a damaged one `Corrupt`.
    pub fn read(&self) -> Result<ConversationIndex, PersistenceError> {
        read_json(&self.path)
    }

    /// Lenient read used by queries: missing or corrupt yields an empty index.
    pub fn read_or_default(&self) -> ConversationIndex {
        match self.read() {
            Ok(index) => index,
            Err(PersistenceError::NotFound) => ConversationIndex::default(),
            Err(e) => {
                warn!("Ignoring unreadable index {}: {}", self.path.display(), e);
                ConversationIndex::default()
            }
        }
    }

    /// Apply `f` to the current index and write the result, all under the lock.
    pub fn modify<R>(
        &self,
        f: impl FnOnce(&mut ConversationIndex) -> R,
    ) -> Result<R, PersistenceError> {
        let _guard = self.lock();
        let mut index = self.read_or_default();
        let out = f(&mut index);
        atomic_write_json(&self.path, &index)?;
        Ok(out)
    }

    /// Upsert the entry derived from `messages`/`metadata` under `partition`.
    pub fn update_index(
        &self,
        sid: &str,
        messages: &[Message],
        metadata: &SessionMetadata,
        partition: Partition,
    ) -> Result<(), PersistenceError> {
        let entry = IndexEntry::from_parts(messages, metadata);
        self.modify(|index| index.upsert(sid, entry, partition))?;
        debug!("Indexed {} under {}", sid, partition);
        Ok(())
    }

    pub fn remove(&self, sid: &str) -> Result<bool, PersistenceError> {
        self.modify(|index| index.remove(sid))
    }

    /// Overwrite the whole index, e.g. after a rebuild from files.
    pub fn replace(&self, index: &ConversationIndex) -> Result<(), PersistenceError> {
        let _guard = self.lock();
        atomic_write_json(&self.path, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn metadata(topic: &str) -> SessionMetadata {
        let mut metadata = SessionMetadata {
            topic: topic.into(),
            level: "B1".into(),
            created_at: Some(now_timestamp()),
            updated_at: Some(now_timestamp()),
            ..Default::default()
        };
        metadata.ensure_title();
        metadata
    }

    #[test]
    fn test_missing_index_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::new(dir.path());
        assert_eq!(store.read().unwrap_err(), PersistenceError::NotFound);
        assert!(store.read_or_default().is_empty());
    }

    #[test]
    fn test_corrupt_index_is_replaced_on_next_update() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::new(dir.path());
        std::fs::write(store.path(), b"{{{").unwrap();

        store.update_index("s1", &[], &metadata("food"), Partition::Active).unwrap();
        let index = store.read().unwrap();
        assert_eq!(index.active["s1"].topic, "food");
    }

    #[test]
    fn test_update_moves_between_partitions() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::new(dir.path());
        let meta = metadata("work");
        store.update_index("s1", &[Message::user("hi")], &meta, Partition::Active).unwrap();
        store.update_index("s1", &[Message::user("hi")], &meta, Partition::Archived).unwrap();

        let index = store.read().unwrap();
        assert!(index.active.is_empty());
        assert_eq!(index.archived["s1"].message_count, 1);
        assert!(store.remove("s1").unwrap());
        assert!(store.read().unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_updates_keep_every_entry() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(IndexStore::new(dir.path()));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .update_index(&format!("s{}", i), &[], &metadata("t"), Partition::Active)
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.read().unwrap().active.len(), 16);
    }
}
