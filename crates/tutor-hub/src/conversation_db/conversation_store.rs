//! Per-session JSON documents under `<root>/conversations` and `<root>/archived`

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::conversation_db::schema::*;
use crate::error::PersistenceError;
use crate::utils::{atomic_write_json, read_json};

pub struct ConversationStore {
    root: PathBuf,
}

impl ConversationStore {
    pub fn new(root: &Path) -> Self {
        Self { root: root.to_path_buf() }
    }

    /// Reject ids that could escape the partition directory.
    pub fn validate_sid(sid: &str) -> Result<(), PersistenceError> {
        let valid = !sid.is_empty()
            && sid.len() <= 128
            && sid.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(())
        } else {
            Err(PersistenceError::InvalidId(sid.to_string()))
        }
    }

    pub fn partition_dir(&self, partition: Partition) -> PathBuf {
        self.root.join(partition.dir_name())
    }

    pub fn path_for(&self, sid: &str, partition: Partition) -> Result<PathBuf, PersistenceError> {
        Self::validate_sid(sid)?;
        Ok(self.partition_dir(partition).join(format!("{}.json", sid)))
    }

    pub fn ensure_dirs(&self) -> Result<(), PersistenceError> {
        for partition in [Partition::Active, Partition::Archived] {
            fs::create_dir_all(self.partition_dir(partition))?;
        }
        Ok(())
    }

    pub fn write(&self, doc: &ConversationFile, partition: Partition) -> Result<(), PersistenceError> {
        let path = self.path_for(&doc.sid, partition)?;
        atomic_write_json(&path, doc)?;
        debug!("Wrote {} conversation {} ({} messages)", partition, doc.sid, doc.messages.len());
        Ok(())
    }

    pub fn read(&self, sid: &str, partition: Partition) -> Result<ConversationFile, PersistenceError> {
        let path = self.path_for(sid, partition)?;
        let mut doc: ConversationFile = read_json(&path)?;
        if doc.sid != sid {
            warn!("Conversation file {} carries id {}; using file name", path.display(), doc.sid);
            doc.sid = sid.to_string();
        }
        Ok(doc)
    }

    pub fn exists(&self, sid: &str, partition: Partition) -> bool {
        self.path_for(sid, partition).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Delete the partition file; returns whether a file was removed.
    pub fn remove(&self, sid: &str, partition: Partition) -> Result<bool, PersistenceError> {
        let path = self.path_for(sid, partition)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Ids of every `*.json` file in the partition, sorted. Temp files and bad names are skipped.
    pub fn list_ids(&self, partition: Partition) -> Result<Vec<String>, PersistenceError> {
        let dir = self.partition_dir(partition);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if Self::validate_sid(stem).is_ok() {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}
