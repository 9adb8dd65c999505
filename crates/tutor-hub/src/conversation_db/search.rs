//! Filtering and ordering over the index; never opens per-session files.

use serde::Deserialize;
use std::collections::HashMap;

use crate::conversation_db::schema::*;
use crate::utils::TextUtils;

pub const DEFAULT_SEARCH_LIMIT: usize = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    /// Substring of the title.
    #[serde(default)]
    pub query: Option<String>,
    /// Substring of the topic.
    #[serde(default)]
    pub topic: Option<String>,
    /// Exact level, compared case-insensitively.
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Exact owning tutor, e.g. `math`.
    #[serde(default)]
    pub feature: Option<String>,
}

fn default_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            query: None,
            topic: None,
            level: None,
            limit: DEFAULT_SEARCH_LIMIT,
            feature: None,
        }
    }
}

impl SearchQuery {
    pub fn title(query: impl Into<String>) -> Self {
        Self { query: Some(query.into()), ..Default::default() }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn feature(feature: impl Into<String>) -> Self {
        Self { feature: Some(feature.into()), ..Default::default() }
    }

    fn matches(&self, entry: &IndexEntry) -> bool {
        let title_ok = self
            .query
            .as_deref()
            .map_or(true, |q| TextUtils::contains_ignore_case(&entry.title, q));
        let topic_ok = self
            .topic
            .as_deref()
            .map_or(true, |t| TextUtils::contains_ignore_case(&entry.topic, t));
        let level_ok = self
            .level
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .map_or(true, |l| TextUtils::equals_ignore_case(&entry.level, l.trim()));
        let feature_ok = self
            .feature
            .as_deref()
            .map_or(true, |f| entry.feature.as_deref() == Some(f));
        title_ok && topic_ok && level_ok && feature_ok
    }
}

/// Merge both halves of the index, filter, sort newest first and truncate.
///
/// Should an id ever appear in both halves the archived entry is reported.
/// Ties on `updated_at` are broken by id so the order is total.
pub fn search_index(index: &ConversationIndex, query: &SearchQuery) -> Vec<SearchHit> {
    if query.limit == 0 {
        return Vec::new();
    }

    let mut merged: HashMap<&str, (&IndexEntry, bool)> = HashMap::new();
    for (sid, entry) in &index.active {
        merged.insert(sid.as_str(), (entry, false));
    }
    for (sid, entry) in &index.archived {
        merged.insert(sid.as_str(), (entry, true));
    }

    let mut hits: Vec<SearchHit> = merged
        .into_iter()
        .filter(|(_, (entry, _))| query.matches(entry))
        .map(|(sid, (entry, is_archived))| SearchHit {
            sid: sid.to_string(),
            title: entry.title.clone(),
            topic: entry.topic.clone(),
            level: entry.level.clone(),
            created_at: entry.created_at.clone(),
            updated_at: entry.updated_at.clone(),
            message_count: entry.message_count,
            is_archived,
            feature: entry.feature.clone(),
        })
        .collect();

    hits.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.sid.cmp(&b.sid)));
    hits.truncate(query.limit);
    hits
}
