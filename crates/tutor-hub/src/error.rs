//! Error kinds shared by the storage layer and the session engine.

use thiserror::Error;

use crate::model_catalog::CatalogError;

/// Why a per-session file or the index could not be read or written.
///
/// Callers that only need "is there data" use the coalescing store methods;
/// callers that need to tell a missing session from a damaged one match on
/// this type directly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    #[error("no stored record")]
    NotFound,
    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
    #[error("I/O failure: {0}")]
    Io(String),
    #[error("invalid session id: {0:?}")]
    InvalidId(String),
}

impl PersistenceError {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PersistenceError::NotFound => "not_found",
            PersistenceError::Corrupt(_) => "corrupt",
            PersistenceError::Io(_) => "io",
            PersistenceError::InvalidId(_) => "invalid_id",
        }
    }
}

impl From<std::io::Error> for PersistenceError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            PersistenceError::NotFound
        } else {
            PersistenceError::Io(err.to_string())
        }
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            PersistenceError::Io(err.to_string())
        } else {
            PersistenceError::Corrupt(err.to_string())
        }
    }
}

/// Errors surfaced by session operations to whatever serves requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TutorError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("LLM provider failure: {0}")]
    Upstream(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl TutorError {
    pub fn session_not_found(sid: &str) -> Self {
        TutorError::NotFound(format!("Session {} not found in active or archived records", sid))
    }

    pub fn upstream(err: impl std::fmt::Display) -> Self {
        TutorError::Upstream(err.to_string())
    }
}

impl From<CatalogError> for TutorError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Missing(_) => TutorError::NotFound(err.to_string()),
            CatalogError::Duplicate(_) | CatalogError::UnknownEndpoint(_) => TutorError::Validation(err.to_string()),
            CatalogError::Persistence(e) => TutorError::Internal(format!("model catalog write failed: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_maps_to_not_found() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(PersistenceError::from(io), PersistenceError::NotFound);
    }

    #[test]
    fn test_other_io_errors_keep_message() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only volume");
        let err = PersistenceError::from(io);
        assert_eq!(err.kind(), "io");
        assert!(err.to_string().contains("read-only volume"));
    }

    #[test]
    fn test_bad_json_is_corrupt() {
        let parse = serde_json::from_str::<serde_json::Value>("{\"messages\": [").unwrap_err();
        assert_eq!(PersistenceError::from(parse).kind(), "corrupt");
    }

    #[test]
    fn test_not_found_message_names_session() {
        let err = TutorError::session_not_found("abc-123");
        assert!(err.to_string().contains("abc-123"));
    }

    #[test]
    fn test_catalog_errors_map_to_request_errors() {
        let missing = TutorError::from(CatalogError::Missing("endpoint 'x'".into()));
        assert!(matches!(missing, TutorError::NotFound(_)));
        let duplicate = TutorError::from(CatalogError::Duplicate("endpoint 'x'".into()));
        assert!(matches!(duplicate, TutorError::Validation(_)));
    }
}
