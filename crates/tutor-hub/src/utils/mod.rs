//! Utilities module - text helpers and crash-safe JSON file access

pub mod json_file;
pub mod text_utils;

// Re-export commonly used utilities
pub use json_file::{atomic_write_json, read_json};
pub use text_utils::TextUtils;
