//! Boundary to the external bean query and mutation interface.
//!
//! The engine never reads bean files to build a listing itself. It asks a
//! [`BeanBackend`] for raw records and routes mutations through it, then
//! repairs whatever comes back.

pub mod cli;

use std::time::Duration;

use crate::ingest::RawRecord;
use crate::model::{BeanChanges, BeanDraft};

pub use cli::CliBackend;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The backend program is missing or could not be started.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("backend timed out after {0:?}")]
    Timeout(Duration),

    /// The backend answered, but not with records.
    #[error("malformed backend output: {0}")]
    Malformed(String),

    #[error("bean not found: '{0}'")]
    NotFound(String),

    #[error("permission denied: {0}")]
    Permission(String),

    /// Non-zero exit; the message may name the offending file.
    #[error("{0}")]
    Failed(String),
}

/// Query and mutation interface the store is built on.
pub trait BeanBackend: Send + Sync {
    /// Every record the backend knows about, unvalidated.
    fn query(&self) -> Result<Vec<RawRecord>, BackendError>;

    /// Apply a sparse change set and return the updated record.
    fn update(&self, id: &str, changes: &BeanChanges) -> Result<RawRecord, BackendError>;

    fn create(&self, draft: &BeanDraft) -> Result<RawRecord, BackendError>;

    fn delete(&self, id: &str) -> Result<(), BackendError>;
}

const SECTION_HEADERS: [&str; 5] = ["Usage:", "Flags:", "Global Flags:", "Aliases:", "Examples:"];

fn is_help_pointer(line: &str) -> bool {
    (line.starts_with("Use \"") || line.starts_with("Run '")) && line.contains("--help")
}

/// Reduce backend stderr to the human-readable part.
///
/// Drops usage text, flag listings and `--help` pointers, and strips a
/// leading `Error:` tag. Falls back to the trimmed input when nothing
/// survives.
#[must_use]
pub fn clean_error_message(raw: &str) -> String {
    let mut kept = Vec::new();
    for line in raw.lines() {
        let trimmed = line.trim();
        if SECTION_HEADERS.iter().any(|h| trimmed.starts_with(h)) {
            break;
        }
        if trimmed.is_empty() || is_help_pointer(trimmed) {
            continue;
        }
        let trimmed = trimmed
            .strip_prefix("Error:")
            .or_else(|| trimmed.strip_prefix("error:"))
            .map_or(trimmed, str::trim);
        if !trimmed.is_empty() {
            kept.push(trimmed);
        }
    }

    if kept.is_empty() {
        raw.trim().to_string()
    } else {
        kept.join("\n")
    }
}
