//! Isolation of bean files that cannot be read or repaired.
//!
//! A quarantined file is renamed into `<beans root>/.quarantine/` with a
//! `.quarantined` suffix so the backend stops listing it. Nothing is ever
//! deleted. Paths arrive from backend output and error text, so every target
//! is resolved and checked against the beans root before anything moves.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::config::QUARANTINE_DIR;
use crate::notify::{Notification, NotificationAction, NotificationKind, Notifier};
use crate::paths::{BeansRoot, PathError};

pub const QUARANTINE_SUFFIX: &str = ".quarantined";

#[derive(Debug, thiserror::Error)]
pub enum QuarantineError {
    #[error("refusing to quarantine: {0}")]
    Path(#[from] PathError),

    #[error("refusing to quarantine '{0}': already quarantined")]
    AlreadyQuarantined(String),

    #[error("bean file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("quarantine I/O error: {0}")]
    Io(#[from] io::Error),
}

static QUOTED_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"["'`]([^"'`\r\n]+\.md)["'`]"#).expect("static regex")
});

static BARE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:[A-Za-z]:)?[/\\]?(?:[\w.~-]+[/\\])*[\w.~-]+\.md\b").expect("static regex")
});

/// Pull the offending bean file path out of a backend error message.
///
/// Accepts quoted or bare paths, relative or absolute, with either `/` or
/// `\` separators. Only Markdown files qualify.
#[must_use]
pub fn extract_offending_path(message: &str) -> Option<String> {
    if let Some(caps) = QUOTED_PATH.captures(message) {
        return caps.get(1).map(|m| m.as_str().trim().to_string());
    }
    BARE_PATH
        .find(message)
        .map(|m| m.as_str().to_string())
}

pub struct QuarantineManager {
    root: BeansRoot,
    notifier: Arc<dyn Notifier>,
}

impl QuarantineManager {
    #[must_use]
    pub fn new(root: BeansRoot, notifier: Arc<dyn Notifier>) -> Self {
        Self { root, notifier }
    }

    #[must_use]
    pub fn quarantine_dir(&self) -> PathBuf {
        self.root.beans().join(QUARANTINE_DIR)
    }

    /// Resolve a reported path to a quarantinable file under the beans root.
    pub fn resolve(&self, reported: &str) -> Result<PathBuf, QuarantineError> {
        let target = self.root.resolve(reported)?;
        if target.starts_with(self.quarantine_dir()) {
            return Err(QuarantineError::AlreadyQuarantined(reported.to_string()));
        }
        Ok(target)
    }

    fn destination_for(&self, file_name: &str) -> PathBuf {
        let dir = self.quarantine_dir();
        let first = dir.join(format!("{file_name}{QUARANTINE_SUFFIX}"));
        if !first.exists() {
            return first;
        }
        (1u32..)
            .map(|n| dir.join(format!("{file_name}.{n}{QUARANTINE_SUFFIX}")))
            .find(|candidate| !candidate.exists())
            .unwrap_or(first)
    }

    /// Move a bean file into quarantine and raise exactly one warning for it.
    pub fn quarantine(&self, reported: &str) -> Result<PathBuf, QuarantineError> {
        let target = self.resolve(reported)?;
        if !target.is_file() {
            return Err(QuarantineError::NotFound(target));
        }

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let dir = self.quarantine_dir();
        fs::create_dir_all(&dir)?;
        let destination = self.destination_for(&file_name);
        fs::rename(&target, &destination)?;

        tracing::warn!(
            path = %target.display(),
            destination = %destination.display(),
            "bean file quarantined"
        );

        self.notifier.warn(Notification {
            kind: NotificationKind::Quarantined,
            message: format!("Quarantined unreadable bean file {file_name}"),
            action: Some(NotificationAction::RevealQuarantine(dir)),
        });

        Ok(destination)
    }

    /// Report a record that had no file to move.
    pub fn report_unlocated(&self, id: Option<&str>) {
        let label = id.unwrap_or("<unknown>");
        tracing::warn!(id = %label, "unrecoverable bean record has no file path");
        self.notifier.warn(Notification {
            kind: NotificationKind::Quarantined,
            message: format!("Skipped unrecoverable bean record {label} (no file to quarantine)"),
            action: None,
        });
    }
}
