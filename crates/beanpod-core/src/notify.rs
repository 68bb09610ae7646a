//! User-facing warnings raised while a listing is repaired.
//!
//! Quarantines and orphan repairs are never errors: the listing still
//! succeeds. They surface through a [`Notifier`] that the embedding surface
//! (CLI, editor extension) supplies.

use std::path::PathBuf;
use std::sync::Mutex;

/// Follow-up a surface may offer next to a warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationAction {
    /// Open the quarantine directory.
    RevealQuarantine(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    Quarantined,
    OrphansRepaired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    pub action: Option<NotificationAction>,
}

pub trait Notifier: Send + Sync {
    fn warn(&self, notification: Notification);
}

/// Logs notifications through `tracing` and nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn warn(&self, notification: Notification) {
        tracing::warn!(kind = ?notification.kind, "{}", notification.message);
    }
}

/// Keeps notifications in memory for later display.
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl CollectingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every notification collected so far.
    pub fn drain(&self) -> Vec<Notification> {
        self.seen
            .lock()
            .map(|mut seen| std::mem::take(&mut *seen))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn count(&self, kind: &NotificationKind) -> usize {
        self.seen
            .lock()
            .map(|seen| seen.iter().filter(|n| &n.kind == kind).count())
            .unwrap_or_default()
    }
}

impl Notifier for CollectingNotifier {
    fn warn(&self, notification: Notification) {
        tracing::warn!(kind = ?notification.kind, "{}", notification.message);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(notification);
        }
    }
}
