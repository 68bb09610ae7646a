//! Dangling parent repair.
//!
//! Once quarantine has removed beans from a listing, their children point at
//! parents that no longer exist. Each such link is cleared both remotely and
//! in the returned list. No placeholder parent is ever invented.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::backend::BeanBackend;
use crate::model::{Bean, BeanChanges};
use crate::notify::{Notification, NotificationAction, NotificationKind, Notifier};

/// Outcome of one repair pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    /// Ids whose parent link was cleared remotely.
    pub repaired: Vec<String>,
    /// Ids whose remote clear failed, with the error text. Their in-memory
    /// link is cleared regardless.
    pub failed: Vec<(String, String)>,
}

impl IntegrityReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.repaired.is_empty() && self.failed.is_empty()
    }
}

/// Ids of beans whose parent is not in `beans`, sorted.
#[must_use]
pub fn find_orphans(beans: &[Bean]) -> Vec<String> {
    let present: HashSet<&str> = beans.iter().map(|b| b.id.as_str()).collect();
    let mut orphans: Vec<String> = beans
        .iter()
        .filter(|b| b.parent.as_deref().is_some_and(|p| !present.contains(p)))
        .map(|b| b.id.clone())
        .collect();
    orphans.sort();
    orphans
}

fn summary(codes: &[String], quarantined: &[String], failures: usize) -> String {
    let mut message = format!(
        "Cleared missing parent on {} bean(s): {}",
        codes.len(),
        codes.join(", ")
    );
    if !quarantined.is_empty() {
        message.push_str(&format!(" (after quarantining {})", quarantined.join(", ")));
    }
    if failures > 0 {
        message.push_str(&format!("; {failures} could not be updated on disk"));
    }
    message
}

/// Clear every parent link in `beans` that does not resolve within the set.
///
/// `quarantined` names the files removed from this listing; they are only
/// used in the combined warning. At most one notification is raised.
pub fn repair_dangling_parents(
    beans: &mut [Bean],
    backend: &dyn BeanBackend,
    notifier: &dyn Notifier,
    quarantined: &[String],
    quarantine_dir: Option<PathBuf>,
) -> IntegrityReport {
    let orphans = find_orphans(beans);
    let mut report = IntegrityReport::default();
    if orphans.is_empty() {
        return report;
    }

    let clear = BeanChanges::clear_parent();
    let mut codes = Vec::with_capacity(orphans.len());
    for id in &orphans {
        let Some(bean) = beans.iter_mut().find(|b| &b.id == id) else {
            continue;
        };
        let missing_parent = bean.parent.take().unwrap_or_default();
        codes.push(bean.code.clone());

        match backend.update(id, &clear) {
            Ok(_) => {
                tracing::info!(id = %id, parent = %missing_parent, "cleared dangling parent");
                report.repaired.push(id.clone());
            }
            Err(err) => {
                tracing::warn!(id = %id, parent = %missing_parent, error = %err, "failed to clear dangling parent");
                report.failed.push((id.clone(), err.to_string()));
            }
        }
    }

    notifier.warn(Notification {
        kind: NotificationKind::OrphansRepaired,
        message: summary(&codes, quarantined, report.failed.len()),
        action: quarantine_dir
            .filter(|_| !quarantined.is_empty())
            .map(NotificationAction::RevealQuarantine),
    });

    report
}
