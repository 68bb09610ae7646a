//! Status propagation from a bean to its descendants.
//!
//! Completing, starting or scrapping a bean carries the same status down to
//! every descendant, as does reopening a closed bean. The walk is
//! breadth-first over an explicit worklist with a visited set, so a corrupt
//! parent cycle terminates. Writes go out one at a time in a fixed order and
//! are never rolled back.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::backend::BeanBackend;
use crate::model::{Bean, BeanChanges, Status};

/// Whether moving a bean from `from` to `to` propagates to its descendants.
///
/// Any move into `completed`, `in-progress` or `scrapped` cascades, and so
/// does reopening a closed bean into `draft` or `todo`.
#[must_use]
pub const fn should_cascade(from: Status, to: Status) -> bool {
    match to {
        Status::Completed | Status::InProgress | Status::Scrapped => true,
        Status::Draft | Status::Todo => from.is_closed(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    /// Descendants written, in write order.
    pub updated: Vec<String>,
    /// Descendants whose write failed, with the error text.
    pub failed: Vec<(String, String)>,
    /// Descendants that already had the target status.
    pub skipped: Vec<String>,
}

impl CascadeReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Children of every bean, each list sorted by id.
fn children_index(beans: &[Bean]) -> HashMap<&str, Vec<&Bean>> {
    let mut index: HashMap<&str, Vec<&Bean>> = HashMap::new();
    for bean in beans {
        if let Some(parent) = bean.parent.as_deref() {
            index.entry(parent).or_default().push(bean);
        }
    }
    for children in index.values_mut() {
        children.sort_by(|a, b| a.id.cmp(&b.id));
    }
    index
}

/// Every descendant of `root_id`, breadth-first.
#[must_use]
pub fn descendants<'a>(root_id: &str, beans: &'a [Bean]) -> Vec<&'a Bean> {
    let index = children_index(beans);
    let mut visited: HashSet<&str> = HashSet::from([root_id]);
    let mut worklist: VecDeque<&str> = VecDeque::from([root_id]);
    let mut out = Vec::new();

    while let Some(id) = worklist.pop_front() {
        for child in index.get(id).into_iter().flatten() {
            if visited.insert(child.id.as_str()) {
                out.push(*child);
                worklist.push_back(child.id.as_str());
            }
        }
    }
    out
}

/// Write `target` to every descendant of `root_id` that differs from it.
///
/// `beans` is the hierarchy as last listed. The root itself is not written;
/// its own update belongs to the caller.
pub fn cascade_status(
    root_id: &str,
    target: Status,
    beans: &[Bean],
    backend: &dyn BeanBackend,
) -> CascadeReport {
    let mut report = CascadeReport::default();
    let changes = BeanChanges::status(target);

    for bean in descendants(root_id, beans) {
        if bean.status == target {
            report.skipped.push(bean.id.clone());
            continue;
        }
        match backend.update(&bean.id, &changes) {
            Ok(_) => {
                tracing::debug!(id = %bean.id, status = %target, "cascaded status");
                report.updated.push(bean.id.clone());
            }
            Err(err) => {
                tracing::warn!(id = %bean.id, status = %target, error = %err, "cascade write failed");
                report.failed.push((bean.id.clone(), err.to_string()));
            }
        }
    }

    tracing::info!(
        root = %root_id,
        status = %target,
        updated = report.updated.len(),
        failed = report.failed.len(),
        skipped = report.skipped.len(),
        "status cascade finished"
    );
    report
}
