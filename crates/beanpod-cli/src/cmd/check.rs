//! `bp check`: run one repair pass and report what it touched.

use std::io::Write;

use beanpod_core::model::BeanFilter;
use beanpod_core::{BeanStore, ListingReport};
use serde::Serialize;

use crate::output::{self, OutputMode};

#[derive(Debug, Serialize)]
struct CheckView {
    beans: usize,
    offline: bool,
    retried: bool,
    recovered: Vec<String>,
    persisted: Vec<String>,
    quarantined: Vec<String>,
    orphans_cleared: Vec<String>,
    orphans_failed: Vec<String>,
    quarantine_dir: String,
}

impl CheckView {
    fn new(beans: usize, offline: bool, report: ListingReport, quarantine_dir: String) -> Self {
        Self {
            beans,
            offline,
            retried: report.retried,
            recovered: report.recovered,
            persisted: report.persisted,
            quarantined: report.quarantined,
            orphans_cleared: report.integrity.repaired,
            orphans_failed: report.integrity.failed.into_iter().map(|(id, _)| id).collect(),
            quarantine_dir,
        }
    }

    fn is_clean(&self) -> bool {
        self.recovered.is_empty()
            && self.quarantined.is_empty()
            && self.orphans_cleared.is_empty()
            && self.orphans_failed.is_empty()
    }
}

fn write_human(view: &CheckView, w: &mut dyn Write) -> std::io::Result<()> {
    if view.offline {
        writeln!(w, "Backend unreachable; nothing was checked.")?;
        return Ok(());
    }
    if view.is_clean() {
        return writeln!(w, "{} bean(s), nothing to repair", view.beans);
    }
    writeln!(w, "{} bean(s) after repair", view.beans)?;
    output::rule(w)?;
    let lines: [(&str, &[String]); 5] = [
        ("recovered", view.recovered.as_slice()),
        ("rewritten", view.persisted.as_slice()),
        ("quarantined", view.quarantined.as_slice()),
        ("detached", view.orphans_cleared.as_slice()),
        ("unsaved", view.orphans_failed.as_slice()),
    ];
    for (label, ids) in lines {
        if !ids.is_empty() {
            output::kv(w, label, ids.join(", "))?;
        }
    }
    if !view.quarantined.is_empty() {
        output::kv(w, "quarantine", &view.quarantine_dir)?;
    }
    Ok(())
}

pub fn run_check(output: OutputMode, store: &BeanStore) -> anyhow::Result<()> {
    let beans = store.list_beans(&BeanFilter::default())?;
    let offline = store.is_offline();
    let report = if offline {
        ListingReport::default()
    } else {
        store.last_report()
    };
    let view = CheckView::new(
        beans.len(),
        offline,
        report,
        store.quarantine_dir().display().to_string(),
    );
    output::render(output, &view, write_human)
}
