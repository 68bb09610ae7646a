//! `bp update`: change a bean, cascading status to descendants.

use std::io::Write;

use beanpod_core::model::{BeanChanges, BeanType, ParentChange, Priority, Status};
use beanpod_core::{BeanStore, UpdatedBean};
use clap::Args;
use serde::Serialize;

use crate::output::{self, OutputMode};

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Bean id.
    pub id: String,

    #[arg(short, long)]
    pub status: Option<Status>,

    #[arg(short = 't', long = "type")]
    pub bean_type: Option<BeanType>,

    #[arg(short, long)]
    pub priority: Option<Priority>,

    #[arg(long)]
    pub title: Option<String>,

    /// Move the bean under another bean.
    #[arg(long, conflicts_with = "remove_parent")]
    pub parent: Option<String>,

    /// Detach the bean from its parent.
    #[arg(long)]
    pub remove_parent: bool,

    /// Mark this bean as blocking another (repeatable).
    #[arg(long)]
    pub blocking: Vec<String>,
}

impl UpdateArgs {
    pub fn changes(&self) -> BeanChanges {
        let parent = if self.remove_parent {
            Some(ParentChange::Clear)
        } else {
            self.parent.clone().map(ParentChange::Set)
        };
        BeanChanges {
            status: self.status,
            bean_type: self.bean_type,
            priority: self.priority,
            title: self.title.clone(),
            parent,
            add_blocking: self.blocking.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct FailedWrite<'a> {
    id: &'a str,
    error: &'a str,
}

#[derive(Debug, Serialize)]
struct CascadeView<'a> {
    updated: &'a [String],
    skipped: &'a [String],
    failed: Vec<FailedWrite<'a>>,
}

#[derive(Debug, Serialize)]
struct UpdateView<'a> {
    bean: &'a beanpod_core::model::Bean,
    #[serde(skip_serializing_if = "Option::is_none")]
    cascade: Option<CascadeView<'a>>,
}

impl<'a> From<&'a UpdatedBean> for UpdateView<'a> {
    fn from(updated: &'a UpdatedBean) -> Self {
        Self {
            bean: &updated.bean,
            cascade: updated.cascade.as_ref().map(|report| CascadeView {
                updated: &report.updated,
                skipped: &report.skipped,
                failed: report
                    .failed
                    .iter()
                    .map(|(id, error)| FailedWrite { id, error })
                    .collect(),
            }),
        }
    }
}

fn write_human(view: &UpdateView<'_>, w: &mut dyn Write) -> std::io::Result<()> {
    writeln!(w, "Updated {}", view.bean.id)?;
    output::bean_row(w, view.bean)?;
    let Some(cascade) = &view.cascade else {
        return Ok(());
    };
    if !cascade.updated.is_empty() {
        writeln!(
            w,
            "Cascaded {} to {} descendant(s): {}",
            view.bean.status,
            cascade.updated.len(),
            cascade.updated.join(", ")
        )?;
    }
    for failed in &cascade.failed {
        writeln!(w, "  could not update {}: {}", failed.id, failed.error)?;
    }
    Ok(())
}

pub fn run_update(args: &UpdateArgs, output: OutputMode, store: &BeanStore) -> anyhow::Result<()> {
    let changes = args.changes();
    if changes.is_empty() {
        anyhow::bail!("nothing to update; pass at least one field to change");
    }
    let updated = store.update_bean(&args.id, &changes)?;
    output::render(output, &UpdateView::from(&updated), write_human)
}
