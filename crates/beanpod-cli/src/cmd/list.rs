//! `bp list`: list beans with filtering.

use std::io::Write;

use beanpod_core::BeanStore;
use beanpod_core::model::{BeanFilter, BeanType, Status};
use clap::Args;

use crate::output::{self, OutputMode};

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Filter by status (repeatable).
    #[arg(short, long)]
    pub status: Vec<Status>,

    /// Filter by type (repeatable).
    #[arg(short = 't', long = "type")]
    pub bean_type: Vec<BeanType>,

    /// Filter by tag.
    #[arg(long)]
    pub tag: Option<String>,

    /// Filter by parent bean id.
    #[arg(long)]
    pub parent: Option<String>,

    /// Case-insensitive text search over id, title and body.
    #[arg(short = 'q', long)]
    pub search: Option<String>,

    /// Maximum beans to show.
    #[arg(short = 'n', long, default_value = "200")]
    pub limit: usize,
}

impl ListArgs {
    pub fn filter(&self) -> BeanFilter {
        BeanFilter {
            statuses: self.status.iter().copied().collect(),
            types: self.bean_type.iter().copied().collect(),
            tag: self.tag.clone(),
            parent: self.parent.clone(),
            search: self.search.clone(),
        }
    }
}

pub fn run_list(args: &ListArgs, output: OutputMode, store: &BeanStore) -> anyhow::Result<()> {
    let mut beans = store.list_beans(&args.filter())?;
    beans.sort_by(|a, b| a.id.cmp(&b.id));
    beans.truncate(args.limit);

    let offline = store.is_offline();
    output::render(output, &beans, |beans, w| {
        if offline {
            writeln!(w, "(backend unreachable, showing last known listing)")?;
        }
        if beans.is_empty() {
            return writeln!(w, "No beans found");
        }
        for bean in beans {
            output::bean_row(w, bean)?;
        }
        Ok(())
    })
}
