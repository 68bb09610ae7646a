//! `bp create`: create a new bean.

use std::io::Write;

use beanpod_core::BeanStore;
use beanpod_core::model::{BeanDraft, BeanType, Priority, Status};
use clap::Args;

use crate::output::{self, OutputMode};

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Title of the new bean.
    pub title: String,

    #[arg(short = 't', long = "type")]
    pub bean_type: Option<BeanType>,

    #[arg(short, long)]
    pub status: Option<Status>,

    #[arg(short, long)]
    pub priority: Option<Priority>,

    /// Parent bean id.
    #[arg(long)]
    pub parent: Option<String>,

    /// Body text.
    #[arg(short, long)]
    pub body: Option<String>,

    /// Tags to attach (repeatable).
    #[arg(long)]
    pub tag: Vec<String>,
}

impl CreateArgs {
    pub fn draft(&self) -> BeanDraft {
        BeanDraft {
            title: self.title.clone(),
            bean_type: self.bean_type,
            status: self.status,
            priority: self.priority,
            parent: self.parent.clone(),
            body: self.body.clone(),
            tags: self.tag.clone(),
        }
    }
}

pub fn run_create(args: &CreateArgs, output: OutputMode, store: &BeanStore) -> anyhow::Result<()> {
    let bean = store.create_bean(&args.draft())?;
    output::render(output, &bean, |bean, w| {
        writeln!(w, "Created {}", bean.id)?;
        output::bean_detail(w, bean)
    })
}
