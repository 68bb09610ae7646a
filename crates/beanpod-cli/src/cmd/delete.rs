//! `bp delete`: remove a bean.

use std::io::Write;

use beanpod_core::BeanStore;
use clap::Args;
use serde::Serialize;

use crate::output::{self, OutputMode};

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Bean id.
    pub id: String,
}

#[derive(Debug, Serialize)]
struct Deleted<'a> {
    ok: bool,
    id: &'a str,
}

pub fn run_delete(args: &DeleteArgs, output: OutputMode, store: &BeanStore) -> anyhow::Result<()> {
    store.delete_bean(&args.id)?;
    let result = Deleted {
        ok: true,
        id: &args.id,
    };
    output::render(output, &result, |r, w| writeln!(w, "Deleted {}", r.id))
}
