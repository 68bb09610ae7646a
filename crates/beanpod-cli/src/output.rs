//! Shared output layer for human/JSON parity across all commands.
//!
//! Results go to stdout. Errors and repair warnings go to stderr so a
//! `--json` listing stays parseable even when the listing had to heal itself.

use std::io::{self, Write};

use beanpod_core::StoreError;
use beanpod_core::model::Bean;
use beanpod_core::notify::{Notification, NotificationAction, NotificationKind};
use serde::Serialize;

/// Shared width for human separators.
pub const RULE_WIDTH: usize = 72;

pub fn rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = RULE_WIDTH)
}

/// Left-aligned key/value line.
pub fn kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<12} {}", format!("{key}:"), value.as_ref())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub const fn from_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Human }
    }

    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Render a serializable value to stdout.
///
/// JSON mode serializes `value`; human mode hands it to `human_fn`.
pub fn render<T: Serialize>(
    mode: OutputMode,
    value: &T,
    human_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Human => human_fn(value, &mut out)?,
    }
    Ok(())
}

/// One-line summary of a bean: code, status, type, title.
pub fn bean_row(w: &mut dyn Write, bean: &Bean) -> io::Result<()> {
    let parent = bean
        .parent
        .as_deref()
        .map(|p| format!("  (under {p})"))
        .unwrap_or_default();
    writeln!(
        w,
        "{:<8} {:<12} {:<10} {}{parent}",
        bean.code,
        bean.status.as_str(),
        bean.bean_type.as_str(),
        bean.title
    )
}

pub fn bean_detail(w: &mut dyn Write, bean: &Bean) -> io::Result<()> {
    writeln!(w, "{}", bean.title)?;
    rule(w)?;
    kv(w, "id", &bean.id)?;
    kv(w, "status", bean.status.as_str())?;
    kv(w, "type", bean.bean_type.as_str())?;
    if let Some(priority) = bean.priority {
        kv(w, "priority", priority.as_str())?;
    }
    if let Some(parent) = &bean.parent {
        kv(w, "parent", parent)?;
    }
    if let Some(path) = &bean.path {
        kv(w, "path", path)?;
    }
    Ok(())
}

/// A structured error with optional hint and error code.
#[derive(Debug, Serialize)]
pub struct CliError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl From<&StoreError> for CliError {
    fn from(err: &StoreError) -> Self {
        Self {
            message: err.to_string(),
            suggestion: err.hint().map(ToString::to_string),
            error_code: Some(err.code().code().to_string()),
        }
    }
}

impl From<&anyhow::Error> for CliError {
    fn from(err: &anyhow::Error) -> Self {
        if let Some(store) = err.downcast_ref::<StoreError>() {
            return store.into();
        }
        Self {
            message: format!("{err:#}"),
            suggestion: None,
            error_code: None,
        }
    }
}

/// Render an error to stderr.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, &serde_json::json!({ "error": error }))?;
            writeln!(out)?;
        }
        OutputMode::Human => {
            match &error.error_code {
                Some(code) => writeln!(out, "error[{code}]: {}", error.message)?,
                None => writeln!(out, "error: {}", error.message)?,
            }
            if let Some(suggestion) = &error.suggestion {
                writeln!(out, "  suggestion: {suggestion}")?;
            }
        }
    }
    Ok(())
}

const fn kind_label(kind: &NotificationKind) -> &'static str {
    match kind {
        NotificationKind::Quarantined => "quarantined",
        NotificationKind::OrphansRepaired => "orphans_repaired",
    }
}

fn write_notifications(
    w: &mut dyn Write,
    mode: OutputMode,
    notes: &[Notification],
) -> anyhow::Result<()> {
    for note in notes {
        let reveal = note.action.as_ref().map(|action| match action {
            NotificationAction::RevealQuarantine(dir) => dir.display().to_string(),
        });
        match mode {
            OutputMode::Json => {
                let line = serde_json::json!({
                    "warning": {
                        "kind": kind_label(&note.kind),
                        "message": note.message,
                        "quarantine_dir": reveal,
                    }
                });
                serde_json::to_writer(&mut *w, &line)?;
                writeln!(w)?;
            }
            OutputMode::Human => {
                writeln!(w, "warning: {}", note.message)?;
                if let Some(dir) = reveal {
                    writeln!(w, "  quarantine: {dir}")?;
                }
            }
        }
    }
    Ok(())
}

/// Surface repair warnings collected during the command on stderr.
pub fn render_notifications(mode: OutputMode, notes: &[Notification]) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    write_notifications(&mut out, mode, notes)
}
