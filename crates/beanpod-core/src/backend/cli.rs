//! [`BeanBackend`] that shells out to the `beans` command.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;

use super::{BackendError, BeanBackend, clean_error_message};
use crate::ingest::RawRecord;
use crate::model::{BeanChanges, BeanDraft, ParentChange};
use crate::process::{CommandOutput, ProcessError, run_with_timeout};

/// Runs `beans` subcommands in the workspace directory.
#[derive(Debug, Clone)]
pub struct CliBackend {
    program: String,
    workspace_root: PathBuf,
    timeout: Duration,
}

/// Pull bean records out of `beans ... --json` output.
///
/// Accepts a bare array, an object wrapping the array under `beans`, a
/// single bean object, or an object wrapping one under `bean`.
pub fn parse_records(stdout: &str) -> Result<Vec<RawRecord>, BackendError> {
    let value: Value = serde_json::from_str(stdout.trim())
        .map_err(|e| BackendError::Malformed(format!("invalid JSON: {e}")))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            if let Some(Value::Array(items)) = map.remove("beans") {
                items
            } else if let Some(bean) = map.remove("bean") {
                vec![bean]
            } else {
                vec![Value::Object(map)]
            }
        }
        other => {
            return Err(BackendError::Malformed(format!(
                "expected bean records, got {}",
                json_kind(&other)
            )));
        }
    };

    let total = items.len();
    let records: Vec<RawRecord> = items.into_iter().filter_map(RawRecord::from_value).collect();
    if records.len() < total {
        tracing::warn!(
            skipped = total - records.len(),
            "backend returned non-object entries, ignoring them"
        );
    }
    Ok(records)
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn single(stdout: &str) -> Result<RawRecord, BackendError> {
    parse_records(stdout)?
        .into_iter()
        .next()
        .ok_or_else(|| BackendError::Malformed("backend returned no bean".into()))
}

fn update_args(id: &str, changes: &BeanChanges) -> Vec<String> {
    let mut args = vec!["update".to_string(), id.to_string()];
    let mut flag = |name: &str, value: &str| {
        args.push(format!("--{name}"));
        args.push(value.to_string());
    };
    if let Some(status) = changes.status {
        flag("status", status.as_str());
    }
    if let Some(bean_type) = changes.bean_type {
        flag("type", bean_type.as_str());
    }
    if let Some(priority) = changes.priority {
        flag("priority", priority.as_str());
    }
    if let Some(title) = &changes.title {
        flag("title", title);
    }
    if let Some(ParentChange::Set(parent)) = &changes.parent {
        flag("parent", parent);
    }
    for blocked in &changes.add_blocking {
        flag("blocking", blocked);
    }
    if matches!(changes.parent, Some(ParentChange::Clear)) {
        args.push("--remove-parent".to_string());
    }
    args.push("--json".to_string());
    args
}

fn create_args(draft: &BeanDraft) -> Vec<String> {
    let mut args = vec!["create".to_string(), draft.title.clone()];
    let mut flag = |name: &str, value: &str| {
        args.push(format!("--{name}"));
        args.push(value.to_string());
    };
    if let Some(bean_type) = draft.bean_type {
        flag("type", bean_type.as_str());
    }
    if let Some(status) = draft.status {
        flag("status", status.as_str());
    }
    if let Some(priority) = draft.priority {
        flag("priority", priority.as_str());
    }
    if let Some(parent) = &draft.parent {
        flag("parent", parent);
    }
    if let Some(body) = &draft.body {
        flag("body", body);
    }
    for tag in &draft.tags {
        flag("tag", tag);
    }
    args.push("--json".to_string());
    args
}

impl CliBackend {
    #[must_use]
    pub fn new(program: impl Into<String>, workspace_root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            workspace_root: workspace_root.into(),
            timeout,
        }
    }

    fn run(&self, args: Vec<String>) -> Result<CommandOutput, BackendError> {
        tracing::debug!(program = %self.program, ?args, "running beans backend");
        run_with_timeout(&self.program, &args, &self.workspace_root, self.timeout).map_err(|err| match err {
            ProcessError::Spawn { program, source } => {
                BackendError::Unavailable(format!("{program}: {source}"))
            }
            ProcessError::Timeout { waited, .. } => BackendError::Timeout(waited),
            ProcessError::Io { program, source } => BackendError::Unavailable(format!("{program}: {source}")),
        })
    }

    /// Run a command and classify a non-zero exit. `id` names the bean for
    /// not-found reporting.
    fn run_checked(&self, args: Vec<String>, id: Option<&str>) -> Result<String, BackendError> {
        let out = self.run(args)?;
        if out.success() {
            return Ok(out.stdout);
        }

        let raw = if out.stderr.trim().is_empty() {
            &out.stdout
        } else {
            &out.stderr
        };
        let message = clean_error_message(raw);
        let lowered = message.to_lowercase();
        tracing::debug!(code = out.status.code(), %message, "beans backend failed");

        if lowered.contains("permission denied") {
            return Err(BackendError::Permission(message));
        }
        if let Some(id) = id {
            if lowered.contains("not found") {
                return Err(BackendError::NotFound(id.to_string()));
            }
        }
        Err(BackendError::Failed(message))
    }
}

impl BeanBackend for CliBackend {
    fn query(&self) -> Result<Vec<RawRecord>, BackendError> {
        let stdout = self.run_checked(vec!["list".into(), "--json".into()], None)?;
        if stdout.trim().is_empty() {
            return Ok(Vec::new());
        }
        parse_records(&stdout)
    }

    fn update(&self, id: &str, changes: &BeanChanges) -> Result<RawRecord, BackendError> {
        let stdout = self.run_checked(update_args(id, changes), Some(id))?;
        single(&stdout)
    }

    fn create(&self, draft: &BeanDraft) -> Result<RawRecord, BackendError> {
        let stdout = self.run_checked(create_args(draft), None)?;
        single(&stdout)
    }

    fn delete(&self, id: &str) -> Result<(), BackendError> {
        self.run_checked(
            vec!["delete".into(), id.to_string(), "--force".into()],
            Some(id),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BeanType, Status};

    #[test]
    fn parses_array_and_wrapped_listings() {
        let records = parse_records(r#"[{"id":"a"},{"id":"b"}]"#).unwrap();
        assert_eq!(records.len(), 2);

        let records = parse_records(r#"{"beans":[{"id":"a"}]}"#).unwrap();
        assert_eq!(records.len(), 1);

        let record = single(r#"{"success":true,"bean":{"id":"a","title":"x"}}"#).unwrap();
        assert_eq!(record.get("title"), Some(&Value::String("x".into())));
    }

    #[test]
    fn non_records_are_malformed() {
        assert!(matches!(
            parse_records("not json"),
            Err(BackendError::Malformed(_))
        ));
        assert!(matches!(parse_records("42"), Err(BackendError::Malformed(_))));
    }

    #[test]
    fn update_args_carry_only_changed_fields() {
        let changes = BeanChanges {
            status: Some(Status::Completed),
            parent: Some(ParentChange::Clear),
            ..BeanChanges::default()
        };
        assert_eq!(
            update_args("beans-a1", &changes),
            ["update", "beans-a1", "--status", "completed", "--remove-parent", "--json"]
        );
    }

    #[test]
    fn create_args_include_title_and_type() {
        let draft = BeanDraft {
            title: "Wire the pump".into(),
            bean_type: Some(BeanType::Bug),
            ..BeanDraft::default()
        };
        assert_eq!(
            create_args(&draft),
            ["create", "Wire the pump", "--type", "bug", "--json"]
        );
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        fn script(dir: &TempDir, body: &str) -> String {
            let path = dir.path().join("fake-beans");
            fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path.display().to_string()
        }

        #[test]
        fn query_reads_listing_from_program() {
            let dir = TempDir::new().unwrap();
            let program = script(&dir, r#"echo '[{"id":"beans-a1","title":"One"}]'"#);
            let backend = CliBackend::new(program, dir.path(), Duration::from_secs(5));
            let records = backend.query().unwrap();
            assert_eq!(records.len(), 1);
        }

        #[test]
        fn failure_message_is_cleaned() {
            let dir = TempDir::new().unwrap();
            let program = script(
                &dir,
                "echo 'Error: failed to parse .beans/x.md' >&2\necho 'Usage:' >&2\necho '  beans list' >&2\nexit 1",
            );
            let backend = CliBackend::new(program, dir.path(), Duration::from_secs(5));
            assert_eq!(
                backend.query().unwrap_err(),
                BackendError::Failed("failed to parse .beans/x.md".into())
            );
        }

        #[test]
        fn update_not_found_is_classified() {
            let dir = TempDir::new().unwrap();
            let program = script(&dir, "echo 'Error: bean not found' >&2\nexit 1");
            let backend = CliBackend::new(program, dir.path(), Duration::from_secs(5));
            let err = backend
                .update("beans-zz", &BeanChanges::status(Status::Todo))
                .unwrap_err();
            assert_eq!(err, BackendError::NotFound("beans-zz".into()));
        }

        #[test]
        fn missing_program_is_unavailable() {
            let dir = TempDir::new().unwrap();
            let backend = CliBackend::new("beanpod-no-such-beans", dir.path(), Duration::from_secs(1));
            assert!(matches!(backend.query(), Err(BackendError::Unavailable(_))));
        }

        #[test]
        fn slow_program_times_out() {
            let dir = TempDir::new().unwrap();
            let program = script(&dir, "sleep 5");
            let backend = CliBackend::new(program, dir.path(), Duration::from_millis(100));
            assert!(matches!(backend.query(), Err(BackendError::Timeout(_))));
        }
    }
}
