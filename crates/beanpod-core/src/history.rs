//! Version-control history boundary used by field recovery.
//!
//! Recovery only needs two questions answered: which prior revisions touched
//! a file, and what the file looked like at one of them. [`GitHistory`]
//! answers both by shelling out to `git`; [`NoHistory`] stands in when the
//! workspace is not under version control, which degrades recovery to
//! filename inference.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::process::{ProcessError, run_with_timeout};

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("version history unavailable: {0}")]
    Unavailable(String),

    #[error("history command failed: {0}")]
    Command(String),

    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Read-only access to prior revisions of bean files.
pub trait RevisionHistory: Send + Sync {
    /// Revision ids that touched `path`, newest first, at most `limit`.
    ///
    /// `path` is relative to the workspace root.
    fn revisions(&self, path: &Path, limit: usize) -> Result<Vec<String>, HistoryError>;

    /// Content of `path` as of `revision`.
    fn content_at(&self, revision: &str, path: &Path) -> Result<String, HistoryError>;
}

/// History backend for workspaces without version control.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHistory;

impl RevisionHistory for NoHistory {
    fn revisions(&self, _path: &Path, _limit: usize) -> Result<Vec<String>, HistoryError> {
        Err(HistoryError::Unavailable("no version control configured".into()))
    }

    fn content_at(&self, _revision: &str, _path: &Path) -> Result<String, HistoryError> {
        Err(HistoryError::Unavailable("no version control configured".into()))
    }
}

/// `git`-backed history, rooted at the workspace directory.
#[derive(Debug, Clone)]
pub struct GitHistory {
    workspace_root: PathBuf,
    program: String,
    timeout: Duration,
}

fn pathspec(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

impl GitHistory {
    #[must_use]
    pub fn new(workspace_root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            program: "git".to_string(),
            timeout,
        }
    }

    /// Return a `GitHistory` if `workspace_root` is inside a git work tree.
    #[must_use]
    pub fn detect(workspace_root: &Path, timeout: Duration) -> Option<Self> {
        let history = Self::new(workspace_root, timeout);
        match history.git(&["rev-parse", "--is-inside-work-tree"]) {
            Ok(out) if out.trim() == "true" => Some(history),
            Ok(_) => None,
            Err(err) => {
                tracing::debug!(error = %err, "git history not available");
                None
            }
        }
    }

    fn git(&self, args: &[&str]) -> Result<String, HistoryError> {
        let args: Vec<String> = args.iter().map(ToString::to_string).collect();
        let out = run_with_timeout(&self.program, &args, &self.workspace_root, self.timeout)
            .map_err(|err| match err {
                ProcessError::Spawn { source, .. } => HistoryError::Unavailable(source.to_string()),
                other => HistoryError::Process(other),
            })?;

        if !out.success() {
            return Err(HistoryError::Command(out.stderr.trim().to_string()));
        }
        Ok(out.stdout)
    }
}

impl RevisionHistory for GitHistory {
    fn revisions(&self, path: &Path, limit: usize) -> Result<Vec<String>, HistoryError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let limit = limit.to_string();
        let spec = pathspec(path);
        let listed = self.git(&["log", "--format=%H", "-n", &limit, "--follow", "--", &spec])?;
        Ok(listed
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToString::to_string)
            .collect())
    }

    fn content_at(&self, revision: &str, path: &Path) -> Result<String, HistoryError> {
        let object = format!("{revision}:./{}", pathspec(path));
        self.git(&["show", &object])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::process::Command;
    use tempfile::TempDir;

    fn git_installed() -> bool {
        Command::new("git").arg("--version").output().is_ok()
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args([
                "-c",
                "user.name=Bean Tester",
                "-c",
                "user.email=beans@example.com",
                "-c",
                "commit.gpgsign=false",
            ])
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(status.status.success(), "git {args:?} failed");
    }

    #[test]
    fn no_history_is_unavailable() {
        let err = NoHistory
            .revisions(Path::new(".beans/x.md"), 5)
            .unwrap_err();
        assert!(matches!(err, HistoryError::Unavailable(_)));
    }

    #[test]
    fn detect_rejects_plain_directory() {
        if !git_installed() {
            return;
        }
        let dir = TempDir::new().unwrap();
        assert!(GitHistory::detect(dir.path(), Duration::from_secs(5)).is_none());
    }

    #[test]
    fn git_history_lists_newest_first_and_reads_content() {
        if !git_installed() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        git(root, &["init", "-q"]);
        fs::create_dir_all(root.join(".beans")).unwrap();
        let rel = Path::new(".beans/beans-a1--pump.md");

        fs::write(root.join(rel), "---\ntitle: First\n---\n").unwrap();
        git(root, &["add", "."]);
        git(root, &["commit", "-q", "-m", "first"]);

        fs::write(root.join(rel), "---\ntitle: Second\n---\n").unwrap();
        git(root, &["add", "."]);
        git(root, &["commit", "-q", "-m", "second"]);

        let history = GitHistory::detect(root, Duration::from_secs(10)).unwrap();
        let revs = history.revisions(rel, 10).unwrap();
        assert_eq!(revs.len(), 2);
        assert!(history.content_at(&revs[0], rel).unwrap().contains("Second"));
        assert!(history.content_at(&revs[1], rel).unwrap().contains("First"));

        assert_eq!(history.revisions(rel, 1).unwrap().len(), 1);
        assert!(history.revisions(rel, 0).unwrap().is_empty());
    }
}
