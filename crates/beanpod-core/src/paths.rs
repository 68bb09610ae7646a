//! Confinement of backend-reported paths to the beans root.
//!
//! Record paths and error messages come from outside the engine. Nothing is
//! read, rewritten or moved until the path has been resolved here.

use std::io;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("'{0}' resolves outside the beans root")]
    OutsideRoot(String),

    #[error("cannot resolve '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Resolve `.` and `..` without touching the filesystem.
///
/// Returns `None` when `..` would climb above the path's root.
#[must_use]
pub fn normalize_lexically(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    let mut depth = 0usize;
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component),
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                out.pop();
                depth -= 1;
            }
            Component::Normal(part) => {
                out.push(part);
                depth += 1;
            }
        }
    }
    Some(out)
}

/// A workspace directory and the beans directory inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeansRoot {
    workspace: PathBuf,
    beans: PathBuf,
}

/// Absolute form of `path` with `.` and `..` resolved lexically.
fn absolute_lexically(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    normalize_lexically(&absolute).unwrap_or(absolute)
}

impl BeansRoot {
    /// Anchor both roots to their canonical locations.
    ///
    /// Roots that do not exist yet are made absolute lexically; a beans
    /// directory under the workspace stays under the canonical workspace.
    #[must_use]
    pub fn new(workspace: &Path, beans: &Path) -> Self {
        let lexical_workspace = absolute_lexically(workspace);
        let real_workspace = workspace
            .canonicalize()
            .unwrap_or_else(|_| lexical_workspace.clone());
        let real_beans = beans.canonicalize().unwrap_or_else(|_| {
            let lexical = absolute_lexically(beans);
            lexical
                .strip_prefix(&lexical_workspace)
                .map_or_else(|_| lexical.clone(), |rest| real_workspace.join(rest))
        });
        Self {
            workspace: real_workspace,
            beans: real_beans,
        }
    }

    #[must_use]
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    #[must_use]
    pub fn beans(&self) -> &Path {
        &self.beans
    }

    /// `path` relative to the workspace root, for history lookups.
    #[must_use]
    pub fn workspace_relative(&self, path: &Path) -> Option<PathBuf> {
        path.strip_prefix(&self.workspace).ok().map(Path::to_path_buf)
    }

    /// Resolve a reported path to an absolute path under the beans root.
    ///
    /// Relative paths are tried against the workspace root first, then the
    /// beans root. Paths containing `..` are only taken workspace-relative.
    /// Either separator is accepted. The file need not exist, but when it
    /// does its canonical location must also be inside the root.
    pub fn resolve(&self, reported: &str) -> Result<PathBuf, PathError> {
        let unified = reported.trim().replace('\\', "/");
        let raw = Path::new(&unified);

        let climbs = raw.components().any(|c| matches!(c, Component::ParentDir));
        let candidates: Vec<PathBuf> = if raw.is_absolute() {
            vec![raw.to_path_buf()]
        } else if climbs {
            vec![self.workspace.join(raw)]
        } else {
            vec![self.workspace.join(raw), self.beans.join(raw)]
        };

        // An absolute path may reach the root through a symlink.
        let inside: Vec<PathBuf> = candidates
            .iter()
            .filter_map(|c| normalize_lexically(c))
            .map(|c| {
                if c.starts_with(&self.beans) {
                    c
                } else {
                    c.canonicalize().unwrap_or(c)
                }
            })
            .filter(|c| c.starts_with(&self.beans) && c != &self.beans)
            .collect();

        let Some(target) = inside
            .iter()
            .find(|c| c.exists())
            .or_else(|| inside.first())
            .cloned()
        else {
            tracing::warn!(path = %reported, "path escapes the beans root");
            return Err(PathError::OutsideRoot(reported.to_string()));
        };

        // Symlinks can still point elsewhere once the file exists.
        if target.exists() {
            let io_err = |source| PathError::Io {
                path: reported.to_string(),
                source,
            };
            let real = target.canonicalize().map_err(io_err)?;
            let real_root = self.beans.canonicalize().map_err(io_err)?;
            if !real.starts_with(&real_root) {
                tracing::warn!(path = %reported, real = %real.display(), "path links outside the beans root");
                return Err(PathError::OutsideRoot(reported.to_string()));
            }
        }

        Ok(target)
    }
}
