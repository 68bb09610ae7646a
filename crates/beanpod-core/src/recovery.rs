//! Field recovery for malformed bean records.
//!
//! A record missing any of `id`, `title`, `status` or `type` is run through
//! an ordered set of fallbacks until every required field is known:
//!
//! 1. the file's own header, re-read directly;
//! 2. the newest prior revision that has every required field;
//! 3. a per-field merge across prior revisions, newest first;
//! 4. inference from the filename plus workspace defaults.
//!
//! Fields the record already carries are never overwritten. A recovered
//! bean's header is written back to its file with the body untouched, so the
//! next listing ingests it cleanly and recovery does no further work.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::WorkspaceConfig;
use crate::frontmatter::{self, HeaderPatch};
use crate::history::RevisionHistory;
use crate::ingest::{BeanFields, MalformedRecord, RequiredField};
use crate::model::Bean;
use crate::paths::{BeansRoot, PathError};

/// Separator between the id and the slug in a bean filename.
pub const ID_SLUG_DELIMITER: &str = "--";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Where a recovered field came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecoverySource {
    CurrentFile,
    /// A single prior revision had every required field.
    History,
    /// Fields were merged from several prior revisions.
    PartialHistory,
    Filename,
}

/// The bean's file as far as recovery could establish it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileLocation {
    /// No path or slug to go on.
    Unknown,
    /// Resolved under the beans root. The file may not exist.
    Inside(PathBuf),
    /// The reported path escapes the beans root and must not be touched.
    Outside(String),
}

impl FileLocation {
    fn existing(&self) -> Option<&Path> {
        match self {
            Self::Inside(path) if path.is_file() => Some(path),
            _ => None,
        }
    }

    fn name_stem(&self) -> Option<String> {
        let path = match self {
            Self::Inside(path) => path.clone(),
            Self::Outside(reported) => PathBuf::from(reported.replace('\\', "/")),
            Self::Unknown => return None,
        };
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovered {
    pub bean: Bean,
    pub location: FileLocation,
    /// Each strategy that contributed at least one field, in order.
    pub sources: Vec<RecoverySource>,
    /// Required fields the record arrived without.
    pub filled: Vec<RequiredField>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    Recovered(Box<Recovered>),
    Unrecoverable {
        fields: BeanFields,
        location: FileLocation,
        missing: Vec<RequiredField>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("recovery persist I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("cannot render repaired header: {0}")]
    Render(#[from] serde_yaml::Error),

    #[error("refusing to write repaired bean: {0}")]
    Path(#[from] PathError),

    #[error("recovered bean has no file on disk")]
    NoFile,
}

// ---------------------------------------------------------------------------
// Filename inference
// ---------------------------------------------------------------------------

/// Turn a slug into a readable title: `wire-the-pump` → `Wire the pump`.
#[must_use]
pub fn title_from_slug(slug: &str) -> Option<String> {
    let words: Vec<&str> = slug
        .split(['-', '_', ' '])
        .filter(|w| !w.is_empty())
        .collect();
    let joined = words.join(" ");
    let mut chars = joined.chars();
    let first = chars.next()?;
    Some(first.to_uppercase().chain(chars).collect())
}

/// Id and slug encoded in a filename stem, if it carries the delimiter.
#[must_use]
pub fn split_stem(stem: &str) -> (Option<&str>, &str) {
    match stem.split_once(ID_SLUG_DELIMITER) {
        Some((id, slug)) if !id.trim().is_empty() => (Some(id.trim()), slug),
        Some((_, slug)) => (None, slug),
        None => (None, stem),
    }
}

/// Deterministic id for a bean whose filename carries none.
#[must_use]
pub fn synthesize_id(prefix: &str, seed: &str, length: usize) -> String {
    let hash = blake3::hash(seed.as_bytes());
    let hex = hash.to_hex();
    let length = length.clamp(1, hex.len());
    format!("{prefix}{}", &hex.as_str()[..length])
}

fn infer_from_name(stem: Option<&str>, slug: Option<&str>, config: &WorkspaceConfig) -> BeanFields {
    let mut inferred = BeanFields {
        status: Some(config.default_status),
        bean_type: Some(config.default_type),
        ..BeanFields::default()
    };

    let (id, name_slug) = match stem {
        Some(stem) => {
            let (id, rest) = split_stem(stem);
            (id.map(ToString::to_string), Some(rest.to_string()))
        }
        None => (None, slug.map(ToString::to_string)),
    };
    let Some(name_slug) = name_slug.filter(|s| !s.trim().is_empty()) else {
        return inferred;
    };

    inferred.id = Some(id.unwrap_or_else(|| {
        synthesize_id(&config.prefix, stem.unwrap_or(&name_slug), config.id_length)
    }));
    inferred.title = title_from_slug(&name_slug);
    inferred.slug = Some(name_slug);
    inferred
}

fn fill_optional(fields: &mut BeanFields, other: &BeanFields) {
    if fields.priority.is_none() {
        fields.priority = other.priority;
    }
    if fields.parent.is_none() {
        fields.parent.clone_from(&other.parent);
    }
    if fields.tags.is_empty() {
        fields.tags.clone_from(&other.tags);
    }
    if fields.slug.is_none() {
        fields.slug.clone_from(&other.slug);
    }
    if fields.body.as_deref().is_none_or(str::is_empty) {
        if let Some(body) = other.body.as_ref().filter(|b| !b.is_empty()) {
            fields.body = Some(body.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct FieldRecoveryEngine {
    root: BeansRoot,
    config: WorkspaceConfig,
    history: Arc<dyn RevisionHistory>,
    history_depth: usize,
}

impl FieldRecoveryEngine {
    #[must_use]
    pub fn new(
        root: BeansRoot,
        config: WorkspaceConfig,
        history: Arc<dyn RevisionHistory>,
        history_depth: usize,
    ) -> Self {
        Self {
            root,
            config,
            history,
            history_depth,
        }
    }

    /// Find the record's file from its path, or from its slug or id.
    #[must_use]
    pub fn locate(&self, fields: &BeanFields) -> FileLocation {
        if let Some(reported) = fields.path.as_deref().filter(|p| !p.trim().is_empty()) {
            return match self.root.resolve(reported) {
                Ok(path) => FileLocation::Inside(path),
                Err(err) => {
                    tracing::warn!(path = %reported, error = %err, "record path rejected");
                    FileLocation::Outside(reported.to_string())
                }
            };
        }

        let Ok(entries) = fs::read_dir(self.root.beans()) else {
            return FileLocation::Unknown;
        };
        let slug_suffix = fields
            .slug
            .as_deref()
            .map(|s| format!("{ID_SLUG_DELIMITER}{s}.md"));
        let id_prefix = fields.id.as_deref().map(|id| format!("{id}{ID_SLUG_DELIMITER}"));

        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| {
                slug_suffix.as_deref().is_some_and(|s| name.ends_with(s))
                    || id_prefix.as_deref().is_some_and(|p| name.starts_with(p))
            })
            .collect();
        names.sort();
        names
            .into_iter()
            .next()
            .map_or(FileLocation::Unknown, |name| {
                FileLocation::Inside(self.root.beans().join(name))
            })
    }

    fn history_snapshots(&self, file: &Path) -> Vec<BeanFields> {
        let Some(relative) = self.root.workspace_relative(file) else {
            return Vec::new();
        };
        let revisions = match self.history.revisions(&relative, self.history_depth) {
            Ok(revisions) => revisions,
            Err(err) => {
                tracing::debug!(path = %relative.display(), error = %err, "no history for bean file");
                return Vec::new();
            }
        };

        revisions
            .iter()
            .take(self.history_depth)
            .filter_map(|rev| match self.history.content_at(rev, &relative) {
                Ok(content) => Some(frontmatter::parse_fields(&content, &self.config)),
                Err(err) => {
                    tracing::debug!(revision = %rev, error = %err, "skipping unreadable revision");
                    None
                }
            })
            .collect()
    }

    /// Run every strategy in order until the record is complete.
    ///
    /// # Algorithm
    ///
    /// 1. Re-read the current file header.
    /// 2. Walk prior revisions newest first; the first complete one fills
    ///    every missing field.
    /// 3. Otherwise, fill each missing field from the first revision that
    ///    has it.
    /// 4. Infer anything still missing from the filename and defaults.
    #[must_use]
    pub fn recover(&self, record: MalformedRecord) -> RecoveryOutcome {
        let mut fields = record.fields;
        let location = self.locate(&fields);
        let mut sources = Vec::new();
        let mut filled = Vec::new();

        if let Some(file) = location.existing() {
            match fs::read_to_string(file) {
                Ok(content) => {
                    let current = frontmatter::parse_fields(&content, &self.config);
                    let got = fields.fill_required_from(&current);
                    fill_optional(&mut fields, &current);
                    if !got.is_empty() {
                        sources.push(RecoverySource::CurrentFile);
                        filled.extend(got);
                    }
                }
                Err(err) => {
                    tracing::debug!(path = %file.display(), error = %err, "cannot re-read bean file");
                }
            }
        }

        if !fields.is_complete() {
            if let FileLocation::Inside(file) = &location {
                let snapshots = self.history_snapshots(file);
                if let Some(complete) = snapshots.iter().find(|s| s.is_complete()) {
                    filled.extend(fields.fill_required_from(complete));
                    fill_optional(&mut fields, complete);
                    sources.push(RecoverySource::History);
                } else {
                    let mut merged = false;
                    for snapshot in &snapshots {
                        let got = fields.fill_required_from(snapshot);
                        merged |= !got.is_empty();
                        filled.extend(got);
                    }
                    if merged {
                        sources.push(RecoverySource::PartialHistory);
                    }
                }
            }
        }

        if !fields.is_complete() {
            let stem = location.name_stem();
            let inferred = infer_from_name(stem.as_deref(), fields.slug.as_deref(), &self.config);
            let got = fields.fill_required_from(&inferred);
            if fields.slug.is_none() {
                fields.slug = inferred.slug;
            }
            if !got.is_empty() {
                sources.push(RecoverySource::Filename);
                filled.extend(got);
            }
        }

        let missing = fields.missing_required();
        if !missing.is_empty() {
            tracing::debug!(?missing, "bean record is unrecoverable");
            return RecoveryOutcome::Unrecoverable {
                fields,
                location,
                missing,
            };
        }

        if fields.path.is_none() {
            if let FileLocation::Inside(file) = &location {
                fields.path = self
                    .root
                    .workspace_relative(file)
                    .map(|p| p.to_string_lossy().replace('\\', "/"));
            }
        }

        match fields.clone().into_bean() {
            Some(bean) => {
                tracing::info!(id = %bean.id, ?sources, ?filled, "recovered malformed bean");
                RecoveryOutcome::Recovered(Box::new(Recovered {
                    bean,
                    location,
                    sources,
                    filled,
                }))
            }
            None => RecoveryOutcome::Unrecoverable {
                missing: fields.missing_required(),
                fields,
                location,
            },
        }
    }

    /// Write the recovered header back to the bean's file.
    ///
    /// Returns `Ok(true)` when the file changed and `Ok(false)` when the
    /// rendered file is identical to the one on disk. A bean with no file
    /// cannot be kept, so that is an error.
    pub fn persist(&self, recovered: &Recovered) -> Result<bool, PersistError> {
        let file = match &recovered.location {
            FileLocation::Unknown => return Err(PersistError::NoFile),
            FileLocation::Outside(reported) => {
                return Err(PathError::OutsideRoot(reported.clone()).into());
            }
            FileLocation::Inside(file) => file,
        };
        if !file.is_file() {
            tracing::debug!(path = %file.display(), "recovered bean has no file on disk");
            return Err(PersistError::NoFile);
        }

        let bean = &recovered.bean;
        let named_id = recovered
            .location
            .name_stem()
            .and_then(|stem| split_stem(&stem).0.map(ToString::to_string));
        let patch = HeaderPatch {
            id: (named_id.as_deref() != Some(bean.id.as_str())).then(|| bean.id.clone()),
            title: bean.title.clone(),
            status: bean.status.as_str().to_string(),
            bean_type: bean.bean_type.as_str().to_string(),
        };

        let content = fs::read_to_string(file)?;
        let rendered = frontmatter::render_patched(&content, &patch)?;
        if rendered == content {
            return Ok(false);
        }
        fs::write(file, rendered)?;
        tracing::info!(id = %bean.id, path = %file.display(), "wrote repaired bean header");
        Ok(true)
    }
}

/// Quote a bean file's `title:` line if its value would be misparsed.
///
/// Returns `Ok(true)` when the file was rewritten.
pub fn ensure_quoted_title(path: &Path) -> io::Result<bool> {
    let content = fs::read_to_string(path)?;
    let Some(quoted) = frontmatter::quote_title_line(&content) else {
        return Ok(false);
    };
    fs::write(path, quoted)?;
    tracing::debug!(path = %path.display(), "quoted bean title");
    Ok(true)
}
