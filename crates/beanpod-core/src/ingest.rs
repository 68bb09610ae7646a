//! Normalization of loosely-typed backend records into [`Bean`]s.
//!
//! Backend versions disagree on field spelling (`parentId` vs `parent_id` vs
//! `parent`), may omit optional fields, and occasionally hand back empty
//! strings for required ones. Every logical field owns an alias list of
//! `(key, priority)` pairs; the present, non-blank key with the lowest
//! priority wins. Newer spellings carry lower priorities.
//!
//! A record missing any of `id`, `title`, `status` or `type` (or carrying a
//! value outside the workspace's enumerations) is *malformed*. Malformed
//! records keep everything that did resolve so recovery can fill the gaps.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::config::WorkspaceConfig;
use crate::model::{Bean, BeanType, Priority, Status, short_code};

/// Untyped record as received from the backend (or read from a header).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord(Map<String, Value>);

impl RawRecord {
    #[must_use]
    pub const fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Wrap a JSON value; anything other than an object is rejected.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Logical bean fields addressed through the alias table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Id,
    Slug,
    Path,
    Title,
    Status,
    Type,
    Priority,
    Body,
    Tags,
    Parent,
    Blocking,
    BlockedBy,
    CreatedAt,
    UpdatedAt,
    Etag,
}

/// Candidate keys per field, as `(key, priority)`; lower priority wins.
const FIELD_ALIASES: &[(Field, &[(&str, u8)])] = &[
    (Field::Id, &[("id", 0)]),
    (Field::Slug, &[("slug", 0)]),
    (Field::Path, &[("path", 0), ("file", 1), ("filePath", 2)]),
    (Field::Title, &[("title", 0)]),
    (Field::Status, &[("status", 0)]),
    (Field::Type, &[("type", 0), ("kind", 1)]),
    (Field::Priority, &[("priority", 0)]),
    (Field::Body, &[("body", 0), ("content", 1)]),
    (Field::Tags, &[("tags", 0), ("labels", 1)]),
    (Field::Parent, &[("parentId", 0), ("parent_id", 1), ("parent", 2)]),
    (
        Field::Blocking,
        &[("blockingIds", 0), ("blocking_ids", 1), ("blocking", 2)],
    ),
    (
        Field::BlockedBy,
        &[("blockedByIds", 0), ("blocked_by_ids", 1), ("blockedBy", 2), ("blocked_by", 3)],
    ),
    (Field::CreatedAt, &[("createdAt", 0), ("created_at", 1)]),
    (Field::UpdatedAt, &[("updatedAt", 0), ("updated_at", 1)]),
    (Field::Etag, &[("etag", 0), ("ETag", 1)]),
];

fn aliases(field: Field) -> &'static [(&'static str, u8)] {
    FIELD_ALIASES
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, keys)| *keys)
        .unwrap_or(&[])
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Resolve a logical field: the present, non-blank alias with the lowest priority.
#[must_use]
pub fn resolve(raw: &RawRecord, field: Field) -> Option<&Value> {
    aliases(field)
        .iter()
        .filter_map(|(key, priority)| {
            raw.get(key)
                .filter(|v| !is_blank(v))
                .map(|v| (*priority, v))
        })
        .min_by_key(|(priority, _)| *priority)
        .map(|(_, v)| v)
}

fn resolve_string(raw: &RawRecord, field: Field) -> Option<String> {
    match resolve(raw, field)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Body text keeps its whitespace; only `null` counts as absent.
fn resolve_body(raw: &RawRecord) -> Option<String> {
    aliases(Field::Body)
        .iter()
        .filter_map(|(key, priority)| match raw.get(key) {
            Some(Value::String(s)) => Some((*priority, s.clone())),
            _ => None,
        })
        .min_by_key(|(priority, _)| *priority)
        .map(|(_, s)| s)
}

fn resolve_set(raw: &RawRecord, field: Field) -> BTreeSet<String> {
    match resolve(raw, field) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                // GraphQL-style `{ id: ... }` references.
                Value::Object(obj) => obj
                    .get("id")
                    .and_then(Value::as_str)
                    .map(|s| s.trim().to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect(),
        _ => BTreeSet::new(),
    }
}

fn resolve_parent(raw: &RawRecord) -> Option<String> {
    match resolve(raw, Field::Parent)? {
        Value::Object(obj) => obj
            .get("id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string),
        _ => resolve_string(raw, Field::Parent),
    }
}

fn resolve_enum<T>(raw: &RawRecord, field: Field, allowed: impl Fn(T) -> bool) -> Option<T>
where
    T: FromStr + Copy,
{
    let text = resolve_string(raw, field)?;
    match text.parse::<T>() {
        Ok(value) if allowed(value) => Some(value),
        _ => {
            tracing::debug!(field = ?field, value = %text, "value outside configured enumeration");
            None
        }
    }
}

/// Parse a backend timestamp; unparsable values fall back to "now".
#[must_use]
pub fn parse_timestamp(text: &str) -> DateTime<Utc> {
    let trimmed = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return ts.with_timezone(&Utc);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return naive.and_utc();
    }
    if let Some(midnight) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return midnight.and_utc();
    }
    tracing::debug!(value = %trimmed, "unparsable timestamp, using now");
    Utc::now()
}

fn resolve_timestamp(raw: &RawRecord, field: Field) -> Option<DateTime<Utc>> {
    resolve_string(raw, field).map(|s| parse_timestamp(&s))
}

/// The four fields a bean cannot exist without.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RequiredField {
    Id,
    Title,
    Status,
    Type,
}

impl RequiredField {
    pub const ALL: [Self; 4] = [Self::Id, Self::Title, Self::Status, Self::Type];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Title => "title",
            Self::Status => "status",
            Self::Type => "type",
        }
    }
}

impl fmt::Display for RequiredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every field of a bean, each possibly unresolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BeanFields {
    pub id: Option<String>,
    pub title: Option<String>,
    pub status: Option<Status>,
    pub bean_type: Option<BeanType>,
    pub priority: Option<Priority>,
    pub body: Option<String>,
    pub tags: BTreeSet<String>,
    pub parent: Option<String>,
    pub blocking: BTreeSet<String>,
    pub blocked_by: BTreeSet<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub slug: Option<String>,
    pub path: Option<String>,
    pub etag: Option<String>,
}

impl BeanFields {
    #[must_use]
    pub fn has(&self, field: RequiredField) -> bool {
        match field {
            RequiredField::Id => self.id.is_some(),
            RequiredField::Title => self.title.is_some(),
            RequiredField::Status => self.status.is_some(),
            RequiredField::Type => self.bean_type.is_some(),
        }
    }

    #[must_use]
    pub fn missing_required(&self) -> Vec<RequiredField> {
        RequiredField::ALL
            .into_iter()
            .filter(|f| !self.has(*f))
            .collect()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        RequiredField::ALL.iter().all(|f| self.has(*f))
    }

    /// Copy one required field from `other` if this set lacks it.
    ///
    /// Returns `true` when the field was filled.
    pub fn take_required(&mut self, other: &Self, field: RequiredField) -> bool {
        if self.has(field) || !other.has(field) {
            return false;
        }
        match field {
            RequiredField::Id => self.id.clone_from(&other.id),
            RequiredField::Title => self.title.clone_from(&other.title),
            RequiredField::Status => self.status = other.status,
            RequiredField::Type => self.bean_type = other.bean_type,
        }
        true
    }

    /// Fill every missing required field from `other`; returns the fields filled.
    pub fn fill_required_from(&mut self, other: &Self) -> Vec<RequiredField> {
        RequiredField::ALL
            .into_iter()
            .filter(|f| self.take_required(other, *f))
            .collect()
    }

    /// Build a bean once every required field is present.
    #[must_use]
    pub fn into_bean(self) -> Option<Bean> {
        let id = self.id?;
        let title = self.title?;
        let status = self.status?;
        let bean_type = self.bean_type?;
        let created_at = self.created_at.unwrap_or_else(Utc::now);
        Some(Bean {
            code: short_code(&id),
            id,
            slug: self.slug,
            title,
            status,
            bean_type,
            priority: self.priority,
            body: self.body.unwrap_or_default(),
            tags: self.tags,
            parent: self.parent,
            blocking: self.blocking,
            blocked_by: self.blocked_by,
            created_at,
            updated_at: self.updated_at.unwrap_or(created_at),
            path: self.path,
            etag: self.etag,
        })
    }
}

/// A record that failed validation, with everything that did resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRecord {
    pub fields: BeanFields,
    pub missing: Vec<RequiredField>,
}

/// Outcome of ingesting one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingested {
    Valid(Box<Bean>),
    Malformed(MalformedRecord),
}

/// Resolve every logical field of a record against the alias table.
#[must_use]
pub fn fields_from_raw(raw: &RawRecord, config: &WorkspaceConfig) -> BeanFields {
    BeanFields {
        id: resolve_string(raw, Field::Id),
        title: resolve_string(raw, Field::Title),
        status: resolve_enum::<Status>(raw, Field::Status, |s| config.allows_status(s)),
        bean_type: resolve_enum::<BeanType>(raw, Field::Type, |t| config.allows_type(t)),
        priority: resolve_enum::<Priority>(raw, Field::Priority, |p| config.allows_priority(p)),
        body: resolve_body(raw),
        tags: resolve_set(raw, Field::Tags),
        parent: resolve_parent(raw),
        blocking: resolve_set(raw, Field::Blocking),
        blocked_by: resolve_set(raw, Field::BlockedBy),
        created_at: resolve_timestamp(raw, Field::CreatedAt),
        updated_at: resolve_timestamp(raw, Field::UpdatedAt),
        slug: resolve_string(raw, Field::Slug),
        path: resolve_string(raw, Field::Path),
        etag: resolve_string(raw, Field::Etag),
    }
}

/// Convert one backend record into a bean, or flag it malformed.
#[must_use]
pub fn ingest(raw: &RawRecord, config: &WorkspaceConfig) -> Ingested {
    let fields = fields_from_raw(raw, config);
    let missing = fields.missing_required();
    if missing.is_empty() {
        if let Some(bean) = fields.clone().into_bean() {
            return Ingested::Valid(Box::new(bean));
        }
    }
    Ingested::Malformed(MalformedRecord { fields, missing })
}
