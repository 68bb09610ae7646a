use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::{fmt, str::FromStr};

/// The five lifecycle states a bean can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Draft,
    Todo,
    InProgress,
    Completed,
    Scrapped,
}

impl Status {
    pub const ALL: [Self; 5] = [
        Self::Draft,
        Self::Todo,
        Self::InProgress,
        Self::Completed,
        Self::Scrapped,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Todo => "todo",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Scrapped => "scrapped",
        }
    }

    /// `completed` and `scrapped` close a bean; everything else is active.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Completed | Self::Scrapped)
    }
}

/// Bean kinds. The allowed subset is configured per workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeanType {
    Milestone,
    Epic,
    Feature,
    Bug,
    Task,
}

impl BeanType {
    pub const ALL: [Self; 5] = [
        Self::Milestone,
        Self::Epic,
        Self::Feature,
        Self::Bug,
        Self::Task,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Milestone => "milestone",
            Self::Epic => "epic",
            Self::Feature => "feature",
            Self::Bug => "bug",
            Self::Task => "task",
        }
    }
}

/// Optional priority marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Normal,
    Low,
    Deferred,
}

impl Priority {
    pub const ALL: [Self; 5] = [
        Self::Critical,
        Self::High,
        Self::Normal,
        Self::Low,
        Self::Deferred,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
            Self::Deferred => "deferred",
        }
    }
}

/// A validated work item.
///
/// Every `Bean` handed out by the store has a non-empty `id` and a status and
/// type drawn from the workspace's configured enumerations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bean {
    pub id: String,
    /// Trailing segment of `id`, used in compact listings and warnings.
    pub code: String,
    pub slug: Option<String>,
    pub title: String,
    pub status: Status,
    #[serde(rename = "type")]
    pub bean_type: BeanType,
    pub priority: Option<Priority>,
    pub body: String,
    pub tags: BTreeSet<String>,
    pub parent: Option<String>,
    pub blocking: BTreeSet<String>,
    pub blocked_by: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// File location relative to the workspace root, as reported by the backend.
    pub path: Option<String>,
    pub etag: Option<String>,
}

impl Bean {
    /// A bean with only its required fields set, stamped now.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>, status: Status, bean_type: BeanType) -> Self {
        let id = id.into();
        let now = Utc::now();
        Self {
            code: short_code(&id),
            id,
            slug: None,
            title: title.into(),
            status,
            bean_type,
            priority: None,
            body: String::new(),
            tags: BTreeSet::new(),
            parent: None,
            blocking: BTreeSet::new(),
            blocked_by: BTreeSet::new(),
            created_at: now,
            updated_at: now,
            path: None,
            etag: None,
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

/// Derive the short code for an id: the segment after its final `-`.
///
/// `beans-a1b2` → `a1b2`; an id with no separator is its own code.
#[must_use]
pub fn short_code(id: &str) -> String {
    id.rsplit('-')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(id)
        .to_string()
}

/// How an update touches the parent link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "op", content = "id")]
pub enum ParentChange {
    Set(String),
    Clear,
}

/// Sparse change set for a single bean update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeanChanges {
    pub status: Option<Status>,
    pub bean_type: Option<BeanType>,
    pub priority: Option<Priority>,
    pub title: Option<String>,
    pub parent: Option<ParentChange>,
    /// Ids to add to the `blocking` set.
    pub add_blocking: Vec<String>,
}

impl BeanChanges {
    #[must_use]
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn clear_parent() -> Self {
        Self {
            parent: Some(ParentChange::Clear),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.bean_type.is_none()
            && self.priority.is_none()
            && self.title.is_none()
            && self.parent.is_none()
            && self.add_blocking.is_empty()
    }

    /// Apply this change set to an in-memory bean.
    pub fn apply_to(&self, bean: &mut Bean) {
        if let Some(status) = self.status {
            bean.status = status;
        }
        if let Some(bean_type) = self.bean_type {
            bean.bean_type = bean_type;
        }
        if let Some(priority) = self.priority {
            bean.priority = Some(priority);
        }
        if let Some(title) = &self.title {
            bean.title.clone_from(title);
        }
        match &self.parent {
            Some(ParentChange::Set(id)) => bean.parent = Some(id.clone()),
            Some(ParentChange::Clear) => bean.parent = None,
            None => {}
        }
        bean.blocking.extend(self.add_blocking.iter().cloned());
    }
}

/// Input for creating a bean.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeanDraft {
    pub title: String,
    pub bean_type: Option<BeanType>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub parent: Option<String>,
    pub body: Option<String>,
    pub tags: Vec<String>,
}

/// Listing filter. Empty sets match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BeanFilter {
    pub statuses: BTreeSet<Status>,
    pub types: BTreeSet<BeanType>,
    pub tag: Option<String>,
    pub parent: Option<String>,
    /// Case-insensitive substring match over id, title and body.
    pub search: Option<String>,
}

impl BeanFilter {
    #[must_use]
    pub fn matches(&self, bean: &Bean) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&bean.status) {
            return false;
        }
        if !self.types.is_empty() && !self.types.contains(&bean.bean_type) {
            return false;
        }
        if let Some(tag) = &self.tag {
            if !bean.tags.contains(tag) {
                return false;
            }
        }
        if let Some(parent) = &self.parent {
            if bean.parent.as_deref() != Some(parent.as_str()) {
                return false;
            }
        }
        if let Some(needle) = &self.search {
            let needle = needle.to_lowercase();
            let hit = bean.id.to_lowercase().contains(&needle)
                || bean.title.to_lowercase().contains(&needle)
                || bean.body.to_lowercase().contains(&needle);
            if !hit {
                return false;
            }
        }
        true
    }
}

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for BeanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize(input: &str) -> String {
    input.trim().to_ascii_lowercase().replace('_', "-")
}

impl FromStr for Status {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        match normalized.as_str() {
            "draft" => Ok(Self::Draft),
            "todo" => Ok(Self::Todo),
            "in-progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "scrapped" => Ok(Self::Scrapped),
            _ => Err(ParseEnumError {
                expected: "status",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for BeanType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        match normalized.as_str() {
            "milestone" => Ok(Self::Milestone),
            "epic" => Ok(Self::Epic),
            "feature" => Ok(Self::Feature),
            "bug" => Ok(Self::Bug),
            "task" => Ok(Self::Task),
            _ => Err(ParseEnumError {
                expected: "type",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        match normalized.as_str() {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "normal" => Ok(Self::Normal),
            "low" => Ok(Self::Low),
            "deferred" => Ok(Self::Deferred),
            _ => Err(ParseEnumError {
                expected: "priority",
                got: s.to_string(),
            }),
        }
    }
}
