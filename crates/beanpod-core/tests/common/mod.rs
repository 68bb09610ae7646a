//! Shared fixtures for beanpod-core integration tests.
//!
//! [`DirBackend`] behaves like the `beans` CLI over a real `.beans`
//! directory: ids come from the header or the filename, writes re-render the
//! header with unquoted values, and a file containing [`FATAL_MARKER`] makes
//! the whole listing fail with an error naming that file.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use beanpod_core::backend::{BackendError, BeanBackend};
use beanpod_core::config::{EngineConfig, WorkspaceConfig};
use beanpod_core::frontmatter;
use beanpod_core::history::{HistoryError, RevisionHistory};
use beanpod_core::ingest::RawRecord;
use beanpod_core::model::{Bean, BeanChanges, BeanDraft, ParentChange};
use beanpod_core::notify::CollectingNotifier;
use beanpod_core::recovery::split_stem;
use beanpod_core::store::BeanStore;
use serde_json::{Map, Value, json};
use tempfile::TempDir;

pub const FATAL_MARKER: &str = "<<fatal>>";

const KEY_ORDER: [&str; 10] = [
    "id",
    "title",
    "status",
    "type",
    "priority",
    "parent",
    "blocking",
    "tags",
    "created_at",
    "updated_at",
];

#[derive(Default)]
struct State {
    query_calls: usize,
    writes: Vec<(String, BeanChanges)>,
    query_errors: VecDeque<BackendError>,
    reject_updates: HashSet<String>,
    extra_records: Vec<RawRecord>,
    query_delay: Duration,
    created: usize,
}

pub struct DirBackend {
    workspace: PathBuf,
    beans_dir: PathBuf,
    state: Mutex<State>,
}

struct Loaded {
    file: PathBuf,
    header: Map<String, Value>,
    body: String,
    record: RawRecord,
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(scalar).collect();
            format!("[{}]", parts.join(", "))
        }
        other => other.to_string(),
    }
}

/// Render a header the way a naive writer would: no quoting at all.
fn render(header: &Map<String, Value>, body: &str) -> String {
    let mut out = String::from("---\n");
    for key in KEY_ORDER {
        if let Some(value) = header.get(key) {
            out.push_str(&format!("{key}: {}\n", scalar(value)));
        }
    }
    for (key, value) in header {
        if !KEY_ORDER.contains(&key.as_str()) {
            out.push_str(&format!("{key}: {}\n", scalar(value)));
        }
    }
    out.push_str("---\n");
    out.push_str(body);
    out
}

impl DirBackend {
    pub fn new(workspace: &Path) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
            beans_dir: workspace.join(".beans"),
            state: Mutex::new(State::default()),
        }
    }

    pub fn query_calls(&self) -> usize {
        self.state.lock().unwrap().query_calls
    }

    pub fn writes(&self) -> Vec<(String, BeanChanges)> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.state.lock().unwrap().writes.len()
    }

    pub fn fail_next_query(&self, err: BackendError) {
        self.state.lock().unwrap().query_errors.push_back(err);
    }

    pub fn reject_updates_for(&self, id: &str) {
        self.state.lock().unwrap().reject_updates.insert(id.to_string());
    }

    pub fn add_raw_record(&self, value: Value) {
        let record = RawRecord::from_value(value).expect("object record");
        self.state.lock().unwrap().extra_records.push(record);
    }

    pub fn set_query_delay(&self, delay: Duration) {
        self.state.lock().unwrap().query_delay = delay;
    }

    fn bean_files(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.beans_dir) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == "md"))
            .collect();
        files.sort();
        files
    }

    fn relative(&self, file: &Path) -> String {
        file.strip_prefix(&self.workspace)
            .unwrap_or(file)
            .to_string_lossy()
            .replace('\\', "/")
    }

    fn load(&self, file: &Path) -> Loaded {
        let content = fs::read_to_string(file).unwrap_or_default();
        let (header, body) = match frontmatter::split(&content) {
            Some(parts) => (
                frontmatter::header_record(parts.header).as_map().clone(),
                parts.body.to_string(),
            ),
            None => (Map::new(), content.clone()),
        };

        let mut record = RawRecord::new(header.clone());
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (named_id, slug) = split_stem(&stem);
        if header.get("id").is_none() {
            if let Some(id) = named_id {
                record.insert("id", json!(id));
            }
        }
        record.insert("slug", json!(slug));
        record.insert("path", json!(self.relative(file)));
        record.insert("body", json!(body));

        Loaded {
            file: file.to_path_buf(),
            header,
            body,
            record,
        }
    }

    fn find(&self, id: &str) -> Option<Loaded> {
        self.bean_files()
            .iter()
            .map(|f| self.load(f))
            .find(|l| l.record.get("id").and_then(Value::as_str) == Some(id))
    }
}

impl BeanBackend for DirBackend {
    fn query(&self) -> Result<Vec<RawRecord>, BackendError> {
        let (delay, queued, extra) = {
            let mut state = self.state.lock().unwrap();
            state.query_calls += 1;
            (
                state.query_delay,
                state.query_errors.pop_front(),
                state.extra_records.clone(),
            )
        };
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        if let Some(err) = queued {
            return Err(err);
        }

        let mut records = Vec::new();
        for file in self.bean_files() {
            let content = fs::read_to_string(&file).unwrap_or_default();
            if content.contains(FATAL_MARKER) {
                return Err(BackendError::Failed(format!(
                    "failed to parse bean {}: yaml: line 2: could not find expected ':'",
                    self.relative(&file)
                )));
            }
            records.push(self.load(&file).record);
        }
        records.extend(extra);
        Ok(records)
    }

    fn update(&self, id: &str, changes: &BeanChanges) -> Result<RawRecord, BackendError> {
        if self.state.lock().unwrap().reject_updates.contains(id) {
            return Err(BackendError::Failed(format!("cannot write bean {id}: read-only")));
        }
        let Some(mut loaded) = self.find(id) else {
            return Err(BackendError::NotFound(id.to_string()));
        };

        let header = &mut loaded.header;
        if let Some(status) = changes.status {
            header.insert("status".into(), json!(status.as_str()));
        }
        if let Some(kind) = changes.bean_type {
            header.insert("type".into(), json!(kind.as_str()));
        }
        if let Some(priority) = changes.priority {
            header.insert("priority".into(), json!(priority.as_str()));
        }
        if let Some(title) = &changes.title {
            header.insert("title".into(), json!(title));
        }
        match &changes.parent {
            Some(ParentChange::Set(parent)) => {
                header.insert("parent".into(), json!(parent));
            }
            Some(ParentChange::Clear) => {
                header.remove("parent");
            }
            None => {}
        }
        if !changes.add_blocking.is_empty() {
            let mut blocking: Vec<Value> = header
                .get("blocking")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            blocking.extend(changes.add_blocking.iter().map(|b| json!(b)));
            header.insert("blocking".into(), Value::Array(blocking));
        }

        fs::write(&loaded.file, render(&loaded.header, &loaded.body)).unwrap();
        self.state
            .lock()
            .unwrap()
            .writes
            .push((id.to_string(), changes.clone()));
        Ok(self.load(&loaded.file).record)
    }

    fn create(&self, draft: &BeanDraft) -> Result<RawRecord, BackendError> {
        let seq = {
            let mut state = self.state.lock().unwrap();
            state.created += 1;
            state.created
        };
        let id = format!("beans-n{seq:03}");
        let slug: String = draft
            .title
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        let file = self.beans_dir.join(format!("{id}--{}.md", slug.trim_matches('-')));

        let mut header = Map::new();
        header.insert("title".into(), json!(draft.title));
        header.insert(
            "status".into(),
            json!(draft.status.map_or("todo", |s| s.as_str())),
        );
        header.insert(
            "type".into(),
            json!(draft.bean_type.map_or("task", |t| t.as_str())),
        );
        if let Some(parent) = &draft.parent {
            header.insert("parent".into(), json!(parent));
        }
        fs::create_dir_all(&self.beans_dir).unwrap();
        fs::write(&file, render(&header, draft.body.as_deref().unwrap_or(""))).unwrap();
        Ok(self.load(&file).record)
    }

    fn delete(&self, id: &str) -> Result<(), BackendError> {
        let loaded = self
            .find(id)
            .ok_or_else(|| BackendError::NotFound(id.to_string()))?;
        fs::remove_file(loaded.file).unwrap();
        Ok(())
    }
}

/// History keyed by workspace-relative path; contents newest first.
#[derive(Default)]
pub struct MapHistory {
    revisions: Mutex<HashMap<PathBuf, Vec<String>>>,
}

impl MapHistory {
    pub fn add(&self, path: &str, newest_first: &[&str]) {
        self.revisions.lock().unwrap().insert(
            PathBuf::from(path),
            newest_first.iter().map(ToString::to_string).collect(),
        );
    }
}

impl RevisionHistory for MapHistory {
    fn revisions(&self, path: &Path, limit: usize) -> Result<Vec<String>, HistoryError> {
        let revisions = self.revisions.lock().unwrap();
        let count = revisions.get(path).map_or(0, Vec::len).min(limit);
        Ok((0..count).map(|i| format!("rev-{i}")).collect())
    }

    fn content_at(&self, revision: &str, path: &Path) -> Result<String, HistoryError> {
        let index: usize = revision
            .strip_prefix("rev-")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| HistoryError::Command(format!("bad revision {revision}")))?;
        self.revisions
            .lock()
            .unwrap()
            .get(path)
            .and_then(|revs| revs.get(index).cloned())
            .ok_or_else(|| HistoryError::Command(format!("{revision} not found")))
    }
}

pub struct Workspace {
    pub dir: TempDir,
    pub backend: Arc<DirBackend>,
    pub history: Arc<MapHistory>,
    pub notifier: Arc<CollectingNotifier>,
    pub store: BeanStore,
}

impl Workspace {
    pub fn new() -> Self {
        Self::with_config(WorkspaceConfig::default())
    }

    pub fn with_config(config: WorkspaceConfig) -> Self {
        let dir = TempDir::new().unwrap();
        Self::in_dir(dir, Path::new(""), config)
    }

    /// Workspace rooted at `dir/sub`, leaving `dir` free for files that
    /// must stay outside the workspace.
    pub fn in_dir(dir: TempDir, sub: &Path, config: WorkspaceConfig) -> Self {
        let root = if sub.as_os_str().is_empty() {
            dir.path().to_path_buf()
        } else {
            dir.path().join(sub)
        };
        fs::create_dir_all(root.join(".beans")).unwrap();
        let backend = Arc::new(DirBackend::new(&root));
        let history = Arc::new(MapHistory::default());
        let notifier = Arc::new(CollectingNotifier::new());
        let store = BeanStore::new(
            &root,
            config,
            &EngineConfig::default(),
            backend.clone(),
            history.clone(),
            notifier.clone(),
        );
        Self {
            dir,
            backend,
            history,
            notifier,
            store,
        }
    }

    pub fn root(&self) -> &Path {
        self.store.workspace_root()
    }

    pub fn bean_path(&self, name: &str) -> PathBuf {
        self.root().join(".beans").join(name)
    }

    pub fn write_bean(&self, name: &str, content: &str) -> PathBuf {
        let path = self.bean_path(name);
        fs::write(&path, content).unwrap();
        path
    }

    pub fn read_bean(&self, name: &str) -> String {
        fs::read_to_string(self.bean_path(name)).unwrap()
    }
}

/// Header for a complete bean file.
pub fn bean_file(title: &str, status: &str, kind: &str, parent: Option<&str>) -> String {
    let mut out = format!(
        "---\ntitle: {title}\nstatus: {status}\ntype: {kind}\ncreated_at: 2024-03-01T09:00:00Z\n"
    );
    if let Some(parent) = parent {
        out.push_str(&format!("parent: {parent}\n"));
    }
    out.push_str("---\n");
    out
}

pub fn find<'a>(beans: &'a [Bean], id: &str) -> &'a Bean {
    beans
        .iter()
        .find(|b| b.id == id)
        .unwrap_or_else(|| panic!("{id} missing from listing"))
}

/// Every parent link in `beans` resolves within `beans`.
pub fn assert_no_orphans(beans: &[Bean]) {
    let ids: HashSet<&str> = beans.iter().map(|b| b.id.as_str()).collect();
    for bean in beans {
        if let Some(parent) = &bean.parent {
            assert!(
                ids.contains(parent.as_str()),
                "{} points at missing parent {parent}",
                bean.id
            );
        }
    }
}
