//! The bean store facade.
//!
//! [`BeanStore`] is the only entry point consumers need. Every listing runs
//! the full repair pipeline:
//!
//! ```text
//! backend query ─▶ ingest ─┬─ valid ──────────────────────────────┐
//!                          └─ malformed ─▶ recover ─┬─ persisted ─┤
//!                                                   └─ quarantine │
//!                                                                 ▼
//!                                              dangling parent repair ─▶ beans
//! ```
//!
//! A backend failure that names a corrupt file quarantines that file and
//! retries the query once. When the backend is unreachable the last good
//! listing is served and the store reports itself offline. Mutations never
//! fall back to the cache.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use anyhow::Context;

use crate::backend::{BackendError, BeanBackend, CliBackend};
use crate::cascade::{self, CascadeReport};
use crate::config::{self, EngineConfig, WorkspaceConfig};
use crate::error::StoreError;
use crate::history::{GitHistory, NoHistory, RevisionHistory};
use crate::ingest::{Ingested, RawRecord, ingest};
use crate::integrity::{self, IntegrityReport};
use crate::model::{Bean, BeanChanges, BeanDraft, BeanFilter};
use crate::notify::Notifier;
use crate::paths::BeansRoot;
use crate::quarantine::{QuarantineError, QuarantineManager, extract_offending_path};
use crate::recovery::{self, FieldRecoveryEngine, FileLocation, RecoveryOutcome};

/// Result of a successful update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatedBean {
    pub bean: Bean,
    /// Present when the status change propagated to descendants.
    pub cascade: Option<CascadeReport>,
}

/// What the most recent fresh listing had to repair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingReport {
    /// Ids recovered from a malformed record.
    pub recovered: Vec<String>,
    /// Recovered beans whose file was rewritten.
    pub persisted: Vec<String>,
    /// Filenames moved into quarantine.
    pub quarantined: Vec<String>,
    pub integrity: IntegrityReport,
    /// The listing needed a quarantine-and-retry to succeed.
    pub retried: bool,
}

/// Single-flight state for concurrent listings.
#[derive(Default)]
struct Flight {
    running: bool,
    generation: u64,
    result: Option<Result<Vec<Bean>, StoreError>>,
}

/// Marks the in-flight listing finished even if the leader unwinds.
struct FlightGuard<'a> {
    store: &'a BeanStore,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let mut flight = self.store.lock_flight();
        flight.running = false;
        flight.generation = flight.generation.wrapping_add(1);
        drop(flight);
        self.store.landed.notify_all();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn file_name_of(reported: &str) -> String {
    let unified = reported.replace('\\', "/");
    Path::new(&unified)
        .file_name()
        .map_or_else(|| unified.clone(), |n| n.to_string_lossy().into_owned())
}

pub struct BeanStore {
    root: BeansRoot,
    config: WorkspaceConfig,
    backend: Arc<dyn BeanBackend>,
    notifier: Arc<dyn Notifier>,
    recovery: FieldRecoveryEngine,
    quarantine: QuarantineManager,
    cache: Mutex<Option<Vec<Bean>>>,
    report: Mutex<ListingReport>,
    offline: AtomicBool,
    flight: Mutex<Flight>,
    landed: Condvar,
}

impl BeanStore {
    #[must_use]
    pub fn new(
        workspace_root: &Path,
        config: WorkspaceConfig,
        engine: &EngineConfig,
        backend: Arc<dyn BeanBackend>,
        history: Arc<dyn RevisionHistory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let root = BeansRoot::new(workspace_root, &config.beans_root(workspace_root));
        let recovery =
            FieldRecoveryEngine::new(root.clone(), config.clone(), history, engine.history_depth);
        let quarantine = QuarantineManager::new(root.clone(), Arc::clone(&notifier));
        Self {
            root,
            config,
            backend,
            notifier,
            recovery,
            quarantine,
            cache: Mutex::new(None),
            report: Mutex::new(ListingReport::default()),
            offline: AtomicBool::new(false),
            flight: Mutex::new(Flight::default()),
            landed: Condvar::new(),
        }
    }

    /// Open a workspace with the `beans` CLI backend and git history if present.
    pub fn open(workspace_root: &Path, notifier: Arc<dyn Notifier>) -> anyhow::Result<Self> {
        let workspace_config = config::load_workspace_config(workspace_root)
            .with_context(|| format!("loading workspace config in {}", workspace_root.display()))?;
        let engine = config::load_engine_config().context("loading beanpod config")?;
        Ok(Self::open_with(workspace_root, workspace_config, &engine, notifier))
    }

    #[must_use]
    pub fn open_with(
        workspace_root: &Path,
        workspace_config: WorkspaceConfig,
        engine: &EngineConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let timeout = engine.backend_timeout();
        let backend = Arc::new(CliBackend::new(
            engine.backend_program.clone(),
            workspace_root,
            timeout,
        ));
        let history: Arc<dyn RevisionHistory> = match GitHistory::detect(workspace_root, timeout) {
            Some(git) => Arc::new(git),
            None => Arc::new(NoHistory),
        };
        Self::new(workspace_root, workspace_config, engine, backend, history, notifier)
    }

    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        self.root.workspace()
    }

    #[must_use]
    pub fn quarantine_dir(&self) -> PathBuf {
        self.quarantine.quarantine_dir()
    }

    /// True when the last listing was served from cache.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn last_report(&self) -> ListingReport {
        lock(&self.report).clone()
    }

    fn lock_flight(&self) -> MutexGuard<'_, Flight> {
        lock(&self.flight)
    }

    fn cached(&self) -> Option<Vec<Bean>> {
        lock(&self.cache).clone()
    }

    // -----------------------------------------------------------------------
    // Listing
    // -----------------------------------------------------------------------

    /// List validated beans matching `filter`.
    ///
    /// Individual bad records never fail the listing. Concurrent calls share
    /// one backend query.
    pub fn list_beans(&self, filter: &BeanFilter) -> Result<Vec<Bean>, StoreError> {
        let all = self.shared_listing()?;
        Ok(all.into_iter().filter(|b| filter.matches(b)).collect())
    }

    fn shared_listing(&self) -> Result<Vec<Bean>, StoreError> {
        let mut flight = self.lock_flight();
        while flight.running {
            let joined = flight.generation;
            while flight.running && flight.generation == joined {
                flight = self
                    .landed
                    .wait(flight)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if let Some(result) = flight.result.clone() {
                tracing::trace!("joined in-flight listing");
                return result;
            }
        }
        flight.running = true;
        flight.result = None;
        drop(flight);

        let guard = FlightGuard { store: self };
        let result = self.list_fresh();
        self.lock_flight().result = Some(result.clone());
        drop(guard);
        result
    }

    fn list_fresh(&self) -> Result<Vec<Bean>, StoreError> {
        let mut report = ListingReport::default();
        let records = match self.query_with_retry(&mut report) {
            Ok(records) => records,
            Err(err) if err.is_connectivity() => {
                self.offline.store(true, Ordering::SeqCst);
                return match self.cached() {
                    Some(cached) => {
                        tracing::warn!(error = %err, beans = cached.len(), "backend unreachable, serving cached listing");
                        Ok(cached)
                    }
                    None => Err(err),
                };
            }
            Err(err) => return Err(err),
        };
        self.offline.store(false, Ordering::SeqCst);

        let mut beans = self.assemble(records, &mut report);
        report.integrity = integrity::repair_dangling_parents(
            &mut beans,
            self.backend.as_ref(),
            self.notifier.as_ref(),
            &report.quarantined,
            Some(self.quarantine.quarantine_dir()),
        );

        tracing::debug!(
            beans = beans.len(),
            recovered = report.recovered.len(),
            quarantined = report.quarantined.len(),
            "listing assembled"
        );
        *lock(&self.cache) = Some(beans.clone());
        *lock(&self.report) = report;
        Ok(beans)
    }

    /// Query once; on a failure naming a corrupt file, quarantine it and
    /// query again. A second failure propagates.
    fn query_with_retry(&self, report: &mut ListingReport) -> Result<Vec<RawRecord>, StoreError> {
        let message = match self.backend.query() {
            Ok(records) => return Ok(records),
            Err(BackendError::Failed(message)) => message,
            Err(other) => return Err(other.into()),
        };

        let Some(offending) = extract_offending_path(&message) else {
            return Err(StoreError::Backend(message));
        };
        if let Err(err) = self.quarantine.quarantine(&offending) {
            tracing::warn!(path = %offending, error = %err, "could not quarantine file named by backend failure");
            return Err(StoreError::Backend(message));
        }
        report.quarantined.push(file_name_of(&offending));
        report.retried = true;

        tracing::info!(path = %offending, "retrying listing after quarantine");
        self.backend.query().map_err(StoreError::from)
    }

    fn assemble(&self, records: Vec<RawRecord>, report: &mut ListingReport) -> Vec<Bean> {
        let mut beans = Vec::with_capacity(records.len());
        let mut seen = HashSet::new();

        for raw in records {
            let bean = match ingest(&raw, &self.config) {
                Ingested::Valid(bean) => *bean,
                Ingested::Malformed(record) => {
                    tracing::debug!(missing = ?record.missing, path = ?record.fields.path, "malformed bean record");
                    match self.recovery.recover(record) {
                        RecoveryOutcome::Recovered(recovered) => {
                            match self.recovery.persist(&recovered) {
                                Ok(wrote) => {
                                    if wrote {
                                        report.persisted.push(recovered.bean.id.clone());
                                    }
                                    report.recovered.push(recovered.bean.id.clone());
                                    recovered.bean
                                }
                                Err(err) => {
                                    tracing::warn!(id = %recovered.bean.id, error = %err, "could not persist recovered bean");
                                    self.quarantine_location(
                                        &recovered.location,
                                        Some(recovered.bean.id.as_str()),
                                        report,
                                    );
                                    continue;
                                }
                            }
                        }
                        RecoveryOutcome::Unrecoverable {
                            fields, location, ..
                        } => {
                            self.quarantine_location(&location, fields.id.as_deref(), report);
                            continue;
                        }
                    }
                }
            };

            if seen.insert(bean.id.clone()) {
                beans.push(bean);
            } else {
                tracing::warn!(id = %bean.id, "duplicate bean id in listing, keeping the first");
            }
        }
        beans
    }

    fn quarantine_location(&self, location: &FileLocation, id: Option<&str>, report: &mut ListingReport) {
        let reported = match location {
            FileLocation::Unknown => {
                self.quarantine.report_unlocated(id);
                return;
            }
            FileLocation::Inside(path) => path.to_string_lossy().into_owned(),
            FileLocation::Outside(reported) => reported.clone(),
        };

        match self.quarantine.quarantine(&reported) {
            Ok(_) => report.quarantined.push(file_name_of(&reported)),
            Err(QuarantineError::NotFound(_)) => self.quarantine.report_unlocated(id),
            Err(err) => {
                tracing::warn!(path = %reported, error = %err, "quarantine failed, bean left out of listing");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    fn bean_from_response(&self, raw: &RawRecord) -> Option<Bean> {
        match ingest(raw, &self.config) {
            Ingested::Valid(bean) => Some(*bean),
            Ingested::Malformed(record) => {
                tracing::debug!(missing = ?record.missing, "backend returned incomplete record for mutation");
                None
            }
        }
    }

    fn quote_title_of(&self, bean: &Bean) {
        let Some(reported) = bean.path.as_deref() else {
            return;
        };
        let result = self
            .root
            .resolve(reported)
            .map_err(|e| e.to_string())
            .and_then(|path| recovery::ensure_quoted_title(&path).map_err(|e| e.to_string()));
        if let Err(err) = result {
            tracing::warn!(id = %bean.id, error = %err, "could not quote bean title");
        }
    }

    fn check_values(&self, changes: &BeanChanges) -> Result<(), StoreError> {
        if let Some(status) = changes.status.filter(|s| !self.config.allows_status(*s)) {
            return Err(StoreError::InvalidValue(format!("status '{status}' is not configured")));
        }
        if let Some(kind) = changes.bean_type.filter(|t| !self.config.allows_type(*t)) {
            return Err(StoreError::InvalidValue(format!("type '{kind}' is not configured")));
        }
        if let Some(priority) = changes.priority.filter(|p| !self.config.allows_priority(*p)) {
            return Err(StoreError::InvalidValue(format!("priority '{priority}' is not configured")));
        }
        if changes.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(StoreError::InvalidInput("title cannot be empty".into()));
        }
        Ok(())
    }

    /// Beans to read the previous state and descendants from.
    ///
    /// A status change needs the current hierarchy, so it lists afresh and
    /// only falls back to the cache when that listing fails. Other changes
    /// use the cache when there is one.
    fn hierarchy_for(&self, changes: &BeanChanges) -> Result<Vec<Bean>, StoreError> {
        if changes.status.is_none() {
            if let Some(cached) = self.cached() {
                return Ok(cached);
            }
            return self.shared_listing();
        }
        match self.shared_listing() {
            Ok(beans) => Ok(beans),
            Err(err) => match self.cached() {
                Some(cached) => {
                    tracing::warn!(error = %err, "listing failed, cascading from cached hierarchy");
                    Ok(cached)
                }
                None => Err(err),
            },
        }
    }

    /// Apply `changes` to bean `id`, cascading a status change to descendants.
    ///
    /// The bean's own update is issued exactly once. Cascade failures are
    /// reported in the result, not as an error.
    pub fn update_bean(&self, id: &str, changes: &BeanChanges) -> Result<UpdatedBean, StoreError> {
        self.check_values(changes)?;

        let hierarchy = self.hierarchy_for(changes)?;
        let previous = hierarchy.iter().find(|b| b.id == id).cloned();
        if changes.status.is_some() && previous.is_none() {
            tracing::warn!(id, "bean missing from listing, status change will not cascade");
        }

        let raw = self.backend.update(id, changes)?;
        let bean = match (self.bean_from_response(&raw), &previous) {
            (Some(bean), _) => bean,
            (None, Some(previous)) => {
                let mut bean = previous.clone();
                changes.apply_to(&mut bean);
                bean
            }
            (None, None) => {
                return Err(StoreError::MalformedResponse(format!(
                    "update of '{id}' returned an incomplete record"
                )));
            }
        };

        if changes.title.is_some() {
            self.quote_title_of(&bean);
        }

        let cascade = match (changes.status, &previous) {
            (Some(to), Some(previous)) if cascade::should_cascade(previous.status, to) => {
                let mut current = hierarchy;
                if let Some(slot) = current.iter_mut().find(|b| b.id == id) {
                    slot.clone_from(&bean);
                }
                let report = cascade::cascade_status(id, to, &current, self.backend.as_ref());
                Some(report)
            }
            _ => None,
        };

        self.patch_cache(&bean, cascade.as_ref());
        Ok(UpdatedBean { bean, cascade })
    }

    fn patch_cache(&self, bean: &Bean, cascade: Option<&CascadeReport>) {
        let mut cache = lock(&self.cache);
        let Some(beans) = cache.as_mut() else {
            return;
        };
        match beans.iter_mut().find(|b| b.id == bean.id) {
            Some(slot) => slot.clone_from(bean),
            None => beans.push(bean.clone()),
        }
        if let Some(report) = cascade {
            for cascaded in beans.iter_mut().filter(|b| report.updated.contains(&b.id)) {
                cascaded.status = bean.status;
            }
        }
    }

    /// Create a bean and return it as the backend stored it.
    pub fn create_bean(&self, draft: &BeanDraft) -> Result<Bean, StoreError> {
        if draft.title.trim().is_empty() {
            return Err(StoreError::InvalidInput("title cannot be empty".into()));
        }
        self.check_values(&BeanChanges {
            status: draft.status,
            bean_type: draft.bean_type,
            priority: draft.priority,
            ..BeanChanges::default()
        })?;

        let raw = self.backend.create(draft)?;
        let bean = self.bean_from_response(&raw).ok_or_else(|| {
            StoreError::MalformedResponse("create returned an incomplete record".into())
        })?;
        self.quote_title_of(&bean);
        self.patch_cache(&bean, None);
        tracing::info!(id = %bean.id, "bean created");
        Ok(bean)
    }

    /// Delete a bean. Children keep their link until the next listing
    /// repairs it remotely; in the cached listing it is cleared at once.
    pub fn delete_bean(&self, id: &str) -> Result<(), StoreError> {
        self.backend.delete(id)?;
        if let Some(beans) = lock(&self.cache).as_mut() {
            beans.retain(|b| b.id != id);
            for child in beans.iter_mut().filter(|b| b.parent.as_deref() == Some(id)) {
                child.parent = None;
            }
        }
        tracing::info!(id = %id, "bean deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_of_handles_both_separators() {
        assert_eq!(file_name_of(".beans/a--b.md"), "a--b.md");
        assert_eq!(file_name_of(r"C:\w\.beans\a--b.md"), "a--b.md");
        assert_eq!(file_name_of("bare.md"), "bare.md");
    }
}
