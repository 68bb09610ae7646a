//! End-to-end listing through the store: ingestion, recovery, quarantine,
//! retry, orphan repair and offline fallback.

mod common;

use std::fs;
use std::path::Path;
use std::time::Duration;

use beanpod_core::StoreError;
use beanpod_core::backend::BackendError;
use beanpod_core::config::WorkspaceConfig;
use beanpod_core::model::{BeanFilter, Status};
use beanpod_core::notify::NotificationKind;
use common::{FATAL_MARKER, Workspace, assert_no_orphans, bean_file, find};
use serde_json::json;
use tempfile::TempDir;

#[test]
fn clean_listing_needs_no_repair() {
    let ws = Workspace::new();
    ws.write_bean("beans-e1--epic.md", &bean_file("Epic", "todo", "epic", None));
    ws.write_bean(
        "beans-f1--feature.md",
        &bean_file("Feature", "todo", "feature", Some("beans-e1")),
    );

    let beans = ws.store.list_beans(&BeanFilter::default()).unwrap();
    assert_eq!(beans.len(), 2);
    assert_eq!(find(&beans, "beans-f1").parent.as_deref(), Some("beans-e1"));
    assert_eq!(find(&beans, "beans-e1").code, "e1");
    assert_eq!(ws.backend.write_count(), 0);
    assert!(ws.notifier.drain().is_empty());
    assert!(!ws.store.is_offline());
}

#[test]
fn missing_status_comes_from_prior_revision() {
    let ws = Workspace::new();
    ws.write_bean(
        "beans-a1--pump.md",
        "---\ntitle: Wire the pump\ntype: task\n---\nSteps.\n",
    );
    ws.history.add(
        ".beans/beans-a1--pump.md",
        &["---\ntitle: Wire the pump\nstatus: in-progress\ntype: task\n---\nSteps.\n"],
    );

    let beans = ws.store.list_beans(&BeanFilter::default()).unwrap();
    let bean = find(&beans, "beans-a1");
    assert_eq!(bean.status, Status::InProgress);
    assert_eq!(bean.body, "Steps.\n");

    assert!(ws.bean_path("beans-a1--pump.md").exists());
    assert!(ws.read_bean("beans-a1--pump.md").contains("status: in-progress"));
    assert_eq!(ws.notifier.count(&NotificationKind::Quarantined), 0);

    let report = ws.store.last_report();
    assert_eq!(report.recovered, vec!["beans-a1"]);
    assert_eq!(report.persisted, vec!["beans-a1"]);
}

#[test]
fn older_complete_revision_beats_newer_broken_one() {
    let ws = Workspace::new();
    ws.write_bean("bean-x.md", "this file lost its header\n");
    ws.history.add(
        ".beans/bean-x.md",
        &[
            "---\ntitle: [half written\n",
            "---\nid: bean-x\ntitle: Calibrate sensor\nstatus: completed\ntype: bug\n---\n",
        ],
    );

    let beans = ws.store.list_beans(&BeanFilter::default()).unwrap();
    let bean = find(&beans, "bean-x");
    assert_eq!(bean.title, "Calibrate sensor");
    assert_eq!(bean.status, Status::Completed);
    assert!(ws.read_bean("bean-x.md").ends_with("this file lost its header\n"));
}

#[test]
fn record_with_nothing_to_go_on_is_dropped_with_one_warning() {
    let ws = Workspace::new();
    ws.write_bean("beans-ok--fine.md", &bean_file("Fine", "todo", "task", None));
    ws.backend.add_raw_record(json!({ "id": "", "title": "", "status": "todo" }));

    let beans = ws.store.list_beans(&BeanFilter::default()).unwrap();
    assert_eq!(beans.len(), 1);
    assert_eq!(beans[0].id, "beans-ok");

    let notes = ws.notifier.drain();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].kind, NotificationKind::Quarantined);
}

#[test]
fn recovered_record_without_any_file_is_dropped() {
    let ws = Workspace::new();
    ws.backend
        .add_raw_record(json!({ "id": "beans-ghost", "title": "Ghost" }));

    let beans = ws.store.list_beans(&BeanFilter::default()).unwrap();
    assert!(beans.is_empty());
    assert!(ws.store.last_report().recovered.is_empty());

    let notes = ws.notifier.drain();
    assert_eq!(notes.len(), 1);
    assert!(notes[0].message.contains("beans-ghost"));
    assert!(!ws.root().join(".beans/.quarantine").exists());
}

#[test]
fn recovered_record_whose_file_is_gone_is_dropped() {
    let ws = Workspace::new();
    ws.write_bean("beans-ok--fine.md", &bean_file("Fine", "todo", "task", None));
    ws.backend.add_raw_record(json!({
        "id": "beans-m1",
        "title": "M",
        "path": ".beans/beans-m1--gone.md",
    }));

    let beans = ws.store.list_beans(&BeanFilter::default()).unwrap();
    let ids: Vec<&str> = beans.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, ["beans-ok"]);
    assert!(!ws.bean_path("beans-m1--gone.md").exists());

    let notes = ws.notifier.drain();
    assert_eq!(notes.len(), 1);
    assert!(notes[0].message.contains("beans-m1"));
}

#[test]
fn repair_is_idempotent() {
    let ws = Workspace::new();
    ws.write_bean(
        "beans-b2--fix-the-valve.md",
        "---\nstatus: todo\ncreated_at: 2024-03-01T09:00:00Z\n---\nBody stays.\n",
    );

    let first = ws.store.list_beans(&BeanFilter::default()).unwrap();
    assert_eq!(find(&first, "beans-b2").title, "Fix the valve");
    assert_eq!(ws.store.last_report().persisted, vec!["beans-b2"]);
    let written = ws.read_bean("beans-b2--fix-the-valve.md");

    let second = ws.store.list_beans(&BeanFilter::default()).unwrap();
    assert_eq!(ws.read_bean("beans-b2--fix-the-valve.md"), written);
    let report = ws.store.last_report();
    assert!(report.recovered.is_empty());
    assert!(report.persisted.is_empty());
    assert_eq!(find(&first, "beans-b2"), find(&second, "beans-b2"));
}

#[test]
fn unrecoverable_parent_is_quarantined_and_children_detached() {
    let ws = Workspace::new();
    // Id from the filename, but no title anywhere.
    ws.write_bean("beans-p1--.md", "---\nstatus: todo\n---\n");
    ws.write_bean(
        "beans-c1--child-one.md",
        &bean_file("Child one", "todo", "task", Some("beans-p1")),
    );
    ws.write_bean(
        "beans-c2--child-two.md",
        &bean_file("Child two", "todo", "task", Some("beans-p1")),
    );

    let beans = ws.store.list_beans(&BeanFilter::default()).unwrap();
    assert_eq!(beans.len(), 2);
    assert_no_orphans(&beans);
    assert!(
        ws.root()
            .join(".beans/.quarantine/beans-p1--.md.quarantined")
            .exists()
    );

    let notes = ws.notifier.drain();
    assert_eq!(notes.len(), 2);
    assert_eq!(notes[0].kind, NotificationKind::Quarantined);
    assert_eq!(notes[1].kind, NotificationKind::OrphansRepaired);
    assert_eq!(
        notes[1].message,
        "Cleared missing parent on 2 bean(s): c1, c2 (after quarantining beans-p1--.md)"
    );

    // The clears went to the backend, so the next listing is clean.
    assert_eq!(ws.backend.write_count(), 2);
    let again = ws.store.list_beans(&BeanFilter::default()).unwrap();
    assert_eq!(again.len(), 2);
    assert!(ws.notifier.drain().is_empty());
}

#[test]
fn fatal_listing_error_quarantines_named_file_and_retries_once() {
    let ws = Workspace::new();
    ws.write_bean("beans-e1--epic.md", &format!("---\ntitle: {FATAL_MARKER}\n"));
    ws.write_bean(
        "beans-t1--task.md",
        &bean_file("Task", "todo", "task", Some("beans-e1")),
    );

    let beans = ws.store.list_beans(&BeanFilter::default()).unwrap();
    assert_eq!(ws.backend.query_calls(), 2);
    assert_eq!(beans.len(), 1);
    assert!(beans[0].parent.is_none());
    assert!(ws.store.last_report().retried);

    assert_eq!(ws.notifier.count(&NotificationKind::Quarantined), 1);
    assert_eq!(ws.notifier.count(&NotificationKind::OrphansRepaired), 1);
    let notes = ws.notifier.drain();
    assert!(notes[0].message.contains("beans-e1--epic.md"));
    assert!(!notes[0].message.contains(&ws.root().display().to_string()));
}

#[test]
fn second_fatal_error_propagates() {
    let ws = Workspace::new();
    ws.write_bean("beans-a1--one.md", FATAL_MARKER);
    ws.write_bean("beans-a2--two.md", FATAL_MARKER);

    let err = ws.store.list_beans(&BeanFilter::default()).unwrap_err();
    assert!(matches!(err, StoreError::Backend(ref msg) if msg.contains("beans-a2--two.md")));
    assert_eq!(ws.backend.query_calls(), 2);
    assert!(ws.bean_path("beans-a2--two.md").exists());
}

#[test]
fn unreachable_backend_serves_cache_and_goes_offline() {
    let ws = Workspace::new();
    ws.write_bean("beans-a1--one.md", &bean_file("One", "todo", "task", None));
    let fresh = ws.store.list_beans(&BeanFilter::default()).unwrap();

    ws.backend
        .fail_next_query(BackendError::Unavailable("beans: not found".into()));
    let cached = ws.store.list_beans(&BeanFilter::default()).unwrap();
    assert_eq!(cached, fresh);
    assert!(ws.store.is_offline());

    ws.backend.fail_next_query(BackendError::Timeout(Duration::from_secs(10)));
    assert!(ws.store.list_beans(&BeanFilter::default()).is_ok());
    assert!(ws.store.is_offline());

    ws.store.list_beans(&BeanFilter::default()).unwrap();
    assert!(!ws.store.is_offline());
}

#[test]
fn unreachable_backend_without_cache_is_an_error() {
    let ws = Workspace::new();
    ws.backend
        .fail_next_query(BackendError::Unavailable("no beans binary".into()));
    let err = ws.store.list_beans(&BeanFilter::default()).unwrap_err();
    assert!(matches!(err, StoreError::BackendUnavailable(_)));
    assert!(err.is_connectivity());
}

#[test]
fn record_path_escaping_root_is_never_touched() {
    let outer = TempDir::new().unwrap();
    let secret = outer.path().join("secret--plans.md");
    fs::write(&secret, "keep out\n").unwrap();
    let ws = Workspace::in_dir(outer, Path::new("ws"), WorkspaceConfig::default());
    ws.write_bean("beans-ok--fine.md", &bean_file("Fine", "todo", "task", None));
    ws.backend
        .add_raw_record(json!({ "id": "", "path": "../secret--plans.md" }));

    let beans = ws.store.list_beans(&BeanFilter::default()).unwrap();
    assert_eq!(beans.len(), 1);
    assert_eq!(fs::read_to_string(ws.dir.path().join("secret--plans.md")).unwrap(), "keep out\n");
    assert!(!ws.root().join(".beans/.quarantine").exists());
    assert_eq!(ws.notifier.count(&NotificationKind::Quarantined), 0);
}

#[test]
fn filters_apply_after_repair() {
    let ws = Workspace::new();
    ws.write_bean("beans-a1--one.md", &bean_file("One", "todo", "task", None));
    ws.write_bean("beans-a2--two.md", &bean_file("Two", "completed", "bug", None));
    ws.write_bean("beans-a3--three.md", "---\ntitle: Three\ntype: bug\n---\n");

    let filter = BeanFilter {
        types: [beanpod_core::model::BeanType::Bug].into(),
        ..BeanFilter::default()
    };
    let bugs = ws.store.list_beans(&filter).unwrap();
    let mut ids: Vec<&str> = bugs.iter().map(|b| b.id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, ["beans-a2", "beans-a3"]);

    let search = BeanFilter {
        search: Some("THREE".into()),
        ..BeanFilter::default()
    };
    assert_eq!(ws.store.list_beans(&search).unwrap().len(), 1);
}

#[test]
fn invalid_enum_value_is_repaired_from_defaults() {
    let config = WorkspaceConfig {
        statuses: vec![Status::Todo, Status::InProgress, Status::Completed],
        ..WorkspaceConfig::default()
    };
    let ws = Workspace::with_config(config);
    ws.write_bean("beans-a1--one.md", "---\ntitle: One\nstatus: scrapped\ntype: task\n---\n");

    let beans = ws.store.list_beans(&BeanFilter::default()).unwrap();
    assert_eq!(find(&beans, "beans-a1").status, Status::Todo);
    assert!(ws.read_bean("beans-a1--one.md").contains("status: todo"));
}
