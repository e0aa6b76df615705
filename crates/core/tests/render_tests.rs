use std::collections::BTreeSet;

use taskdeck_core::{
    render, EntityKind, ExpansionState, FilterDimension, Panel, PanelKey, RenderLimits,
    RenderModel, Snapshot, TaskRecord, TaskStatus, TaskTable, TelemetryView, ViewStateStore,
};

fn tasks_body(n: u64, status: &str) -> String {
    let tasks: Vec<String> = (1..=n)
        .map(|i| {
            format!(
                r#"{{"task_id": {i}, "execution_id": {}, "status": "{status}", "command": "run {i}",
                    "worker_name": "w1", "batch": "b1", "output": "line {i}\n", "error": null,
                    "creation_date": "2024-03-01 10:00:00",
                    "modification_date": "2024-03-01 10:02:00"}}"#,
                i + 100
            )
        })
        .collect();
    format!(
        r#"{{"tasks": [{}], "batch_list": ["b1", null], "worker_list": ["w1"]}}"#,
        tasks.join(",")
    )
}

fn tasks(n: u64, status: &str) -> Snapshot {
    Snapshot::decode(EntityKind::Tasks, tasks_body(n, status).as_bytes()).unwrap()
}

fn task_table(model: RenderModel) -> TaskTable {
    match model {
        RenderModel::Tasks(t) => t,
        other => panic!("expected tasks, got {other:?}"),
    }
}

#[test]
fn test_row_cap_applies_after_filtering() {
    let view = ViewStateStore::new();
    let snap = tasks(600, "running");
    let table = task_table(render(&snap, &view, &RenderLimits::default()));
    assert_eq!(table.rows.len(), 500);
    assert_eq!(table.hidden, 100);
    assert_eq!(table.rows[0].task_id, 1);
    assert_eq!(table.rows[499].task_id, 500);
}

#[test]
fn test_filter_then_cap() {
    let mut body = tasks_body(3, "failed");
    body = body.replacen(r#""status": "failed""#, r#""status": "running""#, 1);
    let snap = Snapshot::decode(EntityKind::Tasks, body.as_bytes()).unwrap();

    let mut view = ViewStateStore::new();
    view.set_filter(FilterDimension::Status, "terminated").unwrap();
    let limits = RenderLimits { max_rows: 1, ..RenderLimits::default() };
    let table = task_table(render(&snap, &view, &limits));
    assert_eq!(table.rows.len(), 1);
    assert_eq!(table.rows[0].task_id, 2);
    assert_eq!(table.hidden, 1);
}

#[test]
fn test_expansion_survives_snapshot_replacement() {
    let mut view = ViewStateStore::new();
    let key = PanelKey::new(Panel::Stdout, 42);
    view.toggle_with_execution(key, Some(142));

    let first = task_table(render(&tasks(50, "running"), &view, &RenderLimits::default()));
    let second = task_table(render(&tasks(50, "running"), &view, &RenderLimits::default()));
    for table in [&first, &second] {
        let row = table.rows.iter().find(|r| r.task_id == 42).unwrap();
        assert_eq!(row.stdout.as_ref().unwrap().state, ExpansionState::Expanded);
        assert_eq!(row.stdout.as_ref().unwrap().key.to_string(), "output-std-42");
    }
    assert_eq!(first, second);
    assert!(view.detail_ids().contains(&142));
}

#[test]
fn test_expansion_only_from_store() {
    let view = ViewStateStore::new();
    let table = task_table(render(&tasks(5, "running"), &view, &RenderLimits::default()));
    assert!(table
        .rows
        .iter()
        .all(|r| r.command.state == ExpansionState::Collapsed));
}

#[test]
fn test_status_change_collapses_everything() {
    let mut view = ViewStateStore::new();
    view.toggle_with_execution(PanelKey::new(Panel::Stdout, 1), Some(101));
    view.set_filter(FilterDimension::Status, "failed").unwrap();
    assert_eq!(view.expanded().count(), 0);
    assert!(view.detail_ids().is_empty());
}

#[test]
fn test_long_output_shows_tail() {
    let long = "x".repeat(1500) + "END";
    let body = format!(
        r#"{{"tasks": [{{"task_id": 1, "status": "failed", "command": "c", "output": "{long}"}}]}}"#
    );
    let snap = Snapshot::decode(EntityKind::Tasks, body.as_bytes()).unwrap();
    let table = task_table(render(&snap, &ViewStateStore::new(), &RenderLimits::default()));
    let out = table.rows[0].stdout.as_ref().unwrap();
    assert!(out.truncated);
    assert_eq!(out.text.chars().count(), 1000);
    assert!(out.text.ends_with("END"));
}

#[test]
fn test_runtime_and_choices() {
    let snap = tasks(1, "succeeded");
    let table = task_table(render(&snap, &ViewStateStore::new(), &RenderLimits::default()));
    assert_eq!(table.rows[0].runtime, "2.0min");
    assert_eq!(table.filters.batches, vec!["b1"]);
    assert_eq!(table.filters.batch, "-");
}

#[test]
fn test_batch_filter_reset_when_unknown() {
    let mut view = ViewStateStore::new();
    view.set_filter(FilterDimension::Batch, "gone").unwrap();
    let snap = tasks(1, "running");
    assert!(view.reconcile_filters(snap.as_tasks().unwrap()));
    assert_eq!(view.get_filter(FilterDimension::Batch), "-");
    view.set_filter(FilterDimension::Batch, "b1").unwrap();
    assert!(!view.reconcile_filters(snap.as_tasks().unwrap()));
}

#[test]
fn test_worker_telemetry_shapes() {
    let body = br#"{"workers": [
        {"worker_id": 1, "name": "a", "status": "running", "concurrency": 2, "prefetch": 1,
         "load": 0.5, "memory": "3.1G",
         "stats": {"load": "0.5", "disk": {"usage": ["/:10%"], "speed": "1MB/s", "counter": "3GB"},
                   "network": {"speed": "2MB/s", "counter": "5GB"}}},
        {"worker_id": 2, "name": "b", "status": "offline", "concurrency": 1, "prefetch": 0,
         "stats": "garbled"}
    ], "tasks_per_status": {"running": 4}}"#;
    let snap = Snapshot::decode(EntityKind::Workers, body).unwrap();
    let model = render(&snap, &ViewStateStore::new(), &RenderLimits::default());
    let RenderModel::Workers(table) = model else {
        panic!("expected workers");
    };
    assert!(matches!(table.rows[0].telemetry, TelemetryView::Stats { .. }));
    assert_eq!(table.rows[1].telemetry, TelemetryView::Absent);
    assert_eq!(table.rows[1].indicator, "secondary");
    assert_eq!(table.rows[1].load, "-");
    let failed = table
        .tasks_per_status
        .iter()
        .find(|(s, _)| s.as_str() == "failed")
        .unwrap();
    assert_eq!(failed.1, 0);
}

#[test]
fn test_batch_stats_lines() {
    let body = br#"{"batches": [
        {"batch": "b1", "status": "succeeded", "count": 3, "min": 0.1, "avg": 0.25, "max": 0.5},
        {"batch": "b1", "status": "failed", "count": 1}
    ], "workers": [{"batch": "b1", "workers": "w1,w2"}]}"#;
    let snap = Snapshot::decode(EntityKind::Batches, body).unwrap();
    let model = render(&snap, &ViewStateStore::new(), &RenderLimits::default());
    let RenderModel::Batches(table) = model else {
        panic!("expected batches");
    };
    let row = &table.rows[0];
    assert_eq!(row.stats, vec!["succeeded: 0.25 [0.10 - 0.50]"]);
    assert_eq!(row.total, 4);
    assert_eq!(row.progress, 100.0);
    assert_eq!(row.workers, vec!["w1", "w2"]);
}

#[test]
fn test_job_log_preview_expands_from_store() {
    let log = "a".repeat(60) + "rest of the log";
    let body = format!(
        r#"{{"jobs": [{{"job_id": 9, "action": "worker_deploy", "status": "failed",
                       "log": "{log}", "progression": 40}}]}}"#
    );
    let snap = Snapshot::decode(EntityKind::Jobs, body.as_bytes()).unwrap();
    let mut view = ViewStateStore::new();

    let RenderModel::Jobs(table) = render(&snap, &view, &RenderLimits::default()) else {
        panic!("expected jobs");
    };
    let row = &table.rows[0];
    assert_eq!(row.action, "Deploy worker");
    assert_eq!(row.log_head.len(), 60);
    assert_eq!(row.log_rest.as_ref().unwrap().state, ExpansionState::Collapsed);

    view.toggle(PanelKey::new(Panel::JobLog, 9));
    let RenderModel::Jobs(table) = render(&snap, &view, &RenderLimits::default()) else {
        panic!("expected jobs");
    };
    let rest = table.rows[0].log_rest.as_ref().unwrap();
    assert_eq!(rest.state, ExpansionState::Expanded);
    assert_eq!(rest.text, "rest of the log");
}

fn mixed_tasks() -> Snapshot {
    Snapshot::decode(
        EntityKind::Tasks,
        br#"{"tasks": [
            {"task_id": 1, "status": "running", "command": "a", "worker_name": "w1", "batch": "b1"},
            {"task_id": 2, "status": "failed", "command": "b", "worker_name": "w2", "batch": "b2"},
            {"task_id": 3, "status": "pending", "command": "c", "batch": "b1"},
            {"task_id": 4, "status": "succeeded", "command": "d", "worker_name": "w1"},
            {"task_id": 5, "status": "waiting", "command": "e", "batch": "b2"},
            {"task_id": 6, "status": "accepted", "command": "f", "worker_name": "w2",
             "batch": "b1"}
        ], "batch_list": ["b1", "b2"], "worker_list": ["w1", "w2"]}"#,
    )
    .unwrap()
}

fn row_ids(snap: &Snapshot, view: &ViewStateStore) -> BTreeSet<u64> {
    task_table(render(snap, view, &RenderLimits::default()))
        .rows
        .iter()
        .map(|r| r.task_id)
        .collect()
}

#[test]
fn test_batch_filter_end_to_end() {
    let snap = Snapshot::decode(
        EntityKind::Tasks,
        br#"{"tasks": [
            {"task_id": 1, "status": "running", "command": "a", "batch": "b1"},
            {"task_id": 2, "status": "failed", "command": "b", "batch": "b2"}
        ], "batch_list": ["b1", "b2"]}"#,
    )
    .unwrap();
    let mut view = ViewStateStore::new();

    view.set_filter(FilterDimension::Batch, "b1").unwrap();
    assert_eq!(row_ids(&snap, &view), BTreeSet::from([1]));

    view.set_filter(FilterDimension::Batch, "-").unwrap();
    assert_eq!(row_ids(&snap, &view), BTreeSet::from([1, 2]));
}

/// Written out by hand so the check does not lean on the filter code.
fn expected(task: &TaskRecord, status: &str, worker: &str, batch: &str) -> bool {
    let status_ok = match status {
        "all" => true,
        "pending" => matches!(
            task.status,
            TaskStatus::Pending | TaskStatus::Assigned | TaskStatus::Accepted
        ),
        "terminated" => matches!(task.status, TaskStatus::Succeeded | TaskStatus::Failed),
        s => task.status.as_str() == s,
    };
    let named = |wanted: &str, actual: Option<&str>| wanted == "-" || actual == Some(wanted);
    status_ok && named(worker, task.worker_name.as_deref()) && named(batch, task.batch.as_deref())
}

#[test]
fn test_every_filter_combination_admits_exactly_the_matching_rows() {
    let snap = mixed_tasks();
    let all = &snap.as_tasks().unwrap().tasks;
    let every_id: BTreeSet<u64> = all.iter().map(|t| t.task_id).collect();

    for status in ["all", "pending", "terminated", "running", "failed", "waiting", "paused"] {
        for worker in ["-", "w1", "w2", "w9"] {
            for batch in ["-", "b1", "b2", "b9"] {
                let mut view = ViewStateStore::new();
                view.set_filter(FilterDimension::Status, status).unwrap();
                view.set_filter(FilterDimension::Worker, worker).unwrap();
                view.set_filter(FilterDimension::Batch, batch).unwrap();

                let shown = row_ids(&snap, &view);
                let wanted: BTreeSet<u64> = all
                    .iter()
                    .filter(|t| expected(t, status, worker, batch))
                    .map(|t| t.task_id)
                    .collect();
                assert!(shown.is_subset(&every_id));
                assert_eq!(shown, wanted, "status={status} worker={worker} batch={batch}");
            }
        }
    }
}
