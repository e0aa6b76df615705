//! Snapshot + view state -> display model. Pure: the same inputs always
//! produce the same model, so a re-render never loses expansion state.

use serde::{Deserialize, Serialize};

use crate::command::{Command, RowRef};
use crate::filter::{FilterDimension, FilterState};
use crate::model::{
    BatchesSnapshot, JobRecord, JobStatus, JobsSnapshot, Snapshot, TaskRecord, TaskStatus,
    TasksSnapshot, WorkerRecord, WorkerStatus, WorkerTelemetry, WorkersSnapshot,
};
use crate::time::{display_timestamp, elapsed_seconds, format_runtime};
use crate::view_state::{EditTarget, ExpansionState, Panel, PanelKey, ViewStateStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderLimits {
    pub max_rows: usize,
    pub max_output_chars: usize,
    pub job_log_preview_chars: usize,
}

impl Default for RenderLimits {
    fn default() -> Self {
        RenderLimits {
            max_rows: 500,
            max_output_chars: 1000,
            job_log_preview_chars: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowAction {
    Resume,
    Pause,
    Stop,
    Break,
    Restart,
    Download,
    Delete,
    EditCommand,
    Clean,
    ChangeBatch,
    Concurrency,
    Prefetch,
    Go,
    Clear,
}

impl RowAction {
    pub fn label(self) -> &'static str {
        match self {
            RowAction::Resume => "resume",
            RowAction::Pause => "pause",
            RowAction::Stop => "stop",
            RowAction::Break => "break",
            RowAction::Restart => "restart",
            RowAction::Download => "download",
            RowAction::Delete => "delete",
            RowAction::EditCommand => "edit",
            RowAction::Clean => "clean",
            RowAction::ChangeBatch => "batch",
            RowAction::Concurrency => "concurrency±",
            RowAction::Prefetch => "prefetch±",
            RowAction::Go => "go",
            RowAction::Clear => "clear",
        }
    }
}

/// Expandable sub-panel. `text` is always the bounded slice; whether it is
/// shown depends on `state`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelView {
    pub key: PanelKey,
    pub state: ExpansionState,
    pub text: String,
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingView {
    pub prompt: String,
    pub scoped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterChoices {
    pub status: String,
    pub worker: String,
    pub batch: String,
    pub sort: String,
    pub workers: Vec<String>,
    pub batches: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRow {
    pub task_id: u64,
    pub execution_id: Option<u64>,
    pub name: String,
    pub status: TaskStatus,
    pub worker: String,
    pub batch: String,
    pub created: String,
    pub runtime: String,
    pub command: PanelView,
    pub stdout: Option<PanelView>,
    pub stderr: Option<PanelView>,
    pub actions: Vec<RowAction>,
    pub pending: Option<PendingView>,
    pub editing: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskTable {
    pub rows: Vec<TaskRow>,
    /// Admitted rows dropped by the row cap.
    pub hidden: usize,
    pub filters: FilterChoices,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryView {
    Absent,
    Stats {
        load: String,
        disk_usage: Vec<String>,
        disk_io: String,
        network_io: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerRow {
    pub worker_id: u64,
    pub name: String,
    pub batch: String,
    pub status: WorkerStatus,
    pub indicator: &'static str,
    pub concurrency: u32,
    pub prefetch: u32,
    pub accepted: u64,
    pub running: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub total: u64,
    pub load: String,
    pub memory: String,
    pub telemetry: TelemetryView,
    pub actions: Vec<RowAction>,
    pub pending: Option<PendingView>,
    pub editing: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerTable {
    pub rows: Vec<WorkerRow>,
    pub hidden: usize,
    pub tasks_per_status: Vec<(TaskStatus, u64)>,
    /// Worker launch waiting for confirmation.
    pub launch_pending: Option<PendingView>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchRow {
    pub name: String,
    pub workers: Vec<String>,
    pub pending: u64,
    pub running: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub total: u64,
    /// Share of tasks that reached a terminal status, in percent.
    pub progress: f64,
    pub stats: Vec<String>,
    pub actions: Vec<RowAction>,
    pub pending_confirmation: Option<PendingView>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchTable {
    pub rows: Vec<BatchRow>,
    pub hidden: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobRow {
    pub job_id: u64,
    pub action: String,
    pub target: String,
    pub status: JobStatus,
    pub indicator: &'static str,
    pub log_head: String,
    pub log_rest: Option<PanelView>,
    pub progression: Option<f64>,
    pub updated: String,
    pub actions: Vec<RowAction>,
    pub pending: Option<PendingView>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobTable {
    pub rows: Vec<JobRow>,
    pub hidden: usize,
    pub delete_all_pending: Option<PendingView>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderModel {
    Tasks(TaskTable),
    Workers(WorkerTable),
    Batches(BatchTable),
    Jobs(JobTable),
}

pub fn render(snapshot: &Snapshot, view: &ViewStateStore, limits: &RenderLimits) -> RenderModel {
    match snapshot {
        Snapshot::Tasks(s) => RenderModel::Tasks(render_tasks(s, view, limits)),
        Snapshot::Workers(s) => RenderModel::Workers(render_workers(s, view, limits)),
        Snapshot::Batches(s) => RenderModel::Batches(render_batches(s, view, limits)),
        Snapshot::Jobs(s) => RenderModel::Jobs(render_jobs(s, view, limits)),
    }
}

/// Last `max_chars` characters of `text`, and whether anything was cut.
pub fn tail_slice(text: &str, max_chars: usize) -> (String, bool) {
    let count = text.chars().count();
    if count <= max_chars {
        return (text.to_string(), false);
    }
    (text.chars().skip(count - max_chars).collect(), true)
}

fn head_split(text: &str, max_chars: usize) -> (String, Option<String>) {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => (text[..idx].to_string(), Some(text[idx..].to_string())),
        None => (text.to_string(), None),
    }
}

fn panel(view: &ViewStateStore, key: PanelKey, text: &str, max_chars: usize) -> PanelView {
    let (text, truncated) = tail_slice(text, max_chars);
    PanelView {
        key,
        state: view.expansion(key),
        text,
        truncated,
    }
}

fn pending(view: &ViewStateStore, row: &RowRef) -> Option<PendingView> {
    view.confirmation(row).map(|cmd: &Command| PendingView {
        prompt: cmd.confirmation_prompt(),
        scoped: cmd.has_scope_choice(),
    })
}

fn editing(view: &ViewStateStore, target: EditTarget) -> Option<String> {
    view.edit()
        .filter(|s| s.target == target)
        .map(|s| s.buffer.clone())
}

fn or_dash(value: Option<&str>) -> String {
    value.unwrap_or("-").to_string()
}

pub fn task_actions(status: TaskStatus) -> Vec<RowAction> {
    let mut actions = Vec::new();
    match status {
        TaskStatus::Paused => actions.push(RowAction::Resume),
        TaskStatus::Running => {
            actions.extend([RowAction::Pause, RowAction::Stop, RowAction::Break])
        }
        _ => {}
    }
    actions.extend([
        RowAction::Restart,
        RowAction::Download,
        RowAction::Delete,
        RowAction::EditCommand,
    ]);
    actions
}

fn task_row(task: &TaskRecord, view: &ViewStateStore, limits: &RenderLimits) -> TaskRow {
    let id = task.task_id;
    let output = |text: &Option<String>, which: Panel| {
        text.as_deref()
            .map(|t| panel(view, PanelKey::new(which, id), t, limits.max_output_chars))
    };
    TaskRow {
        task_id: id,
        execution_id: task.execution_id,
        name: or_dash(task.name.as_deref()),
        status: task.status,
        worker: or_dash(task.worker_name.as_deref()),
        batch: or_dash(task.batch.as_deref()),
        created: display_timestamp(task.creation_date),
        runtime: elapsed_seconds(task.creation_date, task.modification_date)
            .map(format_runtime)
            .unwrap_or_default(),
        command: panel(
            view,
            PanelKey::new(Panel::Command, id),
            &task.command,
            limits.max_output_chars,
        ),
        stdout: output(&task.output, Panel::Stdout),
        stderr: output(&task.error, Panel::Stderr),
        actions: task_actions(task.status),
        pending: pending(view, &RowRef::Task(id)),
        editing: editing(view, EditTarget::TaskCommand(id)),
    }
}

fn filter_choices(filters: &FilterState, snapshot: &TasksSnapshot) -> FilterChoices {
    FilterChoices {
        status: filters.get(FilterDimension::Status),
        worker: filters.get(FilterDimension::Worker),
        batch: filters.get(FilterDimension::Batch),
        sort: filters.get(FilterDimension::Sort),
        workers: snapshot.worker_list.clone(),
        batches: snapshot.batch_list.clone(),
    }
}

pub fn render_tasks(
    snapshot: &TasksSnapshot,
    view: &ViewStateStore,
    limits: &RenderLimits,
) -> TaskTable {
    let filters = view.filters();
    let admitted: Vec<&TaskRecord> = snapshot.tasks.iter().filter(|t| filters.admits(t)).collect();
    let hidden = admitted.len().saturating_sub(limits.max_rows);
    TaskTable {
        rows: admitted
            .into_iter()
            .take(limits.max_rows)
            .map(|t| task_row(t, view, limits))
            .collect(),
        hidden,
        filters: filter_choices(filters, snapshot),
    }
}

fn worker_actions(status: WorkerStatus) -> Vec<RowAction> {
    let toggle = if status == WorkerStatus::Paused {
        RowAction::Resume
    } else {
        RowAction::Pause
    };
    vec![
        toggle,
        RowAction::Clean,
        RowAction::Restart,
        RowAction::Delete,
        RowAction::ChangeBatch,
        RowAction::Concurrency,
        RowAction::Prefetch,
    ]
}

fn telemetry(stats: Option<&WorkerTelemetry>) -> TelemetryView {
    match stats {
        Some(WorkerTelemetry::Structured(s)) => TelemetryView::Stats {
            load: s.load.to_string(),
            disk_usage: s.disk.usage.clone(),
            disk_io: format!("{} / {}", s.disk.speed, s.disk.counter),
            network_io: format!("{} / {}", s.network.speed, s.network.counter),
        },
        _ => TelemetryView::Absent,
    }
}

fn worker_row(worker: &WorkerRecord, view: &ViewStateStore) -> WorkerRow {
    let metric = |m: &Option<crate::model::Metric>| {
        m.as_ref().map(ToString::to_string).unwrap_or_else(|| "-".into())
    };
    WorkerRow {
        worker_id: worker.worker_id,
        name: worker.name.clone(),
        batch: or_dash(worker.batch.as_deref()),
        status: worker.status,
        indicator: worker.status.indicator(),
        concurrency: worker.concurrency,
        prefetch: worker.prefetch,
        accepted: worker.accepted,
        running: worker.running,
        succeeded: worker.succeeded,
        failed: worker.failed,
        total: worker.total,
        load: metric(&worker.load),
        memory: metric(&worker.memory),
        telemetry: telemetry(worker.stats.as_ref()),
        actions: worker_actions(worker.status),
        pending: pending(view, &RowRef::Worker(worker.worker_id)),
        editing: editing(view, EditTarget::WorkerBatch(worker.worker_id)),
    }
}

pub fn render_workers(
    snapshot: &WorkersSnapshot,
    view: &ViewStateStore,
    limits: &RenderLimits,
) -> WorkerTable {
    WorkerTable {
        rows: snapshot
            .workers
            .iter()
            .take(limits.max_rows)
            .map(|w| worker_row(w, view))
            .collect(),
        hidden: snapshot.workers.len().saturating_sub(limits.max_rows),
        tasks_per_status: TaskStatus::ALL
            .into_iter()
            .map(|s| (s, snapshot.tasks_per_status.get(&s).copied().unwrap_or(0)))
            .collect(),
        launch_pending: pending(view, &RowRef::NewWorkers),
    }
}

pub fn render_batches(
    snapshot: &BatchesSnapshot,
    view: &ViewStateStore,
    limits: &RenderLimits,
) -> BatchTable {
    let records = snapshot.records();
    let hidden = records.len().saturating_sub(limits.max_rows);
    let rows = records
        .into_iter()
        .take(limits.max_rows)
        .map(|b| {
            let total = b.total();
            let succeeded = b.count(TaskStatus::Succeeded);
            let failed = b.count(TaskStatus::Failed);
            let progress = if total == 0 {
                0.0
            } else {
                (succeeded + failed) as f64 * 100.0 / total as f64
            };
            let row_ref = RowRef::Batch(b.name.clone().unwrap_or_default());
            BatchRow {
                name: or_dash(b.name.as_deref()),
                pending: b.waiting(),
                running: b.running(),
                succeeded,
                failed,
                total,
                progress,
                stats: b
                    .stats
                    .iter()
                    .map(|(status, s)| {
                        format!("{status}: {:.2} [{:.2} - {:.2}]", s.avg, s.min, s.max)
                    })
                    .collect(),
                actions: vec![
                    RowAction::Pause,
                    RowAction::Go,
                    RowAction::Stop,
                    RowAction::Break,
                    RowAction::Clear,
                ],
                pending_confirmation: pending(view, &row_ref),
                workers: b.workers,
            }
        })
        .collect();
    BatchTable { rows, hidden }
}

fn job_actions(status: JobStatus) -> Vec<RowAction> {
    let mut actions = Vec::new();
    if matches!(
        status,
        JobStatus::Succeeded | JobStatus::Failed | JobStatus::Pending
    ) {
        actions.push(RowAction::Delete);
    }
    if status == JobStatus::Failed {
        actions.push(RowAction::Restart);
    }
    actions
}

fn job_row(job: &JobRecord, view: &ViewStateStore, limits: &RenderLimits) -> JobRow {
    let (log_head, rest) =
        head_split(job.log.as_deref().unwrap_or(""), limits.job_log_preview_chars);
    let log_rest = rest.map(|rest| {
        panel(
            view,
            PanelKey::new(Panel::JobLog, job.job_id),
            &rest,
            limits.max_output_chars,
        )
    });
    JobRow {
        job_id: job.job_id,
        action: job.action_label().to_string(),
        target: or_dash(job.target.as_deref()),
        status: job.status,
        indicator: job.status.indicator(),
        log_head,
        log_rest,
        progression: job.progression,
        updated: display_timestamp(job.modification_date),
        actions: job_actions(job.status),
        pending: pending(view, &RowRef::Job(job.job_id)),
    }
}

pub fn render_jobs(
    snapshot: &JobsSnapshot,
    view: &ViewStateStore,
    limits: &RenderLimits,
) -> JobTable {
    JobTable {
        rows: snapshot
            .jobs
            .iter()
            .take(limits.max_rows)
            .map(|j| job_row(j, view, limits))
            .collect(),
        hidden: snapshot.jobs.len().saturating_sub(limits.max_rows),
        delete_all_pending: pending(view, &RowRef::AllJobs),
    }
}
