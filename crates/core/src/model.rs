use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

use crate::command::AUTO;
use crate::error::{ParseError, SnapshotError};
use crate::time::opt_naive_utc;

/// Entity class a snapshot (and a dashboard tab) is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Tasks,
    Workers,
    Batches,
    Jobs,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Tasks,
        EntityKind::Workers,
        EntityKind::Batches,
        EntityKind::Jobs,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Tasks => "tasks",
            EntityKind::Workers => "workers",
            EntityKind::Batches => "batches",
            EntityKind::Jobs => "jobs",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tasks" | "task" => Ok(EntityKind::Tasks),
            "workers" | "worker" => Ok(EntityKind::Workers),
            "batches" | "batch" => Ok(EntityKind::Batches),
            "jobs" | "job" => Ok(EntityKind::Jobs),
            other => Err(ParseError::unknown("view", other)),
        }
    }
}

/// Lifecycle status of a task as reported by the server. Batch aggregates
/// also carry execution statuses such as `refused`. Anything else decodes
/// as `Unknown` instead of failing the whole snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    Accepted,
    Running,
    Paused,
    Succeeded,
    Failed,
    /// Held back until the workflow steps it depends on are done.
    Waiting,
    Debug,
    Refused,
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    /// Statuses an operator can filter on.
    pub const ALL: [TaskStatus; 9] = [
        TaskStatus::Pending,
        TaskStatus::Assigned,
        TaskStatus::Accepted,
        TaskStatus::Running,
        TaskStatus::Paused,
        TaskStatus::Succeeded,
        TaskStatus::Failed,
        TaskStatus::Waiting,
        TaskStatus::Debug,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Assigned => "assigned",
            TaskStatus::Accepted => "accepted",
            TaskStatus::Running => "running",
            TaskStatus::Paused => "paused",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::Waiting => "waiting",
            TaskStatus::Debug => "debug",
            TaskStatus::Refused => "refused",
            TaskStatus::Unknown => "unknown",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }

    /// Waiting to run: not yet picked up, or picked up but not started.
    pub fn is_waiting(self) -> bool {
        matches!(
            self,
            TaskStatus::Pending | TaskStatus::Assigned | TaskStatus::Accepted
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| ParseError::unknown("task status", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Running,
    Paused,
    Offline,
    Failed,
    /// Spot instance reclaimed by its provider.
    Evicted,
    #[serde(other)]
    Unknown,
}

impl WorkerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerStatus::Running => "running",
            WorkerStatus::Paused => "paused",
            WorkerStatus::Offline => "offline",
            WorkerStatus::Failed => "failed",
            WorkerStatus::Evicted => "evicted",
            WorkerStatus::Unknown => "unknown",
        }
    }

    /// Indicator class used to color the status dot.
    pub fn indicator(self) -> &'static str {
        match self {
            WorkerStatus::Failed => "danger",
            WorkerStatus::Paused => "warning",
            WorkerStatus::Offline => "secondary",
            WorkerStatus::Running => "primary",
            WorkerStatus::Evicted | WorkerStatus::Unknown => "dark",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Unknown => "unknown",
        }
    }

    pub fn indicator(self) -> &'static str {
        match self {
            JobStatus::Succeeded => "success",
            JobStatus::Pending => "secondary",
            JobStatus::Running => "warning",
            JobStatus::Failed => "danger",
            JobStatus::Unknown => "dark",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One task with its latest execution, as listed on the tasks tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: u64,
    #[serde(default)]
    pub name: Option<String>,
    /// Changes every time the same task is retried.
    #[serde(default)]
    pub execution_id: Option<u64>,
    pub status: TaskStatus,
    #[serde(default)]
    pub batch: Option<String>,
    #[serde(default)]
    pub worker_name: Option<String>,
    #[serde(default)]
    pub worker_id: Option<u64>,
    pub command: String,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, with = "opt_naive_utc")]
    pub creation_date: Option<NaiveDateTime>,
    #[serde(default, with = "opt_naive_utc")]
    pub modification_date: Option<NaiveDateTime>,
}

/// Scalar telemetry value; the server sends either numbers or preformatted text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Metric {
    Number(f64),
    Text(String),
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Number(n) => write!(f, "{n}"),
            Metric::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskStats {
    #[serde(default)]
    pub usage: Vec<String>,
    pub speed: Metric,
    pub counter: Metric,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub speed: Metric,
    pub counter: Metric,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub load: Metric,
    pub disk: DiskStats,
    pub network: NetworkStats,
}

/// Worker resource telemetry. Older workers report free-form payloads, so
/// anything that does not have the structured shape is kept as raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerTelemetry {
    Structured(WorkerStats),
    Unstructured(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub worker_id: u64,
    pub name: String,
    #[serde(default)]
    pub batch: Option<String>,
    pub status: WorkerStatus,
    pub concurrency: u32,
    pub prefetch: u32,
    #[serde(default)]
    pub accepted: u64,
    #[serde(default)]
    pub running: u64,
    #[serde(default)]
    pub succeeded: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub load: Option<Metric>,
    #[serde(default)]
    pub memory: Option<Metric>,
    #[serde(default)]
    pub stats: Option<WorkerTelemetry>,
}

/// One (batch, status) aggregate row. Durations are in hours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStatusRow {
    #[serde(default)]
    pub batch: Option<String>,
    pub status: TaskStatus,
    pub count: u64,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub avg: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchWorkers {
    #[serde(default)]
    pub batch: Option<String>,
    #[serde(default)]
    pub workers: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DurationStats {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

/// A batch folded from its per-status rows.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRecord {
    pub name: Option<String>,
    pub counts: BTreeMap<TaskStatus, u64>,
    pub stats: Vec<(TaskStatus, DurationStats)>,
    pub workers: Vec<String>,
}

impl BatchRecord {
    pub fn count(&self, status: TaskStatus) -> u64 {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn running(&self) -> u64 {
        self.count(TaskStatus::Running) + self.count(TaskStatus::Paused)
    }

    pub fn waiting(&self) -> u64 {
        TaskStatus::ALL
            .into_iter()
            .filter(|s| s.is_waiting())
            .map(|s| self.count(s))
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: u64,
    #[serde(default)]
    pub target: Option<String>,
    pub action: String,
    pub status: JobStatus,
    #[serde(default)]
    pub log: Option<String>,
    #[serde(default)]
    pub progression: Option<f64>,
    #[serde(default)]
    pub args: Option<serde_json::Value>,
    #[serde(default, with = "opt_naive_utc")]
    pub modification_date: Option<NaiveDateTime>,
}

impl JobRecord {
    pub fn action_label(&self) -> &str {
        match self.action.as_str() {
            "worker_create" => "Create worker",
            "worker_deploy" => "Deploy worker",
            "worker_destroy" => "Destroy worker",
            other => other,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TasksSnapshot {
    pub tasks: Vec<TaskRecord>,
    #[serde(default, deserialize_with = "names_skipping_null")]
    pub batch_list: Vec<String>,
    #[serde(default, deserialize_with = "names_skipping_null")]
    pub worker_list: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkersSnapshot {
    pub workers: Vec<WorkerRecord>,
    #[serde(default)]
    pub tasks_per_status: BTreeMap<TaskStatus, u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchesSnapshot {
    pub batches: Vec<BatchStatusRow>,
    #[serde(default)]
    pub workers: Vec<BatchWorkers>,
}

impl BatchesSnapshot {
    /// Folds the per-status rows into one record per batch, keeping the
    /// order in which batches first appear.
    pub fn records(&self) -> Vec<BatchRecord> {
        let mut records: Vec<BatchRecord> = Vec::new();
        for row in &self.batches {
            let idx = match records.iter().position(|r| r.name == row.batch) {
                Some(idx) => idx,
                None => {
                    records.push(BatchRecord {
                        name: row.batch.clone(),
                        counts: BTreeMap::new(),
                        stats: Vec::new(),
                        workers: self.workers_of(row.batch.as_deref()),
                    });
                    records.len() - 1
                }
            };
            let record = &mut records[idx];
            *record.counts.entry(row.status).or_insert(0) += row.count;
            if let (Some(min), Some(avg), Some(max)) = (row.min, row.avg, row.max) {
                record.stats.push((row.status, DurationStats { min, avg, max }));
            }
        }
        records
    }

    fn workers_of(&self, batch: Option<&str>) -> Vec<String> {
        self.workers
            .iter()
            .filter(|w| w.batch.as_deref() == batch)
            .flat_map(|w| w.workers.split(','))
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobsSnapshot {
    pub jobs: Vec<JobRecord>,
}

/// An instance type one provider offers in one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flavor {
    pub name: String,
    pub provider: String,
    pub region: String,
    #[serde(default)]
    pub cpu: Option<Metric>,
    #[serde(default)]
    pub ram: Option<Metric>,
    #[serde(default)]
    pub disk: Option<Metric>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub gpu: Option<Metric>,
}

/// Launch choices for new workers, read once from the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlavorList {
    #[serde(default)]
    pub list: Vec<Flavor>,
    #[serde(default)]
    pub date: Option<String>,
}

impl FlavorList {
    pub fn decode(body: &[u8]) -> Result<FlavorList, SnapshotError> {
        serde_json::from_slice(body).map_err(SnapshotError::MalformedFlavors)
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn offers(&self, name: &str) -> bool {
        self.list.iter().any(|f| f.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        distinct(self.list.iter().map(|f| f.name.as_str()))
    }

    /// Regions, led by `auto`.
    pub fn regions(&self) -> Vec<&str> {
        distinct(std::iter::once(AUTO).chain(self.list.iter().map(|f| f.region.as_str())))
    }

    /// Providers, led by `auto`.
    pub fn providers(&self) -> Vec<&str> {
        distinct(std::iter::once(AUTO).chain(self.list.iter().map(|f| f.provider.as_str())))
    }
}

fn distinct<'a>(items: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut out: Vec<&str> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

/// One full, replacing read of server state for an entity kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Tasks(TasksSnapshot),
    Workers(WorkersSnapshot),
    Batches(BatchesSnapshot),
    Jobs(JobsSnapshot),
}

impl Snapshot {
    pub fn kind(&self) -> EntityKind {
        match self {
            Snapshot::Tasks(_) => EntityKind::Tasks,
            Snapshot::Workers(_) => EntityKind::Workers,
            Snapshot::Batches(_) => EntityKind::Batches,
            Snapshot::Jobs(_) => EntityKind::Jobs,
        }
    }

    /// Decodes and validates a response body. A snapshot that fails either
    /// step is rejected as a whole; nothing partial is ever returned.
    pub fn decode(kind: EntityKind, body: &[u8]) -> Result<Snapshot, SnapshotError> {
        let malformed = |source| SnapshotError::Malformed { kind, source };
        let snapshot = match kind {
            EntityKind::Tasks => Snapshot::Tasks(serde_json::from_slice(body).map_err(malformed)?),
            EntityKind::Workers => {
                Snapshot::Workers(serde_json::from_slice(body).map_err(malformed)?)
            }
            EntityKind::Batches => {
                Snapshot::Batches(serde_json::from_slice(body).map_err(malformed)?)
            }
            EntityKind::Jobs => Snapshot::Jobs(serde_json::from_slice(body).map_err(malformed)?),
        };
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn validate(&self) -> Result<(), SnapshotError> {
        match self {
            Snapshot::Tasks(s) => unique_ids(EntityKind::Tasks, s.tasks.iter().map(|t| t.task_id)),
            Snapshot::Workers(s) => {
                unique_ids(EntityKind::Workers, s.workers.iter().map(|w| w.worker_id))
            }
            Snapshot::Batches(_) => Ok(()),
            Snapshot::Jobs(s) => {
                unique_ids(EntityKind::Jobs, s.jobs.iter().map(|j| j.job_id))?;
                for job in &s.jobs {
                    if let Some(value) = job.progression {
                        if !(0.0..=100.0).contains(&value) {
                            return Err(SnapshotError::ProgressOutOfRange {
                                job_id: job.job_id,
                                value,
                            });
                        }
                    }
                }
                Ok(())
            }
        }
    }

    pub fn as_tasks(&self) -> Option<&TasksSnapshot> {
        match self {
            Snapshot::Tasks(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_workers(&self) -> Option<&WorkersSnapshot> {
        match self {
            Snapshot::Workers(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_workers_mut(&mut self) -> Option<&mut WorkersSnapshot> {
        match self {
            Snapshot::Workers(s) => Some(s),
            _ => None,
        }
    }
}

fn unique_ids(kind: EntityKind, ids: impl Iterator<Item = u64>) -> Result<(), SnapshotError> {
    let mut seen = BTreeSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(SnapshotError::DuplicateId { kind, id });
        }
    }
    Ok(())
}

fn names_skipping_null<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<Option<String>>> = Option::deserialize(deserializer)?;
    Ok(raw.unwrap_or_default().into_iter().flatten().collect())
}
