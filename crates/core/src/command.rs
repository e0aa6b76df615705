//! User intents that mutate server state, and how each maps onto the wire.

use std::fmt;

use crate::model::{Snapshot, WorkerStatus};

/// Row a confirmation slot is attached to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RowRef {
    Task(u64),
    Worker(u64),
    Batch(String),
    Job(u64),
    AllJobs,
    /// The launch form on the workers tab.
    NewWorkers,
}

impl fmt::Display for RowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowRef::Task(id) => write!(f, "task {id}"),
            RowRef::Worker(id) => write!(f, "worker {id}"),
            RowRef::Batch(name) => write!(f, "batch {name}"),
            RowRef::Job(id) => write!(f, "job {id}"),
            RowRef::AllJobs => f.write_str("all jobs"),
            RowRef::NewWorkers => f.write_str("new workers"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskAction {
    Pause,
    Resume,
    Stop,
    Break,
    Restart,
    Delete,
    Modify { command: String },
}

impl TaskAction {
    pub fn wire_name(&self) -> &'static str {
        match self {
            TaskAction::Pause => "pause",
            TaskAction::Resume => "resume",
            TaskAction::Stop => "stop",
            TaskAction::Break => "break",
            TaskAction::Restart => "restart",
            TaskAction::Delete => "delete",
            TaskAction::Modify { .. } => "modify",
        }
    }
}

/// Whether a batch pause or go also touches tasks already in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchScope {
    #[default]
    WithTasks,
    BatchOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchAction {
    Pause(BatchScope),
    Go(BatchScope),
    Stop,
    Break,
    Clear,
}

impl BatchAction {
    pub fn wire_name(self) -> &'static str {
        match self {
            BatchAction::Pause(BatchScope::WithTasks) => "pause",
            BatchAction::Pause(BatchScope::BatchOnly) => "simple pause",
            BatchAction::Go(BatchScope::WithTasks) => "go",
            BatchAction::Go(BatchScope::BatchOnly) => "simple go",
            BatchAction::Stop => "stop",
            BatchAction::Break => "break",
            BatchAction::Clear => "clear",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerAction {
    Pause,
    Resume,
    Clean,
    Restart,
    Delete,
    ChangeBatch { batch: Option<String> },
}

impl WorkerAction {
    pub fn verb(&self) -> &'static str {
        match self {
            WorkerAction::Pause => "pause",
            WorkerAction::Resume => "resume",
            WorkerAction::Clean => "clean",
            WorkerAction::Restart => "restart",
            WorkerAction::Delete => "delete",
            WorkerAction::ChangeBatch { .. } => "move",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityField {
    Concurrency,
    Prefetch,
}

impl CapacityField {
    pub fn as_str(self) -> &'static str {
        match self {
            CapacityField::Concurrency => "concurrency",
            CapacityField::Prefetch => "prefetch",
        }
    }

    fn endpoint_path(self) -> &'static str {
        match self {
            CapacityField::Concurrency => "/ui/concurrency_change",
            CapacityField::Prefetch => "/ui/prefetch_change",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobAction {
    Delete,
    Restart,
}

impl JobAction {
    pub fn verb(self) -> &'static str {
        match self {
            JobAction::Delete => "delete",
            JobAction::Restart => "restart",
        }
    }
}

/// Workers to recruit from a provider. Each one becomes a `worker_create`
/// job on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerLaunch {
    pub flavor: String,
    pub number: u32,
    pub concurrency: u32,
    pub prefetch: u32,
    pub region: String,
    pub provider: String,
    pub batch: Option<String>,
}

impl WorkerLaunch {
    /// One worker of `flavor`, region and provider left to the server.
    pub fn new(flavor: impl Into<String>) -> Self {
        WorkerLaunch {
            flavor: flavor.into(),
            number: 1,
            concurrency: 1,
            prefetch: 0,
            region: AUTO.to_string(),
            provider: AUTO.to_string(),
            batch: None,
        }
    }
}

/// Region or provider left for the server to pick.
pub const AUTO: &str = "auto";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Task { task_id: u64, action: TaskAction },
    Batch { name: String, action: BatchAction },
    Worker { worker_id: u64, action: WorkerAction },
    Capacity { worker_id: u64, field: CapacityField, delta: i32 },
    CreateWorkers(WorkerLaunch),
    Job { job_id: u64, action: JobAction },
    DeleteAllJobs,
}

/// Path and query parameters of a write request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub path: &'static str,
    pub params: Vec<(&'static str, String)>,
}

impl Endpoint {
    fn new(path: &'static str) -> Self {
        Endpoint {
            path,
            params: Vec::new(),
        }
    }

    fn param(mut self, key: &'static str, value: impl ToString) -> Self {
        self.params.push((key, value.to_string()));
        self
    }
}

impl Command {
    /// Capacity nudges go straight out. Edits are confirmed by submitting the
    /// edit session. Everything else waits for an explicit confirmation.
    pub fn requires_confirmation(&self) -> bool {
        match self {
            Command::Capacity { .. } => false,
            Command::Task {
                action: TaskAction::Modify { .. },
                ..
            } => false,
            Command::Worker {
                action: WorkerAction::ChangeBatch { .. },
                ..
            } => false,
            _ => true,
        }
    }

    pub fn row(&self) -> RowRef {
        match self {
            Command::Task { task_id, .. } => RowRef::Task(*task_id),
            Command::Batch { name, .. } => RowRef::Batch(name.clone()),
            Command::Worker { worker_id, .. } | Command::Capacity { worker_id, .. } => {
                RowRef::Worker(*worker_id)
            }
            Command::CreateWorkers(_) => RowRef::NewWorkers,
            Command::Job { job_id, .. } => RowRef::Job(*job_id),
            Command::DeleteAllJobs => RowRef::AllJobs,
        }
    }

    /// Re-scopes a batch pause or go; other commands come back unchanged.
    pub fn with_batch_scope(self, scope: BatchScope) -> Self {
        match self {
            Command::Batch {
                name,
                action: BatchAction::Pause(_),
            } => Command::Batch {
                name,
                action: BatchAction::Pause(scope),
            },
            Command::Batch {
                name,
                action: BatchAction::Go(_),
            } => Command::Batch {
                name,
                action: BatchAction::Go(scope),
            },
            other => other,
        }
    }

    /// True for batch pause and go, which offer a scope choice when confirmed.
    pub fn has_scope_choice(&self) -> bool {
        matches!(
            self,
            Command::Batch {
                action: BatchAction::Pause(_) | BatchAction::Go(_),
                ..
            }
        )
    }

    pub fn endpoint(&self) -> Endpoint {
        match self {
            Command::Task { task_id, action } => match action {
                TaskAction::Modify { command } => Endpoint::new("/ui/task/action")
                    .param("task_id", task_id)
                    .param("action", action.wire_name())
                    .param("modification", command),
                other => Endpoint::new("/ui/task/action")
                    .param("task_id", task_id)
                    .param("action", other.wire_name()),
            },
            Command::Batch { name, action } => Endpoint::new("/ui/batch/action")
                .param("name", name)
                .param("action", action.wire_name())
                .param("signal", 0),
            Command::Worker { worker_id, action } => match action {
                WorkerAction::Pause => Endpoint::new("/ui/pause_unpause_worker")
                    .param("id", worker_id)
                    .param("status", "paused"),
                WorkerAction::Resume => Endpoint::new("/ui/pause_unpause_worker")
                    .param("id", worker_id)
                    .param("status", "running"),
                WorkerAction::Clean => {
                    Endpoint::new("/ui/clean_worker").param("worker_id", worker_id)
                }
                WorkerAction::Restart => {
                    Endpoint::new("/ui/restart_worker").param("worker_id", worker_id)
                }
                WorkerAction::Delete => {
                    Endpoint::new("/ui/delete_worker").param("worker_id", worker_id)
                }
                WorkerAction::ChangeBatch { batch } => Endpoint::new("/ui/change_batch")
                    .param("worker_id", worker_id)
                    .param("batch_name", batch.as_deref().unwrap_or_default()),
            },
            Command::Capacity {
                worker_id,
                field,
                delta,
            } => Endpoint::new(field.endpoint_path())
                .param("object", "worker")
                .param("id", worker_id)
                .param("change", delta),
            Command::CreateWorkers(launch) => Endpoint::new("/ui/create_worker")
                .param("concurrency", launch.concurrency)
                .param("prefetch", launch.prefetch)
                .param("flavor", &launch.flavor)
                .param("region", &launch.region)
                .param("provider", &launch.provider)
                .param("batch", launch.batch.as_deref().unwrap_or_default())
                .param("number", launch.number),
            Command::Job { job_id, action } => match action {
                JobAction::Delete => Endpoint::new("/ui/delete_job").param("job_id", job_id),
                JobAction::Restart => Endpoint::new("/ui/restart_job").param("job_id", job_id),
            },
            Command::DeleteAllJobs => Endpoint::new("/ui/delete_jobs"),
        }
    }

    /// Question shown while the command waits for confirmation.
    pub fn confirmation_prompt(&self) -> String {
        match self {
            Command::Task { task_id, action } => {
                format!("{} task_{task_id}?", action.wire_name())
            }
            Command::Batch { name, action } => match action {
                BatchAction::Pause(_) => {
                    format!("pause batch {name}, with or without its running tasks?")
                }
                BatchAction::Go(_) => {
                    format!("relaunch batch {name}, with or without its paused tasks?")
                }
                other => format!("{} batch {name}?", other.wire_name()),
            },
            Command::Worker { worker_id, action } => {
                format!("{} worker {worker_id}?", action.verb())
            }
            Command::Capacity { .. } => self.to_string(),
            Command::CreateWorkers(launch) => format!(
                "launch {} x {} (concurrency {}, prefetch {}) in {}/{}{}?",
                launch.number,
                launch.flavor,
                launch.concurrency,
                launch.prefetch,
                launch.provider,
                launch.region,
                launch
                    .batch
                    .as_deref()
                    .map(|b| format!(" for batch {b}"))
                    .unwrap_or_default()
            ),
            Command::Job { job_id, action } => format!("{} job {job_id}?", action.verb()),
            Command::DeleteAllJobs => "delete every job?".to_string(),
        }
    }

    /// Applies the locally predictable part of the command to the current
    /// snapshot so the next render reflects it before the server confirms.
    /// Returns whether anything changed.
    pub fn apply_optimistic(&self, snapshot: &mut Snapshot) -> bool {
        let Some(workers) = snapshot.as_workers_mut() else {
            return false;
        };
        let RowRef::Worker(worker_id) = self.row() else {
            return false;
        };
        let Some(worker) = workers.workers.iter_mut().find(|w| w.worker_id == worker_id) else {
            return false;
        };
        match self {
            Command::Capacity { field, delta, .. } => {
                let slot = match field {
                    CapacityField::Concurrency => &mut worker.concurrency,
                    CapacityField::Prefetch => &mut worker.prefetch,
                };
                let next = (i64::from(*slot) + i64::from(*delta)).max(0);
                *slot = u32::try_from(next).unwrap_or(u32::MAX);
                true
            }
            Command::Worker { action, .. } => match action {
                WorkerAction::Pause => {
                    worker.status = WorkerStatus::Paused;
                    true
                }
                WorkerAction::Resume => {
                    worker.status = WorkerStatus::Running;
                    true
                }
                WorkerAction::ChangeBatch { batch } => {
                    worker.batch = batch.clone();
                    true
                }
                _ => false,
            },
            _ => false,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Task { task_id, action } => {
                write!(f, "{} task {task_id}", action.wire_name())
            }
            Command::Batch { name, action } => write!(f, "{} batch {name}", action.wire_name()),
            Command::Worker { worker_id, action } => match action {
                WorkerAction::ChangeBatch { batch } => write!(
                    f,
                    "move worker {worker_id} to {}",
                    batch.as_deref().unwrap_or("no batch")
                ),
                other => write!(f, "{} worker {worker_id}", other.verb()),
            },
            Command::Capacity {
                worker_id,
                field,
                delta,
            } => write!(f, "{} {delta:+} on worker {worker_id}", field.as_str()),
            Command::CreateWorkers(launch) => {
                write!(f, "create {} {} workers", launch.number, launch.flavor)
            }
            Command::Job { job_id, action } => write!(f, "{} job {job_id}", action.verb()),
            Command::DeleteAllJobs => f.write_str("delete all jobs"),
        }
    }
}
