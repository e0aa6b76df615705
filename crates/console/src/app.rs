//! Application state owned by the poll loop: the current snapshot, the
//! view store, the gate and the last rendered frame.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use taskdeck_core::{
    render, BatchScope, Command, EditTarget, EntityKind, FilterDimension, FlavorList, Panel,
    PanelKey, RenderLimits, RenderModel, RowRef, Snapshot, TaskAction, VisibilityGate,
    ViewStateStore, WorkerAction,
};
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::fetcher::FetchRequest;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportRequest {
    All(PathBuf),
    Task { task_id: u64, dir: PathBuf },
}

/// Operator intent, produced by the input parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserEvent {
    SwitchView(EntityKind),
    SetFilter(FilterDimension, String),
    Toggle(Panel, u64),
    Request(Command),
    Confirm {
        row: Option<RowRef>,
        scope: Option<BatchScope>,
    },
    Cancel(Option<RowRef>),
    BeginEdit(EditTarget),
    EditText(String),
    SubmitEdit,
    CancelEdit,
    SetHidden(bool),
    Pause,
    Resume,
    Refresh,
    Export(ExportRequest),
    Quit,
}

/// What the loop has to do after an event was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Redraw,
    Refetch,
    Dispatch(Command),
    Export(ExportRequest),
    Quit,
}

/// Last thing worth telling the operator about, shown on the status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    FetchFailed(String),
    SnapshotRejected(String),
    Dispatched { command: String },
    DispatchFailed { command: String, error: String },
    Info(String),
}

impl Notice {
    fn is_fetch_failure(&self) -> bool {
        matches!(self, Notice::FetchFailed(_) | Notice::SnapshotRejected(_))
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::FetchFailed(e) => write!(f, "fetch failed: {e}"),
            Notice::SnapshotRejected(e) => write!(f, "snapshot rejected: {e}"),
            Notice::Dispatched { command } => write!(f, "sent: {command}"),
            Notice::DispatchFailed { command, error } => write!(f, "{command} failed: {error}"),
            Notice::Info(msg) => f.write_str(msg),
        }
    }
}

pub struct App {
    kind: EntityKind,
    view: ViewStateStore,
    gate: VisibilityGate,
    limits: RenderLimits,
    snapshot: Option<Snapshot>,
    frame: Option<RenderModel>,
    notice: Option<Notice>,
    interval: Duration,
    operator_hold: bool,
    refreshes: u64,
    flavors: FlavorList,
}

impl App {
    pub fn new(kind: EntityKind, limits: RenderLimits) -> Self {
        Self {
            kind,
            view: ViewStateStore::new(),
            gate: VisibilityGate::default(),
            limits,
            snapshot: None,
            frame: None,
            notice: None,
            interval: Duration::ZERO,
            operator_hold: false,
            refreshes: 0,
            flavors: FlavorList::default(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn view(&self) -> &ViewStateStore {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut ViewStateStore {
        &mut self.view
    }

    pub fn gate(&self) -> &VisibilityGate {
        &self.gate
    }

    pub fn gate_mut(&mut self) -> &mut VisibilityGate {
        &mut self.gate
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn frame(&self) -> Option<&RenderModel> {
        self.frame.as_ref()
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn refreshes(&self) -> u64 {
        self.refreshes
    }

    pub fn flavors(&self) -> &FlavorList {
        &self.flavors
    }

    pub fn set_flavors(&mut self, flavors: FlavorList) {
        info!("{} flavors available", flavors.list.len());
        self.flavors = flavors;
    }

    pub fn fetch_request(&self) -> FetchRequest {
        FetchRequest::from_view(self.kind, &self.view)
    }

    /// Replaces the snapshot and re-renders. Responses for another view
    /// (the operator switched tabs mid-flight) are dropped.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) -> bool {
        if snapshot.kind() != self.kind {
            debug!(
                "dropping {} snapshot, view is now {}",
                snapshot.kind(),
                self.kind
            );
            return false;
        }
        if let Some(tasks) = snapshot.as_tasks() {
            self.view.reconcile_filters(tasks);
        }
        self.snapshot = Some(snapshot);
        self.refreshes += 1;
        if self.notice.as_ref().is_some_and(Notice::is_fetch_failure) {
            self.notice = None;
        }
        self.rerender();
        true
    }

    /// Keeps the previous frame and surfaces the failure.
    pub fn record_failure(&mut self, err: &FetchError) {
        warn!("refresh failed: {err}");
        self.notice = Some(match err {
            FetchError::Snapshot(e) => Notice::SnapshotRejected(e.to_string()),
            other => Notice::FetchFailed(other.to_string()),
        });
    }

    pub fn note(&mut self, notice: Notice) {
        self.notice = Some(notice);
    }

    fn rerender(&mut self) {
        if let Some(snapshot) = &self.snapshot {
            self.frame = Some(render(snapshot, &self.view, &self.limits));
        }
    }

    /// Unpauses once nothing holds the loop any more.
    fn release_gate(&mut self) {
        if !self.operator_hold && !self.view.has_open_interaction() {
            self.gate.unpause();
        }
    }

    fn optimistic(&mut self, command: &Command) {
        if let Some(snapshot) = self.snapshot.as_mut() {
            if command.apply_optimistic(snapshot) {
                self.rerender();
            }
        }
    }

    fn send(&mut self, command: Command) -> Vec<Effect> {
        self.optimistic(&command);
        vec![Effect::Redraw, Effect::Dispatch(command)]
    }

    fn execution_of(&self, task_id: u64) -> Option<u64> {
        self.snapshot
            .as_ref()?
            .as_tasks()?
            .tasks
            .iter()
            .find(|t| t.task_id == task_id)?
            .execution_id
    }

    fn edit_original(&self, target: EditTarget) -> Option<String> {
        let snapshot = self.snapshot.as_ref()?;
        match target {
            EditTarget::TaskCommand(id) => snapshot
                .as_tasks()?
                .tasks
                .iter()
                .find(|t| t.task_id == id)
                .map(|t| t.command.clone()),
            EditTarget::WorkerBatch(id) => snapshot
                .as_workers()?
                .workers
                .iter()
                .find(|w| w.worker_id == id)
                .map(|w| w.batch.clone().unwrap_or_default()),
        }
    }

    pub fn handle(&mut self, event: UserEvent) -> Vec<Effect> {
        match event {
            UserEvent::SwitchView(kind) => {
                if kind == self.kind {
                    return Vec::new();
                }
                info!("switching view to {kind}");
                self.kind = kind;
                self.snapshot = None;
                self.frame = None;
                self.view.clear_all();
                self.view.dismiss_interactions();
                self.release_gate();
                vec![Effect::Redraw, Effect::Refetch]
            }
            UserEvent::SetFilter(dim, value) => match self.view.set_filter(dim, &value) {
                Ok(true) => {
                    self.rerender();
                    vec![Effect::Redraw, Effect::Refetch]
                }
                Ok(false) => Vec::new(),
                Err(e) => {
                    self.note(Notice::Info(e.to_string()));
                    vec![Effect::Redraw]
                }
            },
            UserEvent::Toggle(panel, id) => {
                let exec = if panel.wants_detail() {
                    self.execution_of(id)
                } else {
                    None
                };
                self.view.toggle_with_execution(PanelKey::new(panel, id), exec);
                self.rerender();
                vec![Effect::Redraw]
            }
            UserEvent::Request(command) => {
                if let Command::CreateWorkers(launch) = &command {
                    // An empty list means the server never answered; let it judge.
                    if !self.flavors.is_empty() && !self.flavors.offers(&launch.flavor) {
                        self.note(Notice::Info(format!(
                            "unknown flavor {}, try one of: {}",
                            launch.flavor,
                            self.flavors.names().join(", ")
                        )));
                        return vec![Effect::Redraw];
                    }
                }
                if command.requires_confirmation() {
                    self.view.request_confirmation(command);
                    self.gate.pause();
                    self.rerender();
                    vec![Effect::Redraw]
                } else {
                    self.send(command)
                }
            }
            UserEvent::Confirm { row, scope } => {
                let Some(row) = row.or_else(|| self.view.first_confirmation().cloned()) else {
                    self.note(Notice::Info("nothing to confirm".into()));
                    return vec![Effect::Redraw];
                };
                let Some(mut command) = self.view.take_confirmation(&row) else {
                    self.note(Notice::Info(format!("nothing pending on {row}")));
                    return vec![Effect::Redraw];
                };
                if let Some(scope) = scope {
                    command = command.with_batch_scope(scope);
                }
                self.release_gate();
                self.rerender();
                self.send(command)
            }
            UserEvent::Cancel(row) => {
                let row = row.or_else(|| self.view.first_confirmation().cloned());
                if let Some(row) = row {
                    self.view.take_confirmation(&row);
                }
                self.release_gate();
                self.rerender();
                vec![Effect::Redraw]
            }
            UserEvent::BeginEdit(target) => {
                let Some(original) = self.edit_original(target) else {
                    self.note(Notice::Info(format!("{target:?} is not on screen")));
                    return vec![Effect::Redraw];
                };
                if !self.view.begin_edit(target, original) {
                    self.note(Notice::Info("another edit is already open".into()));
                    return vec![Effect::Redraw];
                }
                self.gate.pause();
                self.rerender();
                vec![Effect::Redraw]
            }
            UserEvent::EditText(text) => {
                if !self.view.set_edit_text(&text) {
                    self.note(Notice::Info("no edit is open".into()));
                }
                self.rerender();
                vec![Effect::Redraw]
            }
            UserEvent::SubmitEdit => {
                let Some(session) = self.view.finish_edit() else {
                    self.note(Notice::Info("no edit is open".into()));
                    return vec![Effect::Redraw];
                };
                self.release_gate();
                self.rerender();
                if session.buffer == session.original {
                    return vec![Effect::Redraw];
                }
                let command = match session.target {
                    EditTarget::TaskCommand(task_id) => Command::Task {
                        task_id,
                        action: TaskAction::Modify {
                            command: session.buffer,
                        },
                    },
                    EditTarget::WorkerBatch(worker_id) => {
                        let batch = session.buffer.trim();
                        Command::Worker {
                            worker_id,
                            action: WorkerAction::ChangeBatch {
                                batch: (!batch.is_empty()).then(|| batch.to_string()),
                            },
                        }
                    }
                };
                self.send(command)
            }
            UserEvent::CancelEdit => {
                self.view.finish_edit();
                self.release_gate();
                self.rerender();
                vec![Effect::Redraw]
            }
            UserEvent::SetHidden(hidden) => {
                if self.gate.set_hidden(hidden) {
                    debug!(hidden, "visibility changed");
                }
                vec![Effect::Redraw]
            }
            UserEvent::Pause => {
                self.operator_hold = true;
                self.gate.pause();
                vec![Effect::Redraw]
            }
            UserEvent::Resume => {
                self.operator_hold = false;
                self.release_gate();
                vec![Effect::Redraw]
            }
            UserEvent::Refresh => vec![Effect::Refetch],
            UserEvent::Export(request) => vec![Effect::Export(request)],
            UserEvent::Quit => vec![Effect::Quit],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskdeck_core::{CapacityField, ExpansionState, WorkerLaunch, WorkerStatus};

    fn workers_snapshot() -> Snapshot {
        Snapshot::decode(
            EntityKind::Workers,
            br#"{"workers": [{"worker_id": 3, "name": "n3", "batch": "b1", "status": "running",
                              "concurrency": 1, "prefetch": 0}]}"#,
        )
        .unwrap()
    }

    fn tasks_snapshot() -> Snapshot {
        Snapshot::decode(
            EntityKind::Tasks,
            br#"{"tasks": [{"task_id": 42, "execution_id": 7, "status": "running", "command": "ls",
                            "output": "hello"}], "batch_list": ["b1"]}"#,
        )
        .unwrap()
    }

    #[test]
    fn capacity_is_optimistic_and_unconfirmed() {
        let mut app = App::new(EntityKind::Workers, RenderLimits::default());
        app.apply_snapshot(workers_snapshot());
        let cmd = Command::Capacity {
            worker_id: 3,
            field: CapacityField::Concurrency,
            delta: 1,
        };
        let effects = app.handle(UserEvent::Request(cmd.clone()));
        assert_eq!(effects, vec![Effect::Redraw, Effect::Dispatch(cmd)]);
        let Some(RenderModel::Workers(table)) = app.frame() else {
            panic!("expected workers frame");
        };
        assert_eq!(table.rows[0].concurrency, 2);
        assert!(app.gate().may_poll());
    }

    #[test]
    fn confirmation_pauses_until_answered() {
        let mut app = App::new(EntityKind::Workers, RenderLimits::default());
        app.apply_snapshot(workers_snapshot());
        let pause = Command::Worker {
            worker_id: 3,
            action: WorkerAction::Pause,
        };
        assert_eq!(app.handle(UserEvent::Request(pause.clone())), vec![Effect::Redraw]);
        assert!(app.gate().is_paused());

        let effects = app.handle(UserEvent::Confirm {
            row: None,
            scope: None,
        });
        assert_eq!(effects, vec![Effect::Redraw, Effect::Dispatch(pause)]);
        assert!(!app.gate().is_paused());
        let snap = app.snapshot().unwrap().as_workers().unwrap();
        assert_eq!(snap.workers[0].status, WorkerStatus::Paused);
    }

    #[test]
    fn confirm_picks_the_named_row() {
        let mut app = App::new(EntityKind::Workers, RenderLimits::default());
        app.apply_snapshot(workers_snapshot());
        let clean = Command::Worker {
            worker_id: 3,
            action: WorkerAction::Clean,
        };
        app.handle(UserEvent::Request(Command::DeleteAllJobs));
        app.handle(UserEvent::Request(clean.clone()));

        let effects = app.handle(UserEvent::Confirm {
            row: Some(RowRef::Worker(3)),
            scope: None,
        });
        assert_eq!(effects, vec![Effect::Redraw, Effect::Dispatch(clean)]);
        assert!(app.view().confirmation(&RowRef::AllJobs).is_some());
        assert!(app.gate().is_paused());

        app.handle(UserEvent::Cancel(Some(RowRef::AllJobs)));
        assert!(app.view().confirmations().next().is_none());
        assert!(!app.gate().is_paused());
    }

    #[test]
    fn launch_checks_flavor_when_list_is_known() {
        let mut app = App::new(EntityKind::Workers, RenderLimits::default());
        let body = br#"{"list": [{"name": "s1-8", "provider": "ovh", "region": "GRA"}]}"#;
        app.set_flavors(FlavorList::decode(body).unwrap());
        let bogus = Command::CreateWorkers(WorkerLaunch::new("b2-7"));
        assert_eq!(app.handle(UserEvent::Request(bogus)), vec![Effect::Redraw]);
        assert!(matches!(app.notice(), Some(Notice::Info(msg)) if msg.contains("s1-8")));
        assert!(!app.gate().is_paused());

        let good = Command::CreateWorkers(WorkerLaunch::new("s1-8"));
        app.handle(UserEvent::Request(good.clone()));
        assert!(app.gate().is_paused());
        assert_eq!(app.view().confirmation(&RowRef::NewWorkers), Some(&good));
    }

    #[test]
    fn operator_hold_survives_confirmation() {
        let mut app = App::new(EntityKind::Workers, RenderLimits::default());
        app.apply_snapshot(workers_snapshot());
        app.handle(UserEvent::Pause);
        app.handle(UserEvent::Request(Command::Worker {
            worker_id: 3,
            action: WorkerAction::Clean,
        }));
        app.handle(UserEvent::Cancel(None));
        assert!(app.gate().is_paused());
        app.handle(UserEvent::Resume);
        assert!(!app.gate().is_paused());
    }

    #[test]
    fn unchanged_edit_sends_nothing() {
        let mut app = App::new(EntityKind::Workers, RenderLimits::default());
        app.apply_snapshot(workers_snapshot());
        app.handle(UserEvent::BeginEdit(EditTarget::WorkerBatch(3)));
        assert!(app.gate().is_paused());
        assert_eq!(app.handle(UserEvent::SubmitEdit), vec![Effect::Redraw]);
        assert!(!app.gate().is_paused());

        app.handle(UserEvent::BeginEdit(EditTarget::WorkerBatch(3)));
        app.handle(UserEvent::EditText("b2".into()));
        let effects = app.handle(UserEvent::SubmitEdit);
        assert!(matches!(effects.last(), Some(Effect::Dispatch(Command::Worker { .. }))));
        let snap = app.snapshot().unwrap().as_workers().unwrap();
        assert_eq!(snap.workers[0].batch.as_deref(), Some("b2"));
    }

    #[test]
    fn stdout_toggle_requests_detail() {
        let mut app = App::new(EntityKind::Tasks, RenderLimits::default());
        app.apply_snapshot(tasks_snapshot());
        app.handle(UserEvent::Toggle(Panel::Stdout, 42));
        assert_eq!(app.fetch_request().detail_ids, vec![7]);
        let Some(RenderModel::Tasks(table)) = app.frame() else {
            panic!("expected tasks frame");
        };
        assert_eq!(
            table.rows[0].stdout.as_ref().unwrap().state,
            ExpansionState::Expanded
        );
        app.handle(UserEvent::Toggle(Panel::Stdout, 42));
        assert!(app.fetch_request().detail_ids.is_empty());
    }

    #[test]
    fn filter_change_asks_for_refetch() {
        let mut app = App::new(EntityKind::Tasks, RenderLimits::default());
        app.apply_snapshot(tasks_snapshot());
        let effects = app.handle(UserEvent::SetFilter(FilterDimension::Status, "failed".into()));
        assert_eq!(effects, vec![Effect::Redraw, Effect::Refetch]);
        assert!(app
            .handle(UserEvent::SetFilter(FilterDimension::Status, "failed".into()))
            .is_empty());
    }

    #[test]
    fn stale_kind_is_dropped() {
        let mut app = App::new(EntityKind::Tasks, RenderLimits::default());
        app.handle(UserEvent::SwitchView(EntityKind::Workers));
        assert!(!app.apply_snapshot(tasks_snapshot()));
        assert!(app.frame().is_none());
    }
}
