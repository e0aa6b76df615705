use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use taskdeck_console::app::{App, ExportRequest, Notice, UserEvent};
use taskdeck_console::backend::Backend;
use taskdeck_console::dispatcher::CommandDispatcher;
use taskdeck_console::error::{DispatchError, FetchError};
use taskdeck_console::fetcher::FetchRequest;
use taskdeck_console::scheduler::{self, PollScheduler};
use taskdeck_core::{
    CapacityField, Command, Endpoint, EntityKind, FilterDimension, FlavorList, IntervalPolicy,
    Panel, RenderLimits, Snapshot, StatusFilter, TaskAction, TaskStatus,
};
use tokio::sync::mpsc;

const TASKS: &[u8] = br#"{
    "tasks": [{"task_id": 42, "execution_id": 7, "status": "running", "command": "sleep 60",
               "batch": "b1", "worker_name": "w1", "output": "tick"}],
    "batch_list": ["b1"], "worker_list": ["w1"]
}"#;

#[derive(Default)]
struct FakeState {
    requests: Vec<FetchRequest>,
    latencies: VecDeque<Duration>,
    ping_failures: VecDeque<bool>,
    sent: Vec<Endpoint>,
    in_flight: usize,
    max_in_flight: usize,
}

#[derive(Default)]
struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    fn with_latencies(latencies: &[u64]) -> Arc<Self> {
        let backend = FakeBackend::default();
        backend.state.lock().unwrap().latencies =
            latencies.iter().map(|s| Duration::from_secs(*s)).collect();
        Arc::new(backend)
    }

    fn requests(&self) -> Vec<FetchRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    fn sent(&self) -> Vec<Endpoint> {
        self.state.lock().unwrap().sent.clone()
    }
}

impl Backend for FakeBackend {
    async fn ping(&self) -> Result<(), FetchError> {
        let fail = self.state.lock().unwrap().ping_failures.pop_front().unwrap_or(false);
        if fail {
            Err(FetchError::Url("unreachable".into()))
        } else {
            Ok(())
        }
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Snapshot, FetchError> {
        let latency = {
            let mut state = self.state.lock().unwrap();
            state.requests.push(request.clone());
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            state.latencies.pop_front().unwrap_or_default()
        };
        tokio::time::sleep(latency).await;
        self.state.lock().unwrap().in_flight -= 1;
        Ok(Snapshot::decode(EntityKind::Tasks, TASKS)?)
    }

    async fn send(&self, endpoint: &Endpoint) -> Result<(), DispatchError> {
        self.state.lock().unwrap().sent.push(endpoint.clone());
        if endpoint.path == "/ui/delete_jobs" {
            return Err(DispatchError::Url("rejected".into()));
        }
        Ok(())
    }

    async fn flavors(&self) -> Result<FlavorList, FetchError> {
        Ok(FlavorList::default())
    }
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

fn app() -> App {
    App::new(EntityKind::Tasks, RenderLimits::default())
}

#[tokio::test(start_paused = true)]
async fn interval_stretches_after_slow_fetch_then_decays() {
    let backend = FakeBackend::with_latencies(&[12, 0, 0]);
    let (handle, inputs) = scheduler::channel(8);
    let mut app = app();

    let report = PollScheduler::new(backend.clone(), IntervalPolicy::default())
        .run(&mut app, inputs, |app| {
            if app.refreshes() == 3 {
                handle.cancel();
            }
        })
        .await;

    assert_eq!(report.cycles, 3);
    assert_eq!(report.intervals, vec![secs(12), secs(11), secs(10)]);
    assert_eq!(app.interval(), secs(10));
    assert_eq!(backend.requests().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn unreachable_server_skips_cycle_and_resets_interval() {
    let backend = FakeBackend::with_latencies(&[12]);
    backend.state.lock().unwrap().ping_failures = VecDeque::from([true]);
    let (handle, inputs) = scheduler::channel(8);
    let mut app = app();

    let report = PollScheduler::new(backend.clone(), IntervalPolicy::default())
        .run(&mut app, inputs, |app| {
            if app.refreshes() == 2 {
                handle.cancel();
            }
        })
        .await;

    assert_eq!(report.skipped, 1);
    assert_eq!(report.cycles, 2);
    assert_eq!(report.intervals, vec![secs(12), secs(5), secs(5)]);
    assert_eq!(backend.requests().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn filter_change_mid_fetch_is_queued_not_overlapped() {
    let backend = FakeBackend::with_latencies(&[2]);
    let (handle, inputs) = scheduler::channel(8);
    assert!(handle.try_send(UserEvent::SetFilter(
        FilterDimension::Status,
        "failed".into()
    )));
    let mut app = app();

    let report = PollScheduler::new(backend.clone(), IntervalPolicy::default())
        .run(&mut app, inputs, |app| {
            if app.refreshes() == 2 {
                handle.cancel();
            }
        })
        .await;

    let requests = backend.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].filters.status, StatusFilter::All);
    assert_eq!(
        requests[1].filters.status,
        StatusFilter::Is(TaskStatus::Failed)
    );
    assert_eq!(report.out_of_cycle, 1);
    assert_eq!(backend.state.lock().unwrap().max_in_flight, 1);
}

#[tokio::test(start_paused = true)]
async fn expanded_output_is_requested_in_full() {
    let backend = FakeBackend::with_latencies(&[]);
    let (handle, inputs) = scheduler::channel(8);
    let mut app = app();
    let mut asked = false;

    PollScheduler::new(backend.clone(), IntervalPolicy::default())
        .run(&mut app, inputs, |app| {
            if app.refreshes() == 1 && !asked {
                asked = true;
                handle.try_send(UserEvent::Toggle(Panel::Stdout, 42));
                handle.try_send(UserEvent::Refresh);
            }
            if app.refreshes() == 2 {
                handle.cancel();
            }
        })
        .await;

    let requests = backend.requests();
    assert!(requests[0].detail_ids.is_empty());
    assert_eq!(requests[1].detail_ids, vec![7]);
}

#[tokio::test(start_paused = true)]
async fn hidden_view_does_not_poll() {
    let backend = FakeBackend::with_latencies(&[]);
    let (handle, inputs) = scheduler::channel(8);
    handle.try_send(UserEvent::SetHidden(true));
    let mut app = app();

    let scheduler = PollScheduler::new(backend.clone(), IntervalPolicy::default());
    let run = scheduler.run(&mut app, inputs, |_| {});
    let _ = tokio::time::timeout(secs(60), run).await;

    assert_eq!(backend.requests().len(), 1);
    assert!(app.gate().is_hidden());
}

#[tokio::test(start_paused = true)]
async fn confirmed_command_is_dispatched() {
    let backend = FakeBackend::with_latencies(&[]);
    let (handle, inputs) = scheduler::channel(8);
    let mut app = app();
    let mut asked = false;

    let report = PollScheduler::new(backend.clone(), IntervalPolicy::default())
        .run(&mut app, inputs, |app| {
            if app.refreshes() == 1 && !asked {
                asked = true;
                handle.try_send(UserEvent::Request(Command::Task {
                    task_id: 42,
                    action: TaskAction::Stop,
                }));
                handle.try_send(UserEvent::Request(Command::Capacity {
                    worker_id: 1,
                    field: CapacityField::Concurrency,
                    delta: 1,
                }));
                handle.try_send(UserEvent::Confirm {
                    row: None,
                    scope: None,
                });
            }
            if backend.sent().len() == 2 {
                handle.cancel();
            }
        })
        .await;

    assert_eq!(report.dispatched, 2);
    let sent = backend.sent();
    assert!(sent.iter().any(|e| e.path == "/ui/concurrency_change"));
    let stop = sent
        .iter()
        .find(|e| e.path == "/ui/task/action")
        .expect("stop was sent");
    assert!(stop.params.contains(&("action", "stop".to_string())));
    assert!(!app.gate().is_paused());
}

#[tokio::test(start_paused = true)]
async fn failed_dispatch_surfaces_on_status_line() {
    let backend = FakeBackend::with_latencies(&[]);
    let (handle, inputs) = scheduler::channel(8);
    let mut app = app();
    let mut asked = false;

    PollScheduler::new(backend.clone(), IntervalPolicy::default())
        .run(&mut app, inputs, |app| {
            if app.refreshes() == 1 && !asked {
                asked = true;
                handle.try_send(UserEvent::Request(Command::DeleteAllJobs));
                handle.try_send(UserEvent::Confirm {
                    row: None,
                    scope: None,
                });
            }
            if matches!(app.notice(), Some(Notice::DispatchFailed { .. })) {
                handle.cancel();
            }
        })
        .await;

    let Some(Notice::DispatchFailed { command, error }) = app.notice() else {
        panic!("expected a dispatch failure notice, got {:?}", app.notice());
    };
    assert_eq!(command, "delete all jobs");
    assert!(error.contains("rejected"));
}

#[tokio::test(start_paused = true)]
async fn export_reads_full_output_without_touching_the_view() {
    let backend = FakeBackend::with_latencies(&[]);
    let (handle, inputs) = scheduler::channel(8);
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("all.zip");
    let mut app = app();
    let mut asked = false;

    PollScheduler::new(backend.clone(), IntervalPolicy::default())
        .run(&mut app, inputs, |app| {
            if app.refreshes() == 1 && !asked {
                asked = true;
                handle.try_send(UserEvent::Export(ExportRequest::All(archive.clone())));
            }
            if matches!(app.notice(), Some(Notice::Info(msg)) if msg.starts_with("exported")) {
                handle.cancel();
            }
        })
        .await;

    assert!(archive.exists());
    let requests = backend.requests();
    assert!(requests.iter().any(|r| r.detail_ids == vec![7]));
    assert!(requests[0].detail_ids.is_empty());
    assert!(app.view().detail_ids().is_empty());
    assert!(app.fetch_request().detail_ids.is_empty());
}

#[tokio::test]
async fn dispatch_ticket_reports_the_outcome() {
    let backend = FakeBackend::with_latencies(&[]);
    let (notice_tx, mut notices) = mpsc::unbounded_channel();
    let dispatcher = CommandDispatcher::new(backend.clone(), notice_tx);

    let bump = Command::Capacity {
        worker_id: 1,
        field: CapacityField::Prefetch,
        delta: -1,
    };
    let ticket = dispatcher.dispatch(bump.clone());
    let id = ticket.id;
    let ack = ticket.wait().await.unwrap();
    assert_eq!(ack.ticket, id);
    assert_eq!(ack.command, bump);
    assert!(matches!(notices.recv().await, Some(Notice::Dispatched { .. })));

    let err = dispatcher
        .dispatch(Command::DeleteAllJobs)
        .wait()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("rejected"));
    assert!(matches!(
        notices.recv().await,
        Some(Notice::DispatchFailed { .. })
    ));
}
