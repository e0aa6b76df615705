//! The poll loop. One task owns the application state and multiplexes the
//! refresh timer, the in-flight fetch, operator events and dispatch notices,
//! so at most one fetch is ever outstanding.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use taskdeck_core::{AdaptiveInterval, IntervalPolicy, Snapshot};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::app::{App, Effect, Notice, UserEvent};
use crate::backend::Backend;
use crate::dispatcher::CommandDispatcher;
use crate::error::FetchError;
use crate::export::ExportJob;
use crate::fetcher::{FetchRequest, SnapshotFetcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    /// First fetch after start: immediate, no probe.
    Initial,
    /// Timer driven, probed first.
    Scheduled,
    /// Triggered by the operator, e.g. a filter change.
    OutOfCycle,
}

#[derive(Debug)]
pub enum CycleOutcome {
    /// The probe failed; nothing was fetched.
    Skipped(FetchError),
    Completed {
        result: Result<Snapshot, FetchError>,
        elapsed: Duration,
    },
}

async fn run_cycle<B: Backend>(
    fetcher: &SnapshotFetcher<B>,
    request: FetchRequest,
    probe: bool,
) -> CycleOutcome {
    if probe {
        if let Err(e) = fetcher.probe().await {
            return CycleOutcome::Skipped(e);
        }
    }
    let started = Instant::now();
    let result = fetcher.fetch(&request).await;
    CycleOutcome::Completed {
        result,
        elapsed: started.elapsed(),
    }
}

type Cycle<'a> = Pin<Box<dyn Future<Output = CycleOutcome> + 'a>>;

fn start_cycle<'a, B: Backend>(
    fetcher: &'a SnapshotFetcher<B>,
    app: &mut App,
    kind: CycleKind,
) -> (CycleKind, Cycle<'a>) {
    app.gate_mut().begin_fetch();
    debug!(?kind, view = %app.kind(), "starting cycle");
    let probe = kind == CycleKind::Scheduled;
    (kind, Box::pin(run_cycle(fetcher, app.fetch_request(), probe)))
}

/// Counters collected over one run of the loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    pub cycles: u64,
    pub skipped: u64,
    pub failed: u64,
    pub out_of_cycle: u64,
    pub dispatched: u64,
    /// Every wait armed after a timer-driven cycle, in order.
    pub intervals: Vec<Duration>,
}

/// Caller side of a running loop. Dropping it stops the loop.
pub struct SchedulerHandle {
    events: mpsc::Sender<UserEvent>,
    stop: watch::Sender<bool>,
}

impl SchedulerHandle {
    pub fn events(&self) -> mpsc::Sender<UserEvent> {
        self.events.clone()
    }

    /// Queues an event without waiting; false if the queue is full or the
    /// loop is gone.
    pub fn try_send(&self, event: UserEvent) -> bool {
        self.events.try_send(event).is_ok()
    }

    pub fn cancel(&self) {
        let _ = self.stop.send(true);
    }
}

pub struct SchedulerInputs {
    events: mpsc::Receiver<UserEvent>,
    stop: watch::Receiver<bool>,
}

pub fn channel(capacity: usize) -> (SchedulerHandle, SchedulerInputs) {
    let (events_tx, events_rx) = mpsc::channel(capacity);
    let (stop_tx, stop_rx) = watch::channel(false);
    (
        SchedulerHandle {
            events: events_tx,
            stop: stop_tx,
        },
        SchedulerInputs {
            events: events_rx,
            stop: stop_rx,
        },
    )
}

pub struct PollScheduler<B> {
    backend: Arc<B>,
    fetcher: SnapshotFetcher<B>,
    dispatcher: CommandDispatcher<B>,
    interval: AdaptiveInterval,
    notice_tx: mpsc::UnboundedSender<Notice>,
    notices: mpsc::UnboundedReceiver<Notice>,
}

/// Runs an export off the loop. The outcome arrives as a notice.
fn spawn_export<B: Backend>(
    backend: &Arc<B>,
    notices: &mpsc::UnboundedSender<Notice>,
    job: ExportJob,
) {
    let backend = Arc::clone(backend);
    let notices = notices.clone();
    tokio::spawn(async move {
        let summary = match job.run(backend.as_ref()).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!("export failed: {e}");
                format!("export failed: {e}")
            }
        };
        let _ = notices.send(Notice::Info(summary));
    });
}

impl<B: Backend> PollScheduler<B> {
    pub fn new(backend: Arc<B>, policy: IntervalPolicy) -> Self {
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        Self {
            fetcher: SnapshotFetcher::new(Arc::clone(&backend)),
            dispatcher: CommandDispatcher::new(Arc::clone(&backend), notice_tx.clone()),
            backend,
            interval: AdaptiveInterval::new(policy),
            notice_tx,
            notices: notice_rx,
        }
    }

    /// Runs until cancelled or the operator quits. `on_frame` is called
    /// whenever the visible state may have changed.
    pub async fn run<F>(
        self,
        app: &mut App,
        inputs: SchedulerInputs,
        mut on_frame: F,
    ) -> SchedulerReport
    where
        F: FnMut(&App),
    {
        let PollScheduler {
            backend,
            fetcher,
            dispatcher,
            mut interval,
            notice_tx,
            mut notices,
        } = self;
        let SchedulerInputs {
            mut events,
            mut stop,
        } = inputs;

        let mut report = SchedulerReport::default();
        let mut next_tick: Option<Instant> = None;
        let mut refetch_queued = false;

        app.set_interval(interval.current());
        info!(
            "poll loop started: view={} base={:?}",
            app.kind(),
            interval.policy().base
        );
        let mut inflight: Option<(CycleKind, Cycle<'_>)> =
            Some(start_cycle(&fetcher, app, CycleKind::Initial));

        'poll: loop {
            tokio::select! {
                biased;

                _ = stop.changed() => {
                    info!("poll loop cancelled");
                    break 'poll;
                }

                outcome = async {
                    match inflight.as_mut() {
                        Some((_, cycle)) => cycle.as_mut().await,
                        None => std::future::pending().await,
                    }
                }, if inflight.is_some() => {
                    let Some((kind, _)) = inflight.take() else {
                        continue;
                    };
                    app.gate_mut().end_fetch();
                    let wait = match outcome {
                        CycleOutcome::Skipped(e) => {
                            report.skipped += 1;
                            debug!("probe failed, skipping cycle: {e}");
                            app.note(Notice::FetchFailed(e.to_string()));
                            Some(interval.reset())
                        }
                        CycleOutcome::Completed { result, elapsed } => {
                            report.cycles += 1;
                            match result {
                                Ok(snapshot) => {
                                    app.apply_snapshot(snapshot);
                                }
                                Err(e) => {
                                    report.failed += 1;
                                    app.record_failure(&e);
                                }
                            }
                            if kind == CycleKind::OutOfCycle {
                                report.out_of_cycle += 1;
                                None
                            } else {
                                Some(interval.observe(elapsed))
                            }
                        }
                    };
                    if let Some(wait) = wait {
                        debug!("next refresh in {wait:?}");
                        report.intervals.push(wait);
                        app.set_interval(wait);
                        next_tick = Some(Instant::now() + wait);
                    }
                    on_frame(app);
                    if std::mem::take(&mut refetch_queued) {
                        inflight = Some(start_cycle(&fetcher, app, CycleKind::OutOfCycle));
                    }
                }

                _ = sleep_until(next_tick.unwrap_or_else(Instant::now)), if next_tick.is_some() => {
                    next_tick = None;
                    if app.gate().may_poll() {
                        inflight = Some(start_cycle(&fetcher, app, CycleKind::Scheduled));
                    } else {
                        debug!("gate {}, skipping tick", app.gate().describe());
                        next_tick = Some(Instant::now() + interval.current());
                    }
                }

                Some(event) = events.recv() => {
                    for effect in app.handle(event) {
                        match effect {
                            Effect::Redraw => on_frame(app),
                            Effect::Refetch => {
                                if inflight.is_some() {
                                    debug!("fetch in flight, queueing refetch");
                                    refetch_queued = true;
                                } else {
                                    inflight =
                                        Some(start_cycle(&fetcher, app, CycleKind::OutOfCycle));
                                }
                            }
                            Effect::Dispatch(command) => {
                                report.dispatched += 1;
                                dispatcher.dispatch(command);
                            }
                            Effect::Export(request) => {
                                match ExportJob::prepare(request, app) {
                                    Ok(job) => {
                                        app.note(Notice::Info("exporting...".to_string()));
                                        spawn_export(&backend, &notice_tx, job);
                                    }
                                    Err(e) => {
                                        warn!("export failed: {e}");
                                        app.note(Notice::Info(format!("export failed: {e}")));
                                    }
                                }
                                on_frame(app);
                            }
                            Effect::Quit => {
                                info!("operator quit");
                                break 'poll;
                            }
                        }
                    }
                }

                Some(notice) = notices.recv() => {
                    app.note(notice);
                    on_frame(app);
                }

                else => break 'poll,
            }
        }

        if inflight.is_some() {
            app.gate_mut().end_fetch();
        }
        report
    }
}
