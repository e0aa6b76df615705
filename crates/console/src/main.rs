use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use taskdeck_console::app::{App, ExportRequest, UserEvent};
use taskdeck_console::backend::{Backend, HttpBackend};
use taskdeck_console::config::ConsoleConfig;
use taskdeck_console::export::ExportJob;
use taskdeck_console::input::{parse_line, HELP};
use taskdeck_console::present;
use taskdeck_console::scheduler::{self, PollScheduler};
use taskdeck_core::EntityKind;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "taskdeck", version, about = "Polling console for a distributed task server")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Server base URL, e.g. http://127.0.0.1:5000
    #[arg(long, global = true)]
    server: Option<String>,

    /// Tab to open: tasks, workers, batches or jobs.
    #[arg(long, global = true)]
    view: Option<EntityKind>,

    /// Base refresh interval.
    #[arg(long, global = true)]
    interval_ms: Option<u64>,

    /// Initial filters as a query string, e.g. "status=failed&batch=b1".
    #[arg(long, global = true)]
    filters: Option<String>,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Interactive console; reads operator commands from stdin.
    Watch,
    /// Fetch and print one snapshot, then exit.
    Show,
    /// Archive the full output of every task matching the filters.
    Export {
        /// Destination zip file.
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut cfg = match &cli.config {
        Some(path) => ConsoleConfig::load_from(path)?,
        None => ConsoleConfig::default(),
    };
    if let Some(server) = cli.server {
        cfg.server_url = server;
    }
    if let Some(view) = cli.view {
        cfg.view = view;
    }
    if let Some(ms) = cli.interval_ms {
        cfg.base_interval_ms = ms;
    }
    if let Some(filters) = cli.filters {
        cfg.seed_query = Some(filters);
    }

    match cli.command.unwrap_or(Cmd::Watch) {
        Cmd::Watch => watch(cfg).await,
        Cmd::Show => show(cfg).await,
        Cmd::Export { output } => export_all(cfg, output).await,
    }
}

fn build_app(cfg: &ConsoleConfig, kind: EntityKind) -> App {
    let mut app = App::new(kind, cfg.render_limits());
    app.view_mut().seed_filters(cfg.seed_pairs());
    app
}

fn draw(app: &App) {
    let screen = present::render_screen(app);
    let mut stdout = std::io::stdout().lock();
    if stdout.is_terminal() {
        let _ = write!(stdout, "\x1b[2J\x1b[H");
    }
    let _ = write!(stdout, "{screen}");
    let _ = stdout.flush();
}

async fn read_operator_input(events: mpsc::Sender<UserEvent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "help" {
                    println!("{HELP}");
                    continue;
                }
                match parse_line(line) {
                    Ok(event) => {
                        if events.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("{e}"),
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("stdin read error: {e:?}");
                break;
            }
        }
    }
}

async fn watch(cfg: ConsoleConfig) -> Result<()> {
    let backend = Arc::new(HttpBackend::new(&cfg.server_url).context("server url")?);
    let mut app = build_app(&cfg, cfg.view);
    let (handle, inputs) = scheduler::channel(64);

    tokio::spawn(read_operator_input(handle.events()));
    let quit = handle.events();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = quit.send(UserEvent::Quit).await;
        }
    });

    load_flavors(backend.as_ref(), &mut app).await;
    info!("taskdeck watching {} ({})", cfg.server_url, cfg.view);
    let report = PollScheduler::new(backend, cfg.interval_policy())
        .run(&mut app, inputs, draw)
        .await;
    drop(handle);
    info!(
        "stopped after {} cycles ({} skipped, {} failed, {} commands sent)",
        report.cycles, report.skipped, report.failed, report.dispatched
    );
    Ok(())
}

/// The launch form works without a flavor list, so a failed read only warns.
async fn load_flavors<B: Backend>(backend: &B, app: &mut App) {
    match backend.flavors().await {
        Ok(flavors) => app.set_flavors(flavors),
        Err(e) => warn!("flavor list unavailable: {e}"),
    }
}

async fn show(cfg: ConsoleConfig) -> Result<()> {
    let backend = HttpBackend::new(&cfg.server_url).context("server url")?;
    let mut app = build_app(&cfg, cfg.view);
    if cfg.view == EntityKind::Workers {
        load_flavors(&backend, &mut app).await;
    }
    let snapshot = backend
        .fetch(&app.fetch_request())
        .await
        .context("fetch snapshot")?;
    app.apply_snapshot(snapshot);
    print!("{}", present::render_screen(&app));
    Ok(())
}

async fn export_all(cfg: ConsoleConfig, output: PathBuf) -> Result<()> {
    let backend = HttpBackend::new(&cfg.server_url).context("server url")?;
    let mut app = build_app(&cfg, EntityKind::Tasks);

    let snapshot = backend
        .fetch(&app.fetch_request())
        .await
        .context("fetch tasks")?;
    app.apply_snapshot(snapshot);

    let summary = ExportJob::prepare(ExportRequest::All(output), &app)?
        .run(&backend)
        .await?;
    println!("{summary}");
    Ok(())
}
