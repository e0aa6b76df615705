//! Plain-text rendering of a frame plus the status line.

use std::fmt::Write;

use taskdeck_core::{
    BatchTable, FilterDimension, FlavorList, JobTable, PanelView, PendingView, RenderModel,
    RowAction, TaskTable, TelemetryView, WorkerTable,
};

use crate::app::App;

pub fn render_screen(app: &App) -> String {
    let mut out = String::new();
    match app.frame() {
        Some(RenderModel::Tasks(t)) => tasks(&mut out, t),
        Some(RenderModel::Workers(t)) => workers(&mut out, t, app.flavors()),
        Some(RenderModel::Batches(t)) => batches(&mut out, t),
        Some(RenderModel::Jobs(t)) => jobs(&mut out, t),
        None => out.push_str("(waiting for first snapshot)\n"),
    }
    if let Some(edit) = app.view().edit() {
        let _ = writeln!(out, "\n[editing {:?}] {}", edit.target, edit.buffer);
        out.push_str("  set <text> / submit / abort\n");
    }
    out.push('\n');
    out.push_str(&status_line(app));
    out.push('\n');
    out
}

pub fn status_line(app: &App) -> String {
    let view = app.view();
    let mut line = format!(
        "[{}] status={} worker={} batch={} sort={} | every {:.1}s | {}",
        app.kind(),
        view.get_filter(FilterDimension::Status),
        view.get_filter(FilterDimension::Worker),
        view.get_filter(FilterDimension::Batch),
        view.get_filter(FilterDimension::Sort),
        app.interval().as_secs_f64(),
        app.gate().describe(),
    );
    if let Some((row, _)) = view.confirmations().next() {
        let _ = write!(line, " | confirm pending on {row}");
    }
    if let Some(notice) = app.notice() {
        let _ = write!(line, " | {notice}");
    }
    line
}

fn actions(list: &[RowAction]) -> String {
    list.iter().map(|a| a.label()).collect::<Vec<_>>().join(" ")
}

fn confirmation(out: &mut String, pending: Option<&PendingView>) {
    if let Some(p) = pending {
        let choices = if p.scoped {
            "confirm both / confirm only-batch / cancel"
        } else {
            "confirm / cancel"
        };
        let _ = writeln!(out, "    ?? {}  ({choices})", p.prompt);
    }
}

fn panel(out: &mut String, label: &str, view: &PanelView) {
    if !view.state.is_expanded() {
        return;
    }
    let cut = if view.truncated { " (tail)" } else { "" };
    let _ = writeln!(out, "    --- {label} {}{cut}", view.key);
    for line in view.text.lines() {
        let _ = writeln!(out, "    | {line}");
    }
}

fn hidden(out: &mut String, n: usize) {
    if n > 0 {
        let _ = writeln!(out, "... {n} more rows not shown");
    }
}

fn tasks(out: &mut String, t: &TaskTable) {
    let _ = writeln!(
        out,
        "{:>8} {:>8} {:<10} {:<16} {:<12} {:<12} {:<19} {:>9}  actions",
        "task", "exec", "status", "name", "worker", "batch", "created", "runtime"
    );
    for row in &t.rows {
        let exec = row.execution_id.map(|e| e.to_string()).unwrap_or_default();
        let _ = writeln!(
            out,
            "{:>8} {:>8} {:<10} {:<16} {:<12} {:<12} {:<19} {:>9}  {}",
            row.task_id,
            exec,
            row.status,
            row.name,
            row.worker,
            row.batch,
            row.created,
            row.runtime,
            actions(&row.actions)
        );
        confirmation(out, row.pending.as_ref());
        if let Some(buffer) = &row.editing {
            let _ = writeln!(out, "    [edit command] {buffer}");
        }
        panel(out, "command", &row.command);
        if let Some(p) = &row.stdout {
            panel(out, "stdout", p);
        }
        if let Some(p) = &row.stderr {
            panel(out, "stderr", p);
        }
    }
    hidden(out, t.hidden);
    let _ = writeln!(
        out,
        "workers: {}\nbatches: {}",
        t.filters.workers.join(", "),
        t.filters.batches.join(", ")
    );
}

fn workers(out: &mut String, t: &WorkerTable, flavors: &FlavorList) {
    let counters: Vec<String> = t
        .tasks_per_status
        .iter()
        .map(|(s, n)| format!("{s}={n}"))
        .collect();
    let _ = writeln!(out, "tasks: {}", counters.join(" "));
    let _ = writeln!(
        out,
        "{:>6} {:<16} {:<12} {:<9} {:>4} {:>4} {:>5} {:>5} {:>5} {:>5} {:>7} {:>8}  actions",
        "id", "name", "batch", "status", "conc", "pref", "acc", "run", "ok", "fail", "load", "mem"
    );
    for row in &t.rows {
        let _ = writeln!(
            out,
            "{:>6} {:<16} {:<12} {:<9} {:>4} {:>4} {:>5} {:>5} {:>5} {:>5} {:>7} {:>8}  {}",
            row.worker_id,
            row.name,
            row.batch,
            format!("{}({})", row.status, row.indicator),
            row.concurrency,
            row.prefetch,
            row.accepted,
            row.running,
            row.succeeded,
            row.failed,
            row.load,
            row.memory,
            actions(&row.actions)
        );
        if let TelemetryView::Stats {
            load,
            disk_usage,
            disk_io,
            network_io,
        } = &row.telemetry
        {
            let _ = writeln!(
                out,
                "    load {load} | disk {} {disk_io} | net {network_io}",
                disk_usage.join(" ")
            );
        }
        confirmation(out, row.pending.as_ref());
        if let Some(buffer) = &row.editing {
            let _ = writeln!(out, "    [edit batch] {buffer}");
        }
    }
    hidden(out, t.hidden);
    launch_form(out, t.launch_pending.as_ref(), flavors);
}

fn launch_form(out: &mut String, pending: Option<&PendingView>, flavors: &FlavorList) {
    if !flavors.is_empty() {
        out.push_str("launch: worker create <flavor> [number= concurrency= prefetch= ");
        out.push_str("region= provider= batch=]\n");
        let _ = writeln!(out, "  flavors: {}", flavors.names().join(", "));
        let _ = writeln!(out, "  regions: {}", flavors.regions().join(", "));
        let _ = writeln!(out, "  providers: {}", flavors.providers().join(", "));
    }
    confirmation(out, pending);
}

fn batches(out: &mut String, t: &BatchTable) {
    let _ = writeln!(
        out,
        "{:<16} {:>7} {:>7} {:>7} {:>7} {:>7} {:>6}  workers",
        "batch", "pending", "running", "ok", "failed", "total", "done%"
    );
    for row in &t.rows {
        let _ = writeln!(
            out,
            "{:<16} {:>7} {:>7} {:>7} {:>7} {:>7} {:>5.1}%  {}",
            row.name,
            row.pending,
            row.running,
            row.succeeded,
            row.failed,
            row.total,
            row.progress,
            row.workers.join(",")
        );
        for stat in &row.stats {
            let _ = writeln!(out, "    {stat}");
        }
        confirmation(out, row.pending_confirmation.as_ref());
    }
    hidden(out, t.hidden);
}

fn jobs(out: &mut String, t: &JobTable) {
    let _ = writeln!(
        out,
        "{:>6} {:<16} {:<16} {:<10} {:>5} {:<19}  log",
        "job", "action", "target", "status", "prog", "updated"
    );
    for row in &t.rows {
        let progress = row
            .progression
            .map(|p| format!("{p:.0}%"))
            .unwrap_or_default();
        let more = if row.log_rest.is_some() { "…" } else { "" };
        let _ = writeln!(
            out,
            "{:>6} {:<16} {:<16} {:<10} {:>5} {:<19}  {}{more}  [{}]",
            row.job_id,
            row.action,
            row.target,
            row.status,
            progress,
            row.updated,
            row.log_head.replace('\n', " "),
            actions(&row.actions)
        );
        if let Some(rest) = &row.log_rest {
            panel(out, "log", rest);
        }
        confirmation(out, row.pending.as_ref());
    }
    hidden(out, t.hidden);
    confirmation(out, t.delete_all_pending.as_ref());
}
