use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use taskdeck_core::{
    admitted_execution_ids, archive_plan, task_files, EntityKind, ExportEntry, ExportPlan,
    FilterState, Snapshot, TasksSnapshot,
};
use tracing::{debug, info};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::app::{App, ExportRequest};
use crate::backend::Backend;
use crate::error::ExportError;
use crate::fetcher::FetchRequest;

/// An export resolved against the snapshot on screen. Output shown in the
/// table is truncated, so the job reads its tasks again in full before
/// writing anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportJob {
    pub request: ExportRequest,
    pub fetch: FetchRequest,
}

impl ExportJob {
    /// Picks the executions to re-read. Leaves the live view alone.
    pub fn prepare(request: ExportRequest, app: &App) -> Result<Self, ExportError> {
        let tasks = app
            .snapshot()
            .and_then(|s| s.as_tasks())
            .ok_or(ExportError::NoSnapshot)?;
        let filters = app.view().filters().clone();
        let detail_ids = match &request {
            ExportRequest::All(_) => admitted_execution_ids(tasks, &filters),
            ExportRequest::Task { task_id, .. } => {
                let task = tasks
                    .tasks
                    .iter()
                    .find(|t| t.task_id == *task_id)
                    .ok_or(ExportError::UnknownTask(*task_id))?;
                task.execution_id.into_iter().collect()
            }
        };
        Ok(Self {
            request,
            fetch: FetchRequest {
                kind: EntityKind::Tasks,
                filters,
                detail_ids,
            },
        })
    }

    /// Fetches full output, then writes on the blocking pool. Returns a
    /// one-line summary for the status line.
    pub async fn run<B: Backend>(self, backend: &B) -> Result<String, ExportError> {
        debug!(
            details = self.fetch.detail_ids.len(),
            "fetching full output for export"
        );
        let tasks = match backend.fetch(&self.fetch).await? {
            Snapshot::Tasks(tasks) => tasks,
            _ => return Err(ExportError::NoSnapshot),
        };
        let ExportJob { request, fetch } = self;
        tokio::task::spawn_blocking(move || write(&request, &tasks, &fetch.filters))
            .await
            .map_err(|e| ExportError::Aborted(e.to_string()))?
    }
}

/// Writes an export from an already detailed tasks snapshot.
pub fn write(
    request: &ExportRequest,
    tasks: &TasksSnapshot,
    filters: &FilterState,
) -> Result<String, ExportError> {
    match request {
        ExportRequest::All(path) => {
            let plan = archive_plan(tasks, filters);
            if plan.is_empty() {
                return Ok("nothing to export under the current filter".to_string());
            }
            let count = write_archive(path, &plan)?;
            Ok(format!("exported {count} tasks to {}", path.display()))
        }
        ExportRequest::Task { task_id, dir } => {
            let task = tasks
                .tasks
                .iter()
                .find(|t| t.task_id == *task_id)
                .ok_or(ExportError::UnknownTask(*task_id))?;
            let written = write_task_files(dir, &task_files(task))?;
            Ok(format!(
                "wrote {written} files for task {task_id} to {}",
                dir.display()
            ))
        }
    }
}

/// Zip with one folder per task. Returns the number of task folders.
pub fn write_archive(path: &Path, plan: &ExportPlan) -> Result<usize, ExportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut zip = ZipWriter::new(File::create(path)?);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for folder in &plan.folders {
        zip.add_directory(format!("{folder}/"), options)?;
    }
    for entry in &plan.files {
        zip.start_file(entry.path.as_str(), options)?;
        zip.write_all(entry.contents.as_bytes())?;
    }
    zip.finish()?;
    info!(
        "wrote archive {} ({} folders, {} files)",
        path.display(),
        plan.folders.len(),
        plan.files.len()
    );
    Ok(plan.folders.len())
}

pub fn write_task_files(dir: &Path, entries: &[ExportEntry]) -> Result<usize, ExportError> {
    fs::create_dir_all(dir)?;
    for entry in entries {
        fs::write(dir.join(&entry.path), &entry.contents)?;
    }
    Ok(entries.len())
}
