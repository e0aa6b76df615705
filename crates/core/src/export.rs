use crate::filter::FilterState;
use crate::model::{TaskRecord, TasksSnapshot};

/// One file to write, relative to the export root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportEntry {
    pub path: String,
    pub contents: String,
}

/// Everything an archive export writes: a folder per task, even when the
/// task has no output yet, plus the output files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportPlan {
    pub folders: Vec<String>,
    pub files: Vec<ExportEntry>,
}

impl ExportPlan {
    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }
}

fn execution_label(task: &TaskRecord) -> String {
    task.execution_id
        .map(|e| e.to_string())
        .unwrap_or_else(|| "none".into())
}

fn output_files(task: &TaskRecord, suffix: &str) -> Vec<ExportEntry> {
    let exec = execution_label(task);
    [("output-std", &task.output), ("output-err", &task.error)]
        .into_iter()
        .filter_map(|(prefix, text)| {
            text.as_ref().map(|contents| ExportEntry {
                path: format!("{prefix}-{}-execution-{exec}{suffix}", task.task_id),
                contents: contents.clone(),
            })
        })
        .collect()
}

/// Files for a single-task download.
pub fn task_files(task: &TaskRecord) -> Vec<ExportEntry> {
    output_files(task, "")
}

/// Selects with the live filter predicate; the row cap does not apply.
pub fn archive_plan(snapshot: &TasksSnapshot, filters: &FilterState) -> ExportPlan {
    let mut plan = ExportPlan::default();
    for task in snapshot.tasks.iter().filter(|t| filters.admits(t)) {
        let folder = format!("output-{}", task.task_id);
        plan.files.extend(output_files(task, ".txt").into_iter().map(|e| ExportEntry {
            path: format!("{folder}/{}", e.path),
            contents: e.contents,
        }));
        plan.folders.push(folder);
    }
    plan
}

/// Execution ids of every admitted task, used to request full output
/// before an archive is written.
pub fn admitted_execution_ids(snapshot: &TasksSnapshot, filters: &FilterState) -> Vec<u64> {
    snapshot
        .tasks
        .iter()
        .filter(|t| filters.admits(t))
        .filter_map(|t| t.execution_id)
        .collect()
}
