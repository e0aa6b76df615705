//! Operator commands, one per stdin line.

use std::path::PathBuf;

use taskdeck_core::{
    BatchAction, BatchScope, CapacityField, Command, EditTarget, EntityKind, FilterDimension,
    JobAction, Panel, ParseError, RowRef, TaskAction, WorkerAction, WorkerLaunch,
};
use thiserror::Error;

use crate::app::{ExportRequest, UserEvent};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("empty command")]
    Empty,
    #[error("unknown command {0:?}, try `help`")]
    UnknownCommand(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("not a number: {0:?}")]
    BadNumber(String),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

pub const HELP: &str = "\
view <tasks|workers|batches|jobs>
filter <status|worker|batch> <value|->    sort <task|worker|batch>
expand <command|stdout|stderr|log> <id>
task <pause|resume|stop|break|restart|delete> <id>
worker <pause|resume|clean|restart|delete> <id>
worker <concurrency|prefetch> <id> <+1|-1>
worker create <flavor> [number=N concurrency=N prefetch=N region=R provider=P batch=B]
batch <pause|go|stop|break|clear> <name>
job <delete|restart> <id>    job delete-all
confirm [both|only-batch] [<row>]    cancel [<row>]
  row: task <id> | worker <id> | batch <name> | job <id> | all-jobs | launch
edit <command|batch> <id>    set <text>    submit    abort
hide  show  pause  resume  refresh  quit
export all <file.zip>    export task <id> <dir>";

fn id(raw: Option<&str>, usage: &'static str) -> Result<u64, InputError> {
    let raw = raw.ok_or(InputError::Usage(usage))?;
    raw.parse().map_err(|_| InputError::BadNumber(raw.to_string()))
}

fn delta(raw: Option<&str>) -> Result<i32, InputError> {
    match raw {
        Some("+1") | Some("+") | Some("1") => Ok(1),
        Some("-1") | Some("-") => Ok(-1),
        Some(other) => Err(InputError::BadNumber(other.to_string())),
        None => Err(InputError::Usage("worker <concurrency|prefetch> <id> <+1|-1>")),
    }
}

fn count(key: &str, raw: &str) -> Result<u32, InputError> {
    raw.parse()
        .map_err(|_| InputError::BadNumber(format!("{key}={raw}")))
}

const LAUNCH_USAGE: &str = "worker create <flavor> [number=N concurrency=N prefetch=N \
region=R provider=P batch=B]";

fn launch<'a>(mut words: impl Iterator<Item = &'a str>) -> Result<WorkerLaunch, InputError> {
    let flavor = words.next().ok_or(InputError::Usage(LAUNCH_USAGE))?;
    let mut launch = WorkerLaunch::new(flavor);
    for option in words {
        let (key, value) = option
            .split_once('=')
            .ok_or(InputError::Usage(LAUNCH_USAGE))?;
        match key {
            "number" | "n" => launch.number = count(key, value)?,
            "concurrency" => launch.concurrency = count(key, value)?,
            "prefetch" => launch.prefetch = count(key, value)?,
            "region" => launch.region = value.to_string(),
            "provider" => launch.provider = value.to_string(),
            "batch" => launch.batch = (!value.is_empty()).then(|| value.to_string()),
            _ => return Err(InputError::Usage(LAUNCH_USAGE)),
        }
    }
    if launch.number == 0 {
        return Err(InputError::Usage(LAUNCH_USAGE));
    }
    Ok(launch)
}

const ROW_USAGE: &str =
    "confirm|cancel [task <id> | worker <id> | batch <name> | job <id> | all-jobs | launch]";

/// Optional row named after `confirm` or `cancel`.
fn row_ref(text: &str) -> Result<Option<RowRef>, InputError> {
    let mut words = text.split_whitespace();
    let row = match words.next() {
        None => return Ok(None),
        Some("task") => RowRef::Task(id(words.next(), ROW_USAGE)?),
        Some("worker") => RowRef::Worker(id(words.next(), ROW_USAGE)?),
        Some("job") => RowRef::Job(id(words.next(), ROW_USAGE)?),
        Some("batch") => {
            let name = rest_after(text, 1);
            if name.is_empty() {
                return Err(InputError::Usage(ROW_USAGE));
            }
            return Ok(Some(RowRef::Batch(name.to_string())));
        }
        Some("all-jobs") => RowRef::AllJobs,
        Some("launch") => RowRef::NewWorkers,
        Some(_) => return Err(InputError::Usage(ROW_USAGE)),
    };
    if words.next().is_some() {
        return Err(InputError::Usage(ROW_USAGE));
    }
    Ok(Some(row))
}

/// Everything after the first `n` words, with inner spacing preserved.
fn rest_after(line: &str, n: usize) -> &str {
    let mut rest = line.trim_start();
    for _ in 0..n {
        rest = rest
            .find(char::is_whitespace)
            .map(|i| rest[i..].trim_start())
            .unwrap_or("");
    }
    rest
}

pub fn parse_line(line: &str) -> Result<UserEvent, InputError> {
    let mut words = line.split_whitespace();
    let head = words.next().ok_or(InputError::Empty)?;
    let event = match head {
        "view" => {
            let kind: EntityKind = words
                .next()
                .ok_or(InputError::Usage("view <tasks|workers|batches|jobs>"))?
                .parse()?;
            UserEvent::SwitchView(kind)
        }
        "filter" => {
            let dim: FilterDimension = words
                .next()
                .ok_or(InputError::Usage("filter <status|worker|batch> <value>"))?
                .parse()?;
            let value = rest_after(line, 2);
            if value.is_empty() {
                return Err(InputError::Usage("filter <status|worker|batch> <value>"));
            }
            UserEvent::SetFilter(dim, value.to_string())
        }
        "sort" => {
            let key = words.next().ok_or(InputError::Usage("sort <task|worker|batch>"))?;
            UserEvent::SetFilter(FilterDimension::Sort, key.to_string())
        }
        "expand" | "toggle" => {
            const USAGE: &str = "expand <command|stdout|stderr|log> <id>";
            let panel: Panel = words.next().ok_or(InputError::Usage(USAGE))?.parse()?;
            UserEvent::Toggle(panel, id(words.next(), USAGE)?)
        }
        "task" => {
            const USAGE: &str = "task <pause|resume|stop|break|restart|delete> <id>";
            let action = match words.next() {
                Some("pause") => TaskAction::Pause,
                Some("resume") => TaskAction::Resume,
                Some("stop") => TaskAction::Stop,
                Some("break") => TaskAction::Break,
                Some("restart") => TaskAction::Restart,
                Some("delete") => TaskAction::Delete,
                _ => return Err(InputError::Usage(USAGE)),
            };
            UserEvent::Request(Command::Task {
                task_id: id(words.next(), USAGE)?,
                action,
            })
        }
        "worker" => {
            const USAGE: &str =
                "worker <pause|resume|clean|restart|delete|concurrency|prefetch> <id>";
            let verb = words.next().ok_or(InputError::Usage(USAGE))?;
            if verb == "create" {
                return Ok(UserEvent::Request(Command::CreateWorkers(launch(words)?)));
            }
            let worker_id = id(words.next(), USAGE)?;
            let field = match verb {
                "concurrency" => Some(CapacityField::Concurrency),
                "prefetch" => Some(CapacityField::Prefetch),
                _ => None,
            };
            if let Some(field) = field {
                UserEvent::Request(Command::Capacity {
                    worker_id,
                    field,
                    delta: delta(words.next())?,
                })
            } else {
                let action = match verb {
                    "pause" => WorkerAction::Pause,
                    "resume" => WorkerAction::Resume,
                    "clean" => WorkerAction::Clean,
                    "restart" => WorkerAction::Restart,
                    "delete" => WorkerAction::Delete,
                    _ => return Err(InputError::Usage(USAGE)),
                };
                UserEvent::Request(Command::Worker { worker_id, action })
            }
        }
        "batch" => {
            const USAGE: &str = "batch <pause|go|stop|break|clear> <name>";
            let action = match words.next() {
                Some("pause") => BatchAction::Pause(BatchScope::default()),
                Some("go") => BatchAction::Go(BatchScope::default()),
                Some("stop") => BatchAction::Stop,
                Some("break") => BatchAction::Break,
                Some("clear") => BatchAction::Clear,
                _ => return Err(InputError::Usage(USAGE)),
            };
            let name = rest_after(line, 2);
            if name.is_empty() {
                return Err(InputError::Usage(USAGE));
            }
            UserEvent::Request(Command::Batch {
                name: name.to_string(),
                action,
            })
        }
        "job" => {
            const USAGE: &str = "job <delete|restart> <id> | job delete-all";
            match words.next() {
                Some("delete-all") => UserEvent::Request(Command::DeleteAllJobs),
                Some("delete") => UserEvent::Request(Command::Job {
                    job_id: id(words.next(), USAGE)?,
                    action: JobAction::Delete,
                }),
                Some("restart") => UserEvent::Request(Command::Job {
                    job_id: id(words.next(), USAGE)?,
                    action: JobAction::Restart,
                }),
                _ => return Err(InputError::Usage(USAGE)),
            }
        }
        "confirm" | "yes" => {
            let scope = match words.next() {
                Some("both") => Some(BatchScope::WithTasks),
                Some("only-batch") | Some("batch-only") => Some(BatchScope::BatchOnly),
                _ => None,
            };
            let skip = if scope.is_some() { 2 } else { 1 };
            UserEvent::Confirm {
                row: row_ref(rest_after(line, skip))?,
                scope,
            }
        }
        "cancel" | "no" => UserEvent::Cancel(row_ref(rest_after(line, 1))?),
        "edit" => {
            const USAGE: &str = "edit <command|batch> <id>";
            let target = match words.next() {
                Some("command") => EditTarget::TaskCommand(id(words.next(), USAGE)?),
                Some("batch") => EditTarget::WorkerBatch(id(words.next(), USAGE)?),
                _ => return Err(InputError::Usage(USAGE)),
            };
            UserEvent::BeginEdit(target)
        }
        "set" => UserEvent::EditText(rest_after(line, 1).to_string()),
        "submit" => UserEvent::SubmitEdit,
        "abort" => UserEvent::CancelEdit,
        "hide" => UserEvent::SetHidden(true),
        "show" => UserEvent::SetHidden(false),
        "pause" => UserEvent::Pause,
        "resume" => UserEvent::Resume,
        "refresh" => UserEvent::Refresh,
        "export" => {
            const USAGE: &str = "export all <file.zip> | export task <id> <dir>";
            match words.next() {
                Some("all") => {
                    let path = words.next().ok_or(InputError::Usage(USAGE))?;
                    UserEvent::Export(ExportRequest::All(PathBuf::from(path)))
                }
                Some("task") => {
                    let task_id = id(words.next(), USAGE)?;
                    let dir = words.next().unwrap_or(".");
                    UserEvent::Export(ExportRequest::Task {
                        task_id,
                        dir: PathBuf::from(dir),
                    })
                }
                _ => return Err(InputError::Usage(USAGE)),
            }
        }
        "quit" | "exit" | "q" => UserEvent::Quit,
        other => return Err(InputError::UnknownCommand(other.to_string())),
    };
    Ok(event)
}
