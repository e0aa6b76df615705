use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ParseError;
use crate::model::{TaskRecord, TaskStatus};

/// Placeholder for "no filter" on the worker and batch dimensions.
pub const UNSET: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StatusFilter {
    #[default]
    All,
    /// Composite: pending, assigned or accepted.
    Pending,
    /// Composite: succeeded or failed.
    Terminated,
    Is(TaskStatus),
}

impl StatusFilter {
    pub fn admits(self, status: TaskStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Pending => status.is_waiting(),
            StatusFilter::Terminated => status.is_terminal(),
            StatusFilter::Is(s) => s == status && status != TaskStatus::Unknown,
        }
    }

    /// Status narrowing the server can do itself. Composites are filtered
    /// client side, so they do not narrow the request.
    pub fn server_status(self) -> Option<TaskStatus> {
        match self {
            StatusFilter::Is(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StatusFilter::All => "all",
            StatusFilter::Pending => "pending",
            StatusFilter::Terminated => "terminated",
            StatusFilter::Is(s) => s.as_str(),
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for StatusFilter {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" | "" => Ok(StatusFilter::All),
            "pending" => Ok(StatusFilter::Pending),
            "terminated" => Ok(StatusFilter::Terminated),
            other => other
                .parse::<TaskStatus>()
                .map(StatusFilter::Is)
                .map_err(|_| ParseError::unknown("status filter", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Task,
    Worker,
    Batch,
}

impl SortKey {
    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Task => "task",
            SortKey::Worker => "worker",
            SortKey::Batch => "batch",
        }
    }
}

impl FromStr for SortKey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task" => Ok(SortKey::Task),
            "worker" => Ok(SortKey::Worker),
            "batch" => Ok(SortKey::Batch),
            other => Err(ParseError::unknown("sort key", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterDimension {
    Status,
    Worker,
    Batch,
    Sort,
}

impl FilterDimension {
    /// Accepts both the short names and the `*_filter` query keys.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "status" | "status_filter" => Some(FilterDimension::Status),
            "worker" | "worker_filter" => Some(FilterDimension::Worker),
            "batch" | "batch_filter" => Some(FilterDimension::Batch),
            "sort" | "sortby" => Some(FilterDimension::Sort),
            _ => None,
        }
    }
}

impl FromStr for FilterDimension {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterDimension::from_key(s).ok_or_else(|| ParseError::unknown("filter", s))
    }
}

/// Narrowing applied to the tasks tab.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    pub status: StatusFilter,
    pub worker: Option<String>,
    pub batch: Option<String>,
    pub sort: SortKey,
}

impl FilterState {
    /// Builds filters from decoded query pairs. Unknown keys and unparsable
    /// values are skipped so a stale bookmark still loads.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut state = FilterState::default();
        for (key, value) in pairs {
            let Some(dim) = FilterDimension::from_key(key.as_ref()) else {
                continue;
            };
            if let Err(e) = state.set(dim, value.as_ref()) {
                warn!("ignoring seeded filter: {e}");
            }
        }
        state
    }

    pub fn get(&self, dim: FilterDimension) -> String {
        match dim {
            FilterDimension::Status => self.status.as_str().to_string(),
            FilterDimension::Worker => self.worker.clone().unwrap_or_else(|| UNSET.into()),
            FilterDimension::Batch => self.batch.clone().unwrap_or_else(|| UNSET.into()),
            FilterDimension::Sort => self.sort.as_str().to_string(),
        }
    }

    /// Returns whether the value actually changed.
    pub fn set(&mut self, dim: FilterDimension, value: &str) -> Result<bool, ParseError> {
        let changed = match dim {
            FilterDimension::Status => replace(&mut self.status, value.parse()?),
            FilterDimension::Sort => replace(&mut self.sort, value.parse()?),
            FilterDimension::Worker => replace(&mut self.worker, optional(value)),
            FilterDimension::Batch => replace(&mut self.batch, optional(value)),
        };
        Ok(changed)
    }

    pub fn admits(&self, task: &TaskRecord) -> bool {
        self.status.admits(task.status)
            && matches_name(self.worker.as_deref(), task.worker_name.as_deref())
            && matches_name(self.batch.as_deref(), task.batch.as_deref())
    }

    /// Query parameters for the tasks read endpoint.
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("sortby", self.sort.as_str().to_string())];
        if let Some(status) = self.status.server_status() {
            params.push(("status", status.as_str().to_string()));
        }
        if let Some(worker) = &self.worker {
            params.push(("worker", worker.clone()));
        }
        if let Some(batch) = &self.batch {
            params.push(("batch", batch.clone()));
        }
        params
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty() && value != UNSET).then(|| value.to_string())
}

fn matches_name(filter: Option<&str>, actual: Option<&str>) -> bool {
    match filter {
        None => true,
        Some(wanted) => actual == Some(wanted),
    }
}
