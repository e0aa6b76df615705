//! State that survives every snapshot replacement: expanded panels, filters,
//! pending confirmations and the open edit session.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::debug;

use crate::command::{Command, RowRef};
use crate::error::ParseError;
use crate::filter::{FilterDimension, FilterState};
use crate::model::{EntityKind, TasksSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Panel {
    Command,
    Stdout,
    Stderr,
    JobLog,
}

impl Panel {
    pub fn keyword(self) -> &'static str {
        match self {
            Panel::Command => "command",
            Panel::Stdout => "output-std",
            Panel::Stderr => "output-err",
            Panel::JobLog => "job-log",
        }
    }

    pub fn entity(self) -> EntityKind {
        match self {
            Panel::JobLog => EntityKind::Jobs,
            _ => EntityKind::Tasks,
        }
    }

    /// Output panels ask the server for the untruncated text.
    pub fn wants_detail(self) -> bool {
        matches!(self, Panel::Stdout | Panel::Stderr)
    }
}

impl std::str::FromStr for Panel {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "command" | "cmd" => Ok(Panel::Command),
            "stdout" | "output-std" => Ok(Panel::Stdout),
            "stderr" | "output-err" => Ok(Panel::Stderr),
            "log" | "job-log" => Ok(Panel::JobLog),
            other => Err(ParseError::unknown("panel", other)),
        }
    }
}

/// Stable identity of an expandable sub-panel, e.g. `output-std-42`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PanelKey {
    pub panel: Panel,
    pub id: u64,
}

impl PanelKey {
    pub fn new(panel: Panel, id: u64) -> Self {
        PanelKey { panel, id }
    }

    pub fn kind(&self) -> EntityKind {
        self.panel.entity()
    }
}

impl fmt::Display for PanelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.panel.keyword(), self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionState {
    Expanded,
    Collapsed,
}

impl ExpansionState {
    pub fn is_expanded(self) -> bool {
        self == ExpansionState::Expanded
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EditTarget {
    TaskCommand(u64),
    WorkerBatch(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession {
    pub target: EditTarget,
    pub original: String,
    pub buffer: String,
}

#[derive(Debug, Default)]
pub struct ViewStateStore {
    expanded: BTreeSet<PanelKey>,
    /// Execution id each open output panel asked details for.
    detail_requests: BTreeMap<PanelKey, u64>,
    filters: FilterState,
    seeded: bool,
    confirmations: BTreeMap<RowRef, Command>,
    edit: Option<EditSession>,
}

impl ViewStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies the initial filter query. Only the first call has any effect.
    pub fn seed_filters<I, K, V>(&mut self, pairs: I) -> bool
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if std::mem::replace(&mut self.seeded, true) {
            return false;
        }
        self.filters = FilterState::from_pairs(pairs);
        debug!(filters = ?self.filters, "seeded filters");
        true
    }

    pub fn toggle(&mut self, key: PanelKey) -> ExpansionState {
        self.toggle_with_execution(key, None)
    }

    /// Flips a panel. Output panels register the execution id whose full
    /// text should be requested on the next fetch, and release it on close.
    pub fn toggle_with_execution(
        &mut self,
        key: PanelKey,
        execution_id: Option<u64>,
    ) -> ExpansionState {
        if self.expanded.remove(&key) {
            self.detail_requests.remove(&key);
            return ExpansionState::Collapsed;
        }
        self.expanded.insert(key);
        if let (true, Some(exec)) = (key.panel.wants_detail(), execution_id) {
            self.detail_requests.insert(key, exec);
        }
        ExpansionState::Expanded
    }

    pub fn is_expanded(&self, key: PanelKey) -> bool {
        self.expanded.contains(&key)
    }

    pub fn expansion(&self, key: PanelKey) -> ExpansionState {
        if self.is_expanded(key) {
            ExpansionState::Expanded
        } else {
            ExpansionState::Collapsed
        }
    }

    pub fn expanded(&self) -> impl Iterator<Item = &PanelKey> {
        self.expanded.iter()
    }

    /// Drops every expansion and the detail ids tied to them.
    pub fn clear_all(&mut self) {
        self.expanded.clear();
        self.detail_requests.clear();
    }

    pub fn detail_ids(&self) -> BTreeSet<u64> {
        self.detail_requests.values().copied().collect()
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    pub fn get_filter(&self, dim: FilterDimension) -> String {
        self.filters.get(dim)
    }

    /// Returns whether the filter changed. A status change also collapses
    /// every panel, since the rows underneath are a different set.
    pub fn set_filter(&mut self, dim: FilterDimension, value: &str) -> Result<bool, ParseError> {
        let changed = self.filters.set(dim, value)?;
        if changed && dim == FilterDimension::Status {
            self.clear_all();
        }
        Ok(changed)
    }

    /// Resets a batch filter the latest snapshot no longer knows about.
    pub fn reconcile_filters(&mut self, snapshot: &TasksSnapshot) -> bool {
        match &self.filters.batch {
            Some(batch) if !snapshot.batch_list.iter().any(|b| b == batch) => {
                debug!(batch = %batch, "batch filter no longer valid, clearing");
                self.filters.batch = None;
                true
            }
            _ => false,
        }
    }

    /// Puts a command in its row's confirmation slot, replacing whatever
    /// was waiting there.
    pub fn request_confirmation(&mut self, command: Command) -> Option<Command> {
        self.confirmations.insert(command.row(), command)
    }

    pub fn confirmation(&self, row: &RowRef) -> Option<&Command> {
        self.confirmations.get(row)
    }

    pub fn take_confirmation(&mut self, row: &RowRef) -> Option<Command> {
        self.confirmations.remove(row)
    }

    /// Lowest-ordered pending row (tasks before workers, batches, jobs), used
    /// when the operator does not name one.
    pub fn first_confirmation(&self) -> Option<&RowRef> {
        self.confirmations.keys().next()
    }

    pub fn confirmations(&self) -> impl Iterator<Item = (&RowRef, &Command)> {
        self.confirmations.iter()
    }

    /// Starts an edit session. Fails if another one is open.
    pub fn begin_edit(&mut self, target: EditTarget, original: String) -> bool {
        if self.edit.is_some() {
            return false;
        }
        self.edit = Some(EditSession {
            target,
            buffer: original.clone(),
            original,
        });
        true
    }

    pub fn set_edit_text(&mut self, text: &str) -> bool {
        match self.edit.as_mut() {
            Some(session) => {
                session.buffer = text.to_string();
                true
            }
            None => false,
        }
    }

    pub fn edit(&self) -> Option<&EditSession> {
        self.edit.as_ref()
    }

    pub fn finish_edit(&mut self) -> Option<EditSession> {
        self.edit.take()
    }

    /// Drops every pending confirmation and the open edit.
    pub fn dismiss_interactions(&mut self) {
        self.confirmations.clear();
        self.edit = None;
    }

    /// Whether a confirmation or edit is holding the poll loop.
    pub fn has_open_interaction(&self) -> bool {
        !self.confirmations.is_empty() || self.edit.is_some()
    }
}
