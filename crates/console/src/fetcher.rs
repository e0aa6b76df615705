use std::sync::Arc;

use taskdeck_core::{EntityKind, FilterState, Snapshot, ViewStateStore};
use tracing::debug;

use crate::backend::{read_path, Backend};
use crate::error::FetchError;

/// Everything that shapes one snapshot read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub kind: EntityKind,
    pub filters: FilterState,
    /// Execution ids whose output should come back untruncated.
    pub detail_ids: Vec<u64>,
}

impl FetchRequest {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            filters: FilterState::default(),
            detail_ids: Vec::new(),
        }
    }

    /// Current filters and open output panels of the view store.
    pub fn from_view(kind: EntityKind, view: &ViewStateStore) -> Self {
        Self {
            kind,
            filters: view.filters().clone(),
            detail_ids: view.detail_ids().into_iter().collect(),
        }
    }

    pub fn path(&self) -> &'static str {
        read_path(self.kind)
    }

    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let object = match self.kind {
            EntityKind::Tasks => "tasks",
            EntityKind::Workers => "workers",
            EntityKind::Batches => "batch",
            EntityKind::Jobs => return Vec::new(),
        };
        let mut pairs = vec![("object".to_string(), object.to_string())];
        if self.kind == EntityKind::Tasks {
            pairs.extend(
                self.filters
                    .query_params()
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v)),
            );
            pairs.extend(
                self.detail_ids
                    .iter()
                    .map(|id| ("detailed_tasks[]".to_string(), id.to_string())),
            );
        }
        pairs
    }
}

/// Reads snapshots through a backend. Any failure rejects the whole snapshot.
pub struct SnapshotFetcher<B> {
    backend: Arc<B>,
}

impl<B> Clone for SnapshotFetcher<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: Backend> SnapshotFetcher<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    pub async fn probe(&self) -> Result<(), FetchError> {
        self.backend.ping().await
    }

    pub async fn fetch(&self, request: &FetchRequest) -> Result<Snapshot, FetchError> {
        debug!(
            kind = %request.kind,
            details = request.detail_ids.len(),
            "fetching snapshot"
        );
        self.backend.fetch(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskdeck_core::{FilterDimension, Panel, PanelKey};

    #[test]
    fn tasks_query_carries_filters_and_details() {
        let mut view = ViewStateStore::new();
        view.set_filter(FilterDimension::Status, "failed").unwrap();
        view.set_filter(FilterDimension::Batch, "b1").unwrap();
        view.toggle_with_execution(PanelKey::new(Panel::Stdout, 4), Some(7));
        let pairs = FetchRequest::from_view(EntityKind::Tasks, &view).query_pairs();
        let has = |k: &str, v: &str| pairs.iter().any(|(a, b)| a == k && b == v);
        assert!(has("object", "tasks"));
        assert!(has("status", "failed"));
        assert!(has("batch", "b1"));
        assert!(has("sortby", "task"));
        assert!(has("detailed_tasks[]", "7"));
    }

    #[test]
    fn composite_status_is_not_sent() {
        let mut view = ViewStateStore::new();
        view.set_filter(FilterDimension::Status, "pending").unwrap();
        let pairs = FetchRequest::from_view(EntityKind::Tasks, &view).query_pairs();
        assert!(!pairs.iter().any(|(k, _)| k == "status"));
    }

    #[test]
    fn other_kinds_ignore_task_filters() {
        let mut view = ViewStateStore::new();
        view.set_filter(FilterDimension::Worker, "w1").unwrap();
        let pairs = FetchRequest::from_view(EntityKind::Batches, &view).query_pairs();
        assert_eq!(pairs, vec![("object".to_string(), "batch".to_string())]);
        assert!(FetchRequest::new(EntityKind::Jobs).query_pairs().is_empty());
    }
}
