use thiserror::Error;

use taskdeck_core::SnapshotError;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("server unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("invalid url: {0}")]
    Url(String),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(String),
    #[error("dispatch task aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("no tasks snapshot loaded yet")]
    NoSnapshot,
    #[error("task {0} is not in the current snapshot")]
    UnknownTask(u64),
    #[error("could not read full output: {0}")]
    Fetch(#[from] FetchError),
    #[error("export task aborted: {0}")]
    Aborted(String),
}
