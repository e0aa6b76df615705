use thiserror::Error;

use crate::model::EntityKind;

/// A snapshot that cannot be trusted. The whole snapshot is rejected and the
/// previous render stays on screen.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("malformed {kind} snapshot: {source}")]
    Malformed {
        kind: EntityKind,
        #[source]
        source: serde_json::Error,
    },
    #[error("{kind} snapshot lists id {id} twice")]
    DuplicateId { kind: EntityKind, id: u64 },
    #[error("job {job_id} reports progression {value} outside 0..=100")]
    ProgressOutOfRange { job_id: u64, value: f64 },
    #[error("malformed flavor list: {0}")]
    MalformedFlavors(#[source] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown {what}: {value:?}")]
    Unknown { what: &'static str, value: String },
}

impl ParseError {
    pub fn unknown(what: &'static str, value: impl Into<String>) -> Self {
        ParseError::Unknown {
            what,
            value: value.into(),
        }
    }
}
