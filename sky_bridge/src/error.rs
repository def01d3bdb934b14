use thiserror::Error;

use sky_proto::{Body, ChangeIds};

/// Failures while turning a snapshot file into a [`crate::SkyState`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SnapshotError {
    #[error("snapshot is missing required key `{0}`")]
    MissingKey(&'static str),
    #[error("snapshot key `{key}` holds non-numeric value `{value}`")]
    InvalidNumber { key: &'static str, value: String },
    #[error("failed to read snapshot from {location}: {reason}")]
    Read { location: String, reason: String },
}

/// Failures of the synchronization layer.
///
/// Network and HTTP failures are recovered locally by the callers; none of these
/// reach the scene as a hard failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error("remote unreachable: {0}")]
    Unreachable(String),
    #[error("remote answered HTTP {status}: {body}")]
    HttpError { status: u16, body: String },
    #[error("malformed delta: {0}")]
    MalformedDelta(String),
    #[error("stale delta ({received}) older than mirror ({current})")]
    StaleDelta {
        received: ChangeIds,
        current: ChangeIds,
    },
    #[error("snapshot parse failed: {0}")]
    Parse(#[from] SnapshotError),
    #[error("object info for {body} could not be decoded: {reason}")]
    InvalidObjectInfo { body: Body, reason: String },
    #[error("remote session has no mirror; a full fetch is required")]
    NotInitialized,
    #[error("no sky state available")]
    Unknown,
}

impl SyncError {
    /// Errors that mean the mirror cannot be trusted and the live mode must end.
    pub fn requires_resync(&self) -> bool {
        matches!(self, SyncError::MalformedDelta(_) | SyncError::NotInitialized)
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            SyncError::Unreachable(_) | SyncError::HttpError { .. }
        )
    }
}
