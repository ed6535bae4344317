//! Error types for ingestion and snapshot sources.

use thiserror::Error;

use crate::source::SubscriptionId;

/// Boxed error produced by a fallible observer callback.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = DiffError> = std::result::Result<T, E>;

/// A single observer that failed during an ingestion.
#[derive(Debug, Error)]
#[error("observer #{index} failed: {source}")]
pub struct ObserverFailure {
    /// Registration index of the failing observer.
    pub index: usize,
    #[source]
    pub source: BoxError,
}

/// Failure of a [`DiffEngine::ingest`](crate::DiffEngine::ingest) call.
///
/// Whenever this is returned the engine's prior snapshot is left untouched.
#[derive(Debug, Error)]
pub enum DiffError {
    #[error(transparent)]
    Observer(#[from] ObserverFailure),

    #[error("{} observers failed", .0.len())]
    Many(Vec<ObserverFailure>),
}

impl DiffError {
    /// Registration indices of every observer that failed.
    #[must_use]
    pub fn failed_indices(&self) -> Vec<usize> {
        match self {
            Self::Observer(failure) => vec![failure.index],
            Self::Many(failures) => failures.iter().map(|f| f.index).collect(),
        }
    }

    pub(crate) fn from_failures(mut failures: Vec<ObserverFailure>) -> Option<Self> {
        match failures.len() {
            0 => None,
            1 => Some(Self::Observer(failures.remove(0))),
            _ => Some(Self::Many(failures)),
        }
    }
}

/// Errors reported by a [`SnapshotSource`](crate::SnapshotSource).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("unknown subscription: {0}")]
    UnknownSubscription(SubscriptionId),
}
