//! Error types for the dispatch core.

use domain::services::BoundaryError;
use thiserror::Error;

/// Faults surfaced by dispatch operations.
///
/// None of these ever cross the device-poll boundary: pollers see a task,
/// no task, or a switch-account directive. These errors are for the
/// configuration/CRUD surface and for logging at call sites.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Invalid instance or assignment configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Referenced instance does not exist.
    #[error("unknown instance: {0}")]
    UnknownInstance(String),

    /// Referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A record with the same identity already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Transient failure in an external collaborator.
    #[error(transparent)]
    Boundary(#[from] BoundaryError),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
