use thiserror::Error;

use crate::config::{ConfigError, OperationMode};
use crate::manifest::ManifestError;
use crate::store::StoreError;

/// Errors that prevent a run from starting or completing.
///
/// Failures of individual operations are not errors of the run; they are recorded in the results.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Loading the manifest or creating the manifest writer failed.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The object store client could not be constructed.
    #[error("failed to create object store client")]
    Store(#[from] StoreError),

    /// The run issues GETs but has no keys to read.
    #[error("'{0}' mode requires at least one key to read")]
    NoKeys(OperationMode),

    /// A worker terminated unexpectedly.
    #[error("worker task terminated unexpectedly")]
    WorkerFailed(#[from] tokio::task::JoinError),
}
