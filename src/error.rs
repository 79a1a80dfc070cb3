//! Error kinds for the gitserver core.
//!
//! Mirrors the teacher crate's single-enum-plus-alias shape
//! (`GitError`/`GitResult`): one public enum for everything that can
//! cross an API boundary, one internal enum for errors the janitor
//! pipeline swallows rather than propagates.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced to callers of the clone/update/janitor APIs.
#[derive(Debug, Error)]
pub enum GitServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("clone already in progress for {0}: {1}")]
    CloneInProgress(PathBuf, String),

    #[error("repository not found: {0}")]
    RepoNotFound(String),

    #[error("repository already exists: {0}")]
    RepoExists(String),

    #[error("repository is not cloneable: {reason}")]
    NotCloneable { reason: String },

    #[error("command failed: {cmd}\n{stderr}")]
    Subprocess { cmd: String, stderr: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("disk pressure target unsatisfiable: needed {need} more bytes, freed {freed}")]
    DiskPressureUnsatisfiable { need: u64, freed: u64 },

    #[error("invalid git config flag: {0}")]
    InvalidFlag(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, GitServerError>;

/// Errors raised inside a single maintenance-primitive step.
///
/// These never propagate out of the janitor's per-repo pipeline on their
/// own; the janitor logs them at `warn` and moves to the next step or the
/// next repository (see §7 of SPEC_FULL.md).
#[derive(Debug, Error)]
pub enum MaintenanceError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    GitServer(#[from] GitServerError),

    #[error("{what}: {source}")]
    Step {
        what: &'static str,
        #[source]
        source: Box<MaintenanceError>,
    },
}

impl MaintenanceError {
    pub fn step(what: &'static str, source: impl Into<MaintenanceError>) -> Self {
        MaintenanceError::Step {
            what,
            source: Box::new(source.into()),
        }
    }
}
