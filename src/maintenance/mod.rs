//! C6: the maintenance primitives.
//!
//! Each primitive is `GitDir -> (stop?, error)` per §4.6; `stop = true`
//! means "this repository was removed or will be re-cloned, skip the
//! remaining steps of this sweep". The janitor (§4.7) runs them in the
//! fixed order declared in [`crate::janitor`].

pub mod attributes;
pub mod corrupt;
pub mod gc;
pub mod locks;
pub mod prune;
pub mod reclone;
pub mod remote;
pub mod size;

use crate::error::MaintenanceError;

/// The outcome of one maintenance primitive.
#[derive(Debug, Default, Clone)]
pub struct StepOutcome {
    /// `true` if the rest of this repository's pipeline should be
    /// skipped this sweep (it was deleted, or is being re-cloned).
    pub stop: bool,
    /// A short, human-readable reason for logging/metrics, e.g. the
    /// reclone reason or "skipped" for a no-op maintenance check.
    pub reason: Option<String>,
}

impl StepOutcome {
    pub fn cont() -> Self {
        StepOutcome::default()
    }

    pub fn stop(reason: impl Into<String>) -> Self {
        StepOutcome {
            stop: true,
            reason: Some(reason.into()),
        }
    }

    pub fn continue_with_reason(reason: impl Into<String>) -> Self {
        StepOutcome {
            stop: false,
            reason: Some(reason.into()),
        }
    }
}

pub type StepResult = Result<StepOutcome, MaintenanceError>;
