//! ensure-attributes: keep `info/attributes` set to the canonical content
//! that disables `export-ignore`, so `git archive` produces complete
//! trees (§4.6). Rewritten only when the on-disk content differs, to
//! avoid gratuitous mtime churn.

use crate::error::MaintenanceError;
use crate::gitdir::GitDir;
use crate::maintenance::{StepOutcome, StepResult};

/// The canonical `info/attributes` content. Neutralizes `export-ignore`
/// by matching every path and clearing the attribute that `git archive`
/// would otherwise honor to exclude files.
pub const CANONICAL_ATTRIBUTES: &str = "* -export-ignore\n";

pub async fn ensure_attributes(gitdir: &GitDir) -> StepResult {
    let info_dir = gitdir.join("info");
    let attributes_path = info_dir.join("attributes");

    let current = tokio::fs::read(&attributes_path).await.ok();
    if current.as_deref() == Some(CANONICAL_ATTRIBUTES.as_bytes()) {
        return Ok(StepOutcome::cont());
    }

    tokio::fs::create_dir_all(&info_dir)
        .await
        .map_err(MaintenanceError::from)?;
    tokio::fs::write(&attributes_path, CANONICAL_ATTRIBUTES)
        .await
        .map_err(MaintenanceError::from)?;

    Ok(StepOutcome::cont())
}
