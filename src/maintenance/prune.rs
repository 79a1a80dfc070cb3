//! git-prune-if-needed: runs only when loose-object pressure was flagged
//! by the sg-maintenance check, with an immediate expiry so the normal
//! 2-week grace doesn't leave the same objects to repack next sweep
//! (§4.6).

use crate::config::Config;
use crate::error::MaintenanceError;
use crate::gitdir::GitDir;
use crate::maintenance::gc::too_many_loose_objects;
use crate::maintenance::{StepOutcome, StepResult};
use crate::process::{CommandRunner, RunOpts};

pub async fn prune_if_needed(gitdir: &GitDir, config: &Config) -> StepResult {
    if !too_many_loose_objects(gitdir, config.loose_objects_limit).await {
        return Ok(StepOutcome::continue_with_reason("skipped"));
    }

    CommandRunner
        .run_checked(
            gitdir,
            &["prune", "--expire", "now"],
            RunOpts::with_timeout(config.git_long_command_timeout),
        )
        .await
        .map_err(|err| MaintenanceError::step("git-prune", err))?;

    Ok(StepOutcome::continue_with_reason("pruned"))
}
