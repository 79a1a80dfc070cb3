//! scrub-remote: best-effort removal of the `origin` remote, since
//! credentials may historically have been baked into its URL (§4.6).

use crate::gitdir::GitDir;
use crate::maintenance::{StepOutcome, StepResult};
use crate::process::{CommandRunner, RunOpts};

pub async fn scrub_remote(gitdir: &GitDir) -> StepResult {
    let result = CommandRunner
        .run(gitdir, &["remote", "remove", "origin"], RunOpts::default())
        .await;

    if let Err(err) = result {
        log::debug!("scrub-remote: no origin to remove in {gitdir}: {err}");
    }

    Ok(StepOutcome::cont())
}
