//! C2: the config-flag store.
//!
//! Reads/writes persistent key/value flags inside a repository's own Git
//! config (not the user's global config — contrast with the teacher
//! crate's `operations::auth::GitConfig`, which reads the *global* config
//! for auth settings). Distinguishes "key not present" from I/O failure
//! per §4.2's exit-code contract.

use std::time::Duration;

use crate::error::{GitServerError, Result};
use crate::gitdir::GitDir;
use crate::process::{CommandRunner, RunOpts};

pub const REPO_TYPE: &str = "sourcegraph.type";
pub const RECLONE_TIMESTAMP: &str = "sourcegraph.recloneTimestamp";
pub const MAYBE_CORRUPT_REPO: &str = "sourcegraph.maybeCorruptRepo";

const CONFIG_TIMEOUT: Duration = Duration::from_secs(10);

/// `git config --get <key>`. Exit code 1 means "not present" (not an
/// error, per §4.2); any other nonzero exit is wrapped with the full
/// command line and stderr.
pub async fn get(gitdir: &GitDir, key: &str) -> Result<Option<String>> {
    let runner = CommandRunner::new();
    let output = runner
        .run(gitdir, &["config", "--get", key], RunOpts::with_timeout(CONFIG_TIMEOUT))
        .await?;

    match output.status.code() {
        Some(0) => {
            let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
            Ok(Some(value))
        }
        Some(1) => Ok(None),
        _ => Err(GitServerError::Subprocess {
            cmd: format!("git config --get {key}"),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }),
    }
}

/// `git config <key> <value>`.
pub async fn set(gitdir: &GitDir, key: &str, value: &str) -> Result<()> {
    let runner = CommandRunner::new();
    runner
        .run_checked(gitdir, &["config", key, value], RunOpts::with_timeout(CONFIG_TIMEOUT))
        .await?;
    Ok(())
}

/// `git config --unset <key>`. Exit code 5 means "already unset" (not an
/// error, per §4.2).
pub async fn unset(gitdir: &GitDir, key: &str) -> Result<()> {
    let runner = CommandRunner::new();
    let output = runner
        .run(gitdir, &["config", "--unset", key], RunOpts::with_timeout(CONFIG_TIMEOUT))
        .await?;

    match output.status.code() {
        Some(0) | Some(5) => Ok(()),
        _ => Err(GitServerError::Subprocess {
            cmd: format!("git config --unset {key}"),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }),
    }
}
