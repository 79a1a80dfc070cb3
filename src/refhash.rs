//! The "last changed" stamp (§4.10 step 9, §4.11 step 4): a file,
//! `sg_refhash`, whose content is a hash of the repository's sorted ref
//! list and whose mtime is set to the latest commit's time the first
//! time that hash is observed. Callers (RPC handlers wanting "has this
//! repo changed since I last looked") can stat the file cheaply instead
//! of re-deriving the hash.

use filetime::{set_file_mtime, FileTime};

use crate::error::Result;
use crate::gitdir::GitDir;
use crate::placement::fnv1a_64;
use crate::process::{CommandRunner, RunOpts};

const REFHASH_FILE: &str = "sg_refhash";

/// `hash64(sorted "git show-ref" output)`, hex-encoded. Empty repos (no
/// refs yet) hash the empty string, which is a stable, well-defined value
/// rather than an error.
pub async fn show_ref_hash(gitdir: &GitDir) -> Result<String> {
    let runner = CommandRunner::new();
    let output = runner.run(gitdir, &["show-ref"], RunOpts::default()).await?;

    // `git show-ref` exits 1 when there are no refs; that's not a failure
    // here, just an empty ref list.
    let stdout = if output.status.success() || output.status.code() == Some(1) {
        String::from_utf8_lossy(&output.stdout).into_owned()
    } else {
        return Err(crate::error::GitServerError::Subprocess {
            cmd: "git show-ref".to_string(),
            stderr: crate::corruption::redact(&String::from_utf8_lossy(&output.stderr)),
        });
    };

    let mut lines: Vec<&str> = stdout.lines().collect();
    lines.sort_unstable();
    let joined = lines.join("\n");
    Ok(format!("{:016x}", fnv1a_64(joined.as_bytes())))
}

/// Unix timestamp of the commit HEAD currently points at, via `git log`;
/// falls back to "now" if the repo has no commits yet (a freshly cloned
/// empty repo).
async fn latest_commit_time(gitdir: &GitDir) -> u64 {
    let runner = CommandRunner::new();
    let output = runner
        .run(gitdir, &["log", "-1", "--format=%ct", "HEAD"], RunOpts::default())
        .await;
    match output {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout)
            .trim()
            .parse()
            .unwrap_or_else(|_| crate::clock::unix_now()),
        _ => crate::clock::unix_now(),
    }
}

/// Unconditionally (re)write `sg_refhash` and set its mtime to the latest
/// commit time. Used by the clone path (§4.10 step 9), where the stamp is
/// always fresh.
pub async fn write_last_changed_stamp(gitdir: &GitDir) -> Result<()> {
    let hash = show_ref_hash(gitdir).await?;
    let commit_time = latest_commit_time(gitdir).await;
    write_stamp_file(gitdir, &hash, commit_time)
}

/// Update the stamp only if the ref hash actually changed since the last
/// write (§4.11 step 4: "mtime set to the latest commit time on first
/// creation" — an unchanged hash must not bump the mtime, or callers
/// polling mtime would see spurious churn on every fetch).
pub async fn update_last_changed_stamp_if_needed(gitdir: &GitDir) -> Result<bool> {
    let hash = show_ref_hash(gitdir).await?;
    let existing = tokio::fs::read_to_string(gitdir.join(REFHASH_FILE)).await.ok();
    if existing.as_deref() == Some(hash.as_str()) {
        return Ok(false);
    }
    let commit_time = latest_commit_time(gitdir).await;
    write_stamp_file(gitdir, &hash, commit_time)?;
    Ok(true)
}

fn write_stamp_file(gitdir: &GitDir, hash: &str, commit_time: u64) -> Result<()> {
    let path = gitdir.join(REFHASH_FILE);
    std::fs::write(&path, hash)?;
    let mtime = FileTime::from_unix_time(commit_time as i64, 0);
    set_file_mtime(&path, mtime).map_err(crate::error::GitServerError::from)?;
    Ok(())
}
