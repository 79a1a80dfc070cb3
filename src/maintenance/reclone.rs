//! maybe-reclone: the last step of the per-repo pipeline (§4.6, §4.7).
//! Decides whether a repository has aged out, failed GC too many times,
//! or was flagged possibly-corrupt, and if so re-clones it in
//! block/overwrite mode via the clone coordinator (C10).

use std::time::Duration;

use futures::future::BoxFuture;

use crate::clock::{age_secs, unix_now};
use crate::config::Config;
use crate::config_flags::{self, MAYBE_CORRUPT_REPO, RECLONE_TIMESTAMP, REPO_TYPE};
use crate::error::{GitServerError, MaintenanceError};
use crate::gitdir::GitDir;
use crate::maintenance::{StepOutcome, StepResult};
use crate::placement::fnv1a_64;

/// Age at which a repository is reclonable purely on staleness, absent
/// any other signal.
pub const TTL: Duration = Duration::from_secs(45 * 24 * 3600);
/// Age at which a lingering `gc.log` from a failed `git gc` triggers a
/// reclone.
pub const TTL_GC: Duration = Duration::from_secs(2 * 24 * 3600);
/// Age at which a lingering `sgm.log` from failed sg-maintenance
/// triggers a reclone. [`crate::config::Config::validate`] requires
/// `sgmLogExpire` stay strictly below this, or a fresh log would never
/// be observed by this check before it expired.
pub const TTL_SGM: Duration = Duration::from_secs(2 * 24 * 3600);

const PERFORCE_TYPE: &str = "perforce";

/// The clone coordinator's "reclone" entry point, injected so this
/// module doesn't depend on the concrete syncer/network stack. Mirrors
/// §4.10's `Block=true, Overwrite=true` mode.
pub trait Recloner {
    fn reclone<'a>(
        &'a self,
        repo_name: &'a str,
        gitdir: &'a GitDir,
    ) -> BoxFuture<'a, Result<(), GitServerError>>;
}

/// `hash64(key) mod d`, folded into `[0, d)`. Deterministic per
/// repository name so restart-to-restart sweeps make the same call, and
/// so a fleet of repos cloned at once doesn't all expire on one day.
pub fn jitter(key: &str, d: Duration) -> Duration {
    if d.is_zero() {
        return Duration::ZERO;
    }
    let secs = d.as_secs().max(1);
    let offset = fnv1a_64(key.as_bytes()) % secs;
    Duration::from_secs(offset)
}

pub async fn maybe_reclone(
    gitdir: &GitDir,
    repo_name: &str,
    config: &Config,
    recloner: &dyn Recloner,
) -> StepResult {
    if config.disable_auto_git_updates {
        return Ok(StepOutcome::continue_with_reason("auto-updates disabled"));
    }

    let now = unix_now();
    let reclone_time = reclone_time_or_seed(gitdir, now).await?;

    let mut reason = decide_reason(gitdir, now, reclone_time).await?;

    if reason.as_deref() != Some("maybeCorrupt") {
        if let Some(repo_type) = config_flags::get(gitdir, REPO_TYPE)
            .await
            .map_err(MaintenanceError::from)?
        {
            if repo_type == PERFORCE_TYPE {
                reason = None;
            }
        }
    }

    let Some(reason) = reason else {
        return Ok(StepOutcome::cont());
    };

    let backoff = reclone_time + age_secs(now, reclone_time) / 2;
    config_flags::set(gitdir, RECLONE_TIMESTAMP, &backoff.to_string())
        .await
        .map_err(MaintenanceError::from)?;

    log::info!("recloning {repo_name} ({gitdir}): {reason}");
    if let Err(err) = recloner.reclone(repo_name, gitdir).await {
        log::warn!("reclone of {repo_name} failed: {err}");
    }

    Ok(StepOutcome::stop(reason))
}

async fn reclone_time_or_seed(gitdir: &GitDir, now: u64) -> Result<u64, MaintenanceError> {
    match config_flags::get(gitdir, RECLONE_TIMESTAMP)
        .await
        .map_err(MaintenanceError::from)?
    {
        Some(value) => Ok(value.parse().unwrap_or(now)),
        None => {
            config_flags::set(gitdir, RECLONE_TIMESTAMP, &now.to_string())
                .await
                .map_err(MaintenanceError::from)?;
            Ok(now)
        }
    }
}

async fn decide_reason(
    gitdir: &GitDir,
    now: u64,
    reclone_time: u64,
) -> Result<Option<String>, MaintenanceError> {
    if config_flags::get(gitdir, MAYBE_CORRUPT_REPO)
        .await
        .map_err(MaintenanceError::from)?
        .is_some()
    {
        config_flags::unset(gitdir, MAYBE_CORRUPT_REPO)
            .await
            .map_err(MaintenanceError::from)?;
        return Ok(Some("maybeCorrupt".to_string()));
    }

    let age = age_secs(now, reclone_time);
    let key = gitdir.path().to_string_lossy().into_owned();

    if age > (TTL + jitter(&key, TTL / 4)).as_secs() {
        return Ok(Some("old".to_string()));
    }

    if age > (TTL_GC + jitter(&key, TTL_GC / 4)).as_secs() {
        if let Some(first_line) = first_nonempty_line(gitdir, "gc.log").await {
            return Ok(Some(format!("git gc {first_line}")));
        }
    }

    if age > (TTL_SGM + jitter(&key, TTL_SGM / 4)).as_secs() {
        if let Some(first_line) = first_nonempty_line(gitdir, "sgm.log").await {
            return Ok(Some(format!("sg maintenance {first_line}")));
        }
    }

    Ok(None)
}

async fn first_nonempty_line(gitdir: &GitDir, rel: &str) -> Option<String> {
    let content = tokio::fs::read_to_string(gitdir.join(rel)).await.ok()?;
    content.lines().find(|l| !l.trim().is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct CountingRecloner(AtomicUsize);

    impl Recloner for CountingRecloner {
        fn reclone<'a>(
            &'a self,
            _repo_name: &'a str,
            _gitdir: &'a GitDir,
        ) -> BoxFuture<'a, Result<(), GitServerError>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }
    }

    async fn bare_repo() -> (tempfile::TempDir, GitDir) {
        let dir = tempdir().unwrap();
        std::process::Command::new("git")
            .args(["init", "--bare", "."])
            .current_dir(dir.path())
            .output()
            .unwrap();
        (dir, GitDir::new(dir.path()))
    }

    #[test]
    fn jitter_is_bounded_and_deterministic() {
        let d = Duration::from_secs(1000);
        let a = jitter("repo-a", d);
        let b = jitter("repo-a", d);
        assert_eq!(a, b);
        assert!(a < d);
    }

    #[tokio::test]
    async fn seeds_reclone_timestamp_on_first_sight() {
        let (_dir, gitdir) = bare_repo().await;
        let cfg = Config::default();
        let recloner = CountingRecloner(AtomicUsize::new(0));
        let outcome = maybe_reclone(&gitdir, "repo", &cfg, &recloner).await.unwrap();
        assert!(!outcome.stop);
        assert_eq!(recloner.0.load(Ordering::SeqCst), 0);
        let stamp = config_flags::get(&gitdir, RECLONE_TIMESTAMP).await.unwrap();
        assert!(stamp.is_some());
    }

    #[tokio::test]
    async fn maybe_corrupt_flag_triggers_reclone_and_is_cleared() {
        let (_dir, gitdir) = bare_repo().await;
        config_flags::set(&gitdir, MAYBE_CORRUPT_REPO, &unix_now().to_string())
            .await
            .unwrap();
        let cfg = Config::default();
        let recloner = CountingRecloner(AtomicUsize::new(0));
        let outcome = maybe_reclone(&gitdir, "repo", &cfg, &recloner).await.unwrap();
        assert!(outcome.stop);
        assert_eq!(outcome.reason.as_deref(), Some("maybeCorrupt"));
        assert_eq!(recloner.0.load(Ordering::SeqCst), 1);
        assert_eq!(config_flags::get(&gitdir, MAYBE_CORRUPT_REPO).await.unwrap(), None);
    }

    #[tokio::test]
    async fn old_age_triggers_reclone() {
        let (_dir, gitdir) = bare_repo().await;
        let now = unix_now();
        let old = now - (TTL.as_secs() * 2);
        config_flags::set(&gitdir, RECLONE_TIMESTAMP, &old.to_string()).await.unwrap();
        let cfg = Config::default();
        let recloner = CountingRecloner(AtomicUsize::new(0));
        let outcome = maybe_reclone(&gitdir, "repo", &cfg, &recloner).await.unwrap();
        assert!(outcome.stop);
        assert_eq!(outcome.reason.as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn perforce_type_suppresses_age_based_reclone() {
        let (_dir, gitdir) = bare_repo().await;
        let now = unix_now();
        let old = now - (TTL.as_secs() * 2);
        config_flags::set(&gitdir, RECLONE_TIMESTAMP, &old.to_string()).await.unwrap();
        config_flags::set(&gitdir, REPO_TYPE, PERFORCE_TYPE).await.unwrap();
        let cfg = Config::default();
        let recloner = CountingRecloner(AtomicUsize::new(0));
        let outcome = maybe_reclone(&gitdir, "repo", &cfg, &recloner).await.unwrap();
        assert!(!outcome.stop);
        assert_eq!(recloner.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn disabled_auto_updates_skips_entirely() {
        let (_dir, gitdir) = bare_repo().await;
        let mut cfg = Config::default();
        cfg.disable_auto_git_updates = true;
        let recloner = CountingRecloner(AtomicUsize::new(0));
        let outcome = maybe_reclone(&gitdir, "repo", &cfg, &recloner).await.unwrap();
        assert!(!outcome.stop);
    }
}
