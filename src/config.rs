//! Recognized configuration surface (§6 of SPEC_FULL.md).
//!
//! Loading this struct from a file, flags, or a config service is the
//! excluded "configuration loading" collaborator (§1 Non-goals); the core
//! only ever consumes an already-populated [`Config`].

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_desired_percent_free() -> f64 {
    0.10
}

fn default_max_concurrent_clones() -> usize {
    5
}

fn default_git_long_command_timeout() -> Duration {
    Duration::from_secs(3600)
}

fn default_auto_pack_limit() -> usize {
    50
}

fn default_loose_objects_limit() -> usize {
    1024
}

fn default_sgm_log_expire() -> Duration {
    Duration::from_secs(24 * 3600)
}

fn default_wrong_shard_delete_limit() -> i64 {
    100
}

fn default_janitor_interval() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_update_debounce() -> Duration {
    Duration::from_secs(45)
}

/// Which garbage-collection strategy the janitor's C6 pipeline runs.
/// Exactly one may be active process-wide (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GcMode {
    GitGc,
    SgMaintenance,
}

impl Default for GcMode {
    fn default() -> Self {
        GcMode::SgMaintenance
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// `<root>` for all repositories owned by this shard. Required.
    pub repos_dir: PathBuf,

    /// This shard's identity for hostname matching (§4.12).
    pub hostname: String,

    /// The fleet's address list, used by the shard filter (§4.9) and the
    /// placement hash (§4.12).
    pub addresses: Vec<String>,

    /// Target free-disk fraction for the disk-pressure reclaimer (§4.8).
    #[serde(default = "default_desired_percent_free")]
    pub desired_percent_free: f64,

    /// Capacity of both the clone and ls-remote concurrency gates;
    /// live-reloadable.
    #[serde(default = "default_max_concurrent_clones")]
    pub max_concurrent_clones: usize,

    /// Deadline for clone/fetch/archive operations.
    #[serde(default = "default_git_long_command_timeout", with = "duration_secs")]
    pub git_long_command_timeout: Duration,

    /// Which of git-auto-gc/sg-maintenance is active.
    #[serde(default)]
    pub gc_mode: GcMode,

    /// Packfile-count threshold before sg-maintenance repacks (§4.6).
    #[serde(default = "default_auto_pack_limit")]
    pub auto_pack_limit: usize,

    /// Loose-object threshold before sg-maintenance repacks (§4.6).
    #[serde(default = "default_loose_objects_limit")]
    pub loose_objects_limit: usize,

    /// Skip sg-maintenance if `sgm.log` is younger than this. Must be
    /// strictly less than `TTL_SGM` (§4.6) or reclone would never observe
    /// a fresh log.
    #[serde(default = "default_sgm_log_expire", with = "duration_secs")]
    pub sgm_log_expire: Duration,

    /// Skip the maybe-reclone step entirely when set.
    #[serde(default)]
    pub disable_auto_git_updates: bool,

    /// Per-run cap on wrong-shard deletions (§4.9). Negative disables
    /// deletion ("dry run", log intent only).
    #[serde(default = "default_wrong_shard_delete_limit")]
    pub wrong_shard_delete_limit: i64,

    /// Enables the "not present in the metadata store" removal filter
    /// (§4.9). Off by default (see SPEC_FULL.md §9 Open Question 2).
    #[serde(default)]
    pub remove_non_existing_repos: bool,

    /// How often the janitor sweeps `repos_dir` (ambient; not in the
    /// upstream recognized-options table but required to run a loop).
    #[serde(default = "default_janitor_interval", with = "duration_secs")]
    pub janitor_interval: Duration,

    /// Debounce window for the update coordinator's `since` default
    /// (ambient).
    #[serde(default = "default_update_debounce", with = "duration_secs")]
    pub update_debounce: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            repos_dir: PathBuf::from("/data/repos"),
            hostname: String::new(),
            addresses: Vec::new(),
            desired_percent_free: default_desired_percent_free(),
            max_concurrent_clones: default_max_concurrent_clones(),
            git_long_command_timeout: default_git_long_command_timeout(),
            gc_mode: GcMode::default(),
            auto_pack_limit: default_auto_pack_limit(),
            loose_objects_limit: default_loose_objects_limit(),
            sgm_log_expire: default_sgm_log_expire(),
            disable_auto_git_updates: false,
            wrong_shard_delete_limit: default_wrong_shard_delete_limit(),
            remove_non_existing_repos: false,
            janitor_interval: default_janitor_interval(),
            update_debounce: default_update_debounce(),
        }
    }
}

impl Config {
    pub fn tmp_dir(&self) -> PathBuf {
        self.repos_dir.join(".tmp")
    }

    /// Validate internal consistency the Non-goal list doesn't cover
    /// for us (e.g. `sgmLogExpire < TTL_SGM`, §4.6's constraint).
    pub fn validate(&self) -> Result<(), String> {
        if self.sgm_log_expire >= crate::maintenance::reclone::TTL_SGM {
            return Err(format!(
                "sgmLogExpire ({:?}) must be less than TTL_SGM ({:?})",
                self.sgm_log_expire,
                crate::maintenance::reclone::TTL_SGM
            ));
        }
        if self.repos_dir.as_os_str().is_empty() {
            return Err("reposDir is required".to_string());
        }
        Ok(())
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid_once_repos_dir_is_set() {
        let mut cfg = Config::default();
        cfg.repos_dir = PathBuf::from("/tmp/repos");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_sgm_log_expire_not_below_ttl_sgm() {
        let mut cfg = Config::default();
        cfg.repos_dir = PathBuf::from("/tmp/repos");
        cfg.sgm_log_expire = Duration::from_secs(3 * 24 * 3600);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn round_trips_through_json() {
        let mut cfg = Config::default();
        cfg.repos_dir = PathBuf::from("/tmp/repos");
        cfg.hostname = "gitserver-0".to_string();
        let json = serde_json::to_string(&cfg).expect("serialize");
        let back: Config = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.hostname, "gitserver-0");
        assert_eq!(back.max_concurrent_clones, cfg.max_concurrent_clones);
    }
}
