//! C9: the shard filter. Given the fleet's address list and this shard's
//! hostname, decides which on-disk repos belong here and deletes the
//! rest, rate-limited (§4.9).

use std::path::Path;

use crate::gitdir::GitDir;
use crate::metadata::{CloneStatus, MetadataStore};
use crate::placement::owned_by;

/// Outcome of one shard-filter pass, for logging and tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FilterReport {
    pub removed: Vec<String>,
    /// Names that would have been removed but weren't, because the
    /// delete budget ran out or removal is disabled (dry-run mode).
    pub skipped: Vec<String>,
}

/// Run one shard-filter pass over `gitdirs` (already discovered by the
/// janitor walk).
///
/// `wrong_shard_delete_limit` mirrors `Config::wrong_shard_delete_limit`:
/// a non-negative value caps how many wrong-shard repos are deleted in
/// this run; a negative value disables deletion entirely ("dry run" —
/// candidates are logged, not removed).
///
/// `remove_non_existing_repos`, when true, additionally removes any repo
/// whose name is absent from `metadata` (§4.9's optional "not in DB"
/// mode), under the same budget.
///
/// Every removal notifies `metadata` that the repo is `NotCloned` (§3's
/// `Cloned → NotCloned` transition), using `hostname` as the shard id.
pub async fn run(
    root: &Path,
    gitdirs: &[GitDir],
    addresses: &[String],
    hostname: &str,
    wrong_shard_delete_limit: i64,
    remove_non_existing_repos: bool,
    metadata: &dyn MetadataStore,
) -> FilterReport {
    let dry_run = wrong_shard_delete_limit < 0;
    let mut budget = if dry_run { i64::MAX } else { wrong_shard_delete_limit };

    let mut report = FilterReport::default();

    for gitdir in gitdirs {
        let Some(repo_name) = gitdir.repo_name(root) else {
            continue;
        };

        let wrong_shard = !addresses.is_empty() && !owned_by(&repo_name, addresses, hostname);
        let not_in_metadata = remove_non_existing_repos && !metadata.lookup(&repo_name).await;

        if !wrong_shard && !not_in_metadata {
            continue;
        }

        if dry_run {
            log::info!("shard-filter: would remove {repo_name} (dry run)");
            report.skipped.push(repo_name);
            continue;
        }

        if budget <= 0 {
            log::warn!("shard-filter: delete budget exhausted, leaving {repo_name} in place");
            report.skipped.push(repo_name);
            continue;
        }

        match tokio::fs::remove_dir_all(gitdir.path()).await {
            Ok(()) => {
                log::info!("shard-filter: removed {repo_name} (wrong_shard={wrong_shard}, not_in_metadata={not_in_metadata})");
                metadata.set_clone_status(&repo_name, CloneStatus::NotCloned, hostname).await;
                budget -= 1;
                report.removed.push(repo_name);
            }
            Err(err) => {
                log::warn!("shard-filter: failed to remove {repo_name}: {err}");
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{FakeMetadataStore, NullMetadataStore};
    use tempfile::tempdir;

    async fn make_gitdir(root: &Path, name: &str) -> GitDir {
        let path = root.join(name).join(".git");
        tokio::fs::create_dir_all(&path).await.unwrap();
        GitDir::new(path)
    }

    #[tokio::test]
    async fn keeps_repos_owned_by_this_hostname() {
        let root = tempdir().unwrap();
        let addresses = vec!["gitserver-0".to_string(), "gitserver-1".to_string()];

        let mut owned_here = Vec::new();
        let mut gitdirs = Vec::new();
        for i in 0..10 {
            let name = format!("repo-{i}");
            let gitdir = make_gitdir(root.path(), &name).await;
            if owned_by(&name, &addresses, "gitserver-0") {
                owned_here.push(name);
            }
            gitdirs.push(gitdir);
        }

        let metadata = NullMetadataStore;
        let report = run(root.path(), &gitdirs, &addresses, "gitserver-0", 100, false, &metadata).await;

        for name in &owned_here {
            assert!(!report.removed.contains(name), "{name} is owned by this shard and must not be removed");
        }
    }

    #[tokio::test]
    async fn removes_wrong_shard_repos() {
        let root = tempdir().unwrap();
        let addresses = vec!["gitserver-0".to_string(), "gitserver-1".to_string()];

        // Find a name this hostname does NOT own.
        let mut wrong_name = None;
        for i in 0..50 {
            let name = format!("repo-{i}");
            if !owned_by(&name, &addresses, "gitserver-0") {
                wrong_name = Some(name);
                break;
            }
        }
        let wrong_name = wrong_name.expect("some repo name must hash away from gitserver-0");
        let gitdir = make_gitdir(root.path(), &wrong_name).await;

        let metadata = FakeMetadataStore::new();
        let report = run(root.path(), &[gitdir.clone()], &addresses, "gitserver-0", 10, false, &metadata).await;

        assert_eq!(report.removed, vec![wrong_name.clone()]);
        assert!(!gitdir.exists());
        assert_eq!(metadata.status_of(&wrong_name), Some(crate::metadata::CloneStatus::NotCloned));
    }

    #[tokio::test]
    async fn negative_limit_is_dry_run_and_deletes_nothing() {
        let root = tempdir().unwrap();
        let addresses = vec!["gitserver-0".to_string(), "gitserver-1".to_string()];

        let mut wrong_name = None;
        for i in 0..50 {
            let name = format!("repo-{i}");
            if !owned_by(&name, &addresses, "gitserver-0") {
                wrong_name = Some(name);
                break;
            }
        }
        let wrong_name = wrong_name.unwrap();
        let gitdir = make_gitdir(root.path(), &wrong_name).await;

        let metadata = NullMetadataStore;
        let report = run(root.path(), &[gitdir.clone()], &addresses, "gitserver-0", -1, false, &metadata).await;

        assert!(report.removed.is_empty());
        assert_eq!(report.skipped, vec![wrong_name]);
        assert!(gitdir.exists(), "dry run must not delete anything");
    }

    #[tokio::test]
    async fn delete_budget_caps_removals_per_run() {
        let root = tempdir().unwrap();
        let addresses = vec!["gitserver-0".to_string(), "gitserver-1".to_string()];

        let mut wrong_names = Vec::new();
        let mut gitdirs = Vec::new();
        for i in 0..50 {
            let name = format!("repo-{i}");
            if !owned_by(&name, &addresses, "gitserver-0") {
                let gitdir = make_gitdir(root.path(), &name).await;
                gitdirs.push(gitdir);
                wrong_names.push(name);
                if wrong_names.len() == 3 {
                    break;
                }
            }
        }
        assert_eq!(wrong_names.len(), 3, "need at least 3 wrong-shard names to exercise the budget");

        let metadata = NullMetadataStore;
        let report = run(root.path(), &gitdirs, &addresses, "gitserver-0", 1, false, &metadata).await;

        assert_eq!(report.removed.len(), 1);
        assert_eq!(report.skipped.len(), 2);
    }

    #[tokio::test]
    async fn removes_repos_absent_from_metadata_when_enabled() {
        let root = tempdir().unwrap();
        // Empty address list: every repo is "kept" by ownership, so only
        // the not-in-metadata filter is exercised.
        let addresses: Vec<String> = Vec::new();

        let known = make_gitdir(root.path(), "known/repo").await;
        let unknown = make_gitdir(root.path(), "unknown/repo").await;

        let metadata = FakeMetadataStore::new();
        metadata.seed_known("known/repo");

        let report = run(
            root.path(),
            &[known.clone(), unknown.clone()],
            &addresses,
            "gitserver-0",
            10,
            true,
            &metadata,
        )
        .await;

        assert_eq!(report.removed, vec!["unknown/repo".to_string()]);
        assert!(known.exists());
        assert!(!unknown.exists());
        assert_eq!(metadata.status_of("unknown/repo"), Some(crate::metadata::CloneStatus::NotCloned));
        assert_eq!(metadata.status_of("known/repo"), None, "kept repo must not be touched");
    }

    #[tokio::test]
    async fn not_in_metadata_filter_is_off_by_default() {
        let root = tempdir().unwrap();
        let addresses: Vec<String> = Vec::new();
        let unknown = make_gitdir(root.path(), "unknown/repo").await;

        let metadata = FakeMetadataStore::new();
        let report = run(root.path(), &[unknown.clone()], &addresses, "gitserver-0", 10, false, &metadata).await;

        assert!(report.removed.is_empty());
        assert!(unknown.exists());
    }
}
