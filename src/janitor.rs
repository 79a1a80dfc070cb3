//! C7: the janitor. Walks `<root>`, runs the ordered per-repo maintenance
//! pipeline, then triggers the disk-pressure reclaimer and shard filter
//! (§4.7).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, GcMode};
use crate::disk::DiskSizer;
use crate::diskpressure;
use crate::error::Result;
use crate::gitdir::GitDir;
use crate::maintenance::reclone::Recloner;
use crate::maintenance::{attributes, corrupt, gc, locks, prune, reclone, remote, size};
use crate::metadata::MetadataStore;
use crate::shardfilter;
use crate::stats::{self, RepoStats};

/// Summary of one completed sweep, for logging/metrics.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub repos_visited: usize,
    pub bytes_total: u64,
    pub bytes_reclaimed: u64,
    pub shard_filter: shardfilter::FilterReport,
}

/// Owns the collaborators a sweep needs beyond `Config` itself. `Shard`
/// (C16) constructs one of these from its own fields.
pub struct Janitor {
    root: PathBuf,
    config: Config,
    metadata: Arc<dyn MetadataStore>,
    disk_sizer: Arc<dyn DiskSizer>,
    recloner: Arc<dyn Recloner>,
    /// Guards against two overlapping sweeps on this process (§4.7: "two
    /// janitor runs must not overlap").
    running: AtomicBool,
}

impl Janitor {
    pub fn new(
        root: PathBuf,
        config: Config,
        metadata: Arc<dyn MetadataStore>,
        disk_sizer: Arc<dyn DiskSizer>,
        recloner: Arc<dyn Recloner>,
    ) -> Self {
        Janitor { root, config, metadata, disk_sizer, recloner, running: AtomicBool::new(false) }
    }

    /// Run one full sweep. Returns `Ok(None)` without doing anything if a
    /// sweep is already in progress on this process.
    pub async fn sweep(&self, cancel: &CancellationToken) -> Result<Option<SweepReport>> {
        if self.running.swap(true, Ordering::SeqCst) {
            log::debug!("janitor: sweep already in progress, skipping");
            return Ok(None);
        }
        let result = self.sweep_inner(cancel).await;
        self.running.store(false, Ordering::SeqCst);
        result.map(Some)
    }

    async fn sweep_inner(&self, cancel: &CancellationToken) -> Result<SweepReport> {
        let gitdirs = discover_gitdirs(&self.root).await;

        let mut report = SweepReport::default();
        let mut sizes_by_name: HashMap<String, u64> = HashMap::new();

        for gitdir in &gitdirs {
            if cancel.is_cancelled() {
                log::info!("janitor: sweep cancelled after {} repos", report.repos_visited);
                return Ok(report);
            }

            let Some(repo_name) = gitdir.repo_name(&self.root) else {
                continue;
            };

            let bytes = run_repo_pipeline(
                gitdir,
                &repo_name,
                &self.config,
                self.recloner.as_ref(),
                self.metadata.as_ref(),
            )
            .await;
            report.repos_visited += 1;
            report.bytes_total += bytes;
            sizes_by_name.insert(repo_name, bytes);
        }

        stats::write_stats(
            &self.root,
            &RepoStats { updated_at: Utc::now(), git_dir_bytes: report.bytes_total },
        )
        .await?;

        self.seed_missing_sizes(&sizes_by_name).await;

        if cancel.is_cancelled() {
            return Ok(report);
        }

        let candidates = diskpressure::candidates_from_gitdirs(gitdirs.clone(), &self.root).await;
        match diskpressure::reclaim_if_needed(
            self.disk_sizer.as_ref(),
            &self.root,
            self.config.desired_percent_free,
            candidates,
            self.metadata.as_ref(),
            &self.config.hostname,
        )
        .await
        {
            Ok(freed) => report.bytes_reclaimed = freed,
            Err(err) => log::warn!("janitor: disk-pressure reclaim failed: {err}"),
        }

        report.shard_filter = shardfilter::run(
            &self.root,
            &gitdirs,
            &self.config.addresses,
            &self.config.hostname,
            self.config.wrong_shard_delete_limit,
            self.config.remove_non_existing_repos,
            self.metadata.as_ref(),
        )
        .await;

        Ok(report)
    }

    /// One-shot seed of repo sizes into the metadata store for repos it
    /// reports as having a null size (§4.7 step 4).
    async fn seed_missing_sizes(&self, sizes_by_name: &HashMap<String, u64>) {
        let missing = self.metadata.list_repos_without_size().await;
        if missing.is_empty() {
            return;
        }
        let mut to_update = HashMap::new();
        for (name, id) in missing {
            if let Some(bytes) = sizes_by_name.get(&name) {
                to_update.insert(id, *bytes);
            }
        }
        if !to_update.is_empty() {
            self.metadata.update_repo_sizes(&self.config.hostname, to_update).await;
        }
    }
}

/// Walk `root` with a best-effort walker (unreadable directories are
/// logged and skipped, never fatal). Any directory literally named
/// `.git` whose parent is not `.tmp*`/`p4-home` is a GitDir; its contents
/// are not recursed into (§4.7 step 1).
pub async fn discover_gitdirs(root: &Path) -> Vec<GitDir> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) => {
                log::warn!("janitor: failed to read {}: {err}", dir.display());
                continue;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    log::warn!("janitor: failed to read an entry under {}: {err}", dir.display());
                    break;
                }
            };

            let file_type = match entry.file_type().await {
                Ok(ft) => ft,
                Err(_) => continue,
            };
            if !file_type.is_dir() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            if crate::tmp::is_ignored_basename(&name) {
                continue;
            }

            if name == ".git" {
                out.push(GitDir::new(entry.path()));
            } else {
                stack.push(entry.path());
            }
        }
    }

    out
}

/// Run the fixed ordered pipeline against one GitDir, stopping at the
/// first step that reports `stop = true`. Every step's own error is
/// logged and swallowed; a single bad repo must never abort the sweep.
async fn run_repo_pipeline(
    gitdir: &GitDir,
    repo_name: &str,
    config: &Config,
    recloner: &dyn Recloner,
    metadata: &dyn MetadataStore,
) -> u64 {
    let (size_result, bytes) = size::compute_size_step(gitdir).await;
    if log_step(repo_name, "compute-size", size_result) {
        return bytes;
    }

    let corrupt_result = corrupt::maybe_remove_corrupt(gitdir, repo_name, metadata, &config.hostname).await;
    if log_step(repo_name, "maybe-remove-corrupt", corrupt_result) {
        return bytes;
    }
    if log_step(repo_name, "remove-stale-locks", locks::remove_stale_locks(gitdir).await) {
        return bytes;
    }
    if log_step(repo_name, "ensure-attributes", attributes::ensure_attributes(gitdir).await) {
        return bytes;
    }
    if log_step(repo_name, "scrub-remote", remote::scrub_remote(gitdir).await) {
        return bytes;
    }
    if log_step(repo_name, "gc-or-maintenance", gc::gc_or_maintenance(gitdir, config).await) {
        return bytes;
    }
    if config.gc_mode == GcMode::SgMaintenance
        && log_step(repo_name, "prune-if-needed", prune::prune_if_needed(gitdir, config).await)
    {
        return bytes;
    }
    if !config.disable_auto_git_updates {
        log_step(repo_name, "maybe-reclone", reclone::maybe_reclone(gitdir, repo_name, config, recloner).await);
    }

    bytes
}

/// Logs a step's outcome and returns `true` if the pipeline should stop.
fn log_step(repo_name: &str, step: &'static str, result: crate::maintenance::StepResult) -> bool {
    match result {
        Ok(outcome) => {
            if let Some(reason) = &outcome.reason {
                log::debug!("janitor: {repo_name}: {step}: {reason}");
            }
            outcome.stop
        }
        Err(err) => {
            log::warn!("janitor: {repo_name}: {step} failed: {err}");
            false
        }
    }
}
