//! C16 (ambient): the shard composition root.
//!
//! `Shard` owns every piece of process-wide mutable state enumerated in
//! §3 ("Shard state") as concrete fields rather than package globals.
//! `Janitor`, the clone coordinator, and the update coordinator are all
//! reached through `&Shard`/`Arc<Shard>`, so the janitor's reclone step
//! and an RPC-driven clone share the same locker and concurrency gates —
//! resolving the cyclic dependency between the janitor and the clone
//! coordinator noted in SPEC_FULL.md §9.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use futures::future::BoxFuture;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::clone::{self, CloneContext, CloneOpts};
use crate::config::Config;
use crate::disk::DiskSizer;
use crate::error::{GitServerError, Result};
use crate::gitdir::GitDir;
use crate::janitor::Janitor;
use crate::locker::Locker;
use crate::maintenance::reclone::Recloner;
use crate::metadata::MetadataStore;
use crate::syncer::{Syncer, SyncerFactory};
use crate::update::{self, UpdateTable};

/// Resolves a repository name to the remote URL it should be cloned
/// from (§4.10 step 2's "injected function"). Fails with
/// [`GitServerError::RepoNotFound`] (or any other `GitServerError`) when
/// the name isn't recognized.
pub type UrlResolver = Arc<dyn Fn(&str) -> Result<String> + Send + Sync>;

pub struct Shard {
    root_dir: PathBuf,
    hostname: String,
    locker: Locker,
    /// `ArcSwap` rather than a bare `Arc<Semaphore>` because
    /// `Semaphore::add_permits` only grows; shrinking the configured
    /// concurrency requires building a fresh `Semaphore` and swapping it
    /// in (§4.16).
    clone_gate: ArcSwap<Semaphore>,
    ls_remote_gate: ArcSwap<Semaphore>,
    update_table: UpdateTable,
    config: ArcSwap<Config>,
    metadata: Arc<dyn MetadataStore>,
    disk_sizer: Arc<dyn DiskSizer>,
    syncer_factory: SyncerFactory,
    url_resolver: UrlResolver,
    cancel: CancellationToken,
}

impl Shard {
    pub fn new(
        root_dir: PathBuf,
        config: Config,
        metadata: Arc<dyn MetadataStore>,
        disk_sizer: Arc<dyn DiskSizer>,
        syncer_factory: SyncerFactory,
        url_resolver: UrlResolver,
    ) -> Self {
        let hostname = config.hostname.clone();
        let clone_gate = Semaphore::new(config.max_concurrent_clones);
        let ls_remote_gate = Semaphore::new(config.max_concurrent_clones);
        Shard {
            root_dir,
            hostname,
            locker: Locker::new(),
            clone_gate: ArcSwap::from_pointee(clone_gate),
            ls_remote_gate: ArcSwap::from_pointee(ls_remote_gate),
            update_table: UpdateTable::new(),
            config: ArcSwap::from_pointee(config),
            metadata,
            disk_sizer,
            syncer_factory,
            url_resolver,
            cancel: CancellationToken::new(),
        }
    }

    pub fn root_dir(&self) -> &std::path::Path {
        &self.root_dir
    }

    pub fn config(&self) -> Arc<Config> {
        self.config.load_full()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stage-clear `<root>/.tmp` (§4.5); callers run this once at
    /// startup before accepting traffic.
    pub async fn setup_tmp(&self) -> Result<()> {
        crate::tmp::setup_and_clear_tmp(&self.root_dir).await.map(|_| ())
    }

    /// Replace the live configuration, resizing the clone/ls-remote gates
    /// in place if `max_concurrent_clones` changed (§4.16's
    /// live-reloadable gates).
    pub fn reload_config(&self, new_config: Config) {
        let old = self.config.load();
        if new_config.max_concurrent_clones != old.max_concurrent_clones {
            self.clone_gate.store(Arc::new(Semaphore::new(new_config.max_concurrent_clones)));
            self.ls_remote_gate.store(Arc::new(Semaphore::new(new_config.max_concurrent_clones)));
        }
        self.config.store(Arc::new(new_config));
    }

    fn clone_context(&self, syncer: Arc<dyn Syncer>) -> CloneContext {
        CloneContext {
            root: self.root_dir.clone(),
            locker: self.locker.clone(),
            clone_gate: self.clone_gate.load_full(),
            ls_remote_gate: self.ls_remote_gate.load_full(),
            syncer,
            metadata: self.metadata.clone(),
            shard_id: self.hostname.clone(),
        }
    }

    /// RPC-facing `clone_repo(name, opts) -> progress_message` (§4.10).
    pub async fn clone_repo(&self, name: &str, opts: CloneOpts) -> Result<String> {
        let url = (self.url_resolver)(name)?;
        let syncer = (self.syncer_factory)(name);
        let ctx = self.clone_context(syncer);
        clone::clone_repo(&ctx, name, &url, opts).await
    }

    /// RPC-facing `update_repo(name, since)` (§4.11), debounced and
    /// single-flighted through the shared [`UpdateTable`].
    pub async fn update_repo(&self, name: &str, since: Duration) -> Result<()> {
        let url = (self.url_resolver)(name)?;
        let syncer = (self.syncer_factory)(name);
        let ctx = self.clone_context(syncer);
        update::update_repo(&self.update_table, &ctx, name, &url, since).await
    }

    /// Build a [`Janitor`] sharing this shard's root, config, metadata
    /// store, disk sizer, and — via `self` implementing [`Recloner`] —
    /// this shard's own locker and gates for its reclone step.
    pub fn janitor(self: &Arc<Self>) -> Janitor {
        let recloner: Arc<dyn Recloner> = self.clone();
        Janitor::new(
            self.root_dir.clone(),
            (*self.config.load_full()).clone(),
            self.metadata.clone(),
            self.disk_sizer.clone(),
            recloner,
        )
    }
}

/// The janitor's reclone step (§4.6) re-clones through the very same
/// `clone_repo` an RPC handler would call, in `Block=true, Overwrite=true`
/// mode, so it shares the locker and never races a concurrent RPC clone.
impl Recloner for Shard {
    fn reclone<'a>(
        &'a self,
        repo_name: &'a str,
        _gitdir: &'a GitDir,
    ) -> BoxFuture<'a, std::result::Result<(), GitServerError>> {
        Box::pin(async move {
            self.clone_repo(repo_name, CloneOpts { block: true, overwrite: true }).await.map(|_| ())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::FakeMetadataStore;
    use crate::syncer::GitSyncer;
    use tempfile::tempdir;

    fn make_shard(root: &std::path::Path, remote: &std::path::Path) -> Arc<Shard> {
        let mut config = Config::default();
        config.repos_dir = root.to_path_buf();
        config.hostname = "gitserver-0".to_string();

        let remote_path = remote.to_path_buf();
        let url_resolver: UrlResolver = Arc::new(move |_name: &str| Ok(remote_path.to_string_lossy().into_owned()));
        let syncer_factory: SyncerFactory = Arc::new(|_name: &str| Arc::new(GitSyncer::default()) as Arc<dyn Syncer>);

        Arc::new(Shard::new(
            root.to_path_buf(),
            config,
            Arc::new(FakeMetadataStore::new()),
            Arc::new(crate::disk::FakeDiskSizer::new(1_000_000, 1_000_000)),
            syncer_factory,
            url_resolver,
        ))
    }

    async fn init_bare_remote() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        tokio::process::Command::new("git")
            .args(["init", "--bare", "-q"])
            .arg(dir.path())
            .status()
            .await
            .unwrap();
        dir
    }

    #[tokio::test]
    async fn clone_repo_through_shard_lands_on_disk() {
        let remote = init_bare_remote().await;
        let root = tempdir().unwrap();
        let shard = make_shard(root.path(), remote.path());

        shard
            .clone_repo("example/repo", CloneOpts { block: true, overwrite: false })
            .await
            .unwrap();
        assert!(root.path().join("example/repo/.git/HEAD").exists());
    }

    #[tokio::test]
    async fn janitor_reclone_step_reuses_shard_clone_path() {
        let remote = init_bare_remote().await;
        let root = tempdir().unwrap();
        let shard = make_shard(root.path(), remote.path());

        shard
            .clone_repo("example/repo", CloneOpts { block: true, overwrite: false })
            .await
            .unwrap();

        let gitdir = GitDir::new(root.path().join("example/repo/.git"));
        shard.reclone("example/repo", &gitdir).await.unwrap();
        assert!(gitdir.exists());
    }

    #[tokio::test]
    async fn reload_config_rebuilds_gates_on_capacity_change() {
        let root = tempdir().unwrap();
        let remote = init_bare_remote().await;
        let shard = make_shard(root.path(), remote.path());

        let mut new_config = (*shard.config.load_full()).clone();
        new_config.max_concurrent_clones = 1;
        shard.reload_config(new_config);
        assert_eq!(shard.clone_gate.load().available_permits(), 1);
    }
}
