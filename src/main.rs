//! `gitserverd`: the daemon entry point. Wires a [`Shard`] from
//! environment configuration, clears the scratch `.tmp` area, runs the
//! janitor on a fixed interval, and shuts down cleanly on SIGINT/SIGTERM.
//!
//! Loading configuration from a file or a config service, and resolving
//! a repository's remote URL against the real fleet database, are both
//! explicitly out of scope for this crate (see SPEC_FULL.md's
//! Non-goals) — this binary wires the simplest honest stand-ins: an
//! environment-variable config and a URL resolver that reports every
//! repository as not found. A real deployment replaces both with its own
//! collaborators and links against this crate as a library.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use gitserver_core::config::Config;
use gitserver_core::disk::RealDiskSizer;
use gitserver_core::error::GitServerError;
use gitserver_core::metadata::NullMetadataStore;
use gitserver_core::shard::{Shard, UrlResolver};
use gitserver_core::syncer::{GitSyncer, Syncer, SyncerFactory};

fn config_from_env() -> anyhow::Result<Config> {
    let mut config = Config::default();
    config.repos_dir = PathBuf::from(env::var("GITSERVER_REPOS_DIR").unwrap_or_else(|_| "/data/repos".to_string()));
    config.hostname = env::var("GITSERVER_HOSTNAME").unwrap_or_default();
    config.addresses = env::var("GITSERVER_ADDRESSES")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    config.validate().map_err(|err| anyhow::anyhow!("invalid configuration: {err}"))?;
    Ok(config)
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut terminate = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = config_from_env()?;
    log::info!("gitserverd: starting on {} ({})", config.hostname, config.repos_dir.display());

    let syncer_factory: SyncerFactory = Arc::new(|_name: &str| Arc::new(GitSyncer::default()) as Arc<dyn Syncer>);
    let url_resolver: UrlResolver =
        Arc::new(|name: &str| Err(GitServerError::RepoNotFound(name.to_string())));

    let shard = Arc::new(Shard::new(
        config.repos_dir.clone(),
        config,
        Arc::new(NullMetadataStore),
        Arc::new(RealDiskSizer),
        syncer_factory,
        url_resolver,
    ));

    shard.setup_tmp().await?;

    let janitor_shard = shard.clone();
    let janitor_handle = tokio::spawn(async move {
        let janitor = janitor_shard.janitor();
        let mut interval = tokio::time::interval(janitor_shard.config().janitor_interval);
        let cancel = janitor_shard.cancellation_token();
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = janitor.sweep(&cancel).await {
                        log::error!("gitserverd: janitor sweep failed: {err}");
                    }
                }
                () = cancel.cancelled() => {
                    log::info!("gitserverd: janitor loop shutting down");
                    break;
                }
            }
        }
    });

    wait_for_shutdown_signal().await;
    log::info!("gitserverd: shutdown signal received");
    shard.cancellation_token().cancel();
    let _ = janitor_handle.await;

    Ok(())
}
