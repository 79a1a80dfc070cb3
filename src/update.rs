//! C11: the update coordinator. Debounces repeat fetch requests and
//! collapses concurrent callers for the same repo into a single flight
//! (§4.11).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use crate::clone::{clone_repo, CloneContext, CloneOpts};
use crate::corruption::flag_if_corrupt;
use crate::error::{GitServerError, Result};
use crate::gitdir::GitDir;
use crate::refhash::update_last_changed_stamp_if_needed;

struct InFlight {
    /// Fires once the in-progress update completes; late joiners await a
    /// clone of the receiver instead of starting a duplicate fetch.
    done: broadcast::Sender<()>,
}

/// Per-repo debounce timestamps and single-flight tokens, owned by
/// `Shard` (C16) alongside the locker.
#[derive(Default)]
pub struct UpdateTable {
    last_attempt: Mutex<HashMap<String, Instant>>,
    in_flight: Mutex<HashMap<String, Arc<InFlight>>>,
}

impl UpdateTable {
    pub fn new() -> Self {
        UpdateTable::default()
    }
}

/// `update_repo(name, since)`: entry point shared by RPC handlers and the
/// janitor's own fetch-on-schedule path (when one exists).
pub async fn update_repo(
    table: &UpdateTable,
    clone_ctx: &CloneContext,
    name: &str,
    url: &str,
    since: Duration,
) -> Result<()> {
    let target_git_dir = GitDir::new(clone_ctx.root.join(name).join(".git"));

    // Step 1: not cloned yet, delegate to the clone coordinator.
    if !target_git_dir.exists() {
        clone_repo(clone_ctx, name, url, CloneOpts { block: false, overwrite: false }).await?;
        return Err(GitServerError::CloneInProgress(
            target_git_dir.into_path(),
            "clone-in-progress".to_string(),
        ));
    }

    // Step 2: debounce.
    {
        let mut attempts = table.last_attempt.lock().unwrap();
        if let Some(last) = attempts.get(name) {
            if last.elapsed() < since {
                return Ok(());
            }
        }
        attempts.insert(name.to_string(), Instant::now());
    }

    // Step 3: single-flight.
    let (is_leader, mut completion) = {
        let mut in_flight = table.in_flight.lock().unwrap();
        if let Some(existing) = in_flight.get(name) {
            (false, existing.done.subscribe())
        } else {
            let (tx, _rx) = broadcast::channel(1);
            let handle = Arc::new(InFlight { done: tx });
            let rx = handle.done.subscribe();
            in_flight.insert(name.to_string(), handle);
            (true, rx)
        }
    };

    if !is_leader {
        let _ = completion.recv().await;
        return Ok(());
    }

    let result = run_fetch(clone_ctx, &target_git_dir, name, url).await;

    {
        let mut in_flight = table.in_flight.lock().unwrap();
        if let Some(handle) = in_flight.remove(name) {
            let _ = handle.done.send(());
        }
    }

    result
}

async fn run_fetch(clone_ctx: &CloneContext, gitdir: &GitDir, name: &str, url: &str) -> Result<()> {
    match clone_ctx.syncer.fetch(url, gitdir).await {
        Ok(_output) => {
            update_last_changed_stamp_if_needed(gitdir).await?;
            clone_ctx.metadata.set_last_error(name, None).await;
            Ok(())
        }
        Err(err) => {
            if let GitServerError::Subprocess { stderr, .. } = &err {
                let _ = flag_if_corrupt(gitdir, stderr).await;
            }
            clone_ctx.metadata.set_last_error(name, Some(&err.to_string())).await;
            Err(err)
        }
    }
}
