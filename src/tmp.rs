//! C5: the tmp-area manager.
//!
//! `<root>/.tmp` is the shared scratch directory for staged clones; it is
//! cleared atomically at startup by renaming any existing `.tmp` aside
//! and deleting the stragglers asynchronously, so a slow recursive
//! delete never blocks startup and a crash never leaves a previous scratch
//! area looking live (§4.5).

use std::path::{Path, PathBuf};

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::error::Result;

pub const TMP_DIRNAME: &str = ".tmp";
pub const TMP_OLD_PREFIX: &str = ".tmp-old";

/// Anything whose basename starts with this (or equals the reserved
/// Perforce home directory name) is ignored by the janitor walk and by
/// size accounting (§6 "Ignored paths").
pub fn is_ignored_basename(name: &str) -> bool {
    name.starts_with(TMP_DIRNAME) || name == "p4-home"
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect()
}

/// Rename any existing `<root>/.tmp` aside, spawn a background task to
/// delete every `.tmp-old*` sibling, then create a fresh empty `.tmp` and
/// return its path.
pub async fn setup_and_clear_tmp(root: &Path) -> Result<PathBuf> {
    let tmp_dir = root.join(TMP_DIRNAME);

    if tokio::fs::try_exists(&tmp_dir).await.unwrap_or(false) {
        let retired = root.join(format!("{TMP_OLD_PREFIX}-{}", random_suffix()));
        tokio::fs::rename(&tmp_dir, &retired).await?;
    }

    tokio::fs::create_dir_all(&tmp_dir).await?;

    let root = root.to_path_buf();
    tokio::spawn(async move {
        if let Err(err) = reap_old_tmp_dirs(&root).await {
            log::warn!("gitserver: failed to reap stale .tmp-old directories: {err}");
        }
    });

    Ok(tmp_dir)
}

async fn reap_old_tmp_dirs(root: &Path) -> Result<()> {
    let mut entries = tokio::fs::read_dir(root).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(TMP_OLD_PREFIX) {
            let path = entry.path();
            if let Err(err) = tokio::fs::remove_dir_all(&path).await {
                log::warn!("gitserver: failed to remove {}: {err}", path.display());
            }
        }
    }
    Ok(())
}

/// Allocate a fresh scratch directory under `.tmp` for a single clone,
/// e.g. `<root>/.tmp/clone-XXXXXX`. The caller creates `.git` beneath it.
pub fn new_clone_scratch_dir(tmp_dir: &Path) -> PathBuf {
    tmp_dir.join(format!("clone-{}", random_suffix()))
}
