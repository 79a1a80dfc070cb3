//! `repos-stats.json`: the janitor sweep's persisted summary (§6). The
//! file name and field set are part of the stable on-disk contract —
//! downstream consumers read it directly.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const STATS_FILENAME: &str = "repos-stats.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepoStats {
    #[serde(rename = "UpdatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "GitDirBytes")]
    pub git_dir_bytes: u64,
}

/// Write `repos-stats.json` atomically (write to a sibling temp file,
/// then rename) so a reader never observes a half-written file.
pub async fn write_stats(root: &Path, stats: &RepoStats) -> Result<()> {
    let json = serde_json::to_vec_pretty(stats).map_err(|err| {
        crate::error::GitServerError::Other(format!("failed to serialize repos-stats.json: {err}"))
    })?;

    let tmp_path = root.join(format!("{STATS_FILENAME}.tmp"));
    tokio::fs::write(&tmp_path, &json).await?;
    tokio::fs::rename(&tmp_path, root.join(STATS_FILENAME)).await?;
    Ok(())
}

pub async fn read_stats(root: &Path) -> Result<Option<RepoStats>> {
    match tokio::fs::read(root.join(STATS_FILENAME)).await {
        Ok(bytes) => {
            let stats = serde_json::from_slice(&bytes).map_err(|err| {
                crate::error::GitServerError::Other(format!("corrupt repos-stats.json: {err}"))
            })?;
            Ok(Some(stats))
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let stats = RepoStats {
            updated_at: Utc::now(),
            git_dir_bytes: 12345,
        };
        write_stats(dir.path(), &stats).await.unwrap();
        let read = read_stats(dir.path()).await.unwrap().unwrap();
        assert_eq!(read.git_dir_bytes, 12345);
    }

    #[tokio::test]
    async fn missing_file_is_none_not_error() {
        let dir = tempdir().unwrap();
        assert_eq!(read_stats(dir.path()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn field_names_match_stable_contract() {
        let stats = RepoStats {
            updated_at: Utc::now(),
            git_dir_bytes: 7,
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"UpdatedAt\""));
        assert!(json.contains("\"GitDirBytes\":7"));
    }
}
