//! The `Syncer` contract (§6): an opaque per-repo VCS strategy. The core
//! depends only on this trait; `GitSyncer` is the one concrete
//! implementation shipped in-crate, driving the real `git` binary. Other
//! backends (npm, Maven, Perforce archives) plug in via [`SyncerFactory`]
//! without the core knowing the difference.

use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as TokioCommand;

use crate::corruption::redact_known;
use crate::error::{GitServerError, Result};

/// One progress line from a streaming clone, already redacted.
#[derive(Debug, Clone)]
pub struct ProgressLine(pub String);

pub type ProgressStream = Pin<Box<dyn Stream<Item = ProgressLine> + Send>>;

/// An opaque VCS backend. Object-safe so `Shard` can hold
/// `Box<dyn Syncer>` per repo without generics leaking into the core.
#[async_trait::async_trait]
pub trait Syncer: Send + Sync {
    /// Cheap existence/permission check before committing concurrency-gate
    /// capacity to a full clone.
    async fn is_cloneable(&self, name: &str, url: &str) -> Result<()>;

    /// Clone `url` into `target_dir` (not yet the final GitDir — the
    /// caller stages into scratch space and renames). Returns a stream of
    /// redacted progress lines; the caller drives it to completion, then
    /// checks the joined background task's result.
    async fn clone(&self, url: &str, target_dir: &Path) -> Result<ProgressStream>;

    /// Fetch updates into an already-cloned `gitdir`. Returns the combined
    /// stdout+stderr of the fetch, redacted, for corruption inspection.
    async fn fetch(&self, url: &str, gitdir: &crate::gitdir::GitDir) -> Result<String>;
}

/// `Fn(&str) -> Box<dyn Syncer>`, resolved per repo name so different
/// repos (or repo name prefixes) can select different backends.
pub type SyncerFactory = Arc<dyn Fn(&str) -> Arc<dyn Syncer> + Send + Sync>;

/// The one concrete [`Syncer`]: drives `git clone --bare --progress` and
/// `git fetch` as child processes, grounded in the same
/// spawn-with-timeout shape as [`crate::process::CommandRunner`] but with
/// its own incremental stdout/stderr reader (clone progress must stream,
/// not wait for exit).
pub struct GitSyncer {
    pub clone_timeout: Duration,
    pub ls_remote_timeout: Duration,
}

impl Default for GitSyncer {
    fn default() -> Self {
        GitSyncer {
            clone_timeout: Duration::from_secs(3600),
            ls_remote_timeout: Duration::from_secs(5),
        }
    }
}

#[async_trait::async_trait]
impl Syncer for GitSyncer {
    async fn is_cloneable(&self, _name: &str, url: &str) -> Result<()> {
        let mut cmd = TokioCommand::new("git");
        cmd.args(["ls-remote", url, "HEAD"]);
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn()?;
        let status = tokio::select! {
            result = child.wait() => result?,
            () = tokio::time::sleep(self.ls_remote_timeout) => {
                let _ = child.kill().await;
                return Err(GitServerError::NotCloneable {
                    reason: format!("ls-remote timed out after {:?}", self.ls_remote_timeout),
                });
            }
        };

        if status.success() {
            Ok(())
        } else {
            let mut stderr = Vec::new();
            if let Some(mut err) = child.stderr.take() {
                use tokio::io::AsyncReadExt;
                let _ = err.read_to_end(&mut stderr).await;
            }
            Err(GitServerError::NotCloneable {
                reason: redact_known(&String::from_utf8_lossy(&stderr), url, None, None),
            })
        }
    }

    async fn clone(&self, url: &str, target_dir: &Path) -> Result<ProgressStream> {
        let mut cmd = TokioCommand::new("git");
        cmd.args(["clone", "--bare", "--progress", url])
            .arg(target_dir);
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd.env("LC_ALL", "C");
        cmd.env("LANG", "C");
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn()?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| GitServerError::Other("no stderr pipe on clone child".to_string()))?;

        let url = url.to_string();
        let timeout = self.clone_timeout;
        let stream = async_stream::stream! {
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                let read = tokio::select! {
                    r = read_progress_chunk(&mut reader, &mut buf) => r,
                    () = tokio::time::sleep(timeout) => break,
                };
                match read {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf).trim().to_string();
                        if !line.is_empty() {
                            yield ProgressLine(redact_known(&line, &url, None, None));
                        }
                    }
                    Err(_) => break,
                }
            }
            let _ = child.wait().await;
        };

        Ok(Box::pin(stream))
    }

    async fn fetch(&self, url: &str, gitdir: &crate::gitdir::GitDir) -> Result<String> {
        let runner = crate::process::CommandRunner::new();
        let opts = crate::process::RunOpts::with_timeout(self.clone_timeout);
        let output = runner.run(gitdir, &["fetch", "--prune", "origin"], opts).await?;
        let combined = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        let redacted = redact_known(&combined, url, None, None);
        if output.status.success() {
            Ok(redacted)
        } else {
            Err(GitServerError::Subprocess {
                cmd: "git fetch --prune origin".to_string(),
                stderr: redacted,
            })
        }
    }
}

/// Reads one "line" from Git's progress stream, where a line is
/// terminated by either `\n` or `\r` (Git rewrites percent updates with
/// `\r` rather than emitting a new line).
async fn read_progress_chunk<R: tokio::io::AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> std::io::Result<usize> {
    let mut total = 0;
    loop {
        let available = match reader.fill_buf().await {
            Ok(b) => b,
            Err(err) => return Err(err),
        };
        if available.is_empty() {
            return Ok(total);
        }
        if let Some(pos) = available.iter().position(|&b| b == b'\n' || b == b'\r') {
            buf.extend_from_slice(&available[..pos]);
            total += pos + 1;
            reader.consume(pos + 1);
            return Ok(total);
        }
        let len = available.len();
        buf.extend_from_slice(available);
        total += len;
        reader.consume(len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tempfile::tempdir;

    #[tokio::test]
    async fn clones_a_local_bare_repo_via_file_url() {
        let src = tempdir().unwrap();
        tokio::process::Command::new("git")
            .args(["init", "--bare", "-q"])
            .arg(src.path())
            .status()
            .await
            .unwrap();

        let dst = tempdir().unwrap();
        let target = dst.path().join("clone.git");
        let syncer = GitSyncer::default();
        let mut stream = syncer
            .clone(&src.path().to_string_lossy(), &target)
            .await
            .unwrap();
        while stream.next().await.is_some() {}

        assert!(target.join("HEAD").exists());
    }

    #[tokio::test]
    async fn is_cloneable_rejects_nonexistent_remote() {
        let dst = tempdir().unwrap();
        let bogus = dst.path().join("nope");
        let syncer = GitSyncer::default();
        let result = syncer
            .is_cloneable("x", &bogus.to_string_lossy())
            .await;
        assert!(result.is_err());
    }
}
