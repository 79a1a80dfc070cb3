//! C1: the `GitDir` value type.
//!
//! Pins a filesystem path as "this is a bare Git directory" so a raw
//! `PathBuf` can never accidentally be handed to a Git invocation. Every
//! maintenance primitive and every [`crate::process::CommandRunner`] call
//! takes a `&GitDir`, never a bare path.

use std::path::{Path, PathBuf};

/// An on-disk bare Git repository, typically `<root>/<name>/.git`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GitDir(PathBuf);

impl GitDir {
    /// Wrap a path without checking that it exists or is actually a Git
    /// directory. Validity is established by the caller (e.g. the janitor
    /// walk only constructs a `GitDir` for directories literally named
    /// `.git`) or checked lazily by [`GitDir::head_path`] consumers.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        GitDir(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    pub fn into_path(self) -> PathBuf {
        self.0
    }

    pub fn join(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.0.join(rel)
    }

    pub fn head_path(&self) -> PathBuf {
        self.join("HEAD")
    }

    pub fn exists(&self) -> bool {
        self.0.is_dir()
    }

    /// The name a repository is known by, derived from its position under
    /// a repos root: `<root>/<name>/.git` -> `<name>`.
    pub fn repo_name(&self, root: &Path) -> Option<String> {
        let parent = self.0.parent()?;
        let rel = parent.strip_prefix(root).ok()?;
        Some(rel.to_string_lossy().replace('\\', "/"))
    }

    /// Set the working directory and `GIT_DIR` on a child process builder.
    /// The sole contract a `GitDir` offers to process spawners.
    pub fn prepare(&self, cmd: &mut tokio::process::Command) {
        cmd.current_dir(&self.0);
        cmd.env("GIT_DIR", &self.0);
    }

    pub fn prepare_std(&self, cmd: &mut std::process::Command) {
        cmd.current_dir(&self.0);
        cmd.env("GIT_DIR", &self.0);
    }
}

impl std::fmt::Display for GitDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl AsRef<Path> for GitDir {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_name_strips_root_and_dotgit() {
        let root = Path::new("/data/repos");
        let dir = GitDir::new("/data/repos/github.com/owner/name/.git");
        assert_eq!(
            dir.repo_name(root),
            Some("github.com/owner/name".to_string())
        );
    }

    #[test]
    fn repo_name_none_outside_root() {
        let root = Path::new("/data/repos");
        let dir = GitDir::new("/elsewhere/owner/name/.git");
        assert_eq!(dir.repo_name(root), None);
    }

    #[test]
    fn head_path_is_gitdir_slash_head() {
        let dir = GitDir::new("/r/x/.git");
        assert_eq!(dir.head_path(), Path::new("/r/x/.git/HEAD"));
    }
}
