//! C12: the HEAD quick-reader.
//!
//! Reads a repository's current commit without forking `git`, by parsing
//! `HEAD`/`refs/**`/`packed-refs` directly. Any failure along the way
//! means the caller should fall back to invoking Git (§4.14) — this
//! module never itself shells out.

use std::path::Path;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::gitdir::GitDir;

fn looks_like_sha(s: &str) -> bool {
    s.len() == 40 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Reject a ref name containing `..` anywhere, or an absolute/escaping
/// path, per §4.14's security note (prevents `ref: ../../etc/passwd`
/// style escapes from `refs/<ref>` path construction).
fn is_safe_ref_name(name: &str) -> bool {
    !name.contains("..") && !name.starts_with('/')
}

/// Best-effort read of the commit HEAD points at. Returns `None` if any
/// step fails or looks unsafe; the caller must fall back to `git
/// rev-parse HEAD`.
pub async fn read_head_commit(gitdir: &GitDir) -> Option<String> {
    let head = tokio::fs::read_to_string(gitdir.head_path()).await.ok()?;
    let head = head.trim();

    if looks_like_sha(head) {
        return Some(head.to_string());
    }

    let ref_name = head.strip_prefix("ref: ")?.trim();
    if !is_safe_ref_name(ref_name) {
        return None;
    }

    if let Some(sha) = read_ref_file(gitdir, ref_name).await {
        return Some(sha);
    }

    read_packed_ref(gitdir, ref_name).await
}

/// Best-effort read of the ref name HEAD points at (e.g. `refs/heads/main`).
pub async fn read_head_ref_name(gitdir: &GitDir) -> Option<String> {
    let head = tokio::fs::read_to_string(gitdir.head_path()).await.ok()?;
    let head = head.trim();
    let ref_name = head.strip_prefix("ref: ")?.trim();
    if !is_safe_ref_name(ref_name) {
        return None;
    }
    Some(ref_name.to_string())
}

async fn read_ref_file(gitdir: &GitDir, ref_name: &str) -> Option<String> {
    let path: &Path = ref_name.as_ref();
    if path.is_absolute() {
        return None;
    }
    let full = gitdir.join(ref_name);
    let contents = tokio::fs::read_to_string(&full).await.ok()?;
    let sha = contents.trim();
    looks_like_sha(sha).then(|| sha.to_string())
}

async fn read_packed_ref(gitdir: &GitDir, ref_name: &str) -> Option<String> {
    let file = tokio::fs::File::open(gitdir.join("packed-refs")).await.ok()?;
    let mut lines = BufReader::new(file).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.starts_with('#') || line.starts_with('^') {
            continue;
        }
        let mut parts = line.splitn(2, ' ');
        let sha = parts.next()?;
        let name = parts.next()?.trim();
        if name == ref_name && looks_like_sha(sha) {
            return Some(sha.to_string());
        }
    }
    None
}
