//! The `MetadataStore` contract (§6): the external system of record for
//! clone status, errors, and size, kept in sync by the clone/update paths
//! and the janitor's size-seeding step. The real SQL-backed store is an
//! external collaborator; only a no-op and an in-memory fake ship here.

use std::collections::HashMap;
use std::sync::Mutex;

/// Clone status as tracked by the external metadata store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneStatus {
    Cloning,
    Cloned,
    NotCloned,
}

#[async_trait::async_trait]
pub trait MetadataStore: Send + Sync {
    async fn set_clone_status(&self, repo_name: &str, status: CloneStatus, shard_id: &str);
    async fn set_last_error(&self, repo_name: &str, message: Option<&str>);
    async fn set_repo_size(&self, repo_name: &str, bytes: u64);
    async fn list_repos_without_size(&self) -> Vec<(String, i64)>;
    async fn update_repo_sizes(&self, shard_id: &str, sizes: HashMap<i64, u64>);
    async fn lookup(&self, repo_name: &str) -> bool;
}

/// Discards every write, and reports every lookup as present (so the
/// §4.9 "not in DB" filter never fires unless a real store is wired in).
#[derive(Debug, Default)]
pub struct NullMetadataStore;

#[async_trait::async_trait]
impl MetadataStore for NullMetadataStore {
    async fn set_clone_status(&self, _repo_name: &str, _status: CloneStatus, _shard_id: &str) {}
    async fn set_last_error(&self, _repo_name: &str, _message: Option<&str>) {}
    async fn set_repo_size(&self, _repo_name: &str, _bytes: u64) {}
    async fn list_repos_without_size(&self) -> Vec<(String, i64)> {
        Vec::new()
    }
    async fn update_repo_sizes(&self, _shard_id: &str, _sizes: HashMap<i64, u64>) {}
    async fn lookup(&self, _repo_name: &str) -> bool {
        true
    }
}

#[derive(Debug, Default, Clone)]
struct RepoRecord {
    status: Option<CloneStatus>,
    last_error: Option<String>,
    size: Option<u64>,
}

/// An in-memory `MetadataStore` for tests: records every write so
/// assertions can inspect what the core reported.
#[derive(Default)]
pub struct FakeMetadataStore {
    repos: Mutex<HashMap<String, RepoRecord>>,
    known: Mutex<std::collections::HashSet<String>>,
}

impl FakeMetadataStore {
    pub fn new() -> Self {
        FakeMetadataStore::default()
    }

    /// Seed a repo name as "present" so [`MetadataStore::lookup`] returns
    /// `true` for it (the §4.9 "not in DB" filter keeps such repos).
    pub fn seed_known(&self, repo_name: impl Into<String>) {
        self.known.lock().unwrap().insert(repo_name.into());
    }

    pub fn status_of(&self, repo_name: &str) -> Option<CloneStatus> {
        self.repos.lock().unwrap().get(repo_name).and_then(|r| r.status)
    }

    pub fn last_error_of(&self, repo_name: &str) -> Option<String> {
        self.repos.lock().unwrap().get(repo_name).and_then(|r| r.last_error.clone())
    }

    pub fn size_of(&self, repo_name: &str) -> Option<u64> {
        self.repos.lock().unwrap().get(repo_name).and_then(|r| r.size)
    }
}

#[async_trait::async_trait]
impl MetadataStore for FakeMetadataStore {
    async fn set_clone_status(&self, repo_name: &str, status: CloneStatus, _shard_id: &str) {
        self.repos.lock().unwrap().entry(repo_name.to_string()).or_default().status = Some(status);
    }

    async fn set_last_error(&self, repo_name: &str, message: Option<&str>) {
        self.repos.lock().unwrap().entry(repo_name.to_string()).or_default().last_error =
            message.map(str::to_string);
    }

    async fn set_repo_size(&self, repo_name: &str, bytes: u64) {
        self.repos.lock().unwrap().entry(repo_name.to_string()).or_default().size = Some(bytes);
    }

    async fn list_repos_without_size(&self) -> Vec<(String, i64)> {
        self.repos
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, r)| r.size.is_none())
            .enumerate()
            .map(|(i, (name, _))| (name.clone(), i as i64))
            .collect()
    }

    async fn update_repo_sizes(&self, _shard_id: &str, sizes: HashMap<i64, u64>) {
        let mut repos = self.repos.lock().unwrap();
        let names: Vec<(String, i64)> = repos
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.clone(), i as i64))
            .collect();
        for (name, id) in names {
            if let Some(bytes) = sizes.get(&id) {
                repos.entry(name).or_default().size = Some(*bytes);
            }
        }
    }

    async fn lookup(&self, repo_name: &str) -> bool {
        self.known.lock().unwrap().contains(repo_name)
    }
}
