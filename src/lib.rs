//! `gitserver-core`: the storage and maintenance plane for a
//! horizontally-sharded Git repository hosting service.
//!
//! This crate owns the on-disk repository contract, the janitor/cleanup
//! sweep, and the clone/fetch coordinators. Configuration loading,
//! network RPC transport, and the external metadata database are
//! injected collaborators — see [`config::Config`], [`metadata`], and
//! [`syncer`] for the seams.

pub mod clock;
pub mod clone;
pub mod config;
pub mod config_flags;
pub mod corruption;
pub mod disk;
pub mod diskpressure;
pub mod error;
pub mod gitdir;
pub mod headref;
pub mod janitor;
pub mod locker;
pub mod maintenance;
pub mod metadata;
pub mod placement;
pub mod process;
pub mod refhash;
pub mod shard;
pub mod shardfilter;
pub mod stats;
pub mod syncer;
pub mod tmp;
pub mod update;

pub use clone::{CloneContext, CloneOpts};
pub use config::{Config, GcMode};
pub use error::{GitServerError, Result};
pub use gitdir::GitDir;
pub use janitor::{Janitor, SweepReport};
pub use locker::{Lock, Locker};
pub use metadata::{CloneStatus, MetadataStore};
pub use shard::{Shard, UrlResolver};
pub use stats::RepoStats;
pub use syncer::{GitSyncer, ProgressLine, Syncer, SyncerFactory};
pub use update::UpdateTable;
