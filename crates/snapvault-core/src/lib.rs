//! Core building blocks shared by snapvault binaries.
//!
//! Pools, filesystems, snapshots and replication are modelled here on top of a
//! [`CommandRunner`]; host process execution lives in `snapvault-zfs`.

pub mod backup;
pub mod catalog;
pub mod command;
pub mod config;
pub mod error;
pub mod filesystem;
pub mod logging;
pub mod pool;
pub mod replication;
pub mod schema;
pub mod tag;
pub mod zfs;

#[cfg(test)]
mod stub;

pub use backup::{run_replication_jobs, snapshot_pools, BackupEvent, BackupLevel, BackupReport};
pub use catalog::{SnapshotCatalog, SnapshotEntry};
pub use command::CommandRunner;
pub use config::{ConfigFormat, Policy, ReplicationJob, SnapvaultConfig};
pub use error::{SnapvaultError, SnapvaultResult};
pub use filesystem::Filesystem;
pub use pool::{Pool, PoolHealth};
pub use replication::{ReplicationPlan, ReplicationReport, StreamKind};
pub use schema::{PropertyKind, PropertyValue};
pub use tag::{TagGrammar, TIMESTAMP_FORMAT};
pub use zfs::Zfs;
