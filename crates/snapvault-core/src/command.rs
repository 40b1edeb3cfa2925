//! Boundary to the external `zfs`/`zpool` tooling.
//!
//! Everything above this module talks to the storage subsystem through
//! [`CommandRunner`], and every argument vector it issues is built here so the
//! external grammar lives in one place. Listing and get operations always ask
//! for header-less, tab-separated output.

use crate::error::SnapvaultResult;

/// Executes external commands on behalf of the pool/filesystem model.
///
/// Implementations spawn real processes (`snapvault-zfs`) or interpret the
/// argument vectors in memory (tests). The first element of every argument
/// vector is the program name (`zfs` or `zpool`).
pub trait CommandRunner {
    /// Run `argv` to completion and return its stdout as trimmed, non-empty lines.
    ///
    /// # Errors
    /// Returns `SnapvaultError::CommandExecutionFailed` when the process exits nonzero.
    fn run(&self, argv: &[String]) -> SnapvaultResult<Vec<String>>;

    /// Run `argv` and report whether it exited successfully, without raising on nonzero exit.
    fn succeeds(&self, argv: &[String]) -> SnapvaultResult<bool>;

    /// Run `source` and `destination` concurrently with the source stdout wired to the
    /// destination stdin. Blocks until the destination exits and returns its exit code.
    fn pipe(&self, source: &[String], destination: &[String]) -> SnapvaultResult<i32>;
}

impl<T> CommandRunner for &T
where
    T: CommandRunner + ?Sized,
{
    fn run(&self, argv: &[String]) -> SnapvaultResult<Vec<String>> {
        (**self).run(argv)
    }

    fn succeeds(&self, argv: &[String]) -> SnapvaultResult<bool> {
        (**self).succeeds(argv)
    }

    fn pipe(&self, source: &[String], destination: &[String]) -> SnapvaultResult<i32> {
        (**self).pipe(source, destination)
    }
}

fn argv<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

/// Compose `dataset@tag`.
pub fn snapshot_name(dataset: &str, tag: &str) -> String {
    format!("{dataset}@{tag}")
}

/// List every imported pool by name.
pub fn list_pools() -> Vec<String> {
    argv(["zpool", "list", "-H", "-o", "name"])
}

/// Status check for a single pool; exits nonzero when the pool is not imported.
pub fn pool_status(pool: &str) -> Vec<String> {
    argv(["zpool", "list", "-H", "-o", "name", pool])
}

pub fn import_pool(pool: &str) -> Vec<String> {
    argv(["zpool", "import", pool])
}

pub fn export_pool(pool: &str) -> Vec<String> {
    argv(["zpool", "export", pool])
}

pub fn get_pool_property(pool: &str, property: &str) -> Vec<String> {
    argv(["zpool", "get", "-H", "-o", "value", property, pool])
}

pub fn set_pool_property(pool: &str, property: &str, value: &str) -> Vec<String> {
    let assignment = format!("{property}={value}");
    argv(["zpool", "set", assignment.as_str(), pool])
}

/// List the filesystems of `pool` (root included) as `name<TAB>mountpoint`.
pub fn list_filesystems(pool: &str) -> Vec<String> {
    argv([
        "zfs",
        "list",
        "-H",
        "-r",
        "-t",
        "filesystem",
        "-o",
        "name,mountpoint",
        pool,
    ])
}

pub fn create_filesystem(dataset: &str) -> Vec<String> {
    argv(["zfs", "create", dataset])
}

pub fn get_filesystem_property(dataset: &str, property: &str) -> Vec<String> {
    argv(["zfs", "get", "-H", "-o", "value", property, dataset])
}

pub fn set_filesystem_property(dataset: &str, property: &str, value: &str) -> Vec<String> {
    let assignment = format!("{property}={value}");
    argv(["zfs", "set", assignment.as_str(), dataset])
}

/// List every snapshot on the host, one `pool[/path]@tag` per line.
pub fn list_snapshots() -> Vec<String> {
    argv(["zfs", "list", "-H", "-t", "snapshot", "-o", "name"])
}

pub fn create_snapshot(dataset: &str, tag: &str) -> Vec<String> {
    argv(["zfs", "snapshot", snapshot_name(dataset, tag).as_str()])
}

pub fn destroy_snapshot(dataset: &str, tag: &str) -> Vec<String> {
    argv(["zfs", "destroy", snapshot_name(dataset, tag).as_str()])
}

pub fn rename_snapshot(dataset: &str, old: &str, new: &str) -> Vec<String> {
    argv([
        "zfs",
        "rename",
        "-r",
        snapshot_name(dataset, old).as_str(),
        snapshot_name(dataset, new).as_str(),
    ])
}

/// Full replication stream of `dataset@tag`.
pub fn send_full(dataset: &str, tag: &str) -> Vec<String> {
    argv(["zfs", "send", snapshot_name(dataset, tag).as_str()])
}

/// Incremental replication stream from `dataset@base` to `dataset@tag`.
pub fn send_incremental(dataset: &str, base: &str, tag: &str) -> Vec<String> {
    argv([
        "zfs",
        "send",
        "-i",
        snapshot_name(dataset, base).as_str(),
        snapshot_name(dataset, tag).as_str(),
    ])
}

/// Receive a stream into `pool`, keeping the sender's dataset path below the pool.
///
/// `force` rolls the destination back to its most recent snapshot and destroys
/// conflicting state before receiving.
pub fn receive(pool: &str, force: bool) -> Vec<String> {
    if force {
        argv(["zfs", "receive", "-F", "-d", pool])
    } else {
        argv(["zfs", "receive", "-d", pool])
    }
}
