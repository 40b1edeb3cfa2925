//! Filesystems (datasets) inside a pool.

use crate::command::{self, CommandRunner};
use crate::error::{SnapvaultError, SnapvaultResult};
use crate::pool::Pool;
use crate::replication::{self, ReplicationReport};
use crate::schema::{filesystem_schema, PropertyValue};
use crate::tag::{parse_timestamp, timestamp_tag, TIMESTAMP_FORMAT};
use crate::zfs::Zfs;
use chrono::NaiveDateTime;
use log::info;
use std::cmp::Ordering;
use std::fmt;

/// One dataset of a pool.
///
/// Property reads always go to the host; nothing is cached between calls.
pub struct Filesystem<R> {
    zfs: Zfs<R>,
    pool: String,
    name: String,
    mountpoint: Option<String>,
}

impl<R> Clone for Filesystem<R> {
    fn clone(&self) -> Self {
        Self {
            zfs: self.zfs.clone(),
            pool: self.pool.clone(),
            name: self.name.clone(),
            mountpoint: self.mountpoint.clone(),
        }
    }
}

impl<R> fmt::Debug for Filesystem<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filesystem")
            .field("pool", &self.pool)
            .field("name", &self.name)
            .field("mountpoint", &self.mountpoint)
            .finish()
    }
}

impl<R> fmt::Display for Filesystem<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dataset())
    }
}

impl<R> PartialEq for Filesystem<R> {
    fn eq(&self, other: &Self) -> bool {
        self.pool == other.pool && self.name == other.name
    }
}

impl<R> Eq for Filesystem<R> {}

/// Filesystems are ordered by name within a pool; across pools they are unordered.
impl<R> PartialOrd for Filesystem<R> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.pool != other.pool {
            return None;
        }
        Some(self.name.cmp(&other.name))
    }
}

impl<R> Filesystem<R> {
    pub(crate) fn new(zfs: Zfs<R>, pool: &str, name: &str, mountpoint: Option<&str>) -> Self {
        Self {
            zfs,
            pool: pool.to_string(),
            name: name.to_string(),
            mountpoint: mountpoint
                .filter(|mount| !mount.is_empty() && *mount != "none" && *mount != "-")
                .map(str::to_string),
        }
    }

    /// Name relative to the pool; the root filesystem is named after the pool.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pool_name(&self) -> &str {
        &self.pool
    }

    pub fn mountpoint(&self) -> Option<&str> {
        self.mountpoint.as_deref()
    }

    pub fn is_root(&self) -> bool {
        self.name == self.pool
    }

    /// Full dataset name as the host knows it.
    pub fn dataset(&self) -> String {
        if self.is_root() {
            self.pool.clone()
        } else {
            format!("{}/{}", self.pool, self.name)
        }
    }

    /// Snapshot tags in catalog order.
    pub fn snapshots(&self) -> Vec<String> {
        self.zfs.tags(&self.pool, &self.name)
    }

    pub fn latest_snapshot(&self) -> Option<String> {
        self.snapshots().pop()
    }

    pub(crate) fn zfs(&self) -> &Zfs<R> {
        &self.zfs
    }

    pub fn has_snapshot(&self, tag: &str) -> bool {
        self.zfs.has_tag(&self.pool, &self.name, tag)
    }

    /// Snapshots whose tag parses under `format` and falls inside `[start, stop]`.
    ///
    /// Tags that do not parse under `format` are skipped.
    pub fn filter_snapshots(
        &self,
        start: &str,
        stop: &str,
        format: Option<&str>,
    ) -> SnapvaultResult<Vec<String>> {
        let format = format.unwrap_or(TIMESTAMP_FORMAT);
        let (start, stop) = parse_range(start, stop, format)?;
        Ok(self.snapshots_between(start, stop, format))
    }

    /// Tags parsing under `format` that fall inside the already validated `[start, stop]`.
    pub(crate) fn snapshots_between(
        &self,
        start: NaiveDateTime,
        stop: NaiveDateTime,
        format: &str,
    ) -> Vec<String> {
        self.snapshots()
            .into_iter()
            .filter(|tag| {
                parse_timestamp(tag, format).is_some_and(|instant| start <= instant && instant <= stop)
            })
            .collect()
    }
}

impl<R> Filesystem<R>
where
    R: CommandRunner,
{
    /// Create a snapshot and return the tag used.
    ///
    /// Without a tag one is generated from the current local time.
    pub fn create_snapshot(&self, tag: Option<&str>) -> SnapvaultResult<String> {
        let tag = tag.map(str::to_string).unwrap_or_else(timestamp_tag);
        let dataset = self.dataset();
        if self.has_snapshot(&tag) {
            return Err(SnapvaultError::SnapshotExists(command::snapshot_name(
                &dataset, &tag,
            )));
        }

        info!("creating snapshot {}", command::snapshot_name(&dataset, &tag));
        self.zfs
            .runner()
            .run(&command::create_snapshot(&dataset, &tag))?;
        self.zfs.reload_catalog()?;
        Ok(tag)
    }

    pub fn remove_snapshot(&self, tag: &str) -> SnapvaultResult<()> {
        let dataset = self.dataset();
        if !self.has_snapshot(tag) {
            return Err(SnapvaultError::SnapshotNotFound(command::snapshot_name(
                &dataset, tag,
            )));
        }

        info!("destroying snapshot {}", command::snapshot_name(&dataset, tag));
        self.zfs
            .runner()
            .run(&command::destroy_snapshot(&dataset, tag))?;
        self.zfs.reload_catalog()
    }

    /// Rename a snapshot, recursively for descendants carrying the same tag.
    pub fn rename_snapshot(&self, old: &str, new: &str) -> SnapvaultResult<()> {
        let dataset = self.dataset();
        if !self.has_snapshot(old) {
            return Err(SnapvaultError::SnapshotNotFound(command::snapshot_name(
                &dataset, old,
            )));
        }
        if self.has_snapshot(new) {
            return Err(SnapvaultError::SnapshotExists(command::snapshot_name(
                &dataset, new,
            )));
        }

        info!(
            "renaming snapshot {} to {new}",
            command::snapshot_name(&dataset, old)
        );
        self.zfs
            .runner()
            .run(&command::rename_snapshot(&dataset, old, new))?;
        self.zfs.reload_catalog()
    }

    /// Read a property. `None` means an optional property is unset.
    pub fn get_property(&self, property: &str) -> SnapvaultResult<Option<PropertyValue>> {
        let schema = filesystem_schema();
        schema.spec(property)?;
        let lines = self
            .zfs
            .runner()
            .run(&command::get_filesystem_property(&self.dataset(), property))?;
        schema.decode(property, &lines.join(" "))
    }

    pub fn set_property(
        &self,
        property: &str,
        value: impl Into<PropertyValue>,
    ) -> SnapvaultResult<()> {
        let raw = filesystem_schema().encode(property, &value.into())?;
        let dataset = self.dataset();
        info!("setting {property}={raw} on {dataset}");
        self.zfs
            .runner()
            .run(&command::set_filesystem_property(&dataset, property, &raw))?;
        Ok(())
    }

    /// Snapshot this filesystem and stream it into `target`.
    ///
    /// The new snapshot stays on this filesystem whatever the transfer outcome;
    /// see [`ReplicationReport::succeeded`].
    pub fn replicate_to(
        &self,
        target: &Pool<R>,
        tag: Option<&str>,
        force: bool,
    ) -> SnapvaultResult<ReplicationReport> {
        replication::replicate(self, target, tag, force)
    }
}

pub(crate) fn parse_range(
    start: &str,
    stop: &str,
    format: &str,
) -> SnapvaultResult<(NaiveDateTime, NaiveDateTime)> {
    let parse = |value: &str| {
        parse_timestamp(value, format).ok_or_else(|| SnapvaultError::InvalidDateFormat {
            value: value.to_string(),
            format: format.to_string(),
        })
    };
    let (start_at, stop_at) = (parse(start)?, parse(stop)?);
    if start_at > stop_at {
        return Err(SnapvaultError::InvalidDateRange {
            start: start.to_string(),
            stop: stop.to_string(),
        });
    }
    Ok((start_at, stop_at))
}
