//! Storage pools and the filesystems they hold.

use crate::command::{self, CommandRunner};
use crate::error::{SnapvaultError, SnapvaultResult};
use crate::filesystem::{parse_range, Filesystem};
use crate::schema::{pool_schema, PropertyValue};
use crate::tag::{timestamp_tag, TIMESTAMP_FORMAT};
use crate::zfs::Zfs;
use log::{debug, info};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Health reported by `zpool get health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolHealth {
    Degraded,
    Faulted,
    Offline,
    Online,
    Removed,
    Unavail,
}

impl FromStr for PoolHealth {
    type Err = SnapvaultError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "DEGRADED" => Ok(PoolHealth::Degraded),
            "FAULTED" => Ok(PoolHealth::Faulted),
            "OFFLINE" => Ok(PoolHealth::Offline),
            "ONLINE" => Ok(PoolHealth::Online),
            "REMOVED" => Ok(PoolHealth::Removed),
            "UNAVAIL" => Ok(PoolHealth::Unavail),
            other => Err(SnapvaultError::InvalidPropertyValue {
                property: "health".into(),
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for PoolHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PoolHealth::Degraded => "DEGRADED",
            PoolHealth::Faulted => "FAULTED",
            PoolHealth::Offline => "OFFLINE",
            PoolHealth::Online => "ONLINE",
            PoolHealth::Removed => "REMOVED",
            PoolHealth::Unavail => "UNAVAIL",
        })
    }
}

/// One storage pool and its filesystems, sorted by name.
///
/// The filesystem list is populated by [`load`](Pool::load) and fully replaced
/// on every call.
pub struct Pool<R> {
    zfs: Zfs<R>,
    name: String,
    filesystems: Vec<Filesystem<R>>,
}

impl<R> Clone for Pool<R> {
    fn clone(&self) -> Self {
        Self {
            zfs: self.zfs.clone(),
            name: self.name.clone(),
            filesystems: self.filesystems.clone(),
        }
    }
}

impl<R> fmt::Debug for Pool<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.name)
            .field("filesystems", &self.filesystems)
            .finish()
    }
}

impl<R> fmt::Display for Pool<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl<R> PartialEq for Pool<R> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl<R> Eq for Pool<R> {}

impl<R> PartialOrd for Pool<R> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<R> Ord for Pool<R> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

impl<R> Pool<R> {
    pub(crate) fn new(zfs: Zfs<R>, name: &str) -> Self {
        Self {
            zfs,
            name: name.to_string(),
            filesystems: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Filesystems as of the last [`load`](Pool::load).
    pub fn filesystems(&self) -> &[Filesystem<R>] {
        &self.filesystems
    }

    /// Look up a loaded filesystem by its name relative to the pool.
    pub fn filesystem(&self, name: &str) -> SnapvaultResult<&Filesystem<R>> {
        self.filesystems
            .iter()
            .find(|fs| fs.name() == name)
            .ok_or_else(|| SnapvaultError::FilesystemNotFound {
                pool: self.name.clone(),
                name: name.to_string(),
            })
    }

    pub fn contains_filesystem(&self, name: &str) -> bool {
        self.filesystems.iter().any(|fs| fs.name() == name)
    }

    /// Full dataset name for `relative` below this pool.
    pub fn dataset_name(&self, relative: &str) -> String {
        if relative == self.name {
            self.name.clone()
        } else {
            format!("{}/{}", self.name, relative)
        }
    }
}

impl<R> Pool<R>
where
    R: CommandRunner,
{
    /// Whether the pool is currently imported.
    pub fn is_available(&self) -> SnapvaultResult<bool> {
        self.zfs.runner().succeeds(&command::pool_status(&self.name))
    }

    /// Import the pool unless it is already available.
    pub fn ensure_available(&self) -> SnapvaultResult<()> {
        if self.is_available()? {
            return Ok(());
        }
        self.import()
    }

    pub fn import(&self) -> SnapvaultResult<()> {
        info!("importing pool {}", self.name);
        self.zfs
            .runner()
            .run(&command::import_pool(&self.name))
            .map_err(|err| SnapvaultError::ImportFailed {
                pool: self.name.clone(),
                reason: err.diagnostic(),
            })?;
        Ok(())
    }

    /// Export the pool. The handle is consumed since its filesystems are gone.
    pub fn export(self) -> SnapvaultResult<()> {
        info!("exporting pool {}", self.name);
        self.zfs
            .runner()
            .run(&command::export_pool(&self.name))
            .map_err(|err| SnapvaultError::ExportFailed {
                pool: self.name.clone(),
                reason: err.diagnostic(),
            })?;
        Ok(())
    }

    /// Replace the filesystem list with a fresh listing from the host.
    pub fn load(&mut self) -> SnapvaultResult<()> {
        let lines = self
            .zfs
            .runner()
            .run(&command::list_filesystems(&self.name))
            .map_err(|err| SnapvaultError::PoolNotFound {
                pool: self.name.clone(),
                reason: err.diagnostic(),
            })?;

        let mut filesystems = Vec::with_capacity(lines.len());
        for line in &lines {
            let mut fields = line.split('\t');
            let dataset = fields.next().unwrap_or_default().trim();
            let mountpoint = fields.next().map(str::trim);

            let Some(name) = self.relative_name(dataset) else {
                debug!("ignoring dataset {dataset} outside pool {}", self.name);
                continue;
            };
            filesystems.push(Filesystem::new(
                self.zfs.clone(),
                &self.name,
                name,
                mountpoint,
            ));
        }
        filesystems.sort_by(|a, b| a.name().cmp(b.name()));
        filesystems.dedup_by(|a, b| a.name() == b.name());

        debug!("pool {} has {} filesystems", self.name, filesystems.len());
        self.filesystems = filesystems;
        Ok(())
    }

    fn relative_name<'a>(&self, dataset: &'a str) -> Option<&'a str> {
        if dataset == self.name {
            return Some(dataset);
        }
        dataset
            .strip_prefix(self.name.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|rest| !rest.is_empty())
    }

    /// Create `relative` below this pool and return the new filesystem.
    pub fn create_filesystem(&mut self, relative: &str) -> SnapvaultResult<Filesystem<R>> {
        let dataset = self.dataset_name(relative);
        if self.contains_filesystem(relative) {
            return Err(SnapvaultError::FilesystemExists(dataset));
        }

        info!("creating filesystem {dataset}");
        self.zfs.runner().run(&command::create_filesystem(&dataset))?;
        self.load()?;
        self.filesystem(relative).cloned()
    }

    /// Read a pool property. `None` means an optional property is unset.
    pub fn get_property(&self, property: &str) -> SnapvaultResult<Option<PropertyValue>> {
        let schema = pool_schema();
        schema.spec(property)?;
        let lines = self
            .zfs
            .runner()
            .run(&command::get_pool_property(&self.name, property))?;
        schema.decode(property, &lines.join(" "))
    }

    pub fn set_property(
        &self,
        property: &str,
        value: impl Into<PropertyValue>,
    ) -> SnapvaultResult<()> {
        let raw = pool_schema().encode(property, &value.into())?;
        info!("setting {property}={raw} on pool {}", self.name);
        self.zfs
            .runner()
            .run(&command::set_pool_property(&self.name, property, &raw))?;
        Ok(())
    }

    pub fn health(&self) -> SnapvaultResult<PoolHealth> {
        match self.get_property("health")? {
            Some(PropertyValue::Text(value)) => value.parse(),
            other => Err(SnapvaultError::InvalidPropertyValue {
                property: "health".into(),
                value: other.map(|value| value.to_string()).unwrap_or_default(),
            }),
        }
    }

    /// Snapshot every loaded filesystem with one tag and return the tag.
    ///
    /// Nothing is issued if any filesystem already carries the tag.
    pub fn create_snapshots(&self, tag: Option<&str>) -> SnapvaultResult<String> {
        let tag = tag.map(str::to_string).unwrap_or_else(timestamp_tag);
        if let Some(existing) = self.filesystems.iter().find(|fs| fs.has_snapshot(&tag)) {
            return Err(SnapvaultError::SnapshotExists(command::snapshot_name(
                &existing.dataset(),
                &tag,
            )));
        }

        let created = self.filesystems.iter().try_for_each(|fs| {
            info!("creating snapshot {}", command::snapshot_name(&fs.dataset(), &tag));
            self.zfs
                .runner()
                .run(&command::create_snapshot(&fs.dataset(), &tag))
                .map(drop)
        });
        // Earlier filesystems may already carry the tag when a later one fails.
        let reloaded = self.zfs.reload_catalog();
        created?;
        reloaded?;
        Ok(tag)
    }

    /// Filter every filesystem's snapshots; yields `(filesystem, tag)` pairs.
    pub fn filter_snapshots(
        &self,
        start: &str,
        stop: &str,
        format: Option<&str>,
    ) -> SnapvaultResult<Vec<(String, String)>> {
        let format = format.unwrap_or(TIMESTAMP_FORMAT);
        let (start, stop) = parse_range(start, stop, format)?;
        Ok(self
            .filesystems
            .iter()
            .flat_map(|fs| {
                fs.snapshots_between(start, stop, format)
                    .into_iter()
                    .map(move |tag| (fs.name().to_string(), tag))
            })
            .collect())
    }
}
