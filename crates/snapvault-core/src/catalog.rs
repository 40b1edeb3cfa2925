//! Point-in-time view of every snapshot on the host.
//!
//! The catalog is a cache: anything that creates, destroys or renames a
//! snapshot must call [`SnapshotCatalog::reload`] before returning.

use crate::command::{self, CommandRunner};
use crate::error::{SnapvaultError, SnapvaultResult};
use crate::tag::{order_tags, TagGrammar};
use log::debug;
use std::collections::BTreeMap;

/// Filesystem name (relative to the pool) -> ordered snapshot tags.
pub type FilesystemSnapshots = BTreeMap<String, Vec<String>>;

/// Pool name -> filesystem name -> ordered snapshot tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotCatalog {
    pools: BTreeMap<String, FilesystemSnapshots>,
}

/// Components of a single `pool[/path]@tag` listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub pool: String,
    /// Path below the pool, or the pool name itself for the root filesystem.
    pub filesystem: String,
    pub tag: String,
}

impl SnapshotEntry {
    /// Parse one listing line. Only the first tab-separated field is considered.
    pub fn parse(line: &str) -> SnapvaultResult<Self> {
        let name = line.split('\t').next().unwrap_or_default().trim();
        let (volume, tag) = name
            .rsplit_once('@')
            .filter(|(volume, tag)| !volume.is_empty() && !tag.is_empty())
            .ok_or_else(|| SnapvaultError::CatalogParseError(line.to_string()))?;

        let (pool, filesystem) = match volume.split_once('/') {
            Some((pool, rest)) if !pool.is_empty() && !rest.is_empty() => (pool, rest),
            Some(_) => return Err(SnapvaultError::CatalogParseError(line.to_string())),
            None => (volume, volume),
        };

        Ok(Self {
            pool: pool.to_string(),
            filesystem: filesystem.to_string(),
            tag: tag.to_string(),
        })
    }
}

impl SnapshotCatalog {
    /// Empty catalog; call [`reload`](Self::reload) before relying on it.
    pub fn new() -> Self {
        Self::default()
    }

    /// Query the host and build a fresh catalog.
    pub fn load<R>(runner: &R) -> SnapvaultResult<Self>
    where
        R: CommandRunner + ?Sized,
    {
        let lines = runner.run(&command::list_snapshots())?;
        Self::from_listing(lines.iter().map(String::as_str))
    }

    /// Replace the contents with a fresh listing from the host.
    pub fn reload<R>(&mut self, runner: &R) -> SnapvaultResult<()>
    where
        R: CommandRunner + ?Sized,
    {
        *self = Self::load(runner)?;
        debug!(
            "snapshot catalog reloaded: {} pools, {} snapshots",
            self.pools.len(),
            self.len()
        );
        Ok(())
    }

    /// Build a catalog from listing lines, ordering each filesystem's tags.
    pub fn from_listing<'a, I>(lines: I) -> SnapvaultResult<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut pools: BTreeMap<String, FilesystemSnapshots> = BTreeMap::new();
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            let entry = SnapshotEntry::parse(line)?;
            pools
                .entry(entry.pool)
                .or_default()
                .entry(entry.filesystem)
                .or_default()
                .push(entry.tag);
        }

        for (pool, filesystems) in pools.iter_mut() {
            for (filesystem, tags) in filesystems.iter_mut() {
                if order_tags(tags).is_none() {
                    debug!("leaving mixed-format tags of {pool}/{filesystem} in listing order");
                }
            }
        }

        Ok(Self { pools })
    }

    /// Ordered tags of one filesystem; empty when it has none.
    pub fn tags(&self, pool: &str, filesystem: &str) -> &[String] {
        self.pools
            .get(pool)
            .and_then(|filesystems| filesystems.get(filesystem))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Latest tag of one filesystem by catalog order.
    pub fn latest(&self, pool: &str, filesystem: &str) -> Option<&str> {
        self.tags(pool, filesystem).last().map(String::as_str)
    }

    pub fn contains(&self, pool: &str, filesystem: &str, tag: &str) -> bool {
        self.tags(pool, filesystem).iter().any(|existing| existing == tag)
    }

    /// Every filesystem of `pool` that has snapshots.
    pub fn pool(&self, pool: &str) -> Option<&FilesystemSnapshots> {
        self.pools.get(pool)
    }

    pub fn pool_names(&self) -> impl Iterator<Item = &str> {
        self.pools.keys().map(String::as_str)
    }

    /// Grammar that ordered this filesystem's tags, if any.
    pub fn grammar(&self, pool: &str, filesystem: &str) -> Option<TagGrammar> {
        let tags = self.tags(pool, filesystem);
        crate::tag::TAG_GRAMMARS
            .into_iter()
            .find(|grammar| tags.iter().all(|tag| grammar.parses(tag)))
    }

    /// Total number of snapshots.
    pub fn len(&self) -> usize {
        self.pools
            .values()
            .flat_map(|filesystems| filesystems.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
