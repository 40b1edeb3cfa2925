//! Session handle shared by pools and filesystems.

use crate::catalog::SnapshotCatalog;
use crate::command::{self, CommandRunner};
use crate::error::SnapvaultResult;
use crate::pool::Pool;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Owns the command runner and the host-wide snapshot catalog.
///
/// Cloning is cheap; every clone sees the same catalog. Pools and filesystems
/// keep a clone so a mutation through one object is visible to all others once
/// the catalog has been reloaded.
pub struct Zfs<R> {
    inner: Arc<Inner<R>>,
}

struct Inner<R> {
    runner: R,
    catalog: Mutex<SnapshotCatalog>,
}

impl<R> Clone for Zfs<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> std::fmt::Debug for Zfs<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Zfs")
            .field("snapshots", &self.catalog_guard().len())
            .finish()
    }
}

impl<R> Zfs<R>
where
    R: CommandRunner,
{
    /// Wrap `runner` and load the initial snapshot catalog.
    pub fn new(runner: R) -> SnapvaultResult<Self> {
        let catalog = SnapshotCatalog::load(&runner)?;
        Ok(Self {
            inner: Arc::new(Inner {
                runner,
                catalog: Mutex::new(catalog),
            }),
        })
    }

    pub fn runner(&self) -> &R {
        &self.inner.runner
    }

    /// Names of every imported pool.
    pub fn pool_names(&self) -> SnapvaultResult<Vec<String>> {
        let lines = self.runner().run(&command::list_pools())?;
        Ok(lines
            .iter()
            .filter_map(|line| line.split('\t').next())
            .map(str::to_string)
            .collect())
    }

    /// Handle for `name` without touching the host.
    pub fn pool(&self, name: &str) -> Pool<R> {
        Pool::new(self.clone(), name)
    }

    /// Handle for `name`, importing the pool if needed and loading its filesystems.
    pub fn open_pool(&self, name: &str) -> SnapvaultResult<Pool<R>> {
        let mut pool = self.pool(name);
        pool.ensure_available()?;
        pool.load()?;
        Ok(pool)
    }

    /// Re-query every snapshot on the host.
    pub fn reload_catalog(&self) -> SnapvaultResult<()> {
        let mut catalog = self.catalog_guard();
        catalog.reload(self.runner())
    }
}

impl<R> Zfs<R> {
    /// Copy of the current catalog.
    pub fn catalog(&self) -> SnapshotCatalog {
        self.catalog_guard().clone()
    }

    pub(crate) fn tags(&self, pool: &str, filesystem: &str) -> Vec<String> {
        self.catalog_guard().tags(pool, filesystem).to_vec()
    }

    pub(crate) fn has_tag(&self, pool: &str, filesystem: &str, tag: &str) -> bool {
        self.catalog_guard().contains(pool, filesystem, tag)
    }

    fn catalog_guard(&self) -> MutexGuard<'_, SnapshotCatalog> {
        self.inner
            .catalog
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
