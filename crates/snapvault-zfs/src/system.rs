//! System-backed [`CommandRunner`] driving the host `zfs`/`zpool` binaries.

use crate::command::execute;
use crate::pipeline::ProcessPipeline;
use log::debug;
use snapvault_core::error::{SnapvaultError, SnapvaultResult};
use snapvault_core::{CommandRunner, SnapvaultConfig};
use std::env;
use std::path::{Path, PathBuf};

pub const DEFAULT_ZFS_PATHS: &[&str] = &[
    "/sbin/zfs",
    "/usr/sbin/zfs",
    "/usr/local/sbin/zfs",
    "/bin/zfs",
    "/usr/bin/zfs",
];

pub const DEFAULT_ZPOOL_PATHS: &[&str] = &[
    "/sbin/zpool",
    "/usr/sbin/zpool",
    "/usr/local/sbin/zpool",
    "/bin/zpool",
    "/usr/bin/zpool",
];

/// Runs argument vectors against the resolved `zfs` and `zpool` binaries.
///
/// The leading `zfs`/`zpool` of each argument vector selects the binary; errors
/// report the logical argument vector rather than the resolved path.
#[derive(Debug, Clone)]
pub struct SystemCommandRunner {
    zfs: PathBuf,
    zpool: PathBuf,
}

impl SystemCommandRunner {
    pub fn new(zfs: PathBuf, zpool: PathBuf) -> Self {
        Self { zfs, zpool }
    }

    /// Resolve both binaries from config overrides, well-known paths, then `PATH`.
    pub fn from_config(config: &SnapvaultConfig) -> SnapvaultResult<Self> {
        let zfs = resolve_binary("zfs", config.zfs_binary_path(), DEFAULT_ZFS_PATHS)?;
        let zpool = resolve_binary("zpool", config.zpool_binary_path(), DEFAULT_ZPOOL_PATHS)?;
        debug!("using zfs at {} and zpool at {}", zfs.display(), zpool.display());
        Ok(Self::new(zfs, zpool))
    }

    pub fn zfs_path(&self) -> &Path {
        &self.zfs
    }

    pub fn zpool_path(&self) -> &Path {
        &self.zpool
    }

    fn split<'a>(&self, argv: &'a [String]) -> SnapvaultResult<(&Path, &'a [String])> {
        match argv.split_first() {
            Some((program, args)) if program == "zfs" => Ok((self.zfs.as_path(), args)),
            Some((program, args)) if program == "zpool" => Ok((self.zpool.as_path(), args)),
            Some((program, _)) => Err(SnapvaultError::Provider(format!(
                "refusing to run unexpected program `{program}`"
            ))),
            None => Err(SnapvaultError::Provider("empty command".into())),
        }
    }
}

impl CommandRunner for SystemCommandRunner {
    fn run(&self, argv: &[String]) -> SnapvaultResult<Vec<String>> {
        let (binary, args) = self.split(argv)?;
        debug!("running {}", argv.join(" "));
        let output = execute(binary, args)?.check(argv)?;
        Ok(output.lines())
    }

    fn succeeds(&self, argv: &[String]) -> SnapvaultResult<bool> {
        let (binary, args) = self.split(argv)?;
        debug!("checking {}", argv.join(" "));
        Ok(execute(binary, args)?.status == 0)
    }

    fn pipe(&self, source: &[String], destination: &[String]) -> SnapvaultResult<i32> {
        let (source_binary, source_args) = self.split(source)?;
        let (destination_binary, destination_args) = self.split(destination)?;
        ProcessPipeline::spawn(
            source_binary,
            source_args,
            destination_binary,
            destination_args,
        )?
        .wait()
    }
}

fn resolve_binary(
    name: &str,
    configured: Option<PathBuf>,
    defaults: &[&str],
) -> SnapvaultResult<PathBuf> {
    if let Some(candidate) = configured {
        if !candidate.exists() {
            return Err(SnapvaultError::InvalidConfig(format!(
                "{name} binary not found at {}",
                candidate.display()
            )));
        }
        return Ok(candidate);
    }

    for candidate in defaults {
        let path = Path::new(candidate);
        if path.exists() {
            return Ok(path.to_path_buf());
        }
    }

    find_in_path(name).ok_or_else(|| {
        SnapvaultError::InvalidConfig(format!(
            "unable to locate {name} binary; tried {defaults:?} and PATH"
        ))
    })
}

fn find_in_path(binary: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_path_must_exist() {
        let err = resolve_binary(
            "zfs",
            Some(PathBuf::from("/nonexistent/zfs")),
            DEFAULT_ZFS_PATHS,
        )
        .unwrap_err();
        assert!(matches!(err, SnapvaultError::InvalidConfig(message) if message.contains("/nonexistent/zfs")));
    }

    #[test]
    fn only_zfs_and_zpool_are_dispatched() {
        let runner = SystemCommandRunner::new(PathBuf::from("/bin/true"), PathBuf::from("/bin/false"));
        let argv = vec!["rm".to_string(), "-rf".into(), "/".into()];
        assert!(matches!(runner.run(&argv), Err(SnapvaultError::Provider(_))));
        assert!(matches!(runner.run(&[]), Err(SnapvaultError::Provider(_))));
    }
}
