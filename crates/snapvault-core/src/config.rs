//! Configuration model and helpers used by snapvault hosts.

use crate::error::{SnapvaultError, SnapvaultResult};
use directories_next::ProjectDirs;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/snapvault.toml";
const CONFIG_FILE_NAME: &str = "snapvault.toml";
const APP_QUALIFIER: &str = "io";
const APP_ORGANIZATION: &str = "Snapvault";
const APP_NAME: &str = "snapvault";

/// Lightweight sanity check that `name` looks like a ZFS dataset or pool name.
pub fn looks_like_dataset_name(name: &str) -> bool {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return false;
    }

    for segment in trimmed.split('/') {
        if segment.is_empty() || segment.starts_with('-') {
            return false;
        }
        if !segment
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | ':' | '.'))
        {
            return false;
        }
    }

    true
}

/// Which pools this host manages and where the tooling lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Policy {
    /// Pools snapshotted by [`crate::backup::snapshot_pools`].
    #[serde(default)]
    pub pools: Vec<String>,

    #[serde(default)]
    pub zfs_path: Option<String>,

    #[serde(default)]
    pub zpool_path: Option<String>,
}

/// One filesystem to replicate into a backup pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ReplicationJob {
    pub source_pool: String,

    /// Filesystem name relative to `source_pool`; the pool name selects its root.
    pub filesystem: String,

    pub target_pool: String,

    /// Receive with rollback/overwrite of conflicting destination state.
    #[serde(default)]
    pub force: bool,

    /// Export the target pool once the job has finished.
    #[serde(default)]
    pub export_target: bool,
}

impl ReplicationJob {
    /// `source_pool/filesystem -> target_pool`, used in logs and reports.
    pub fn describe(&self) -> String {
        let source = if self.filesystem == self.source_pool {
            self.source_pool.clone()
        } else {
            format!("{}/{}", self.source_pool, self.filesystem)
        };
        format!("{source} -> {}", self.target_pool)
    }
}

/// Top-level configuration snapshot loaded from disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SnapvaultConfig {
    #[serde(default)]
    pub policy: Policy,

    #[serde(default)]
    pub replication: Vec<ReplicationJob>,

    #[serde(skip)]
    pub path: PathBuf,

    #[serde(skip)]
    pub format: ConfigFormat,
}

/// Tracks whether we parsed TOML or YAML so writes preserve format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigFormat {
    #[default]
    Toml,
    Yaml,
}

impl SnapvaultConfig {
    /// Canonical system-wide configuration path.
    pub fn default_path() -> &'static Path {
        Path::new(DEFAULT_CONFIG_PATH)
    }

    /// Per-user configuration path.
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Read a config file from disk, detecting TOML or YAML by extension.
    pub fn load<P: AsRef<Path>>(path: P) -> SnapvaultResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let format = if matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some(ext) if ext.eq_ignore_ascii_case("toml")
        ) {
            ConfigFormat::Toml
        } else {
            ConfigFormat::Yaml
        };

        let mut cfg = Self::parse(&contents, format)?;
        cfg.path = path.to_path_buf();
        Ok(cfg)
    }

    /// Parse configuration text in the given format.
    pub fn parse(contents: &str, format: ConfigFormat) -> SnapvaultResult<Self> {
        let mut cfg = match format {
            ConfigFormat::Toml => toml::from_str::<Self>(contents)?,
            ConfigFormat::Yaml => serde_yaml::from_str::<Self>(contents)?,
        };
        cfg.format = format;
        Ok(cfg)
    }

    /// Load the system config if present, then the per-user one, else defaults.
    pub fn load_default() -> SnapvaultResult<Self> {
        let system = Self::default_path();
        if system.exists() {
            return Self::load(system);
        }
        if let Some(user) = Self::user_config_path().filter(|path| path.exists()) {
            return Self::load(user);
        }
        Ok(Self {
            path: system.to_path_buf(),
            ..Self::default()
        })
    }

    /// Best-effort validation pass returning human-readable issues.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        let mut pools = HashSet::new();
        for pool in &self.policy.pools {
            let trimmed = pool.trim();
            if trimmed.contains('/') || !looks_like_dataset_name(trimmed) {
                issues.push(format!("policy.pools contains invalid pool name: {pool:?}"));
            }
            if !pools.insert(trimmed) {
                issues.push(format!("duplicate pool entry detected: {trimmed}"));
            }
        }

        for (field, value) in [
            ("policy.zfs_path", &self.policy.zfs_path),
            ("policy.zpool_path", &self.policy.zpool_path),
        ] {
            if let Some(path) = value {
                if !path.trim().is_empty() && !Path::new(path.trim()).is_absolute() {
                    issues.push(format!("{field} must be an absolute path: {path}"));
                }
            }
        }

        let mut jobs = HashSet::new();
        for job in &self.replication {
            for (field, value) in [
                ("source_pool", &job.source_pool),
                ("target_pool", &job.target_pool),
            ] {
                if value.contains('/') || !looks_like_dataset_name(value) {
                    issues.push(format!(
                        "replication job {} has invalid {field}: {value:?}",
                        job.describe()
                    ));
                }
            }
            if !looks_like_dataset_name(&job.filesystem) {
                issues.push(format!(
                    "replication job {} has invalid filesystem: {:?}",
                    job.describe(),
                    job.filesystem
                ));
            }
            if job.source_pool == job.target_pool {
                issues.push(format!(
                    "replication job {} targets its own source pool",
                    job.describe()
                ));
            }
            if !jobs.insert((&job.source_pool, &job.filesystem, &job.target_pool)) {
                issues.push(format!("duplicate replication job: {}", job.describe()));
            }
        }

        issues
    }

    /// Like [`validate`](Self::validate), but fails on the first batch of issues.
    pub fn ensure_valid(&self) -> SnapvaultResult<()> {
        let issues = self.validate();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(SnapvaultError::InvalidConfig(issues.join("; ")))
        }
    }

    /// Optional override for the `zfs` CLI path.
    pub fn zfs_binary_path(&self) -> Option<PathBuf> {
        non_empty_path(&self.policy.zfs_path)
    }

    /// Optional override for the `zpool` CLI path.
    pub fn zpool_binary_path(&self) -> Option<PathBuf> {
        non_empty_path(&self.policy.zpool_path)
    }

    /// JSON schema describing the configuration file.
    pub fn json_schema() -> SnapvaultResult<String> {
        let schema = schemars::schema_for!(SnapvaultConfig);
        Ok(serde_json::to_string_pretty(&schema)?)
    }

    /// Persist the configuration back to its original on-disk format.
    pub fn save(&self) -> SnapvaultResult<()> {
        let payload = match self.format {
            ConfigFormat::Toml => toml::to_string_pretty(self)?,
            ConfigFormat::Yaml => serde_yaml::to_string(self)?,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, payload)?;
        Ok(())
    }
}

fn non_empty_path(value: &Option<String>) -> Option<PathBuf> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
}
