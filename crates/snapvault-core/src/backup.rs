//! Configured backup runs: snapshot policy pools and replicate filesystems.

use crate::command::CommandRunner;
use crate::config::{ReplicationJob, SnapvaultConfig};
use crate::error::SnapvaultResult;
use crate::replication::ReplicationReport;
use crate::zfs::Zfs;
use log::{error, info, warn};

/// Severity levels used when reporting backup events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupLevel {
    Info,
    Success,
    Warn,
    Error,
}

/// Single line of output produced by a backup step.
#[derive(Debug, Clone)]
pub struct BackupEvent {
    pub level: BackupLevel,
    pub message: String,
}

/// Aggregated report returned by the backup entry points.
#[derive(Debug, Clone, Default)]
pub struct BackupReport {
    pub title: String,
    pub events: Vec<BackupEvent>,
    pub replications: Vec<ReplicationReport>,
}

impl BackupReport {
    fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// True when no step reported an error.
    pub fn succeeded(&self) -> bool {
        !self
            .events
            .iter()
            .any(|event| event.level == BackupLevel::Error)
    }

    fn push(&mut self, level: BackupLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            BackupLevel::Info | BackupLevel::Success => info!("{message}"),
            BackupLevel::Warn => warn!("{message}"),
            BackupLevel::Error => error!("{message}"),
        }
        self.events.push(event(level, message));
    }
}

pub(crate) fn event(level: BackupLevel, message: impl Into<String>) -> BackupEvent {
    BackupEvent {
        level,
        message: message.into(),
    }
}

/// Take one snapshot across every filesystem of each `policy.pools` entry.
///
/// All pools share the same tag. A pool that fails is reported and the run
/// moves on to the next one.
pub fn snapshot_pools<R>(
    config: &SnapvaultConfig,
    zfs: &Zfs<R>,
    tag: Option<&str>,
) -> SnapvaultResult<BackupReport>
where
    R: CommandRunner,
{
    let mut report = BackupReport::new("Snapshot pools");
    if config.policy.pools.is_empty() {
        report.push(BackupLevel::Warn, "No pools configured under policy.pools");
        return Ok(report);
    }

    let tag = tag
        .map(str::to_string)
        .unwrap_or_else(crate::tag::timestamp_tag);
    for name in &config.policy.pools {
        let outcome = zfs
            .open_pool(name)
            .and_then(|pool| pool.create_snapshots(Some(tag.as_str())).map(|_| pool));
        match outcome {
            Ok(pool) => report.push(
                BackupLevel::Success,
                format!(
                    "Snapshot {tag} taken on {} filesystems of pool {name}",
                    pool.filesystems().len()
                ),
            ),
            Err(err) => report.push(
                BackupLevel::Error,
                format!("Snapshot of pool {name} failed: {err}"),
            ),
        }
    }

    Ok(report)
}

/// Run every `[[replication]]` job in order.
///
/// Failures of a job (including a nonzero receive) are recorded and the
/// remaining jobs still run.
pub fn run_replication_jobs<R>(
    config: &SnapvaultConfig,
    zfs: &Zfs<R>,
) -> SnapvaultResult<BackupReport>
where
    R: CommandRunner,
{
    let mut report = BackupReport::new("Replicate filesystems");
    if config.replication.is_empty() {
        report.push(BackupLevel::Warn, "No replication jobs configured");
        return Ok(report);
    }

    for job in &config.replication {
        if let Err(err) = run_job(job, zfs, &mut report) {
            report.push(
                BackupLevel::Error,
                format!("Replication {} failed: {err}", job.describe()),
            );
        }
    }

    Ok(report)
}

fn run_job<R>(job: &ReplicationJob, zfs: &Zfs<R>, report: &mut BackupReport) -> SnapvaultResult<()>
where
    R: CommandRunner,
{
    let target = zfs.open_pool(&job.target_pool)?;
    let source = zfs.open_pool(&job.source_pool)?;
    let filesystem = source.filesystem(&job.filesystem)?;

    let outcome = filesystem.replicate_to(&target, None, job.force)?;
    if outcome.succeeded() {
        report.push(
            BackupLevel::Success,
            format!(
                "Replicated {} as {} ({})",
                job.describe(),
                outcome.plan.tag,
                match outcome.plan.base() {
                    Some(base) => format!("incremental from {base}"),
                    None => "full stream".to_string(),
                }
            ),
        );
    } else {
        report.push(
            BackupLevel::Error,
            format!(
                "Receive for {} exited with code {}; source snapshot {} kept",
                job.describe(),
                outcome.exit_code,
                outcome.plan.tag
            ),
        );
    }
    report.replications.push(outcome);

    if job.export_target {
        target.export()?;
        report.push(
            BackupLevel::Info,
            format!("Exported pool {}", job.target_pool),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Policy;
    use crate::stub::StubHost;

    fn job(filesystem: &str, export_target: bool) -> ReplicationJob {
        ReplicationJob {
            source_pool: "tank".into(),
            filesystem: filesystem.into(),
            target_pool: "backups".into(),
            force: false,
            export_target,
        }
    }

    fn host() -> StubHost {
        StubHost::new()
            .with_pool("tank", true)
            .with_filesystem("tank/home")
            .with_pool("backups", false)
    }

    #[test]
    fn snapshot_pools_reports_each_pool() {
        let host = host();
        let zfs = Zfs::new(host.clone()).unwrap();
        let config = SnapvaultConfig {
            policy: Policy {
                pools: vec!["tank".into(), "ghost".into()],
                ..Policy::default()
            },
            ..SnapvaultConfig::default()
        };

        let report = snapshot_pools(&config, &zfs, Some("1")).unwrap();
        assert!(!report.succeeded());
        assert_eq!(report.events.len(), 2);
        assert_eq!(report.events[0].level, BackupLevel::Success);
        assert!(report.events[0].message.contains("2 filesystems of pool tank"));
        assert_eq!(report.events[1].level, BackupLevel::Error);
        assert_eq!(host.snapshots(), vec!["tank/home@1", "tank@1"]);
    }

    #[test]
    fn empty_policy_only_warns() {
        let zfs = Zfs::new(host()).unwrap();
        let config = SnapvaultConfig::default();
        let report = snapshot_pools(&config, &zfs, None).unwrap();
        assert!(report.succeeded());
        assert_eq!(report.events[0].level, BackupLevel::Warn);

        let report = run_replication_jobs(&config, &zfs).unwrap();
        assert_eq!(report.events[0].level, BackupLevel::Warn);
    }

    #[test]
    fn replication_jobs_run_and_export_target() {
        let host = host().with_snapshot("tank/home@1");
        let zfs = Zfs::new(host.clone()).unwrap();
        let config = SnapvaultConfig {
            replication: vec![job("home", true)],
            ..SnapvaultConfig::default()
        };

        let report = run_replication_jobs(&config, &zfs).unwrap();
        assert!(report.succeeded(), "{:?}", report.events);
        assert_eq!(report.replications.len(), 1);
        assert_eq!(report.replications[0].plan.tag, "2");
        assert_eq!(report.replications[0].plan.base(), Some("1"));
        assert!(host.snapshots().contains(&"backups/home@2".to_string()));
        assert!(!host.is_imported("backups"));
        assert_eq!(report.events.last().unwrap().message, "Exported pool backups");
    }

    #[test]
    fn failing_job_does_not_stop_the_run() {
        let host = host().with_pipe_exit(2);
        let zfs = Zfs::new(host.clone()).unwrap();
        let config = SnapvaultConfig {
            replication: vec![job("missing", false), job("home", false)],
            ..SnapvaultConfig::default()
        };

        let report = run_replication_jobs(&config, &zfs).unwrap();
        assert!(!report.succeeded());
        assert!(report.events[0].message.contains("tank/missing -> backups failed"));
        assert!(report.events[1].message.contains("exited with code 2"));
        assert_eq!(report.replications.len(), 1);
        assert!(host.is_imported("backups"));
    }
}
