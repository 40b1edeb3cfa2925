//! Incremental replication of a filesystem into another pool.
//!
//! A replication snapshots the source, then streams either the full snapshot
//! or the difference from the previous latest snapshot through a
//! `zfs send | zfs receive` chain. Only the receiving stage's exit status is
//! observed; a failing sender shows up as a truncated stream the receiver
//! rejects.

use crate::command::{self, CommandRunner};
use crate::error::SnapvaultResult;
use crate::filesystem::Filesystem;
use crate::pool::Pool;
use crate::tag::{next_integer_tag, timestamp_tag};
use log::{debug, info, warn};

/// What the source stage sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamKind {
    Full,
    Incremental { base: String },
}

/// Fully resolved send/receive pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationPlan {
    /// Source dataset (`pool/path`).
    pub dataset: String,
    /// Snapshot created on the source for this run.
    pub tag: String,
    pub stream: StreamKind,
    pub target_pool: String,
    /// Receive in destructive-overwrite mode.
    pub force: bool,
}

impl ReplicationPlan {
    pub fn new(
        dataset: impl Into<String>,
        base: Option<String>,
        tag: impl Into<String>,
        target_pool: impl Into<String>,
        force: bool,
    ) -> Self {
        Self {
            dataset: dataset.into(),
            tag: tag.into(),
            stream: match base {
                Some(base) => StreamKind::Incremental { base },
                None => StreamKind::Full,
            },
            target_pool: target_pool.into(),
            force,
        }
    }

    pub fn base(&self) -> Option<&str> {
        match &self.stream {
            StreamKind::Full => None,
            StreamKind::Incremental { base } => Some(base),
        }
    }

    pub fn source_command(&self) -> Vec<String> {
        match &self.stream {
            StreamKind::Full => command::send_full(&self.dataset, &self.tag),
            StreamKind::Incremental { base } => {
                command::send_incremental(&self.dataset, base, &self.tag)
            }
        }
    }

    pub fn destination_command(&self) -> Vec<String> {
        command::receive(&self.target_pool, self.force)
    }
}

/// Outcome of one replication run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationReport {
    pub plan: ReplicationPlan,
    /// Exit code of the receiving stage.
    pub exit_code: i32,
}

impl ReplicationReport {
    /// Whether the receiving stage accepted the stream.
    ///
    /// On failure the source snapshot still exists and the destination state
    /// is unknown.
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Pick the tag for a new replication snapshot.
///
/// An explicit tag wins; an integer sequence is continued; anything else gets
/// a timestamp tag.
pub fn choose_tag(requested: Option<&str>, latest: Option<&str>) -> String {
    if let Some(tag) = requested {
        return tag.to_string();
    }
    latest
        .and_then(next_integer_tag)
        .unwrap_or_else(timestamp_tag)
}

pub(crate) fn replicate<R>(
    source: &Filesystem<R>,
    target: &Pool<R>,
    tag: Option<&str>,
    force: bool,
) -> SnapvaultResult<ReplicationReport>
where
    R: CommandRunner,
{
    let dataset = source.dataset();
    let base = source.latest_snapshot();
    let tag = choose_tag(tag, base.as_deref());
    debug!(
        "cloning {dataset} to {} (base {})",
        target.name(),
        base.as_deref().unwrap_or("none")
    );

    let tag = source.create_snapshot(Some(tag.as_str()))?;
    let plan = ReplicationPlan::new(dataset, base, tag, target.name(), force);

    info!(
        "replicating {} to pool {} ({})",
        command::snapshot_name(&plan.dataset, &plan.tag),
        plan.target_pool,
        match plan.base() {
            Some(base) => format!("incremental from {base}"),
            None => "full stream".to_string(),
        }
    );
    let exit_code = source
        .zfs()
        .runner()
        .pipe(&plan.source_command(), &plan.destination_command())?;

    if exit_code == 0 {
        info!(
            "replicated {} to pool {}",
            command::snapshot_name(&plan.dataset, &plan.tag),
            plan.target_pool
        );
    } else {
        warn!(
            "receive into pool {} exited with code {exit_code}; snapshot {} was kept",
            plan.target_pool,
            command::snapshot_name(&plan.dataset, &plan.tag)
        );
    }

    Ok(ReplicationReport { plan, exit_code })
}
