//! Host integration for snapvault.
//!
//! `system` implements `CommandRunner` using the host `zfs`/`zpool` CLIs. `command` and
//! `pipeline` isolate process execution so the runner stays testable with fake binaries.

mod command;
mod pipeline;
mod system;

pub use pipeline::ProcessPipeline;
pub use system::{SystemCommandRunner, DEFAULT_ZFS_PATHS, DEFAULT_ZPOOL_PATHS};
