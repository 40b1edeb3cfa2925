//! Process-wide logger setup.

use env_logger::{Builder, Env};

/// Environment variable consulted for the log filter before `default_filter`.
pub const LOG_ENV: &str = "SNAPVAULT_LOG";

/// Install the logger once. Later calls are ignored.
///
/// `SNAPVAULT_LOG` (then `RUST_LOG`) overrides `default_filter`, e.g. `"info"`
/// or `"snapvault_core=debug"`.
pub fn init(default_filter: &str) {
    let env = Env::default().filter_or(
        LOG_ENV,
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string()),
    );
    let _ = Builder::from_env(env)
        .format_timestamp_secs()
        .format_target(false)
        .try_init();
}
