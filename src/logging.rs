//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. the explicit `level` argument (if provided)
//! 2. `CRONDUCT_LOG` environment variable (e.g. "info", "cronduct=debug")
//! 3. `RUST_LOG`
//! 4. default to `info`
//!
//! Logs go to STDERR.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

/// Install the global subscriber.
///
/// Returns an error if a global subscriber was already set.
pub fn init_logging(level: Option<&str>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = match level {
        Some(lvl) => EnvFilter::try_new(lvl)?,
        None => EnvFilter::try_from_env("CRONDUCT_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("info")),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
}
