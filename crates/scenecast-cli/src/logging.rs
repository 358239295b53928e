//! Tracing subscriber setup.
//!
//! stderr is also the channel for the terminal JSON record, so logging stays
//! off unless a level is requested explicitly.

use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable consulted when `--log-level` is not given.
pub const LOG_ENV: &str = "SCENECAST_LOG";

/// Initializes logging to stderr when `level` is set.
///
/// `level` accepts any `EnvFilter` directive, e.g. `debug` or
/// `scenecast_engine=trace`. Returns whether a subscriber was installed.
pub fn init_logging(level: Option<&str>) -> anyhow::Result<bool> {
    let Some(level) = level.filter(|l| !l.trim().is_empty()) else {
        return Ok(false);
    };

    let filter = EnvFilter::try_new(level)?;
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(true)
}
