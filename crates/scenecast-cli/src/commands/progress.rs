//! Progress command implementation
//!
//! Monitor-side read of the progress file written by a running render.

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use scenecast_engine::{ProgressRecord, RunError};

use crate::output;

/// Reads attempted before reporting the file as missing.
const READ_ATTEMPTS: u32 = 5;

/// Delay between reads.
const READ_DELAY: Duration = Duration::from_millis(200);

/// Run the progress command
///
/// # Returns
/// Exit code: 0 if a record was read, 1 if none is available
pub fn run(progress_path: &Path) -> ExitCode {
    match ProgressRecord::load(progress_path, READ_ATTEMPTS, READ_DELAY) {
        Some(record) => output::finish(Ok(record)),
        None => output::fail(&RunError::NotFound {
            path: progress_path.to_path_buf(),
        }),
    }
}
