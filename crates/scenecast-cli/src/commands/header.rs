//! Header command implementation
//!
//! Prints what the raw file header says without starting Blender.

use std::path::Path;
use std::process::ExitCode;

use scenecast_engine::{header, RunError};

use crate::output;

/// Run the header command
///
/// # Returns
/// Exit code: 0 if the header was recognized, 1 otherwise
pub fn run(path: &Path) -> ExitCode {
    if !path.exists() {
        return output::fail(&RunError::NotFound {
            path: path.to_path_buf(),
        });
    }

    output::finish(header::sniff(path).ok_or_else(|| RunError::ParseError {
        path: path.to_path_buf(),
    }))
}
