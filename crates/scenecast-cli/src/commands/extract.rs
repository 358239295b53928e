//! Extract command implementation
//!
//! Reads frame range and frame rate from a `.blend` file, falling back to
//! header inspection when Blender cannot open it.

use std::path::Path;
use std::process::ExitCode;

use scenecast_engine::{metadata, BlenderEngine, BlenderEngineConfig};

use crate::output;

/// Run the extract command
///
/// # Arguments
/// * `path` - Path to the `.blend` file
/// * `engine_config` - Blender engine configuration
///
/// # Returns
/// Exit code: 0 on success (including estimated metadata), 1 on failure
pub fn run(path: &Path, engine_config: BlenderEngineConfig) -> ExitCode {
    let mut engine = BlenderEngine::with_config(engine_config);
    output::finish(metadata::extract(&mut engine, path))
}
