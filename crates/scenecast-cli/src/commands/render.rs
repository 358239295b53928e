//! Render command implementation
//!
//! Renders the animation of a `.blend` file to MP4 while keeping the progress
//! file current.

use std::path::Path;
use std::process::ExitCode;

use scenecast_engine::{interrupt, render, BlenderEngine, BlenderEngineConfig, RenderConfig};

use crate::output;

/// Run the render command
///
/// # Arguments
/// * `path` - Path to the `.blend` file
/// * `engine_config` - Blender engine configuration
/// * `render_config` - Output, progress and crash-shield settings
///
/// # Returns
/// Exit code: 0 on success, 130 on interrupt, 128+n when killed by signal n,
/// 1 on any other failure
pub fn run(
    path: &Path,
    engine_config: BlenderEngineConfig,
    render_config: &RenderConfig,
) -> ExitCode {
    if let Err(e) = interrupt::install() {
        tracing::warn!(error = %e, "could not install interrupt handler");
    }

    let mut engine = BlenderEngine::with_config(engine_config);
    output::finish(render::render(&mut engine, path, render_config))
}
