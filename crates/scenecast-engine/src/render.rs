//! Render driver: open, hook up progress, render, verify.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{info, warn};

use crate::crash_shield::CrashShield;
use crate::engine::{RenderEvent, RenderSettings, SceneEngine};
use crate::error::{RunError, RunResult};
use crate::ladder::{open_with_ladder, OpenStrategy, DEFAULT_LADDER};
use crate::metadata::SceneMetadata;
use crate::progress::{best_effort, ProgressTracker, DEFAULT_PROGRESS_PATH};
use crate::records::{Resolution, ResultRecord};

/// Default location of the rendered video.
pub const DEFAULT_OUTPUT_PATH: &str = "/tmp/output.mp4";

/// Configuration for a render run.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Where the video is written.
    pub output_path: PathBuf,
    /// Where progress records are written.
    pub progress_path: PathBuf,
    /// Whether to intercept fatal signals for the duration of the render.
    pub shield_signals: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            progress_path: PathBuf::from(DEFAULT_PROGRESS_PATH),
            shield_signals: true,
        }
    }
}

impl RenderConfig {
    /// Sets the output video path.
    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self
    }

    /// Sets the progress file path.
    pub fn progress_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.progress_path = path.into();
        self
    }

    /// Enables or disables the crash shield.
    pub fn shield_signals(mut self, enabled: bool) -> Self {
        self.shield_signals = enabled;
        self
    }
}

/// Renders `path` to video with the default ladder.
pub fn render<E: SceneEngine + ?Sized>(
    engine: &mut E,
    path: &Path,
    config: &RenderConfig,
) -> RunResult<ResultRecord> {
    render_with_ladder(engine, path, config, &DEFAULT_LADDER)
}

/// Renders `path` to video with a custom ladder.
///
/// Unlike metadata extraction there is no header fallback: a file the
/// engine cannot open cannot be rendered.
pub fn render_with_ladder<E: SceneEngine + ?Sized>(
    engine: &mut E,
    path: &Path,
    config: &RenderConfig,
    ladder: &[OpenStrategy],
) -> RunResult<ResultRecord> {
    if !path.exists() {
        return Err(RunError::NotFound {
            path: path.to_path_buf(),
        });
    }

    if open_with_ladder(engine, path, ladder)?.is_none() {
        return Err(RunError::OpenFailure {
            path: path.to_path_buf(),
        });
    }

    let scene = engine.scene()?;
    let metadata = SceneMetadata::from_scene(&scene);

    let tracker = Rc::new(RefCell::new(ProgressTracker::start(
        &config.progress_path,
        &metadata,
    )));
    install_progress_hooks(engine, &tracker);

    let _shield = if config.shield_signals {
        match CrashShield::install() {
            Ok(shield) => Some(shield),
            Err(e) => {
                warn!(error = %e, "could not install crash shield");
                None
            }
        }
    } else {
        None
    };

    engine.configure_render(&RenderSettings::mp4_h264(&config.output_path))?;

    // A leftover artifact from an earlier run would satisfy the output check.
    if config.output_path.exists() {
        if let Err(e) = fs::remove_file(&config.output_path) {
            warn!(path = %config.output_path.display(), error = %e, "could not remove stale output");
        }
    }

    info!(
        frame_start = metadata.frame_start,
        frame_end = metadata.frame_end,
        fps = metadata.fps,
        resolution = %format_args!("{}x{}", scene.resolution_x, scene.resolution_y),
        output = %config.output_path.display(),
        "starting render"
    );

    let rendered = engine.render_animation();
    engine.clear_hooks();
    rendered?;

    let file_size = verify_output(&config.output_path)?;
    best_effort(tracker.borrow_mut().complete());

    info!(file_size, "render complete");

    Ok(ResultRecord {
        success: true,
        output_path: config.output_path.display().to_string(),
        file_size,
        frame_start: metadata.frame_start,
        frame_end: metadata.frame_end,
        frame_count: metadata.frame_count,
        fps: metadata.fps,
        resolution: Resolution {
            x: scene.resolution_x,
            y: scene.resolution_y,
        },
    })
}

/// Replaces any previously registered hooks with progress-writing ones.
fn install_progress_hooks<E: SceneEngine + ?Sized>(
    engine: &mut E,
    tracker: &Rc<RefCell<ProgressTracker>>,
) {
    engine.clear_hooks();

    let init = Rc::clone(tracker);
    engine.register_hook(
        RenderEvent::Init,
        Box::new(move |snap| best_effort(init.borrow_mut().on_render_init(snap))),
    );

    let post = Rc::clone(tracker);
    engine.register_hook(
        RenderEvent::Post,
        Box::new(move |snap| best_effort(post.borrow_mut().on_render_post(snap))),
    );

    let cancel = Rc::clone(tracker);
    engine.register_hook(
        RenderEvent::Cancel,
        Box::new(move |snap| best_effort(cancel.borrow_mut().on_render_cancel(snap))),
    );
}

/// Returns the size of the output artifact, failing when it is absent or empty.
fn verify_output(path: &Path) -> RunResult<u64> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(meta.len()),
        _ => Err(RunError::OutputMissing {
            path: path.to_path_buf(),
        }),
    }
}
