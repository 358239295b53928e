//! Blender subprocess engine.
//!
//! Every engine operation that touches a file runs in a fresh
//! `blender --background` process driven by the bridge script. A segfault
//! inside Blender therefore surfaces as a child exit status instead of taking
//! this process down.
//!
//! Communication:
//! - the bridge writes a JSON report (`{ok, error, scene}`) to a temp file
//! - during a render it prints `SCENECAST_EVENT <init|post|cancel> <frame>`
//!   lines on stdout, which are turned into hook calls on the caller's thread

use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::crash_shield;
use crate::engine::{
    EngineError, EngineResult, FrameSnapshot, HookRegistry, RenderEvent, RenderHook,
    RenderSettings, SceneEngine, SceneInfo,
};
use crate::interrupt;
use crate::ladder::OpenStrategy;

const EMBEDDED_BRIDGE_PY: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../../blender/bridge.py"
));

/// Prefix of lifecycle event lines printed by the bridge.
pub const EVENT_PREFIX: &str = "SCENECAST_EVENT";

/// How often the child is polled for exit and interrupts.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Lines of stderr kept for error messages.
const STDERR_TAIL_LINES: usize = 20;

/// Configuration for the Blender engine.
#[derive(Debug, Clone, Default)]
pub struct BlenderEngineConfig {
    /// Path to the Blender executable.
    pub blender_path: Option<PathBuf>,
    /// Path to the bridge script. The embedded copy is used when unset.
    pub bridge_path: Option<PathBuf>,
}

impl BlenderEngineConfig {
    /// Sets the Blender executable path.
    pub fn blender_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.blender_path = Some(path.into());
        self
    }

    /// Sets the bridge script path.
    pub fn bridge_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.bridge_path = Some(path.into());
        self
    }
}

/// Scene engine backed by Blender subprocesses.
#[derive(Debug)]
pub struct BlenderEngine {
    config: BlenderEngineConfig,
    opened: Option<OpenedFile>,
    settings: Option<RenderSettings>,
    hooks: HookRegistry,
}

#[derive(Debug, Clone)]
struct OpenedFile {
    path: PathBuf,
    strategy: OpenStrategy,
    scene: SceneInfo,
}

struct ResolvedBridge {
    path: PathBuf,
    _tempfile: Option<tempfile::NamedTempFile>,
}

/// Report written by the bridge.
#[derive(Debug, Deserialize)]
struct BridgeReport {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    scene: Option<SceneReport>,
}

/// Scene fields as reported; anything missing falls back to defaults.
#[derive(Debug, Default, Deserialize)]
struct SceneReport {
    frame_start: Option<i64>,
    frame_end: Option<i64>,
    fps: Option<i64>,
    resolution_x: Option<u32>,
    resolution_y: Option<u32>,
}

impl SceneReport {
    fn into_scene(self) -> SceneInfo {
        SceneInfo {
            frame_start: self.frame_start.unwrap_or(1),
            frame_end: self.frame_end.unwrap_or(250),
            fps: self.fps.unwrap_or(24),
            resolution_x: self.resolution_x.unwrap_or(1920),
            resolution_y: self.resolution_y.unwrap_or(1080),
        }
    }
}

/// How a child process finished.
struct ChildOutcome {
    status: ExitStatus,
    stderr_tail: String,
}

impl BlenderEngine {
    /// Creates an engine with default configuration.
    pub fn new() -> Self {
        Self::with_config(BlenderEngineConfig::default())
    }

    /// Creates an engine with the given configuration.
    pub fn with_config(config: BlenderEngineConfig) -> Self {
        Self {
            config,
            opened: None,
            settings: None,
            hooks: HookRegistry::new(),
        }
    }

    /// Locates the Blender executable.
    ///
    /// A configured path is authoritative: if it does not exist the lookup
    /// fails rather than silently running some other Blender.
    pub fn find_blender(&self) -> EngineResult<PathBuf> {
        if let Some(path) = &self.config.blender_path {
            return if path.is_file() {
                Ok(path.clone())
            } else {
                Err(EngineError::MissingExecutable { path: path.clone() })
            };
        }

        blender_candidates()
            .into_iter()
            .find(|path| path.is_file())
            .ok_or(EngineError::NotInstalled)
    }

    fn resolve_bridge(&self) -> EngineResult<ResolvedBridge> {
        if let Some(ref path) = self.config.bridge_path {
            return Ok(ResolvedBridge {
                path: path.clone(),
                _tempfile: None,
            });
        }

        if let Ok(path) = std::env::var("SCENECAST_BLENDER_BRIDGE") {
            return Ok(ResolvedBridge {
                path: PathBuf::from(path),
                _tempfile: None,
            });
        }

        let mut file = tempfile::Builder::new()
            .prefix("scenecast_bridge_")
            .suffix(".py")
            .tempfile()?;
        file.write_all(EMBEDDED_BRIDGE_PY.as_bytes())?;
        file.flush()?;

        Ok(ResolvedBridge {
            path: file.path().to_path_buf(),
            _tempfile: Some(file),
        })
    }

    /// Builds a bridge invocation for `mode` against `blend`.
    fn bridge_command(
        &self,
        bridge: &Path,
        mode: &str,
        blend: &Path,
        strategy: &OpenStrategy,
        report: &Path,
    ) -> EngineResult<Command> {
        let blender = self.find_blender()?;

        // blender --background --factory-startup --python bridge.py -- --mode <mode> --blend <path> ...
        let mut cmd = Command::new(blender);
        cmd.arg("--background")
            .arg("--factory-startup")
            .arg("--python")
            .arg(bridge)
            .arg("--")
            .arg("--mode")
            .arg(mode)
            .arg("--blend")
            .arg(blend)
            .arg("--report")
            .arg(report);
        cmd.args(strategy_args(strategy));
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        Ok(cmd)
    }

    /// Runs a bridge invocation to completion, forwarding lifecycle events to hooks.
    fn run_bridge(&mut self, mut cmd: Command, report_path: &Path) -> EngineResult<BridgeReport> {
        let mut child = cmd.spawn().map_err(EngineError::Spawn)?;
        crash_shield::track_child(child.id());
        let outcome = self.supervise(&mut child);
        crash_shield::untrack_child();
        let outcome = outcome?;

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = outcome.status.signal() {
                return Err(EngineError::Terminated { signal });
            }
        }

        let report = read_report(report_path);

        if !outcome.status.success() {
            let message = report
                .and_then(|r| r.error)
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| {
                    format!(
                        "Blender exited with status {}: {}",
                        outcome.status.code().unwrap_or(-1),
                        outcome.stderr_tail
                    )
                });
            return Err(EngineError::failed(message));
        }

        match report {
            Some(report) if report.ok => Ok(report),
            Some(report) => Err(EngineError::failed(
                report
                    .error
                    .unwrap_or_else(|| "Unknown error".to_string()),
            )),
            None => Err(EngineError::failed(format!(
                "Blender did not write a report to {}",
                report_path.display()
            ))),
        }
    }

    /// Waits for the child while dispatching events and watching for interrupts.
    fn supervise(&mut self, child: &mut Child) -> EngineResult<ChildOutcome> {
        let events = child.stdout.take().map(spawn_line_reader);
        let stderr = child.stderr.take().map(spawn_tail_reader);
        let mut last_frame = self.opened.as_ref().map_or(1, |o| o.scene.frame_start);

        loop {
            if interrupt::requested() {
                warn!("interrupt received, stopping Blender");
                let _ = child.kill();
                let _ = child.wait();
                fire_cancel(events.as_ref(), &mut self.hooks, last_frame);
                return Err(EngineError::Interrupted);
            }

            let exited = child.try_wait()?;

            if let Some(ref rx) = events {
                drain_events(rx, &mut self.hooks, &mut last_frame, exited.is_some());
            }

            if let Some(status) = exited {
                let stderr_tail = stderr
                    .and_then(|h| h.join().ok())
                    .unwrap_or_default();
                return Ok(ChildOutcome {
                    status,
                    stderr_tail,
                });
            }

            if events.is_none() {
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

impl Default for BlenderEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneEngine for BlenderEngine {
    fn reset_to_baseline(&mut self) -> EngineResult<()> {
        self.opened = None;
        self.settings = None;
        Ok(())
    }

    fn open(&mut self, path: &Path, strategy: &OpenStrategy) -> EngineResult<()> {
        let bridge = self.resolve_bridge()?;
        let temp_dir = tempfile::tempdir()?;
        let report_path = temp_dir.path().join("report.json");

        let cmd = self.bridge_command(&bridge.path, "inspect", path, strategy, &report_path)?;
        let report = self.run_bridge(cmd, &report_path)?;
        let scene = report.scene.unwrap_or_default().into_scene();

        debug!(strategy = strategy.name, ?scene, "inspect succeeded");
        self.opened = Some(OpenedFile {
            path: path.to_path_buf(),
            strategy: *strategy,
            scene,
        });
        Ok(())
    }

    fn scene(&self) -> EngineResult<SceneInfo> {
        self.opened
            .as_ref()
            .map(|o| o.scene)
            .ok_or(EngineError::NoScene)
    }

    fn configure_render(&mut self, settings: &RenderSettings) -> EngineResult<()> {
        if self.opened.is_none() {
            return Err(EngineError::NoScene);
        }
        self.settings = Some(settings.clone());
        Ok(())
    }

    fn render_animation(&mut self) -> EngineResult<()> {
        let opened = self.opened.clone().ok_or(EngineError::NoScene)?;
        let settings = self
            .settings
            .clone()
            .unwrap_or_else(|| RenderSettings::mp4_h264(crate::render::DEFAULT_OUTPUT_PATH));

        let bridge = self.resolve_bridge()?;
        let temp_dir = tempfile::tempdir()?;
        let report_path = temp_dir.path().join("report.json");

        let mut cmd = self.bridge_command(
            &bridge.path,
            "render",
            &opened.path,
            &opened.strategy,
            &report_path,
        )?;
        cmd.arg("--output")
            .arg(&settings.output_path)
            .arg("--container")
            .arg(settings.container.as_str())
            .arg("--codec")
            .arg(settings.codec.as_str())
            .arg("--quality")
            .arg(settings.quality.as_str())
            .arg("--encoder-preset")
            .arg(settings.encoder_preset.as_str())
            .arg("--threads")
            .arg(settings.thread_mode.as_str());

        info!(strategy = opened.strategy.name, "launching Blender render");
        self.run_bridge(cmd, &report_path)?;
        Ok(())
    }

    fn clear_hooks(&mut self) {
        self.hooks.clear();
    }

    fn register_hook(&mut self, event: RenderEvent, hook: RenderHook) {
        self.hooks.register(event, hook);
    }
}

/// Well-known install locations, checked after `BLENDER_PATH` and `PATH`.
#[cfg(windows)]
const INSTALL_LOCATIONS: &[&str] = &[r"C:\Program Files\Blender Foundation\Blender\blender.exe"];

#[cfg(target_os = "macos")]
const INSTALL_LOCATIONS: &[&str] = &["/Applications/Blender.app/Contents/MacOS/Blender"];

#[cfg(all(unix, not(target_os = "macos")))]
const INSTALL_LOCATIONS: &[&str] = &[
    "/usr/bin/blender",
    "/usr/local/bin/blender",
    "/snap/bin/blender",
];

/// Places Blender may live when no path is configured, in lookup order.
fn blender_candidates() -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = std::env::var_os("BLENDER_PATH")
        .map(PathBuf::from)
        .into_iter()
        .collect();
    candidates.extend(which::which("blender").ok());
    candidates.extend(INSTALL_LOCATIONS.iter().map(PathBuf::from));
    candidates
}

/// Command-line flags for a strategy's loader options.
fn strategy_args(strategy: &OpenStrategy) -> Vec<&'static str> {
    let mut args = Vec::new();
    if strategy.load_ui == Some(false) {
        args.push("--no-load-ui");
    }
    if strategy.use_scripts == Some(false) {
        args.push("--no-scripts");
    }
    if strategy.use_embedded_data == Some(false) {
        args.push("--no-embedded-data");
    }
    args
}

/// Parses an event line like `SCENECAST_EVENT post 12`.
pub fn parse_event_line(line: &str) -> Option<(RenderEvent, i64)> {
    let mut parts = line.split_whitespace();
    if parts.next()? != EVENT_PREFIX {
        return None;
    }
    let event = RenderEvent::from_wire(parts.next()?)?;
    let frame = parts.next()?.parse().ok()?;
    Some((event, frame))
}

/// Most lines handled per poll, so a chatty child cannot starve interrupt checks.
const MAX_LINES_PER_POLL: usize = 512;

/// Fires hooks for event lines received from the child.
///
/// When `final_drain` is set the child has exited, so this blocks until the
/// reader thread reaches EOF.
fn drain_events(
    rx: &Receiver<String>,
    hooks: &mut HookRegistry,
    last_frame: &mut i64,
    final_drain: bool,
) {
    let mut dispatch = |line: String| dispatch_event(&line, hooks, last_frame);

    if final_drain {
        while let Ok(line) = rx.recv() {
            dispatch(line);
        }
        return;
    }

    match rx.recv_timeout(POLL_INTERVAL) {
        Ok(line) => dispatch(line),
        Err(RecvTimeoutError::Timeout) => return,
        Err(RecvTimeoutError::Disconnected) => {
            thread::sleep(POLL_INTERVAL);
            return;
        }
    }

    for line in rx.try_iter().take(MAX_LINES_PER_POLL) {
        dispatch(line);
    }
}

/// Fires the hooks for one bridge output line, if it is an event line.
fn dispatch_event(line: &str, hooks: &mut HookRegistry, last_frame: &mut i64) {
    if let Some((event, frame)) = parse_event_line(line) {
        *last_frame = frame;
        hooks.fire(
            event,
            &FrameSnapshot {
                frame_current: frame,
            },
        );
    }
}

/// Fires `Cancel` after dispatching events the child reported before it was killed.
fn fire_cancel(events: Option<&Receiver<String>>, hooks: &mut HookRegistry, mut last_frame: i64) {
    if let Some(rx) = events {
        for line in rx.try_iter() {
            dispatch_event(&line, hooks, &mut last_frame);
        }
    }
    hooks.fire(
        RenderEvent::Cancel,
        &FrameSnapshot {
            frame_current: last_frame,
        },
    );
}

fn spawn_line_reader<R: Read + Send + 'static>(source: R) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in BufReader::new(source).lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn spawn_tail_reader<R: Read + Send + 'static>(source: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut tail: Vec<String> = Vec::new();
        for line in BufReader::new(source).lines() {
            let Ok(line) = line else { break };
            if tail.len() == STDERR_TAIL_LINES {
                tail.remove(0);
            }
            tail.push(line);
        }
        tail.join("\n")
    })
}

fn read_report(path: &Path) -> Option<BridgeReport> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(report) => Some(report),
        Err(e) => {
            warn!(error = %e, "failed to parse Blender report");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ladder::DEFAULT_LADDER;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_strategy_args() {
        assert_eq!(
            strategy_args(&DEFAULT_LADDER[0]),
            vec!["--no-load-ui", "--no-scripts", "--no-embedded-data"]
        );
        assert_eq!(
            strategy_args(&DEFAULT_LADDER[1]),
            vec!["--no-load-ui", "--no-scripts"]
        );
        assert_eq!(strategy_args(&DEFAULT_LADDER[2]), vec!["--no-load-ui"]);
        assert!(strategy_args(&DEFAULT_LADDER[3]).is_empty());
    }

    #[test]
    fn test_parse_event_line() {
        assert_eq!(
            parse_event_line("SCENECAST_EVENT post 12"),
            Some((RenderEvent::Post, 12))
        );
        assert_eq!(
            parse_event_line("SCENECAST_EVENT init -3"),
            Some((RenderEvent::Init, -3))
        );
        assert_eq!(parse_event_line("Fra:12 Mem:120M"), None);
        assert_eq!(parse_event_line("SCENECAST_EVENT write 1"), None);
        assert_eq!(parse_event_line("SCENECAST_EVENT post"), None);
    }

    #[test]
    fn test_scene_report_defaults() {
        let report: BridgeReport =
            serde_json::from_str(r#"{"ok": true, "scene": {"frame_end": 48}}"#).unwrap();
        let scene = report.scene.unwrap().into_scene();
        assert_eq!(scene.frame_start, 1);
        assert_eq!(scene.frame_end, 48);
        assert_eq!(scene.fps, 24);
        assert_eq!((scene.resolution_x, scene.resolution_y), (1920, 1080));
    }

    #[test]
    fn test_configure_requires_open_scene() {
        let mut engine = BlenderEngine::new();
        assert!(matches!(engine.scene(), Err(EngineError::NoScene)));
        assert!(matches!(
            engine.configure_render(&RenderSettings::mp4_h264("/tmp/x.mp4")),
            Err(EngineError::NoScene)
        ));
    }

    #[test]
    fn test_cancel_reports_pending_frames() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let cancelled = Rc::new(RefCell::new(Vec::new()));
        let mut hooks = HookRegistry::new();
        let seen = Rc::clone(&cancelled);
        hooks.register(
            RenderEvent::Cancel,
            Box::new(move |snap| seen.borrow_mut().push(snap.frame_current)),
        );

        let (tx, rx) = mpsc::channel();
        tx.send("SCENECAST_EVENT post 6".to_string()).unwrap();
        tx.send("Fra:7 Mem:80M".to_string()).unwrap();
        tx.send("SCENECAST_EVENT post 7".to_string()).unwrap();

        fire_cancel(Some(&rx), &mut hooks, 5);
        assert_eq!(*cancelled.borrow(), vec![7]);

        fire_cancel(None, &mut hooks, 3);
        assert_eq!(*cancelled.borrow(), vec![7, 3]);
    }

    #[test]
    fn test_configured_blender_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("blender");
        let engine =
            BlenderEngine::with_config(BlenderEngineConfig::default().blender_path(&missing));

        match engine.find_blender() {
            Err(EngineError::MissingExecutable { path }) => assert_eq!(path, missing),
            other => panic!("expected MissingExecutable, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_blender_is_not_a_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blend = dir.path().join("scene.blend");
        std::fs::write(&blend, b"BLENDER-v402").unwrap();
        let mut engine = BlenderEngine::with_config(
            BlenderEngineConfig::default().blender_path(dir.path().join("blender")),
        );

        let err = crate::metadata::extract(&mut engine, &blend).unwrap_err();
        assert_eq!(err.error_type(), "EngineError");
        assert!(err.to_string().starts_with("Blender executable not found"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_config_builder() {
        let config = BlenderEngineConfig::default()
            .blender_path("/usr/bin/blender")
            .bridge_path("bridge.py");
        assert_eq!(config.blender_path, Some(PathBuf::from("/usr/bin/blender")));
        assert_eq!(config.bridge_path, Some(PathBuf::from("bridge.py")));
    }

    #[test]
    fn test_embedded_bridge_speaks_event_protocol() {
        assert!(EMBEDDED_BRIDGE_PY.contains(EVENT_PREFIX));
        assert!(EMBEDDED_BRIDGE_PY.contains("open_mainfile"));
    }
}
