//! The scene-engine capability.
//!
//! Everything that actually opens a `.blend` file or renders frames sits
//! behind [`SceneEngine`]. The rest of the crate only talks to this trait, so
//! the ladder, extractor and render driver can be exercised against a
//! scripted engine in tests and against [`crate::blender::BlenderEngine`] in
//! production.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ladder::OpenStrategy;

/// Result type for scene-engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised by a scene engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine reported a failure.
    #[error("{message}")]
    Failed { message: String },

    /// The engine process was killed by a signal.
    #[error("Blender process terminated by signal {signal} ({})", signal_description(*signal))]
    Terminated { signal: i32 },

    /// The operation was cancelled by an operator interrupt.
    #[error("Process interrupted")]
    Interrupted,

    /// No engine executable could be located.
    #[error("Blender executable not found. Ensure Blender is installed and in PATH, or set BLENDER_PATH environment variable")]
    NotInstalled,

    /// The configured engine executable does not exist.
    #[error("Blender executable not found at {}", path.display())]
    MissingExecutable { path: PathBuf },

    /// The engine process could not be started.
    #[error("Failed to spawn Blender process: {0}")]
    Spawn(#[source] std::io::Error),

    /// A scene query was made before any file was opened.
    #[error("No scene is open")]
    NoScene,

    /// IO error while talking to the engine.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Creates a new failure with the given message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Whether this is the engine rejecting a file, as opposed to the engine
    /// being unable to run at all. Only load failures are worth retrying with
    /// another strategy.
    pub fn is_load_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Terminated { .. })
    }
}

/// Conventional description of a signal number, as printed by shells.
pub fn signal_description(signal: i32) -> &'static str {
    match signal {
        1 => "Hangup",
        2 => "Interrupt",
        3 => "Quit",
        4 => "Illegal instruction",
        6 => "Aborted",
        7 => "Bus error",
        8 => "Floating point exception",
        9 => "Killed",
        11 => "Segmentation fault",
        13 => "Broken pipe",
        15 => "Terminated",
        _ => "Unknown signal",
    }
}

/// Scene properties read back from an opened file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneInfo {
    pub frame_start: i64,
    pub frame_end: i64,
    pub fps: i64,
    pub resolution_x: u32,
    pub resolution_y: u32,
}

/// What a lifecycle hook sees of the scene while rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSnapshot {
    pub frame_current: i64,
}

/// Render lifecycle events a hook can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderEvent {
    /// Fires once before the first frame is produced.
    Init,
    /// Fires after every completed frame.
    Post,
    /// Fires when the render is aborted cooperatively.
    Cancel,
}

impl RenderEvent {
    /// Returns the wire name of this event.
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderEvent::Init => "init",
            RenderEvent::Post => "post",
            RenderEvent::Cancel => "cancel",
        }
    }

    /// Parses a wire name.
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "init" => Some(RenderEvent::Init),
            "post" => Some(RenderEvent::Post),
            "cancel" => Some(RenderEvent::Cancel),
            _ => None,
        }
    }
}

/// A lifecycle callback.
pub type RenderHook = Box<dyn FnMut(&FrameSnapshot)>;

/// Storage for lifecycle hooks, meant to be embedded by engine implementations.
#[derive(Default)]
pub struct HookRegistry {
    init: Vec<RenderHook>,
    post: Vec<RenderHook>,
    cancel: Vec<RenderHook>,
}

impl HookRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every registered hook.
    pub fn clear(&mut self) {
        self.init.clear();
        self.post.clear();
        self.cancel.clear();
    }

    /// Appends a hook for `event`.
    pub fn register(&mut self, event: RenderEvent, hook: RenderHook) {
        self.slot(event).push(hook);
    }

    /// Invokes every hook registered for `event`, in registration order.
    pub fn fire(&mut self, event: RenderEvent, snapshot: &FrameSnapshot) {
        for hook in self.slot(event).iter_mut() {
            hook(snapshot);
        }
    }

    /// Number of hooks registered for `event`.
    pub fn len(&self, event: RenderEvent) -> usize {
        match event {
            RenderEvent::Init => self.init.len(),
            RenderEvent::Post => self.post.len(),
            RenderEvent::Cancel => self.cancel.len(),
        }
    }

    /// Returns true when no hooks are registered at all.
    pub fn is_empty(&self) -> bool {
        self.init.is_empty() && self.post.is_empty() && self.cancel.is_empty()
    }

    fn slot(&mut self, event: RenderEvent) -> &mut Vec<RenderHook> {
        match event {
            RenderEvent::Init => &mut self.init,
            RenderEvent::Post => &mut self.post,
            RenderEvent::Cancel => &mut self.cancel,
        }
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("init", &self.init.len())
            .field("post", &self.post.len())
            .field("cancel", &self.cancel.len())
            .finish()
    }
}

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Container {
    Mpeg4,
}

impl Container {
    pub fn as_str(&self) -> &'static str {
        match self {
            Container::Mpeg4 => "MPEG4",
        }
    }
}

/// Output video codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Codec {
    H264,
}

impl Codec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Codec::H264 => "H264",
        }
    }
}

/// Constant-rate-factor quality preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityPreset {
    High,
}

impl QualityPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityPreset::High => "HIGH",
        }
    }
}

/// Encoder speed/size tradeoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncoderPreset {
    Medium,
}

impl EncoderPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncoderPreset::Medium => "MEDIUM",
        }
    }
}

/// Render thread allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadMode {
    Auto,
}

impl ThreadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadMode::Auto => "AUTO",
        }
    }
}

/// Render parameters applied before rendering.
///
/// Resolution, frame range and fps are never part of this: the file's own
/// values are always used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSettings {
    pub output_path: PathBuf,
    pub container: Container,
    pub codec: Codec,
    pub quality: QualityPreset,
    pub encoder_preset: EncoderPreset,
    pub thread_mode: ThreadMode,
}

impl RenderSettings {
    /// The fixed MP4/H.264 preset.
    pub fn mp4_h264(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            container: Container::Mpeg4,
            codec: Codec::H264,
            quality: QualityPreset::High,
            encoder_preset: EncoderPreset::Medium,
            thread_mode: ThreadMode::Auto,
        }
    }
}

/// The scene-engine capability.
///
/// Implementations are driven from a single thread. `render_animation` must
/// invoke registered hooks on the calling thread before it returns.
pub trait SceneEngine {
    /// Returns the engine to a clean baseline, discarding any loaded file.
    fn reset_to_baseline(&mut self) -> EngineResult<()>;

    /// Opens `path` using the loader options in `strategy`.
    fn open(&mut self, path: &Path, strategy: &OpenStrategy) -> EngineResult<()>;

    /// Reads the properties of the currently open scene.
    fn scene(&self) -> EngineResult<SceneInfo>;

    /// Applies render parameters for the next `render_animation` call.
    fn configure_render(&mut self, settings: &RenderSettings) -> EngineResult<()>;

    /// Renders the full animation, firing lifecycle hooks as it goes.
    fn render_animation(&mut self) -> EngineResult<()>;

    /// Removes every registered lifecycle hook.
    fn clear_hooks(&mut self);

    /// Registers a lifecycle hook.
    fn register_hook(&mut self, event: RenderEvent, hook: RenderHook);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_hook_registry_fires_in_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut hooks = HookRegistry::new();

        for tag in ["a", "b"] {
            let seen = Rc::clone(&seen);
            hooks.register(
                RenderEvent::Post,
                Box::new(move |snap| seen.borrow_mut().push((tag, snap.frame_current))),
            );
        }

        hooks.fire(RenderEvent::Post, &FrameSnapshot { frame_current: 7 });
        hooks.fire(RenderEvent::Init, &FrameSnapshot { frame_current: 1 });

        assert_eq!(*seen.borrow(), vec![("a", 7), ("b", 7)]);
        assert_eq!(hooks.len(RenderEvent::Post), 2);
        assert_eq!(hooks.len(RenderEvent::Init), 0);

        hooks.clear();
        assert!(hooks.is_empty());
    }

    #[test]
    fn test_render_event_wire_names() {
        for event in [RenderEvent::Init, RenderEvent::Post, RenderEvent::Cancel] {
            assert_eq!(RenderEvent::from_wire(event.as_str()), Some(event));
        }
        assert_eq!(RenderEvent::from_wire("write"), None);
    }

    #[test]
    fn test_terminated_message_names_signal() {
        let err = EngineError::Terminated { signal: 11 };
        assert!(err.to_string().contains("Segmentation fault"));
        assert!(err.to_string().contains("signal 11"));
    }

    #[test]
    fn test_load_failure_classification() {
        assert!(EngineError::failed("File format is not supported").is_load_failure());
        assert!(EngineError::Terminated { signal: 11 }.is_load_failure());
        assert!(!EngineError::NotInstalled.is_load_failure());
        assert!(!EngineError::MissingExecutable {
            path: PathBuf::from("/opt/blender")
        }
        .is_load_failure());
        assert!(!EngineError::NoScene.is_load_failure());
        assert!(!EngineError::Interrupted.is_load_failure());
    }

    #[test]
    fn test_mp4_preset() {
        let settings = RenderSettings::mp4_h264("/tmp/out.mp4");
        assert_eq!(settings.container.as_str(), "MPEG4");
        assert_eq!(settings.codec.as_str(), "H264");
        assert_eq!(settings.quality.as_str(), "HIGH");
        assert_eq!(settings.encoder_preset.as_str(), "MEDIUM");
        assert_eq!(settings.thread_mode.as_str(), "AUTO");
    }
}
