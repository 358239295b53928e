//! A scene engine whose behavior is scripted per test.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use scenecast_engine::engine::{
    EngineError, EngineResult, FrameSnapshot, HookRegistry, RenderEvent, RenderHook,
    RenderSettings, SceneEngine, SceneInfo,
};
use scenecast_engine::ladder::OpenStrategy;

/// What happens when a strategy is tried.
#[derive(Debug, Clone)]
pub enum OpenOutcome {
    /// The file opens.
    Succeed,
    /// The open fails with this message.
    Fail(String),
    /// The operator interrupts the open.
    Interrupt,
    /// No engine executable can be found.
    NotInstalled,
}

/// What happens when the animation is rendered.
#[derive(Debug, Clone)]
pub enum RenderScript {
    /// Every frame renders; the output receives `output` if set.
    Frames { output: Option<Vec<u8>> },
    /// Frames render up to and including `after_frame`, then the operator interrupts.
    InterruptAfter { after_frame: i64 },
    /// The render fails with this message after the init event.
    Fail(String),
    /// The engine process dies from `signal` mid-render.
    Terminate { signal: i32 },
}

impl RenderScript {
    /// A render that writes a small output file.
    pub fn success() -> Self {
        Self::Frames {
            output: Some(b"\x00\x00\x00\x18ftypmp42".to_vec()),
        }
    }
}

/// One call to [`SceneEngine::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub strategy: &'static str,
    /// Whether `reset_to_baseline` ran since the previous attempt.
    pub after_reset: bool,
}

/// A [`SceneEngine`] driven by a script instead of Blender.
#[derive(Debug)]
pub struct ScriptedEngine {
    scene: SceneInfo,
    outcomes: HashMap<&'static str, OpenOutcome>,
    fallback: OpenOutcome,
    render: RenderScript,
    attempts: Vec<Attempt>,
    clean: bool,
    opened: Option<PathBuf>,
    settings: Option<RenderSettings>,
    hooks: HookRegistry,
    events: Vec<(RenderEvent, i64)>,
}

impl ScriptedEngine {
    /// An engine that opens anything as `scene` and renders successfully.
    pub fn new(scene: SceneInfo) -> Self {
        Self {
            scene,
            outcomes: HashMap::new(),
            fallback: OpenOutcome::Succeed,
            render: RenderScript::success(),
            attempts: Vec::new(),
            clean: false,
            opened: None,
            settings: None,
            hooks: HookRegistry::new(),
            events: Vec::new(),
        }
    }

    /// An engine that fails every strategy with `message`.
    pub fn unreadable(message: &str) -> Self {
        Self::new(scene(1, 250, 24)).fail_by_default(message)
    }

    /// Sets the outcome for a named strategy.
    pub fn on(mut self, strategy: &'static str, outcome: OpenOutcome) -> Self {
        self.outcomes.insert(strategy, outcome);
        self
    }

    /// Fails every strategy without an explicit outcome.
    pub fn fail_by_default(mut self, message: &str) -> Self {
        self.fallback = OpenOutcome::Fail(message.to_string());
        self
    }

    /// Sets the render behavior.
    pub fn render_with(mut self, script: RenderScript) -> Self {
        self.render = script;
        self
    }

    /// Every open attempt, in order.
    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    /// Names of the strategies tried, in order.
    pub fn attempted(&self) -> Vec<&'static str> {
        self.attempts.iter().map(|a| a.strategy).collect()
    }

    /// Settings applied by the last `configure_render`.
    pub fn settings(&self) -> Option<&RenderSettings> {
        self.settings.as_ref()
    }

    /// Lifecycle events fired during rendering.
    pub fn events(&self) -> &[(RenderEvent, i64)] {
        &self.events
    }

    /// Whether any lifecycle hook is still registered.
    pub fn has_hooks(&self) -> bool {
        !self.hooks.is_empty()
    }

    fn fire(&mut self, event: RenderEvent, frame: i64) {
        self.events.push((event, frame));
        self.hooks.fire(
            event,
            &FrameSnapshot {
                frame_current: frame,
            },
        );
    }

    fn write_output(&self, bytes: &[u8]) -> EngineResult<()> {
        let settings = self.settings.as_ref().ok_or(EngineError::NoScene)?;
        fs::write(&settings.output_path, bytes)?;
        Ok(())
    }
}

impl SceneEngine for ScriptedEngine {
    fn reset_to_baseline(&mut self) -> EngineResult<()> {
        self.opened = None;
        self.settings = None;
        self.clean = true;
        Ok(())
    }

    fn open(&mut self, path: &Path, strategy: &OpenStrategy) -> EngineResult<()> {
        self.attempts.push(Attempt {
            strategy: strategy.name,
            after_reset: self.clean,
        });
        self.clean = false;

        let outcome = self
            .outcomes
            .get(strategy.name)
            .unwrap_or(&self.fallback)
            .clone();
        match outcome {
            OpenOutcome::Succeed => {
                self.opened = Some(path.to_path_buf());
                Ok(())
            }
            OpenOutcome::Fail(message) => Err(EngineError::failed(message)),
            OpenOutcome::Interrupt => Err(EngineError::Interrupted),
            OpenOutcome::NotInstalled => Err(EngineError::NotInstalled),
        }
    }

    fn scene(&self) -> EngineResult<SceneInfo> {
        self.opened
            .as_ref()
            .map(|_| self.scene)
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
        if self.opened.is_none() {
            return Err(EngineError::NoScene);
        }

        let (start, end) = (self.scene.frame_start, self.scene.frame_end);
        self.fire(RenderEvent::Init, start);

        match self.render.clone() {
            RenderScript::Frames { output } => {
                for frame in start..=end {
                    self.fire(RenderEvent::Post, frame);
                }
                if let Some(bytes) = output {
                    self.write_output(&bytes)?;
                }
                Ok(())
            }
            RenderScript::InterruptAfter { after_frame } => {
                for frame in start..=after_frame.min(end) {
                    self.fire(RenderEvent::Post, frame);
                }
                self.fire(RenderEvent::Cancel, after_frame + 1);
                Err(EngineError::Interrupted)
            }
            RenderScript::Fail(message) => Err(EngineError::failed(message)),
            RenderScript::Terminate { signal } => Err(EngineError::Terminated { signal }),
        }
    }

    fn clear_hooks(&mut self) {
        self.hooks.clear();
    }

    fn register_hook(&mut self, event: RenderEvent, hook: RenderHook) {
        self.hooks.register(event, hook);
    }
}

/// A 1920x1080 scene with the given range and rate.
pub fn scene(frame_start: i64, frame_end: i64, fps: i64) -> SceneInfo {
    SceneInfo {
        frame_start,
        frame_end,
        fps,
        resolution_x: 1920,
        resolution_y: 1080,
    }
}
