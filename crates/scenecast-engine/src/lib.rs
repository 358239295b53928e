//! scenecast engine
//!
//! Crash-tolerant metadata extraction and animation rendering for `.blend`
//! files. Blender is treated as untrusted: it may hang, crash or take the
//! process down mid-operation, and every run still ends in exactly one
//! machine-readable record.
//!
//! # Overview
//!
//! Metadata acquisition degrades in three tiers:
//!
//! 1. **Full load** - the first [`ladder::DEFAULT_LADDER`] strategy
//! 2. **Restricted loads** - UI, scripts and embedded-data recovery disabled, relaxed one at a time
//! 3. **Header inspection** - [`header::sniff`] reads the raw file header and
//!    the extractor reports estimated defaults
//!
//! Rendering uses the same ladder, then drives the engine while a
//! [`progress::ProgressTracker`] persists lifecycle status and a
//! [`crash_shield::CrashShield`] guarantees a terminal record if the process
//! is killed by a signal.
//!
//! # Architecture
//!
//! All engine access goes through the [`engine::SceneEngine`] trait. The
//! production implementation, [`blender::BlenderEngine`], runs each operation
//! in a `blender --background` subprocess driven by `blender/bridge.py`:
//!
//! - inspect/render reports come back as JSON files
//! - render lifecycle events stream back over stdout
//!
//! # Example
//!
//! ```ignore
//! use scenecast_engine::{metadata, BlenderEngine};
//! use std::path::Path;
//!
//! let mut engine = BlenderEngine::new();
//! let meta = metadata::extract(&mut engine, Path::new("scene.blend"))?;
//! println!("{} frames at {} fps", meta.frame_count, meta.fps);
//! ```
//!
//! # Crate Structure
//!
//! - [`engine`] - Scene-engine capability trait and hook registry
//! - [`blender`] - Blender subprocess engine
//! - [`header`] - Raw header sniffing
//! - [`ladder`] - Strategy ladder and fatal-indicator policy
//! - [`metadata`] - Metadata extraction
//! - [`progress`] - Durable render progress
//! - [`crash_shield`] - Signal interception during render
//! - [`interrupt`] - Cooperative Ctrl-C handling
//! - [`render`] - Render driver
//! - [`records`] - Terminal result/error records
//! - [`error`] - Error taxonomy

pub mod blender;
pub mod crash_shield;
pub mod engine;
pub mod error;
pub mod header;
pub mod interrupt;
pub mod ladder;
pub mod metadata;
pub mod progress;
pub mod records;
pub mod render;

// Re-export main types at crate root
pub use blender::{BlenderEngine, BlenderEngineConfig};
pub use engine::{
    EngineError, EngineResult, FrameSnapshot, HookRegistry, RenderEvent, RenderHook,
    RenderSettings, SceneEngine, SceneInfo,
};
pub use error::{RunError, RunResult};
pub use header::HeaderInfo;
pub use ladder::{OpenStrategy, DEFAULT_LADDER};
pub use metadata::SceneMetadata;
pub use progress::{ProgressRecord, ProgressTracker, RenderStatus};
pub use records::{ErrorRecord, ResultRecord};
pub use render::RenderConfig;
