//! scenecast End-to-End Test Infrastructure
//!
//! This crate drives the extraction and render flows against a scripted
//! scene engine, so every ladder, progress and error path can be exercised
//! without Blender installed.
//!
//! - [`scripted`] - a [`scenecast_engine::SceneEngine`] whose open and render
//!   outcomes are set per test
//! - [`fixtures`] - `.blend` header writers and a scratch-directory harness
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p scenecast-tests
//! ```

pub mod fixtures;
pub mod scripted;

pub use fixtures::TestHarness;
pub use scripted::{Attempt, OpenOutcome, RenderScript, ScriptedEngine};
