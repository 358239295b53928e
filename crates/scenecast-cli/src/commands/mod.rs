//! Command implementations for the scenecast CLI.
//!
//! Every command ends by emitting exactly one JSON record through
//! [`crate::output`] and returning the matching exit code.

pub mod extract;
pub mod header;
pub mod progress;
pub mod render;
