//! scenecast CLI library.
//!
//! Command implementations, logging setup and terminal record emission for
//! the `scenecast` binary.

pub mod commands;
pub mod logging;
pub mod output;
