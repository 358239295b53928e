//! Scene metadata extraction.
//!
//! Tries the strategy ladder first. When no strategy opens the file, falls
//! back to the raw header and reports estimated defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engine::{SceneEngine, SceneInfo};
use crate::error::{RunError, RunResult};
use crate::header::{self, HeaderInfo};
use crate::ladder::{open_with_ladder, OpenStrategy, DEFAULT_LADDER};

/// Frame range used when the file's own range is unusable.
pub const DEFAULT_FRAME_RANGE: (i64, i64) = (1, 250);

/// Frame rate assumed when none can be read.
pub const DEFAULT_FPS: i64 = 24;

const ESTIMATED_NOTE: &str = "Estimated values - file could not be fully opened";

/// Frame range and rate of a scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneMetadata {
    pub frame_start: i64,
    pub frame_end: i64,
    pub frame_count: i64,
    pub fps: i64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub estimated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blender_version: Option<String>,
}

impl SceneMetadata {
    /// Builds metadata from a frame range, resetting inverted ranges.
    pub fn from_range(frame_start: i64, frame_end: i64, fps: i64) -> Self {
        let (frame_start, frame_end) = if frame_start > frame_end {
            DEFAULT_FRAME_RANGE
        } else {
            (frame_start, frame_end)
        };

        Self {
            frame_start,
            frame_end,
            frame_count: frame_count(frame_start, frame_end),
            fps,
            estimated: false,
            note: None,
            blender_version: None,
        }
    }

    /// Builds metadata from an opened scene.
    pub fn from_scene(scene: &SceneInfo) -> Self {
        Self::from_range(scene.frame_start, scene.frame_end, scene.fps)
    }

    /// Synthesizes estimated metadata from a header.
    pub fn estimated(header: &HeaderInfo) -> Self {
        let (frame_start, frame_end) = DEFAULT_FRAME_RANGE;
        Self {
            estimated: true,
            note: Some(format!(
                "{} (format version {})",
                ESTIMATED_NOTE, header.version
            )),
            blender_version: Some(header.version.clone()),
            ..Self::from_range(frame_start, frame_end, DEFAULT_FPS)
        }
    }
}

/// Number of frames in an inclusive range, never less than one.
pub fn frame_count(frame_start: i64, frame_end: i64) -> i64 {
    frame_end.saturating_sub(frame_start).saturating_add(1).max(1)
}

/// Extracts metadata from `path` using the default ladder.
pub fn extract<E: SceneEngine + ?Sized>(engine: &mut E, path: &Path) -> RunResult<SceneMetadata> {
    extract_with_ladder(engine, path, &DEFAULT_LADDER)
}

/// Extracts metadata from `path` using a custom ladder.
pub fn extract_with_ladder<E: SceneEngine + ?Sized>(
    engine: &mut E,
    path: &Path,
    ladder: &[OpenStrategy],
) -> RunResult<SceneMetadata> {
    if !path.exists() {
        return Err(RunError::NotFound {
            path: path.to_path_buf(),
        });
    }

    if open_with_ladder(engine, path, ladder)?.is_some() {
        let scene = engine.scene()?;
        return Ok(SceneMetadata::from_scene(&scene));
    }

    warn!(path = %path.display(), "falling back to header inspection");
    match header::sniff(path) {
        Some(header) => {
            info!(version = %header.version, "synthesized estimated metadata from header");
            Ok(SceneMetadata::estimated(&header))
        }
        None => Err(RunError::ParseError {
            path: path.to_path_buf(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_frame_count() {
        assert_eq!(frame_count(1, 250), 250);
        assert_eq!(frame_count(10, 10), 1);
        assert_eq!(frame_count(0, 0), 1);
        assert_eq!(frame_count(-5, 5), 11);
    }

    #[test]
    fn test_inverted_range_resets() {
        let meta = SceneMetadata::from_range(100, 10, 30);
        assert_eq!(meta.frame_start, 1);
        assert_eq!(meta.frame_end, 250);
        assert_eq!(meta.frame_count, 250);
        assert_eq!(meta.fps, 30);
        assert!(!meta.estimated);
    }

    #[test]
    fn test_plain_metadata_omits_optional_fields() {
        let meta = SceneMetadata::from_range(1, 48, 24);
        let json = serde_json::to_string(&meta).unwrap();
        assert_eq!(
            json,
            r#"{"frame_start":1,"frame_end":48,"frame_count":48,"fps":24}"#
        );
    }

    #[test]
    fn test_estimated_metadata() {
        let (header, _) = header::parse_header(b"BLENDER-v293").unwrap();
        let meta = SceneMetadata::estimated(&header);

        assert!(meta.estimated);
        assert_eq!((meta.frame_start, meta.frame_end, meta.fps), (1, 250, 24));
        assert_eq!(meta.frame_count, 250);
        assert_eq!(meta.blender_version.as_deref(), Some("293"));
        assert!(meta.note.as_deref().unwrap().contains("293"));
    }
}
