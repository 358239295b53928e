//! Durable render progress.
//!
//! The rendering process owns the progress file and overwrites it on every
//! lifecycle event. External monitors poll the same path. Writes go through a
//! temp file in the same directory followed by a rename, so a reader sees
//! either the previous record or the new one.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::FrameSnapshot;
use crate::metadata::SceneMetadata;

/// Default location of the progress file.
pub const DEFAULT_PROGRESS_PATH: &str = "/tmp/render_progress.json";

/// Smallest step between two `updatedAt` values, in seconds.
const MIN_TICK: f64 = 0.001;

/// Render lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderStatus {
    Rendering,
    Completed,
    Cancelled,
    Crashed,
}

/// The persisted progress record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub status: RenderStatus,
    pub frame_start: i64,
    pub frame_end: i64,
    pub frame_count: i64,
    pub current_frame: i64,
    pub frames_done: i64,
    pub started_at: f64,
    pub updated_at: f64,
}

impl ProgressRecord {
    /// Reads the record at `path`, retrying while it is missing or mid-write.
    pub fn load(path: &Path, attempts: u32, delay: Duration) -> Option<Self> {
        for attempt in 0..attempts.max(1) {
            if attempt > 0 {
                thread::sleep(delay);
            }
            if let Some(record) = fs::read_to_string(path)
                .ok()
                .and_then(|content| serde_json::from_str(&content).ok())
            {
                return Some(record);
            }
        }
        None
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartedAtOnly {
    started_at: Option<f64>,
}

/// Reads `startedAt` from an existing progress file, if any.
fn read_started_at(path: &Path) -> Option<f64> {
    let content = fs::read_to_string(path).ok()?;
    serde_json::from_str::<StartedAtOnly>(&content)
        .ok()?
        .started_at
}

/// Current wall-clock time as Unix seconds with millisecond precision.
fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

/// File-backed render progress state machine.
#[derive(Debug)]
pub struct ProgressTracker {
    path: PathBuf,
    frame_start: i64,
    frame_end: i64,
    frame_count: i64,
    started_at: f64,
    updated_at: f64,
    frames_done: i64,
    current_frame: i64,
    status: Option<RenderStatus>,
}

impl ProgressTracker {
    /// Creates a tracker for a render of `metadata` writing to `path`.
    ///
    /// `startedAt` is recovered from an existing file so a retried render does
    /// not reset elapsed time. Nothing is written until the first event.
    pub fn start(path: impl Into<PathBuf>, metadata: &SceneMetadata) -> Self {
        let path = path.into();
        let started_at = read_started_at(&path).unwrap_or_else(now_seconds);

        Self {
            path,
            frame_start: metadata.frame_start,
            frame_end: metadata.frame_end,
            frame_count: metadata.frame_count,
            started_at,
            updated_at: 0.0,
            frames_done: 0,
            current_frame: metadata.frame_start,
            status: None,
        }
    }

    /// Path of the progress file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `startedAt` value written with every record.
    pub fn started_at(&self) -> f64 {
        self.started_at
    }

    /// Last status written, if any.
    pub fn status(&self) -> Option<RenderStatus> {
        self.status
    }

    /// Handles the render-init event.
    pub fn on_render_init(&mut self, snapshot: &FrameSnapshot) -> io::Result<()> {
        let done = (snapshot.frame_current - self.frame_start).max(0);
        self.advance(snapshot.frame_current, done);
        self.write(RenderStatus::Rendering)
    }

    /// Handles a completed frame.
    pub fn on_render_post(&mut self, snapshot: &FrameSnapshot) -> io::Result<()> {
        let done = (snapshot.frame_current - self.frame_start + 1).max(0);
        self.advance(snapshot.frame_current, done);
        self.write(RenderStatus::Rendering)
    }

    /// Handles a cooperative cancel.
    pub fn on_render_cancel(&mut self, snapshot: &FrameSnapshot) -> io::Result<()> {
        self.current_frame = snapshot.frame_current;
        self.frames_done = (snapshot.frame_current - self.frame_start).max(0);
        self.write(RenderStatus::Cancelled)
    }

    /// Marks the render as finished.
    pub fn complete(&mut self) -> io::Result<()> {
        self.current_frame = self.frame_end;
        self.frames_done = self.frame_count;
        self.write(RenderStatus::Completed)
    }

    /// Builds the record for `status` from the current state.
    pub fn record(&self, status: RenderStatus) -> ProgressRecord {
        ProgressRecord {
            status,
            frame_start: self.frame_start,
            frame_end: self.frame_end,
            frame_count: self.frame_count,
            current_frame: self.current_frame,
            frames_done: self.frames_done,
            started_at: self.started_at,
            updated_at: self.updated_at,
        }
    }

    /// `framesDone` never goes backwards while rendering.
    fn advance(&mut self, current_frame: i64, frames_done: i64) {
        self.current_frame = current_frame;
        if self.status == Some(RenderStatus::Rendering) {
            self.frames_done = self.frames_done.max(frames_done);
        } else {
            self.frames_done = frames_done;
        }
    }

    fn write(&mut self, status: RenderStatus) -> io::Result<()> {
        self.updated_at = now_seconds().max(self.updated_at + MIN_TICK);
        self.status = Some(status);

        let record = self.record(status);
        let json = serde_json::to_vec(&record).map_err(io::Error::other)?;

        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&json)?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Logs and discards a progress write failure. Progress never aborts a render.
pub fn best_effort(result: io::Result<()>) {
    if let Err(e) = result {
        warn!(error = %e, "failed to write render progress");
    }
}
