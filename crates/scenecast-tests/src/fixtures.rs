//! Fixture files and a scratch-directory harness.

use std::fs;
use std::path::{Path, PathBuf};

use scenecast_engine::progress::ProgressRecord;
use tempfile::TempDir;

/// Legacy 12-byte header of a Blender 4.2 file, 64-bit little-endian.
pub const LEGACY_HEADER: &[u8] = b"BLENDER-v402";

/// Extended 17-byte header of a Blender 5.0 file, 64-bit little-endian.
pub const EXTENDED_HEADER: &[u8] = b"BLENDER17-01v0500";

/// A scratch directory for one test.
pub struct TestHarness {
    /// Working directory for test inputs and outputs.
    pub work_dir: TempDir,
}

impl TestHarness {
    /// Create a new test harness.
    pub fn new() -> Self {
        Self {
            work_dir: TempDir::new().expect("Failed to create work dir"),
        }
    }

    /// Get the working directory path.
    pub fn path(&self) -> &Path {
        self.work_dir.path()
    }

    /// Path of `name` inside the working directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.work_dir.path().join(name)
    }

    /// Writes a file that starts with `header` followed by block padding.
    pub fn blend_with_header(&self, name: &str, header: &[u8]) -> PathBuf {
        let mut bytes = header.to_vec();
        bytes.extend_from_slice(&[0u8; 256]);
        self.write(name, &bytes)
    }

    /// Writes a `.blend` file with a legacy 4.2 header.
    pub fn blend(&self, name: &str) -> PathBuf {
        self.blend_with_header(name, LEGACY_HEADER)
    }

    /// Writes raw bytes to `name`.
    pub fn write(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.file(name);
        fs::write(&path, bytes).expect("Failed to write fixture");
        path
    }

    /// Reads the progress record at `name`, panicking if it is absent.
    pub fn progress(&self, name: &str) -> ProgressRecord {
        let content = fs::read_to_string(self.file(name)).expect("Progress file missing");
        serde_json::from_str(&content).expect("Progress file is not a valid record")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
