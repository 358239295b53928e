//! Process-level tests for the `scenecast` binary.
//!
//! Blender is replaced by a shell script that speaks the bridge protocol:
//! it parses `--mode`, `--report` and `--output`, writes a JSON report and,
//! when rendering, prints `SCENECAST_EVENT` lines. Its behavior is selected
//! through the `FAKE_BLENDER` environment variable.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p scenecast-cli --test cli_process
//! ```

#![cfg(unix)]

use std::fs;
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use serde_json::Value;
use tempfile::TempDir;

const FAKE_BLENDER: &str = r#"#!/bin/sh
mode=""
report=""
output=""
while [ $# -gt 0 ]; do
    case "$1" in
        --mode) mode="$2"; shift 2 ;;
        --report) report="$2"; shift 2 ;;
        --output) output="$2"; shift 2 ;;
        *) shift ;;
    esac
done

behavior="${FAKE_BLENDER:-ok}"

if [ "$behavior" = "unreadable" ]; then
    printf '{"ok": false, "error": "File format is not supported"}' > "$report"
    exit 1
fi

if [ "$behavior" = "crash" ]; then
    printf '{"ok": false, "error": "Segmentation fault while reading library data"}' > "$report"
    exit 1
fi

if [ "$mode" = "inspect" ]; then
    printf '{"ok": true, "scene": {"frame_start": 1, "frame_end": 3, "fps": 30, "resolution_x": 640, "resolution_y": 360}}' > "$report"
    exit 0
fi

echo "SCENECAST_EVENT init 1"
if [ "$behavior" = "slow" ]; then
    frame=1
    while [ $frame -le 200 ]; do
        sleep 0.1
        echo "SCENECAST_EVENT post $frame"
        frame=$((frame + 1))
    done
fi
for frame in 1 2 3; do
    echo "Fra:$frame Mem:12.00M"
    echo "SCENECAST_EVENT post $frame"
done

if [ "$behavior" != "no-output" ]; then
    printf 'fake mp4 payload' > "$output"
fi
printf '{"ok": true}' > "$report"
exit 0
"#;

/// Scratch directory holding the fake Blender and all run artifacts.
struct Fixture {
    dir: TempDir,
    blender: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let blender = dir.path().join("blender");
        fs::write(&blender, FAKE_BLENDER).expect("Failed to write fake blender");
        fs::set_permissions(&blender, fs::Permissions::from_mode(0o755))
            .expect("Failed to make fake blender executable");
        Self { dir, blender }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Writes a `.blend` file with a legacy 4.x header.
    fn blend(&self, name: &str) -> PathBuf {
        let path = self.path(name);
        let mut bytes = b"BLENDER-v402".to_vec();
        bytes.extend_from_slice(&[0u8; 64]);
        fs::write(&path, bytes).expect("Failed to write blend file");
        path
    }

    fn command(&self, behavior: &str, args: &[&str]) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_scenecast"));
        cmd.args(args)
            .arg("--blender")
            .arg(&self.blender)
            .arg("--bridge")
            .arg(self.path("bridge.py"))
            .env("FAKE_BLENDER", behavior)
            .env_remove("SCENECAST_LOG")
            .stdin(Stdio::null());
        cmd
    }

    fn run(&self, behavior: &str, args: &[&str]) -> Output {
        self.command(behavior, args)
            .output()
            .expect("Failed to run scenecast")
    }
}

/// Parses the single JSON record a run writes to stderr.
fn record(output: &Output) -> Value {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    assert_eq!(lines.len(), 1, "expected exactly one record, got: {stderr}");
    serde_json::from_str(lines[0]).expect("record is not valid JSON")
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("temp paths are UTF-8")
}

// ============================================================================
// extract
// ============================================================================

#[test]
fn test_extract_reads_scene() {
    let fx = Fixture::new();
    let blend = fx.blend("scene.blend");

    let output = fx.run("ok", &["extract", path_str(&blend)]);
    assert_eq!(output.status.code(), Some(0));

    let rec = record(&output);
    assert_eq!(rec["frame_start"], 1);
    assert_eq!(rec["frame_end"], 3);
    assert_eq!(rec["frame_count"], 3);
    assert_eq!(rec["fps"], 30);
    assert!(rec.get("estimated").is_none());
}

#[test]
fn test_extract_missing_file() {
    let fx = Fixture::new();
    let missing = fx.path("missing.blend");

    let output = fx.run("ok", &["extract", path_str(&missing)]);
    assert_eq!(output.status.code(), Some(1));

    let rec = record(&output);
    assert_eq!(rec["success"], false);
    assert_eq!(rec["error_type"], "FileNotFoundError");
    assert!(rec["error"].as_str().unwrap().contains("missing.blend"));
}

#[test]
fn test_extract_falls_back_to_header() {
    let fx = Fixture::new();
    let blend = fx.blend("future.blend");

    let output = fx.run("unreadable", &["extract", path_str(&blend)]);
    assert_eq!(output.status.code(), Some(0));

    let rec = record(&output);
    assert_eq!(rec["frame_start"], 1);
    assert_eq!(rec["frame_end"], 250);
    assert_eq!(rec["frame_count"], 250);
    assert_eq!(rec["fps"], 24);
    assert_eq!(rec["estimated"], true);
    assert_eq!(rec["blender_version"], "402");
    assert!(rec["note"].as_str().unwrap().contains("402"));
}

#[test]
fn test_extract_bad_magic() {
    let fx = Fixture::new();
    let path = fx.path("notes.blend");
    fs::write(&path, b"not a blend file at all").unwrap();

    let output = fx.run("unreadable", &["extract", path_str(&path)]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(record(&output)["error_type"], "ParseError");
}

#[test]
fn test_extract_missing_blender() {
    let fx = Fixture::new();
    let blend = fx.blend("scene.blend");

    let output = Command::new(env!("CARGO_BIN_EXE_scenecast"))
        .args(["extract", path_str(&blend)])
        .arg("--blender")
        .arg(fx.path("no-such-blender"))
        .env_remove("SCENECAST_LOG")
        .stdin(Stdio::null())
        .output()
        .expect("Failed to run scenecast");
    assert_eq!(output.status.code(), Some(1));

    let rec = record(&output);
    assert_eq!(rec["success"], false);
    assert_eq!(rec["error_type"], "EngineError");
    assert!(rec["error"]
        .as_str()
        .unwrap()
        .starts_with("Blender executable not found"));
    assert!(rec.get("estimated").is_none());
}

#[test]
fn test_extract_fatal_engine_failure() {
    let fx = Fixture::new();
    let blend = fx.blend("crashy.blend");

    let output = fx.run("crash", &["extract", path_str(&blend)]);
    assert_eq!(output.status.code(), Some(1));

    let rec = record(&output);
    assert_eq!(rec["error_type"], "EngineFault");
    assert!(rec["error"].as_str().unwrap().contains("Segmentation fault"));
}

// ============================================================================
// header
// ============================================================================

#[test]
fn test_header_command() {
    let fx = Fixture::new();
    let blend = fx.blend("scene.blend");

    let output = fx.run("ok", &["header", path_str(&blend)]);
    assert_eq!(output.status.code(), Some(0));

    let rec = record(&output);
    assert_eq!(rec["magic"], "BLENDER");
    assert_eq!(rec["version"], "402");
}

// ============================================================================
// render
// ============================================================================

#[test]
fn test_render_success() {
    let fx = Fixture::new();
    let blend = fx.blend("scene.blend");
    let video = fx.path("out.mp4");
    let progress = fx.path("progress.json");

    let output = fx.run(
        "ok",
        &[
            "render",
            path_str(&blend),
            "--output",
            path_str(&video),
            "--progress-file",
            path_str(&progress),
        ],
    );
    assert_eq!(output.status.code(), Some(0));

    let rec = record(&output);
    assert_eq!(rec["success"], true);
    assert_eq!(rec["output_path"], path_str(&video));
    assert_eq!(rec["file_size"], 16);
    assert_eq!(rec["frame_count"], 3);
    assert_eq!(rec["fps"], 30);
    assert_eq!(rec["resolution"]["x"], 640);
    assert_eq!(rec["resolution"]["y"], 360);

    let progress: Value = serde_json::from_str(&fs::read_to_string(&progress).unwrap()).unwrap();
    assert_eq!(progress["status"], "completed");
    assert_eq!(progress["framesDone"], 3);
    assert_eq!(progress["frameCount"], 3);
    assert_eq!(progress["currentFrame"], 3);
}

#[test]
fn test_render_without_output() {
    let fx = Fixture::new();
    let blend = fx.blend("scene.blend");
    let video = fx.path("out.mp4");
    let progress = fx.path("progress.json");

    let output = fx.run(
        "no-output",
        &[
            "render",
            path_str(&blend),
            "--output",
            path_str(&video),
            "--progress-file",
            path_str(&progress),
        ],
    );
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(record(&output)["error_type"], "FileNotFoundError");

    let progress: Value = serde_json::from_str(&fs::read_to_string(&progress).unwrap()).unwrap();
    assert_eq!(progress["status"], "rendering");
}

#[test]
fn test_render_unopenable_file() {
    let fx = Fixture::new();
    let blend = fx.blend("scene.blend");
    let video = fx.path("out.mp4");

    let output = fx.run(
        "unreadable",
        &["render", path_str(&blend), "--output", path_str(&video)],
    );
    assert_eq!(output.status.code(), Some(1));

    let rec = record(&output);
    assert_eq!(rec["error_type"], "RuntimeError");
    assert_eq!(rec["error"], "Failed to open blend file with any strategy");
    assert!(!video.exists());
}

#[test]
fn test_render_terminated_by_signal() {
    let fx = Fixture::new();
    let blend = fx.blend("scene.blend");
    let video = fx.path("out.mp4");
    let progress = fx.path("progress.json");

    let mut child = fx
        .command(
            "slow",
            &[
                "render",
                path_str(&blend),
                "--output",
                path_str(&video),
                "--progress-file",
                path_str(&progress),
            ],
        )
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn scenecast");

    // The progress file appears once the render has started.
    let deadline = Instant::now() + Duration::from_secs(30);
    while !progress.exists() {
        assert!(Instant::now() < deadline, "render never started");
        thread::sleep(Duration::from_millis(50));
    }

    let pid = libc::pid_t::try_from(child.id()).unwrap();
    assert_eq!(unsafe { libc::kill(pid, libc::SIGTERM) }, 0);

    let mut stderr = String::new();
    child
        .stderr
        .take()
        .unwrap()
        .read_to_string(&mut stderr)
        .unwrap();
    let status = child.wait().unwrap();

    assert_eq!(status.code(), Some(128 + libc::SIGTERM));

    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    assert_eq!(lines.len(), 1, "expected exactly one record, got: {stderr}");
    let rec: Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(rec["success"], false);
    assert_eq!(rec["error_type"], "SignalError");
    assert_eq!(
        rec["error"],
        format!("Process terminated by signal {}", libc::SIGTERM)
    );
}

// ============================================================================
// progress
// ============================================================================

#[test]
fn test_progress_command_reads_record() {
    let fx = Fixture::new();
    let progress = fx.path("progress.json");
    fs::write(
        &progress,
        r#"{"status":"rendering","frameStart":1,"frameEnd":48,"frameCount":48,"currentFrame":12,"framesDone":11,"startedAt":1700000000.0,"updatedAt":1700000005.5}"#,
    )
    .unwrap();

    let output = fx.run("ok", &["progress", "--progress-file", path_str(&progress)]);
    assert_eq!(output.status.code(), Some(0));

    let rec = record(&output);
    assert_eq!(rec["status"], "rendering");
    assert_eq!(rec["framesDone"], 11);
}

#[test]
fn test_progress_command_missing_file() {
    let fx = Fixture::new();
    let progress = fx.path("progress.json");

    let output = fx.run("ok", &["progress", "--progress-file", path_str(&progress)]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(record(&output)["error_type"], "FileNotFoundError");
}
