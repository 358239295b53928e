//! Terminal record emission.
//!
//! Each run writes exactly one JSON object, on one line, to stderr and then
//! exits with the code that encodes the outcome.

use std::io::Write;
use std::process::ExitCode;

use scenecast_engine::error::EXIT_FAILURE;
use scenecast_engine::records::to_json_line;
use scenecast_engine::{ErrorRecord, RunError, RunResult};
use serde::Serialize;

/// Writes `record` to stderr, falling back to stdout if stderr fails.
pub fn emit<T: Serialize>(record: &T) {
    let line = match to_json_line(record) {
        Ok(line) => line,
        Err(e) => {
            let fallback = ErrorRecord::new(
                format!("Failed to serialize result: {e}"),
                "SerializationError",
                "SCENECAST_010",
            );
            to_json_line(&fallback).unwrap_or_default()
        }
    };

    let mut stderr = std::io::stderr().lock();
    let written = stderr
        .write_all(line.as_bytes())
        .and_then(|()| stderr.flush());

    if written.is_err() {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(line.as_bytes());
        let _ = stdout.flush();
    }
}

/// Narrows a process exit code to the byte the OS reports.
pub fn exit_byte(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(EXIT_FAILURE)
}

/// Converts a process exit code into an `ExitCode`.
pub fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(exit_byte(code))
}

/// Emits the record for `result` and returns the matching exit code.
pub fn finish<T: Serialize>(result: RunResult<T>) -> ExitCode {
    match result {
        Ok(record) => {
            emit(&record);
            ExitCode::SUCCESS
        }
        Err(err) => fail(&err),
    }
}

/// Emits the error record for `err` and returns its exit code.
pub fn fail(err: &RunError) -> ExitCode {
    tracing::debug!(error = %err, error_type = err.error_type(), "run failed");
    emit(&err.to_record());
    exit_code(err.exit_code())
}
