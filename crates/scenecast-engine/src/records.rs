//! Terminal records emitted once per run on the diagnostic channel.

use serde::{Deserialize, Serialize};

/// Output resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub x: u32,
    pub y: u32,
}

/// Successful render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub success: bool,
    pub output_path: String,
    pub file_size: u64,
    pub frame_start: i64,
    pub frame_end: i64,
    pub frame_count: i64,
    pub fps: i64,
    pub resolution: Resolution,
}

/// Failed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub success: bool,
    pub error: String,
    pub error_type: String,
    pub code: String,
}

impl ErrorRecord {
    /// Creates a failure record.
    pub fn new(
        error: impl Into<String>,
        error_type: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            error: error.into(),
            error_type: error_type.into(),
            code: code.into(),
        }
    }
}

/// Serializes a record as a single JSON line.
pub fn to_json_line<T: Serialize>(record: &T) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_record_json_is_one_line() {
        let record = ErrorRecord::new("multi\nline", "RuntimeError", "SCENECAST_002");
        let line = to_json_line(&record).unwrap();
        assert_eq!(line.matches('\n').count(), 1);
        assert!(line.ends_with('\n'));

        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["success"], false);
        assert_eq!(parsed["error_type"], "RuntimeError");
    }
}
