//! Error taxonomy for extraction and render runs.

use std::path::PathBuf;
use thiserror::Error;

use crate::engine::EngineError;
use crate::ladder::LadderError;
use crate::records::ErrorRecord;

/// Result type for top-level runs.
pub type RunResult<T> = Result<T, RunError>;

/// Exit code for a cooperative interrupt.
pub const EXIT_INTERRUPTED: u8 = 130;

/// Exit code for any other failure.
pub const EXIT_FAILURE: u8 = 1;

/// Exit code used when the process dies from an intercepted signal.
pub fn signal_exit_code(signal: i32) -> i32 {
    128 + signal
}

/// Everything that can end a run unsuccessfully.
#[derive(Debug, Error)]
pub enum RunError {
    /// The input file does not exist.
    #[error("Blend file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Every strategy of the ladder failed without a fatal indicator.
    #[error("Failed to open blend file with any strategy")]
    OpenFailure { path: PathBuf },

    /// A ladder attempt matched the fatal-indicator denylist.
    #[error("{message}")]
    FatalEngineFailure {
        strategy: &'static str,
        message: String,
    },

    /// The engine could not open the file and the header is unreadable too.
    #[error("Could not read blend file header")]
    ParseError { path: PathBuf },

    /// The render reported success but the output artifact is absent or empty.
    #[error("Output file was not created: {}", path.display())]
    OutputMissing { path: PathBuf },

    /// The process was terminated by a signal.
    #[error("Process terminated by signal {signal}")]
    SignalTermination { signal: i32 },

    /// The operator interrupted the run.
    #[error("Process interrupted")]
    Interrupted,

    /// Any engine error not covered above.
    #[error(transparent)]
    Engine(EngineError),

    /// IO error outside the engine.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<EngineError> for RunError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Interrupted => RunError::Interrupted,
            EngineError::Terminated { signal } => RunError::SignalTermination { signal },
            other => RunError::Engine(other),
        }
    }
}

impl From<LadderError> for RunError {
    fn from(err: LadderError) -> Self {
        match err {
            LadderError::Fatal { strategy, source } => RunError::FatalEngineFailure {
                strategy,
                message: source.to_string(),
            },
            LadderError::Engine(source) => RunError::from(source),
            LadderError::Interrupted => RunError::Interrupted,
        }
    }
}

impl RunError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            RunError::NotFound { .. } => "SCENECAST_001",
            RunError::OpenFailure { .. } => "SCENECAST_002",
            RunError::FatalEngineFailure { .. } => "SCENECAST_003",
            RunError::ParseError { .. } => "SCENECAST_004",
            RunError::OutputMissing { .. } => "SCENECAST_005",
            RunError::SignalTermination { .. } => "SCENECAST_006",
            RunError::Interrupted => "SCENECAST_007",
            RunError::Engine(_) => "SCENECAST_008",
            RunError::Io(_) => "SCENECAST_009",
        }
    }

    /// The `error_type` reported in the terminal record.
    pub fn error_type(&self) -> &'static str {
        match self {
            RunError::NotFound { .. } | RunError::OutputMissing { .. } => "FileNotFoundError",
            RunError::OpenFailure { .. } => "RuntimeError",
            RunError::FatalEngineFailure { .. } => "EngineFault",
            RunError::ParseError { .. } => "ParseError",
            RunError::SignalTermination { .. } => "SignalError",
            RunError::Interrupted => "KeyboardInterrupt",
            RunError::Engine(_) => "EngineError",
            RunError::Io(_) => "IoError",
        }
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::SignalTermination { signal } => signal_exit_code(*signal),
            RunError::Interrupted => i32::from(EXIT_INTERRUPTED),
            _ => i32::from(EXIT_FAILURE),
        }
    }

    /// Builds the terminal error record.
    pub fn to_record(&self) -> ErrorRecord {
        ErrorRecord::new(self.to_string(), self.error_type(), self.code())
    }
}
