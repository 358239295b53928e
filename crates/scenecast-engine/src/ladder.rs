//! The strategy ladder: ordered loader configurations tried until one opens.
//!
//! Strategies go from most restrictive to the unrestricted default. The
//! unrestricted load is the slowest and the most likely to take the engine
//! down on a hostile or corrupt file, so it runs last.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::engine::{EngineError, SceneEngine};
use crate::interrupt;

/// Loader options for one attempt. `None` leaves the engine default in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenStrategy {
    /// Short name used in logs and errors.
    pub name: &'static str,
    /// Load the UI layout stored in the file.
    pub load_ui: Option<bool>,
    /// Run scripts embedded in the file (drivers, registered text blocks).
    pub use_scripts: Option<bool>,
    /// Recover embedded (packed) data.
    pub use_embedded_data: Option<bool>,
}

/// The canonical ladder.
pub const DEFAULT_LADDER: [OpenStrategy; 4] = [
    OpenStrategy {
        name: "minimal",
        load_ui: Some(false),
        use_scripts: Some(false),
        use_embedded_data: Some(false),
    },
    OpenStrategy {
        name: "no_ui_no_scripts",
        load_ui: Some(false),
        use_scripts: Some(false),
        use_embedded_data: None,
    },
    OpenStrategy {
        name: "no_ui",
        load_ui: Some(false),
        use_scripts: None,
        use_embedded_data: None,
    },
    OpenStrategy {
        name: "default",
        load_ui: None,
        use_scripts: None,
        use_embedded_data: None,
    },
];

/// Failures that abort the ladder instead of moving to the next strategy.
#[derive(Debug, Error)]
pub enum LadderError {
    /// An attempt failed in a way that suggests the engine is corrupting memory.
    #[error("Fatal engine failure during '{strategy}' strategy: {source}")]
    Fatal {
        strategy: &'static str,
        #[source]
        source: EngineError,
    },

    /// The engine could not run at all, so no other strategy can succeed.
    #[error(transparent)]
    Engine(EngineError),

    /// The operator interrupted the run.
    #[error("Process interrupted")]
    Interrupted,
}

/// Returns true when an engine error message matches the fatal-indicator denylist.
///
/// This is a heuristic on message text. A crash whose message does not match
/// is treated as recoverable even though it may not be.
pub fn is_fatal_message(message: &str) -> bool {
    static FAULT_WORD: OnceLock<Regex> = OnceLock::new();
    let fault_word = FAULT_WORD.get_or_init(|| Regex::new(r"(?i)\bfault\b").expect("valid regex"));

    message.contains("Segmentation") || fault_word.is_match(message)
}

/// Tries each strategy of `ladder` against `engine` in order.
///
/// Returns the strategy that opened the file, or `None` when every strategy
/// failed non-fatally.
pub fn open_with_ladder<'a, E: SceneEngine + ?Sized>(
    engine: &mut E,
    path: &Path,
    ladder: &'a [OpenStrategy],
) -> Result<Option<&'a OpenStrategy>, LadderError> {
    for strategy in ladder {
        if interrupt::requested() {
            return Err(LadderError::Interrupted);
        }

        debug!(strategy = strategy.name, path = %path.display(), "attempting open");

        let attempt = engine
            .reset_to_baseline()
            .and_then(|()| engine.open(path, strategy));

        match attempt {
            Ok(()) => {
                info!(strategy = strategy.name, "opened scene");
                return Ok(Some(strategy));
            }
            Err(EngineError::Interrupted) => return Err(LadderError::Interrupted),
            Err(e) if !e.is_load_failure() => {
                warn!(strategy = strategy.name, error = %e, "engine unavailable, aborting ladder");
                return Err(LadderError::Engine(e));
            }
            Err(e) if is_fatal_message(&e.to_string()) => {
                warn!(strategy = strategy.name, error = %e, "fatal engine failure, aborting ladder");
                return Err(LadderError::Fatal {
                    strategy: strategy.name,
                    source: e,
                });
            }
            Err(e) => {
                debug!(strategy = strategy.name, error = %e, "strategy failed, trying next");
            }
        }
    }

    warn!(path = %path.display(), "every open strategy failed");
    Ok(None)
}
