//! Cooperative operator interrupt (Ctrl-C / SIGINT).
//!
//! `ctrlc` only lets a process install one handler, so the flag is a process
//! global and [`install`] is idempotent. Long-running waits poll
//! [`requested`] and unwind through `Interrupted` errors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

static FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

fn flag() -> &'static Arc<AtomicBool> {
    FLAG.get_or_init(|| Arc::new(AtomicBool::new(false)))
}

/// Installs the Ctrl-C handler. Safe to call more than once.
pub fn install() -> Result<(), ctrlc::Error> {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    let flag = Arc::clone(flag());
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))?;
    let _ = INSTALLED.set(());
    Ok(())
}

/// Returns true once an interrupt has been received.
pub fn requested() -> bool {
    FLAG.get().is_some_and(|f| f.load(Ordering::SeqCst))
}
