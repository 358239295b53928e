//! Terminal record on abnormal termination.
//!
//! While a [`CrashShield`] is alive, the signals in [`SHIELDED_SIGNALS`] are
//! intercepted. The handler writes a pre-serialized `SignalError` record to
//! stderr, terminates the tracked engine child (if any) and exits with
//! `128 + signal`. Only async-signal-safe calls happen inside the handler:
//! the JSON is built at install time.

use std::io;
use std::sync::atomic::{AtomicI32, Ordering};

use crate::error::RunError;
use crate::records::to_json_line;

/// Pid of the engine child process, or 0.
static CHILD_PID: AtomicI32 = AtomicI32::new(0);

/// Registers the engine child so a shielded signal also terminates it.
pub fn track_child(pid: u32) {
    CHILD_PID.store(i32::try_from(pid).unwrap_or(0), Ordering::SeqCst);
}

/// Forgets the engine child.
pub fn untrack_child() {
    CHILD_PID.store(0, Ordering::SeqCst);
}

/// The record the shield emits for `signal`, as one JSON line.
pub fn signal_record_line(signal: i32) -> String {
    let record = RunError::SignalTermination { signal }.to_record();
    to_json_line(&record).unwrap_or_else(|_| {
        format!(
            "{{\"success\":false,\"error\":\"Process terminated by signal {signal}\",\"error_type\":\"SignalError\"}}\n"
        )
    })
}

#[cfg(unix)]
pub use self::unix::{CrashShield, SHIELDED_SIGNALS};

#[cfg(unix)]
mod unix {
    use super::*;
    use std::sync::OnceLock;

    /// Signals intercepted during the render phase.
    pub const SHIELDED_SIGNALS: [libc::c_int; 4] =
        [libc::SIGSEGV, libc::SIGABRT, libc::SIGTERM, libc::SIGHUP];

    static RECORDS: OnceLock<Vec<(libc::c_int, Vec<u8>)>> = OnceLock::new();

    pub(super) extern "C" fn handle_signal(signal: libc::c_int) {
        if let Some(records) = RECORDS.get() {
            if let Some((_, line)) = records.iter().find(|(s, _)| *s == signal) {
                // SAFETY: write(2) is async-signal-safe; the buffer is immutable static data.
                unsafe {
                    libc::write(libc::STDERR_FILENO, line.as_ptr().cast(), line.len());
                }
            }
        }

        let child = CHILD_PID.load(Ordering::SeqCst);
        if child > 0 {
            // SAFETY: kill(2) is async-signal-safe.
            unsafe {
                libc::kill(child, libc::SIGTERM);
            }
        }

        // SAFETY: _exit(2) is async-signal-safe and skips atexit handlers.
        unsafe { libc::_exit(128 + signal) }
    }

    /// Installed signal handlers; previous dispositions are restored on drop.
    pub struct CrashShield {
        previous: Vec<(libc::c_int, libc::sigaction)>,
    }

    impl CrashShield {
        /// Installs handlers for every shielded signal.
        pub fn install() -> io::Result<Self> {
            RECORDS.get_or_init(|| {
                SHIELDED_SIGNALS
                    .iter()
                    .map(|&s| (s, signal_record_line(s).into_bytes()))
                    .collect()
            });

            let mut shield = CrashShield {
                previous: Vec::with_capacity(SHIELDED_SIGNALS.len()),
            };

            for &signal in &SHIELDED_SIGNALS {
                // SAFETY: sigaction structs are plain C data; zeroed is a valid initial state.
                let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
                action.sa_sigaction = handle_signal as extern "C" fn(libc::c_int) as usize;
                action.sa_flags = 0;
                // SAFETY: sa_mask is a valid sigset_t owned by `action`.
                unsafe { libc::sigemptyset(&mut action.sa_mask) };

                // SAFETY: zeroed sigaction is valid storage for the previous disposition.
                let mut previous: libc::sigaction = unsafe { std::mem::zeroed() };
                // SAFETY: both pointers refer to live, properly aligned sigaction values.
                let rc = unsafe { libc::sigaction(signal, &action, &mut previous) };
                if rc != 0 {
                    // Dropping `shield` restores what was installed so far.
                    return Err(io::Error::last_os_error());
                }
                shield.previous.push((signal, previous));
            }

            tracing::debug!(signals = ?SHIELDED_SIGNALS, "crash shield installed");
            Ok(shield)
        }
    }

    impl Drop for CrashShield {
        fn drop(&mut self) {
            for (signal, previous) in self.previous.drain(..).rev() {
                // SAFETY: `previous` was filled in by sigaction for this signal.
                unsafe {
                    libc::sigaction(signal, &previous, std::ptr::null_mut());
                }
            }
            tracing::debug!("crash shield removed");
        }
    }

    impl std::fmt::Debug for CrashShield {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("CrashShield")
                .field("signals", &self.previous.len())
                .finish()
        }
    }
}

#[cfg(not(unix))]
pub use self::fallback::{CrashShield, SHIELDED_SIGNALS};

#[cfg(not(unix))]
mod fallback {
    use super::*;

    /// No signals are intercepted on this platform.
    pub const SHIELDED_SIGNALS: [i32; 0] = [];

    /// No-op shield.
    #[derive(Debug)]
    pub struct CrashShield;

    impl CrashShield {
        pub fn install() -> io::Result<Self> {
            Ok(CrashShield)
        }
    }
}
