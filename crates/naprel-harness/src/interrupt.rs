//! External-interruption flag.
//!
//! There is no cooperative cancellation channel; the orchestrator runs to
//! completion. A SIGINT flips a flag that the process runner's poll loop
//! and the orchestrator check, so the run falls through to cleanup and the
//! rename scopes unwind before the harness exits.

use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Install the SIGINT handler. No-op on non-Unix hosts.
#[cfg(unix)]
pub fn install_handler() {
    extern "C" fn on_sigint(_signal: libc::c_int) {
        INTERRUPTED.store(true, Ordering::SeqCst);
    }

    let handler = on_sigint as extern "C" fn(libc::c_int);
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
    }
}

#[cfg(not(unix))]
pub fn install_handler() {}

/// Whether an external interruption has been requested.
#[must_use]
pub fn requested() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}
