//! Signal handling around the destructive phase.
//!
//! Installs SIGINT/SIGTERM handlers so that an interruption before any disk
//! has been touched aborts the run cleanly.
//!
//! - Before disk commands start: the first signal sets the interrupted flag,
//!   which the pipeline checks at its last abortable point. A second signal
//!   restores the default handler and re-raises.
//! - After disk commands start: signals are acknowledged and ignored, since
//!   a half-partitioned disk cannot be rolled back.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Set to `true` by the signal handler on the first SIGINT/SIGTERM.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Set once the pipeline begins modifying the target disk.
static DESTRUCTIVE: AtomicBool = AtomicBool::new(false);

/// Counts how many signals have been received before the destructive phase.
static SIGNAL_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Signal handler (async-signal-safe: atomics and raw `write(2, …)` only).
extern "C" fn handle_signal(sig: libc::c_int) {
    if DESTRUCTIVE.load(Ordering::SeqCst) {
        let msg = b"\nDisk operations in progress, cannot cancel now\n";
        unsafe {
            libc::write(2, msg.as_ptr() as *const libc::c_void, msg.len());
        }
        return;
    }

    let prev = SIGNAL_COUNT.fetch_add(1, Ordering::SeqCst);

    if prev == 0 {
        INTERRUPTED.store(true, Ordering::SeqCst);

        let msg = b"\nInterrupt received, aborting before disk changes...\n";
        unsafe {
            libc::write(2, msg.as_ptr() as *const libc::c_void, msg.len());
        }
    } else {
        let msg = b"\nForced exit\n";
        unsafe {
            libc::write(2, msg.as_ptr() as *const libc::c_void, msg.len());
            libc::signal(sig, libc::SIG_DFL);
            libc::raise(sig);
        }
    }
}

/// Install signal handlers for SIGINT and SIGTERM.
///
/// Safe to call more than once (idempotent).
pub fn install_signal_handlers() {
    unsafe {
        libc::signal(
            libc::SIGINT,
            handle_signal as *const () as libc::sighandler_t,
        );
        libc::signal(
            libc::SIGTERM,
            handle_signal as *const () as libc::sighandler_t,
        );
    }
}

/// Returns `true` if an interrupt signal has been received.
pub fn is_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Returns `true` once irreversible disk operations have started.
pub fn in_destructive_phase() -> bool {
    DESTRUCTIVE.load(Ordering::SeqCst)
}

/// Mark the start of irreversible disk operations.
///
/// Returns `false` (and does not switch) if an interrupt already arrived.
pub fn enter_destructive_phase() -> bool {
    if is_interrupted() {
        return false;
    }
    DESTRUCTIVE.store(true, Ordering::SeqCst);
    !is_interrupted()
}
