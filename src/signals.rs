//! Signal handling: SIGINT/SIGTERM request a clean stop, SIGUSR1 asks for an
//! immediate stats report. Plain flags polled by the capture loop, the same
//! shape the original gets from `signal(SIGTERM, stop_pcap)` and
//! `signal(SIGUSR1, print_stats)`, just race-free across threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use nix::sys::signal::{self, SigHandler, Signal};

static STATS_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_sigusr1(_: i32) {
    STATS_REQUESTED.store(true, Ordering::SeqCst);
}

/// Returns a flag that is set once SIGINT or SIGTERM is received, and
/// installs a SIGUSR1 handler that flips a module-level flag polled via
/// [`stats_requested`].
pub fn install() -> Result<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler({
        let stop = Arc::clone(&stop);
        move || stop.store(true, Ordering::SeqCst)
    })?;

    // SAFETY: the handler only performs an atomic store, which is
    // async-signal-safe.
    unsafe {
        signal::signal(Signal::SIGUSR1, SigHandler::Handler(handle_sigusr1))?;
    }

    Ok(stop)
}

/// Returns `true` exactly once per SIGUSR1 received since the last check.
pub fn stats_requested() -> bool {
    STATS_REQUESTED.swap(false, Ordering::SeqCst)
}
