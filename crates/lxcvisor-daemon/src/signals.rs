//! SIGTERM handling for the supervision loop.

use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

static TERMINATED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigterm(_signum: libc::c_int) {
    TERMINATED.store(true, Ordering::SeqCst);
}

/// Installs the SIGTERM handler.
///
/// `SA_RESTART` is deliberately left unset: the supervision loop blocks
/// in `waitpid`, which must return `EINTR` so the loop can observe the
/// termination flag.
///
/// # Errors
///
/// Returns an error if the handler cannot be registered.
#[allow(unsafe_code)]
pub fn install() -> nix::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_sigterm),
        SaFlags::empty(),
        SigSet::empty(),
    );
    // SAFETY: the handler only performs an atomic store, which is
    // async-signal-safe.
    let _ = unsafe { signal::sigaction(Signal::SIGTERM, &action) }?;
    Ok(())
}

/// The process-wide termination flag set by the SIGTERM handler.
pub fn termination_flag() -> &'static AtomicBool {
    &TERMINATED
}
