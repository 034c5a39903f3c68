//! Host process and power control: child reaping, reboot, and
//! process-group signalling.
//!
//! Everything here sits behind a trait so stop handling and the
//! supervision loop can be exercised in tests without real children or
//! taking the machine down.

use lxcvisor_common::error::{LxcvisorError, Result};
use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{Pid, getpgrp};

/// One observation from a blocking child wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapEvent {
    /// A child process exited or was killed.
    Child(Pid),
    /// The wait was interrupted by signal delivery.
    Interrupted,
    /// No children remain to wait for.
    Exhausted,
}

/// Source of child-exit events for the supervision loop.
pub trait ChildReaper: Send + Sync {
    /// Blocks until any child exits or the wait is interrupted.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying wait fails for a reason other
    /// than signal delivery or running out of children.
    fn wait_next(&self) -> Result<ReapEvent>;
}

/// [`ChildReaper`] over `waitpid(-1)`.
#[derive(Debug, Default)]
pub struct WaitpidReaper;

impl ChildReaper for WaitpidReaper {
    fn wait_next(&self) -> Result<ReapEvent> {
        match waitpid(None::<Pid>, None) {
            Ok(WaitStatus::Exited(pid, code)) => {
                tracing::debug!(pid = pid.as_raw(), code, "child exited");
                Ok(ReapEvent::Child(pid))
            }
            Ok(WaitStatus::Signaled(pid, signal, _)) => {
                tracing::debug!(pid = pid.as_raw(), signal = %signal, "child killed");
                Ok(ReapEvent::Child(pid))
            }
            Ok(_) => Ok(ReapEvent::Interrupted),
            Err(Errno::EINTR) => Ok(ReapEvent::Interrupted),
            Err(Errno::ECHILD) => Ok(ReapEvent::Exhausted),
            Err(e) => Err(LxcvisorError::Host {
                message: format!("waitpid failed: {e}"),
            }),
        }
    }
}

/// Host-level actions the supervisor may take.
pub trait HostControl: Send + Sync {
    /// Flushes filesystem buffers to disk.
    fn sync_disks(&self);

    /// Requests an immediate host reboot.
    ///
    /// # Errors
    ///
    /// Returns an error if the reboot request is rejected; on success
    /// the call does not return.
    fn reboot(&self) -> Result<()>;

    /// Sends SIGTERM to the whole process group, shutting down every
    /// container monitor and the supervisor itself.
    fn terminate_group(&self);
}

/// [`HostControl`] implementation using the host syscalls.
#[derive(Debug, Default)]
pub struct SystemControl;

impl HostControl for SystemControl {
    fn sync_disks(&self) {
        nix::unistd::sync();
    }

    fn reboot(&self) -> Result<()> {
        use nix::sys::reboot::{RebootMode, reboot};
        match reboot(RebootMode::RB_AUTOBOOT) {
            Ok(never) => match never {},
            Err(e) => Err(LxcvisorError::Host {
                message: format!("reboot request failed: {e}"),
            }),
        }
    }

    fn terminate_group(&self) {
        if let Err(e) = killpg(getpgrp(), Signal::SIGTERM) {
            tracing::warn!(error = %e, "failed to signal process group");
        }
    }
}
