//! Container runtime collaborator contract.

use std::path::Path;
use std::time::Duration;

use lxcvisor_common::error::Result;
use nix::unistd::Pid;

/// Lifecycle states the supervisor waits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// The container's init process is up.
    Running,
    /// The container's init process has exited.
    Stopped,
}

impl LifecycleState {
    /// Runtime-facing spelling of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Stopped => "STOPPED",
        }
    }
}

/// Container runtime the supervisor drives.
///
/// Implementors handle the runtime-specific details of container
/// creation, start, lifecycle waits, and device hotplug. All methods are
/// keyed by the configured container name.
pub trait ContainerRuntime: Send + Sync {
    /// Acquires a handle on the named container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is not defined on this host.
    fn create(&self, name: &str) -> Result<()>;

    /// Returns whether the container is currently running.
    fn is_running(&self, name: &str) -> bool;

    /// Starts the container, daemonized.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be started.
    fn start(&self, name: &str) -> Result<()>;

    /// Blocks until the container reaches `state` or `timeout` elapses.
    /// `None` waits forever. Returns whether the state was reached.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait itself cannot be performed.
    fn wait(&self, name: &str, state: LifecycleState, timeout: Option<Duration>) -> Result<bool>;

    /// Returns the PID of the container's init process.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is not running.
    fn init_pid(&self, name: &str) -> Result<Pid>;

    /// Makes a host device node visible inside the running container.
    ///
    /// # Errors
    ///
    /// Returns an error if the device node cannot be attached.
    fn add_device_node(&self, name: &str, src: &Path, dst: &Path) -> Result<()>;

    /// Spawns a host child process that blocks until the container
    /// reaches STOPPED and then exits. The returned PID is what the main
    /// supervision loop matches `waitpid` results against; the child
    /// exists solely to report that edge exactly once.
    ///
    /// # Errors
    ///
    /// Returns an error if the monitor process cannot be spawned.
    fn spawn_stop_monitor(&self, name: &str) -> Result<Pid>;

    /// Releases the handle acquired by [`ContainerRuntime::create`].
    fn release(&self, name: &str);
}
