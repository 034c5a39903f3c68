//! Supervised container and output registry.
//!
//! The registry is built once from configuration and holds the fixed set
//! of containers for the life of the process. Both the supervisor and the
//! display reconciler mutate it, always from behind one shared mutex; the
//! types here are plain data and do no locking of their own.

use lxcvisor_common::config::{ContainerConfig, LauncherConfig, StorageConfig};
use lxcvisor_common::types::{LayerId, RespawnPolicy, SurfaceId};
use nix::unistd::Pid;

/// A container's declared intent to present one guest surface on one
/// named screen via one fixed compositor layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    /// Connector name of the target screen.
    pub display: String,
    /// Compositor layer id, declared in configuration and stable across
    /// restarts of the container.
    pub layer: LayerId,
    /// Surface currently bound to this output, if any.
    pub surface: Option<SurfaceId>,
}

impl Output {
    /// Creates an unbound output.
    #[must_use]
    pub const fn new(display: String, layer: LayerId) -> Self {
        Self {
            display,
            layer,
            surface: None,
        }
    }
}

/// One supervised guest container.
#[derive(Debug, Clone)]
pub struct Container {
    /// Container name, the stable key into the runtime.
    pub name: String,
    /// What to do when the container stops.
    pub policy: RespawnPolicy,
    /// Storage device nodes attached after each start.
    pub storages: Vec<StorageConfig>,
    /// PID of the container's init process while running.
    pub init_pid: Option<Pid>,
    /// PID of the host child blocking on the STOPPED transition.
    pub monitor_pid: Option<Pid>,
    outputs: Vec<Output>,
}

impl Container {
    /// Builds a container from its configuration entry.
    #[must_use]
    pub fn from_config(config: &ContainerConfig) -> Self {
        Self {
            name: config.name.clone(),
            policy: config.policy,
            storages: config.storages.clone(),
            init_pid: None,
            monitor_pid: None,
            outputs: config
                .outputs
                .iter()
                .map(|o| Output::new(o.display.clone(), o.layer))
                .collect(),
        }
    }

    /// The declared outputs, in declaration order.
    #[must_use]
    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    /// Records the live init and monitor PIDs after a successful launch.
    pub fn set_running(&mut self, init_pid: Pid, monitor_pid: Pid) {
        debug_assert!(self.init_pid.is_none(), "container already has a live init pid");
        self.init_pid = Some(init_pid);
        self.monitor_pid = Some(monitor_pid);
    }

    /// Clears the lifecycle PIDs and every surface binding. Called on the
    /// STOPPED transition, before a relaunch or reboot decision.
    pub fn mark_stopped(&mut self) {
        self.init_pid = None;
        self.monitor_pid = None;
        for output in &mut self.outputs {
            output.surface = None;
        }
    }

    /// Binds `surface` to the first output that is unbound or already
    /// bound to this very surface, and returns it. First-declared-order
    /// wins, which also makes the call idempotent when the compositor
    /// reports the same surface twice. `None` means the container has no
    /// free output left.
    pub fn next_output(&mut self, surface: SurfaceId) -> Option<&Output> {
        let slot = self
            .outputs
            .iter_mut()
            .find(|o| o.surface.is_none() || o.surface == Some(surface))?;
        slot.surface = Some(surface);
        Some(&*slot)
    }

    /// Unbinds `surface` from whichever output holds it. Returns the
    /// layer id of the cleared output, or `None` if nothing was bound.
    pub fn clear_surface(&mut self, surface: SurfaceId) -> Option<LayerId> {
        let output = self
            .outputs
            .iter_mut()
            .find(|o| o.surface == Some(surface))?;
        output.surface = None;
        Some(output.layer)
    }
}

/// The fixed, ordered set of supervised containers.
#[derive(Debug)]
pub struct ContainerRegistry {
    containers: Vec<Container>,
}

impl ContainerRegistry {
    /// Builds the registry from a validated configuration.
    #[must_use]
    pub fn from_config(config: &LauncherConfig) -> Self {
        Self {
            containers: config.containers.iter().map(Container::from_config).collect(),
        }
    }

    /// Container names in launch order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.containers.iter().map(|c| c.name.clone()).collect()
    }

    /// Looks up a container by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Container> {
        self.containers.iter().find(|c| c.name == name)
    }

    /// Looks up a container by name, mutably.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Container> {
        self.containers.iter_mut().find(|c| c.name == name)
    }

    /// Finds the container whose live init process is `pid`.
    pub fn owner_of_init_mut(&mut self, pid: Pid) -> Option<&mut Container> {
        self.containers.iter_mut().find(|c| c.init_pid == Some(pid))
    }

    /// Finds the container whose stop monitor is `pid`.
    #[must_use]
    pub fn owner_of_monitor(&self, pid: Pid) -> Option<&str> {
        self.containers
            .iter()
            .find(|c| c.monitor_pid == Some(pid))
            .map(|c| c.name.as_str())
    }

    /// Unbinds `surface` wherever it is bound. Returns the owning
    /// container name and the cleared output's layer id.
    pub fn clear_surface(&mut self, surface: SurfaceId) -> Option<(String, LayerId)> {
        self.containers.iter_mut().find_map(|c| {
            c.clear_surface(surface).map(|layer| (c.name.clone(), layer))
        })
    }
}
