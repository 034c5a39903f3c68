//! Display reconciler: maps guest surfaces onto declared container
//! outputs.
//!
//! Consumes asynchronous compositor notifications, resolves each new
//! surface to its owning container by walking the host process table, and
//! binds it to one of that container's declared, as-yet-unused outputs.
//! Shares the container registry with the supervisor behind a single
//! mutex; the lock is held only for the mutation window, never across a
//! compositor call. The surface mirror is only mutated while the
//! registry lock is held, so bindings and mirrors always move together.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use lxcvisor_common::error::{LxcvisorError, Result};
use lxcvisor_common::types::{LayerId, SurfaceId};
use lxcvisor_runtime::container::ContainerRegistry;
use lxcvisor_runtime::procfs::ProcessTable;

use crate::layer_manager::{LayerManager, NotificationSink, ObjectKind, Screen};

/// Reconciler-side mirror of a bound surface.
#[derive(Debug, Clone)]
struct BoundSurface {
    container: String,
    layer: LayerId,
    configured: bool,
}

/// Owns the surface-to-output mapping and performs binding, geometry
/// configuration, and teardown in response to compositor notifications.
pub struct DisplayReconciler {
    manager: Arc<dyn LayerManager>,
    process_table: Arc<dyn ProcessTable>,
    registry: Arc<Mutex<ContainerRegistry>>,
    screens: HashMap<String, Screen>,
    bound: Mutex<HashMap<SurfaceId, BoundSurface>>,
}

impl DisplayReconciler {
    /// Creates a reconciler, discovering the compositor's screens once.
    ///
    /// # Errors
    ///
    /// Returns an error if screen enumeration fails.
    pub fn new(
        manager: Arc<dyn LayerManager>,
        process_table: Arc<dyn ProcessTable>,
        registry: Arc<Mutex<ContainerRegistry>>,
    ) -> Result<Self> {
        let mut screens = HashMap::new();
        for screen in manager.screens()? {
            tracing::info!(
                connector = %screen.connector,
                id = screen.id,
                width = screen.width,
                height = screen.height,
                "screen discovered"
            );
            let _ = screens.insert(screen.connector.clone(), screen);
        }
        Ok(Self {
            manager,
            process_table,
            registry,
            screens,
            bound: Mutex::new(HashMap::new()),
        })
    }

    /// Creates the full-screen layer backing one declared output: sized
    /// to the named screen, visible, and set as that screen's sole render
    /// target.
    ///
    /// # Errors
    ///
    /// Returns [`LxcvisorError::NotFound`] if the connector has no
    /// discovered screen, or a compositor error if layer setup fails.
    /// Both are fatal to startup: a declared output that cannot be backed
    /// is a configuration or supervision bug.
    pub fn create_layer(&self, connector: &str, layer: LayerId) -> Result<()> {
        let screen = self
            .screens
            .get(connector)
            .ok_or_else(|| LxcvisorError::NotFound {
                kind: "screen",
                id: connector.to_owned(),
            })?;
        tracing::debug!(layer, connector, screen = screen.id, "creating layer");
        self.manager.create_layer(layer, screen.width, screen.height)?;
        self.manager.set_layer_visibility(layer, true)?;
        self.manager.set_render_order(screen.id, &[layer])?;
        self.manager.commit()
    }

    /// Drops the reconciler's surface mirrors for a container, without
    /// touching compositor state. The supervisor calls this inside the
    /// registry critical section of its stop handler, so mirrors and
    /// registry bindings are cleared as one unit.
    pub fn forget_container(&self, container: &str) {
        match self.bound.lock() {
            Ok(mut bound) => bound.retain(|surface, entry| {
                let keep = entry.container != container;
                if !keep {
                    tracing::debug!(container, surface, "dropping stale surface mirror");
                }
                keep
            }),
            Err(_) => tracing::warn!(container, "surface mirror mutex poisoned"),
        }
    }

    fn lock_registry(&self) -> Result<MutexGuard<'_, ContainerRegistry>> {
        self.registry.lock().map_err(|_| LxcvisorError::Compositor {
            message: "container registry mutex poisoned".to_owned(),
        })
    }

    fn surface_created(&self, surface: SurfaceId) {
        if let Ok(bound) = self.bound.lock() {
            if bound.contains_key(&surface) {
                tracing::debug!(surface, "duplicate creation notification");
                return;
            }
        }

        let info = match self.manager.surface_info(surface) {
            Ok(info) => info,
            Err(e) => {
                tracing::debug!(surface, error = %e, "created surface has no readable properties");
                return;
            }
        };

        // The reporting process is the guest compositor client, a child
        // of the container's init: match its parent against init pids.
        let Some(parent) = self.process_table.parent_of(info.creator_pid) else {
            tracing::debug!(surface, creator = %info.creator_pid, "creator process not found");
            return;
        };

        let (container, layer) = {
            let Ok(mut registry) = self.lock_registry() else {
                tracing::warn!(surface, "registry unavailable, ignoring surface");
                return;
            };
            let Some(container) = registry.owner_of_init_mut(parent) else {
                tracing::debug!(
                    surface,
                    creator = %info.creator_pid,
                    parent = %parent,
                    "surface does not belong to a managed container"
                );
                return;
            };
            let name = container.name.clone();
            let Some(output) = container.next_output(surface) else {
                tracing::warn!(
                    container = %name,
                    surface,
                    "no unbound output left, ignoring surface"
                );
                return;
            };
            let layer = output.layer;
            // Inserted while the registry lock is still held: the stop
            // handler purges the mirror inside its own registry critical
            // section, so a binding and its mirror entry can never be
            // torn apart by an interleaved stop.
            let Ok(mut bound) = self.bound.lock() else {
                tracing::warn!(surface, "surface mirror mutex poisoned");
                return;
            };
            let _ = bound.insert(
                surface,
                BoundSurface {
                    container: name.clone(),
                    layer,
                    configured: false,
                },
            );
            (name, layer)
        };

        tracing::info!(container = %container, surface, layer, "surface bound to output");

        if let Err(e) = self.watch_and_probe(surface) {
            tracing::warn!(surface, error = %e, "failed to watch new surface");
        }
    }

    /// Registers for per-surface configuration events, then re-reads the
    /// properties: if the surface was configured before the watch was in
    /// place (a race with the compositor), configure it right away.
    fn watch_and_probe(&self, surface: SurfaceId) -> Result<()> {
        self.manager.watch_surface(surface)?;
        self.manager.commit()?;
        let info = self.manager.surface_info(surface)?;
        if info.width != 0 && info.height != 0 {
            tracing::debug!(surface, "surface was already configured");
            self.configure(surface, info.width, info.height);
        }
        Ok(())
    }

    fn surface_destroyed(&self, surface: SurfaceId) {
        let cleared = {
            let Ok(mut registry) = self.lock_registry() else {
                tracing::warn!(surface, "registry unavailable, ignoring destroyed surface");
                return;
            };
            if let Ok(mut bound) = self.bound.lock() {
                let _ = bound.remove(&surface);
            }
            registry.clear_surface(surface)
        };
        match cleared {
            Some((container, layer)) => {
                tracing::info!(container = %container, surface, layer, "surface unbound");
            }
            None => tracing::debug!(surface, "destroyed surface was not bound to any output"),
        }
    }

    /// Configures a bound surface exactly once: full-geometry source and
    /// destination rectangles, visible, added to its output's layer, and
    /// the per-surface watch removed. All changes are committed as one
    /// batch. A failed attempt releases the claim again, so the next
    /// configured notification retries instead of being discarded.
    fn configure(&self, surface: SurfaceId, width: u32, height: u32) {
        let layer = {
            let Ok(mut bound) = self.bound.lock() else {
                tracing::warn!(surface, "surface mirror mutex poisoned");
                return;
            };
            let Some(entry) = bound.get_mut(&surface) else {
                tracing::debug!(surface, "configured notification for untracked surface");
                return;
            };
            if entry.configured {
                tracing::debug!(surface, "surface already configured");
                return;
            }
            entry.configured = true;
            entry.layer
        };

        if let Err(e) = self.apply_geometry(surface, layer, width, height) {
            tracing::warn!(surface, layer, error = %e, "failed to configure surface, will retry");
            if let Ok(mut bound) = self.bound.lock() {
                if let Some(entry) = bound.get_mut(&surface) {
                    entry.configured = false;
                }
            }
        }
    }

    fn apply_geometry(
        &self,
        surface: SurfaceId,
        layer: LayerId,
        width: u32,
        height: u32,
    ) -> Result<()> {
        self.manager
            .set_surface_destination_rect(surface, 0, 0, width, height)?;
        self.manager
            .set_surface_source_rect(surface, 0, 0, width, height)?;
        self.manager.set_surface_visibility(surface, true)?;
        self.manager.add_surface_to_layer(layer, surface)?;
        self.manager.unwatch_surface(surface)?;
        self.manager.commit()?;
        tracing::info!(surface, layer, width, height, "surface configured");
        Ok(())
    }
}

impl NotificationSink for DisplayReconciler {
    fn object_changed(&self, kind: ObjectKind, id: u32, created: bool) {
        match kind {
            ObjectKind::Layer => {
                // Layers are created and torn down by this system; the
                // notification is informational.
                tracing::debug!(layer = id, created, "layer lifecycle notification");
            }
            ObjectKind::Surface if created => self.surface_created(id),
            ObjectKind::Surface => self.surface_destroyed(id),
        }
    }

    fn surface_configured(&self, surface: SurfaceId, width: u32, height: u32) {
        self.configure(surface, width, height);
    }
}
