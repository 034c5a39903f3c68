//! Compositor layer-manager collaborator contract.
//!
//! The compositor owns all surface and layer state; this boundary mirrors
//! just enough of it to wire guest surfaces into host layers. Object
//! lifecycle and per-surface configuration events are delivered to a
//! [`NotificationSink`] registered via [`LayerManager::subscribe`]; the
//! sink carries its own context, so no global callback bridge exists
//! anywhere in the system.

use std::sync::Arc;

use lxcvisor_common::error::Result;
use lxcvisor_common::types::{LayerId, ScreenId, SurfaceId};
use nix::unistd::Pid;

/// A physical or virtual display connector, discovered once at startup
/// and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screen {
    /// Connector name (e.g. `HDMI-A-1`, `remote-1`).
    pub connector: String,
    /// Compositor-assigned screen id.
    pub id: ScreenId,
    /// Screen width in pixels.
    pub width: u32,
    /// Screen height in pixels.
    pub height: u32,
}

/// Compositor-reported properties of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceInfo {
    /// PID of the process that created the surface (the guest compositor
    /// client, a child of the container's init).
    pub creator_pid: Pid,
    /// Reported width; zero until the surface is configured.
    pub width: u32,
    /// Reported height; zero until the surface is configured.
    pub height: u32,
}

/// Compositor object classes reported through lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// A drawable created by a guest compositor.
    Surface,
    /// A render target owned by this system.
    Layer,
}

/// Receiver for asynchronous compositor notifications.
///
/// Calls arrive on the backend's notification context, potentially a
/// different thread than the supervision loop. Implementations must
/// commit their compositor-state changes synchronously before returning
/// and must never block on the supervision loop.
pub trait NotificationSink: Send + Sync {
    /// A compositor object was created (`created`) or destroyed.
    fn object_changed(&self, kind: ObjectKind, id: u32, created: bool);

    /// A watched surface is ready to be shown at the given geometry.
    fn surface_configured(&self, surface: SurfaceId, width: u32, height: u32);
}

/// Host compositor layer manager.
///
/// All mutating calls are batched by the compositor until [`commit`]
/// applies them atomically from this system's perspective.
///
/// [`commit`]: LayerManager::commit
pub trait LayerManager: Send + Sync {
    /// Enumerates the screens known to the compositor.
    ///
    /// # Errors
    ///
    /// Returns an error if the compositor cannot be queried.
    fn screens(&self) -> Result<Vec<Screen>>;

    /// Creates a layer with the given dimensions.
    ///
    /// Re-creating a live layer id is an error: layer ids are declared in
    /// configuration and created exactly once per container launch.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer cannot be created.
    fn create_layer(&self, layer: LayerId, width: u32, height: u32) -> Result<()>;

    /// Shows or hides a layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer is unknown to the compositor.
    fn set_layer_visibility(&self, layer: LayerId, visible: bool) -> Result<()>;

    /// Sets the ordered list of layers rendered on a screen.
    ///
    /// # Errors
    ///
    /// Returns an error if the screen is unknown to the compositor.
    fn set_render_order(&self, screen: ScreenId, layers: &[LayerId]) -> Result<()>;

    /// Reads the current properties of a surface.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface no longer exists.
    fn surface_info(&self, surface: SurfaceId) -> Result<SurfaceInfo>;

    /// Sets the source rectangle sampled from the surface buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface no longer exists.
    fn set_surface_source_rect(
        &self,
        surface: SurfaceId,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<()>;

    /// Sets the destination rectangle the surface is shown at.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface no longer exists.
    fn set_surface_destination_rect(
        &self,
        surface: SurfaceId,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<()>;

    /// Shows or hides a surface.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface no longer exists.
    fn set_surface_visibility(&self, surface: SurfaceId, visible: bool) -> Result<()>;

    /// Adds a surface to a layer's render order.
    ///
    /// # Errors
    ///
    /// Returns an error if either object no longer exists.
    fn add_surface_to_layer(&self, layer: LayerId, surface: SurfaceId) -> Result<()>;

    /// Starts delivering [`NotificationSink::surface_configured`] events
    /// for a surface.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface no longer exists.
    fn watch_surface(&self, surface: SurfaceId) -> Result<()>;

    /// Stops delivering per-surface configuration events.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription cannot be removed.
    fn unwatch_surface(&self, surface: SurfaceId) -> Result<()>;

    /// Applies the batch of prior calls atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the compositor rejects the batch.
    fn commit(&self) -> Result<()>;

    /// Registers the sink object lifecycle notifications are delivered
    /// to. The sink is handed back unchanged on every callback.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription cannot be established.
    fn subscribe(&self, sink: Arc<dyn NotificationSink>) -> Result<()>;
}
