//! Layer manager backend driving the IVI layer-manager control client.
//!
//! Talks to the compositor through the `LayerManagerControl` binary,
//! which applies each command immediately (so [`LayerManager::commit`] is
//! a no-op here). Object lifecycle notifications are produced by a
//! polling thread that diffs the compositor's surface listing and
//! forwards transitions to the subscribed sink.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lxcvisor_common::constants::COMPOSITOR_POLL;
use lxcvisor_common::error::{LxcvisorError, Result};
use lxcvisor_common::types::{LayerId, ScreenId, SurfaceId};
use nix::unistd::Pid;

use crate::layer_manager::{LayerManager, NotificationSink, ObjectKind, Screen, SurfaceInfo};

const CONTROL_BIN: &str = "LayerManagerControl";

/// [`LayerManager`] implementation over the IVI control client binary.
pub struct IviControlManager {
    control_bin: PathBuf,
    poll_interval: Duration,
    watched: Arc<Mutex<HashSet<SurfaceId>>>,
    sink: Mutex<Option<Arc<dyn NotificationSink>>>,
}

impl IviControlManager {
    /// Creates a manager using the control binary from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            control_bin: PathBuf::from(CONTROL_BIN),
            poll_interval: COMPOSITOR_POLL,
            watched: Arc::new(Mutex::new(HashSet::new())),
            sink: Mutex::new(None),
        }
    }

    /// Blocks until the compositor answers a screen query. Guest
    /// containers must not be launched before the host compositor is up,
    /// so there is no bound on this wait.
    pub fn wait_ready(&self) {
        loop {
            if self.control(&["get", "screens"]).is_ok() {
                tracing::info!("compositor is ready");
                return;
            }
            tracing::debug!("waiting for compositor");
            std::thread::sleep(self.poll_interval);
        }
    }

    fn control(&self, args: &[&str]) -> Result<String> {
        run_control(&self.control_bin, args)
    }
}

impl Default for IviControlManager {
    fn default() -> Self {
        Self::new()
    }
}

fn run_control(bin: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new(bin)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| LxcvisorError::Compositor {
            message: format!("failed to run {}: {e}", bin.display()),
        })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(LxcvisorError::Compositor {
            message: format!("{} {} failed: {}", bin.display(), args.join(" "), stderr.trim()),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

impl LayerManager for IviControlManager {
    fn screens(&self) -> Result<Vec<Screen>> {
        let listing = self.control(&["get", "screens"])?;
        Ok(parse_screen_listing(&listing))
    }

    fn create_layer(&self, layer: LayerId, width: u32, height: u32) -> Result<()> {
        let _ = self.control(&[
            "create",
            "layer",
            &layer.to_string(),
            &width.to_string(),
            &height.to_string(),
        ])?;
        Ok(())
    }

    fn set_layer_visibility(&self, layer: LayerId, visible: bool) -> Result<()> {
        let _ = self.control(&[
            "set",
            "layer",
            &layer.to_string(),
            "visibility",
            if visible { "1" } else { "0" },
        ])?;
        Ok(())
    }

    fn set_render_order(&self, screen: ScreenId, layers: &[LayerId]) -> Result<()> {
        let order = layers
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let _ = self.control(&["set", "screen", &screen.to_string(), "render", "order", &order])?;
        Ok(())
    }

    fn surface_info(&self, surface: SurfaceId) -> Result<SurfaceInfo> {
        let dump = self.control(&["get", "surface", &surface.to_string()])?;
        parse_surface_info(&dump).ok_or_else(|| LxcvisorError::Compositor {
            message: format!("unparsable properties for surface {surface}"),
        })
    }

    fn set_surface_source_rect(
        &self,
        surface: SurfaceId,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<()> {
        let _ = self.control(&[
            "set",
            "surface",
            &surface.to_string(),
            "source",
            "region",
            &x.to_string(),
            &y.to_string(),
            &width.to_string(),
            &height.to_string(),
        ])?;
        Ok(())
    }

    fn set_surface_destination_rect(
        &self,
        surface: SurfaceId,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<()> {
        let _ = self.control(&[
            "set",
            "surface",
            &surface.to_string(),
            "destination",
            "region",
            &x.to_string(),
            &y.to_string(),
            &width.to_string(),
            &height.to_string(),
        ])?;
        Ok(())
    }

    fn set_surface_visibility(&self, surface: SurfaceId, visible: bool) -> Result<()> {
        let _ = self.control(&[
            "set",
            "surface",
            &surface.to_string(),
            "visibility",
            if visible { "1" } else { "0" },
        ])?;
        Ok(())
    }

    fn add_surface_to_layer(&self, layer: LayerId, surface: SurfaceId) -> Result<()> {
        let _ = self.control(&[
            "set",
            "layer",
            &layer.to_string(),
            "render",
            "order",
            &surface.to_string(),
        ])?;
        Ok(())
    }

    fn watch_surface(&self, surface: SurfaceId) -> Result<()> {
        let mut watched = self.watched.lock().map_err(poisoned)?;
        let _ = watched.insert(surface);
        Ok(())
    }

    fn unwatch_surface(&self, surface: SurfaceId) -> Result<()> {
        let mut watched = self.watched.lock().map_err(poisoned)?;
        let _ = watched.remove(&surface);
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        // The control client applies each command immediately; there is
        // no separate batch to flush.
        tracing::trace!("commit (immediate mode)");
        Ok(())
    }

    fn subscribe(&self, sink: Arc<dyn NotificationSink>) -> Result<()> {
        {
            let mut slot = self.sink.lock().map_err(poisoned)?;
            if slot.is_some() {
                return Err(LxcvisorError::Compositor {
                    message: "notification sink already subscribed".to_owned(),
                });
            }
            *slot = Some(sink.clone());
        }

        let bin = self.control_bin.clone();
        let interval = self.poll_interval;
        let watched = Arc::clone(&self.watched);
        let builder = std::thread::Builder::new().name("ivi-notify".to_owned());
        let spawned = builder.spawn(move || notification_loop(&bin, interval, &watched, &sink));
        let _ = spawned.map_err(|e| LxcvisorError::Compositor {
            message: format!("failed to spawn notification thread: {e}"),
        })?;
        Ok(())
    }
}

fn poisoned<T>(_: T) -> LxcvisorError {
    LxcvisorError::Compositor {
        message: "layer manager state mutex poisoned".to_owned(),
    }
}

/// Polls the surface listing forever, synthesizing created/destroyed and
/// configured events. Creator pids of surviving ids are compared between
/// polls, so a surface destroyed and recreated under the same id within
/// one interval is still reported as two events instead of silence.
fn notification_loop(
    bin: &Path,
    interval: Duration,
    watched: &Mutex<HashSet<SurfaceId>>,
    sink: &Arc<dyn NotificationSink>,
) {
    let mut known: HashMap<SurfaceId, Option<Pid>> = HashMap::new();
    loop {
        std::thread::sleep(interval);

        let ids = match run_control(bin, &["get", "surfaces"]) {
            Ok(listing) => parse_surface_ids(&listing),
            Err(e) => {
                tracing::debug!(error = %e, "surface listing failed, retrying");
                continue;
            }
        };

        let mut current: HashMap<SurfaceId, Option<SurfaceInfo>> =
            HashMap::with_capacity(ids.len());
        for &surface in &ids {
            let info = run_control(bin, &["get", "surface", &surface.to_string()])
                .ok()
                .and_then(|dump| parse_surface_info(&dump));
            let _ = current.insert(surface, info);
        }
        let creators: HashMap<SurfaceId, Option<Pid>> = current
            .iter()
            .map(|(&surface, &info)| (surface, info.map(|i| i.creator_pid)))
            .collect();

        for (surface, created) in surface_transitions(&known, &creators) {
            sink.object_changed(ObjectKind::Surface, surface, created);
        }
        known = creators;

        let pending: Vec<SurfaceId> = match watched.lock() {
            Ok(set) => set.iter().copied().collect(),
            Err(_) => continue,
        };
        for surface in pending {
            if let Some(Some(info)) = current.get(&surface) {
                if info.width != 0 && info.height != 0 {
                    sink.surface_configured(surface, info.width, info.height);
                }
            }
        }
    }
}

/// Diffs two creator-pid snapshots into ordered surface lifecycle
/// events. An id present in both snapshots under a different creator was
/// destroyed and recreated between polls and yields a destroy followed
/// by a create; an unreadable creator (`None`) is treated as unchanged.
fn surface_transitions(
    known: &HashMap<SurfaceId, Option<Pid>>,
    current: &HashMap<SurfaceId, Option<Pid>>,
) -> Vec<(SurfaceId, bool)> {
    let mut events: Vec<(SurfaceId, bool)> = Vec::new();
    for &surface in known.keys() {
        if !current.contains_key(&surface) {
            events.push((surface, false));
        }
    }
    for (&surface, &creator) in current {
        match known.get(&surface) {
            None => events.push((surface, true)),
            Some(&previous) if previous.is_some() && creator.is_some() && previous != creator => {
                events.push((surface, false));
                events.push((surface, true));
            }
            _ => {}
        }
    }
    events
}

/// Parses the control client's screen listing, e.g.:
///
/// ```text
/// screen 0
/// - connector name:   HDMI-A-1
/// - resolution:       x=1920, y=1080
/// ```
fn parse_screen_listing(listing: &str) -> Vec<Screen> {
    let mut screens = Vec::new();
    let mut id: Option<ScreenId> = None;
    let mut connector: Option<String> = None;

    for line in listing.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("screen ") {
            id = rest.split_whitespace().next().and_then(|s| s.parse().ok());
            connector = None;
        } else if let Some(value) = field_value(line, "connector name") {
            connector = Some(value.to_owned());
        } else if let Some(value) = field_value(line, "resolution") {
            if let (Some(id), Some(connector), Some((width, height))) =
                (id, connector.take(), parse_xy(value))
            {
                screens.push(Screen {
                    connector,
                    id,
                    width,
                    height,
                });
            }
        }
    }
    screens
}

/// Parses a surface property dump into creator pid and reported size:
///
/// ```text
/// surface 1016
/// - creator pid:      1234
/// - original size:    x=1920, y=1080
/// ```
fn parse_surface_info(dump: &str) -> Option<SurfaceInfo> {
    let mut creator: Option<i32> = None;
    let mut size: Option<(u32, u32)> = None;
    for line in dump.lines() {
        let line = line.trim();
        if let Some(value) = field_value(line, "creator pid") {
            creator = value.parse().ok();
        } else if let Some(value) = field_value(line, "original size") {
            size = parse_xy(value);
        }
    }
    let (width, height) = size?;
    Some(SurfaceInfo {
        creator_pid: Pid::from_raw(creator?),
        width,
        height,
    })
}

/// Extracts surface ids from a `get surfaces` listing: every line of the
/// form `surface <id>` counts, independent of indentation.
fn parse_surface_ids(listing: &str) -> HashSet<SurfaceId> {
    listing
        .lines()
        .filter_map(|line| {
            line.trim()
                .strip_prefix("surface ")?
                .split_whitespace()
                .next()?
                .parse()
                .ok()
        })
        .collect()
}

/// Matches `- <name>: <value>` property lines.
fn field_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let line = line.strip_prefix('-').unwrap_or(line).trim_start();
    let (key, value) = line.split_once(':')?;
    (key.trim() == name).then(|| value.trim())
}

/// Parses `x=<w>, y=<h>` pairs.
fn parse_xy(value: &str) -> Option<(u32, u32)> {
    let mut x = None;
    let mut y = None;
    for part in value.split(',') {
        let (key, v) = part.trim().split_once('=')?;
        match key.trim() {
            "x" => x = v.trim().parse().ok(),
            "y" => y = v.trim().parse().ok(),
            _ => {}
        }
    }
    Some((x?, y?))
}
