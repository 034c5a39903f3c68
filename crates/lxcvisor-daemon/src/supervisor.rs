//! Container supervision: launch, stop handling, and the reaping loop.
//!
//! Each running container is shadowed by one monitor child that exits
//! when the container reaches STOPPED. The supervision loop blocks in
//! the child reaper, matches reaped children back to their containers,
//! and applies the container's policy: relaunch it, or reboot the host.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use lxcvisor_common::config::StorageConfig;
use lxcvisor_common::constants::{LAUNCH_SETTLE, RUNNING_WAIT};
use lxcvisor_common::error::{LxcvisorError, Result};
use lxcvisor_common::types::{LayerId, RespawnPolicy};
use lxcvisor_display::reconciler::DisplayReconciler;
use lxcvisor_runtime::container::ContainerRegistry;
use lxcvisor_runtime::runtime::{ContainerRuntime, LifecycleState};

use crate::host::{ChildReaper, HostControl, ReapEvent};

/// What a stop handler decided to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The container was relaunched in place.
    Relaunched,
    /// A host reboot was requested; supervision is over.
    Rebooting,
}

/// Drives the fixed container set through launch, stop, and policy.
pub struct Supervisor {
    registry: Arc<Mutex<ContainerRegistry>>,
    runtime: Arc<dyn ContainerRuntime>,
    reconciler: Arc<DisplayReconciler>,
    host: Arc<dyn HostControl>,
    reaper: Arc<dyn ChildReaper>,
}

impl Supervisor {
    /// Wires the supervisor to its collaborators.
    #[must_use]
    pub fn new(
        registry: Arc<Mutex<ContainerRegistry>>,
        runtime: Arc<dyn ContainerRuntime>,
        reconciler: Arc<DisplayReconciler>,
        host: Arc<dyn HostControl>,
        reaper: Arc<dyn ChildReaper>,
    ) -> Self {
        Self {
            registry,
            runtime,
            reconciler,
            host,
            reaper,
        }
    }

    /// Launches every configured container in declaration order, pausing
    /// between launches so each guest compositor can come up before the
    /// next one starts competing for the host compositor.
    ///
    /// # Errors
    ///
    /// Returns the first launch failure; any failure here is fatal.
    pub fn launch_all(&self) -> Result<()> {
        let names = self.lock_registry()?.names();
        for name in &names {
            self.launch(name)?;
            std::thread::sleep(LAUNCH_SETTLE);
        }
        Ok(())
    }

    /// Launches one container: start it, wait for RUNNING, attach its
    /// storage device nodes, record its init and monitor PIDs, and back
    /// each declared output with a compositor layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is unknown, already has a live
    /// init process, fails to reach RUNNING within the startup window, or
    /// any runtime or compositor step fails. All of these are fatal.
    pub fn launch(&self, name: &str) -> Result<()> {
        let (outputs, storages) = self.launch_plan(name)?;

        self.runtime.create(name)?;
        if self.runtime.is_running(name) {
            tracing::debug!(container = name, "already running, adopting");
        } else {
            self.runtime.start(name)?;
        }
        if !self
            .runtime
            .wait(name, LifecycleState::Running, Some(RUNNING_WAIT))?
        {
            return Err(LxcvisorError::Runtime {
                container: name.to_owned(),
                message: format!("did not reach RUNNING within {RUNNING_WAIT:?}"),
            });
        }

        for storage in &storages {
            self.runtime.add_device_node(name, &storage.src, &storage.dst)?;
            tracing::debug!(
                container = name,
                src = %storage.src.display(),
                dst = %storage.dst.display(),
                "storage device attached"
            );
        }

        let init_pid = self.runtime.init_pid(name)?;
        let monitor_pid = self.runtime.spawn_stop_monitor(name)?;
        if let Some(container) = self.lock_registry()?.get_mut(name) {
            container.set_running(init_pid, monitor_pid);
        }
        tracing::info!(
            container = name,
            init = init_pid.as_raw(),
            monitor = monitor_pid.as_raw(),
            "container running"
        );

        for (connector, layer) in &outputs {
            self.reconciler.create_layer(connector, *layer)?;
        }
        Ok(())
    }

    /// Applies the stopped container's policy.
    ///
    /// The registry bindings and the reconciler's surface mirrors are
    /// cleared in one critical section, so a concurrent surface
    /// notification observes either the old state or the fully cleared
    /// one, never a half-cleared mix.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is unknown, the relaunch fails,
    /// or the reboot request is rejected.
    pub fn handle_stop(&self, name: &str) -> Result<StopOutcome> {
        let policy = {
            let mut registry = self.lock_registry()?;
            let container =
                registry
                    .get_mut(name)
                    .ok_or_else(|| LxcvisorError::NotFound {
                        kind: "container",
                        id: name.to_owned(),
                    })?;
            let policy = container.policy;
            container.mark_stopped();
            self.reconciler.forget_container(name);
            policy
        };

        match policy {
            RespawnPolicy::RebootHost => {
                tracing::warn!(container = name, "stopped, rebooting host");
                self.host.sync_disks();
                self.host.reboot()?;
                Ok(StopOutcome::Rebooting)
            }
            RespawnPolicy::Respawn => {
                tracing::info!(container = name, "stopped, respawning");
                self.runtime.release(name);
                self.launch(name)?;
                Ok(StopOutcome::Relaunched)
            }
        }
    }

    /// The supervision loop: reap children until termination is requested
    /// or a reboot ends supervision.
    ///
    /// Children that match no monitor are logged and ignored; backend
    /// helpers reaped here instead of by their spawners fall in that
    /// bucket. When `term` is observed set, SIGTERM is fanned out to the
    /// whole process group exactly once and the loop returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the child wait fails unexpectedly or a stop
    /// handler fails.
    pub fn run(&self, term: &AtomicBool) -> Result<()> {
        loop {
            if term.load(Ordering::SeqCst) {
                break;
            }
            let pid = match self.reaper.wait_next()? {
                ReapEvent::Child(pid) => pid,
                // Signal delivery; re-check the termination flag.
                ReapEvent::Interrupted => continue,
                ReapEvent::Exhausted => {
                    tracing::debug!("no children left to supervise");
                    return Ok(());
                }
            };

            let owner = self
                .lock_registry()?
                .owner_of_monitor(pid)
                .map(str::to_owned);
            let Some(name) = owner else {
                tracing::debug!(pid = pid.as_raw(), "reaped unrelated child");
                continue;
            };
            if self.handle_stop(&name)? == StopOutcome::Rebooting {
                return Ok(());
            }
        }

        tracing::info!("termination requested, signalling process group");
        self.host.terminate_group();
        Ok(())
    }

    /// Snapshots what a launch needs from the registry: the declared
    /// outputs and storages, checked for a live init process.
    fn launch_plan(&self, name: &str) -> Result<(Vec<(String, LayerId)>, Vec<StorageConfig>)> {
        let registry = self.lock_registry()?;
        let container = registry.get(name).ok_or_else(|| LxcvisorError::NotFound {
            kind: "container",
            id: name.to_owned(),
        })?;
        if container.init_pid.is_some() {
            return Err(LxcvisorError::Runtime {
                container: name.to_owned(),
                message: "already has a live init process".to_owned(),
            });
        }
        let outputs = container
            .outputs()
            .iter()
            .map(|o| (o.display.clone(), o.layer))
            .collect();
        Ok((outputs, container.storages.clone()))
    }

    fn lock_registry(&self) -> Result<MutexGuard<'_, ContainerRegistry>> {
        self.registry.lock().map_err(|_| LxcvisorError::Host {
            message: "container registry mutex poisoned".to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::path::Path;
    use std::sync::atomic::AtomicI32;
    use std::time::Duration;

    use lxcvisor_common::config::{ContainerConfig, LauncherConfig, OutputConfig};
    use lxcvisor_common::types::SurfaceId;
    use lxcvisor_display::layer_manager::{
        LayerManager, NotificationSink, ObjectKind, Screen, SurfaceInfo,
    };
    use lxcvisor_runtime::procfs::ProcessTable;
    use nix::unistd::Pid;

    use super::*;

    #[derive(Default)]
    struct FakeRuntime {
        next_pid: AtomicI32,
        calls: Mutex<Vec<String>>,
        running: Mutex<HashSet<String>>,
        reach_running: bool,
    }

    impl FakeRuntime {
        fn new() -> Self {
            Self {
                next_pid: AtomicI32::new(100),
                reach_running: true,
                ..Self::default()
            }
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ContainerRuntime for FakeRuntime {
        fn create(&self, name: &str) -> Result<()> {
            self.record(format!("create {name}"));
            Ok(())
        }

        fn is_running(&self, name: &str) -> bool {
            self.running.lock().unwrap().contains(name)
        }

        fn start(&self, name: &str) -> Result<()> {
            self.record(format!("start {name}"));
            let _ = self.running.lock().unwrap().insert(name.to_owned());
            Ok(())
        }

        fn wait(
            &self,
            name: &str,
            state: LifecycleState,
            _timeout: Option<Duration>,
        ) -> Result<bool> {
            self.record(format!("wait {name} {}", state.as_str()));
            Ok(self.reach_running)
        }

        fn init_pid(&self, _name: &str) -> Result<Pid> {
            Ok(Pid::from_raw(self.next_pid.fetch_add(1, Ordering::SeqCst)))
        }

        fn add_device_node(&self, name: &str, src: &Path, dst: &Path) -> Result<()> {
            self.record(format!(
                "device {name} {} {}",
                src.display(),
                dst.display()
            ));
            Ok(())
        }

        fn spawn_stop_monitor(&self, name: &str) -> Result<Pid> {
            self.record(format!("monitor {name}"));
            Ok(Pid::from_raw(self.next_pid.fetch_add(1, Ordering::SeqCst)))
        }

        fn release(&self, name: &str) {
            self.record(format!("release {name}"));
            let _ = self.running.lock().unwrap().remove(name);
        }
    }

    #[derive(Default)]
    struct FakeManager {
        calls: Mutex<Vec<String>>,
        surfaces: Mutex<HashMap<SurfaceId, SurfaceInfo>>,
    }

    impl FakeManager {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn add_surface(&self, surface: SurfaceId, creator: i32, width: u32, height: u32) {
            let _ = self.surfaces.lock().unwrap().insert(
                surface,
                SurfaceInfo {
                    creator_pid: Pid::from_raw(creator),
                    width,
                    height,
                },
            );
        }
    }

    impl LayerManager for FakeManager {
        fn screens(&self) -> Result<Vec<Screen>> {
            Ok(vec![Screen {
                connector: "HDMI-A-1".to_owned(),
                id: 0,
                width: 1920,
                height: 1080,
            }])
        }

        fn create_layer(&self, layer: LayerId, width: u32, height: u32) -> Result<()> {
            self.record(format!("create_layer {layer} {width}x{height}"));
            Ok(())
        }

        fn set_layer_visibility(&self, layer: LayerId, visible: bool) -> Result<()> {
            self.record(format!("layer_visibility {layer} {visible}"));
            Ok(())
        }

        fn set_render_order(&self, screen: u32, layers: &[LayerId]) -> Result<()> {
            self.record(format!("render_order {screen} {layers:?}"));
            Ok(())
        }

        fn surface_info(&self, surface: SurfaceId) -> Result<SurfaceInfo> {
            self.surfaces.lock().unwrap().get(&surface).copied().ok_or(
                LxcvisorError::NotFound {
                    kind: "surface",
                    id: surface.to_string(),
                },
            )
        }

        fn set_surface_source_rect(
            &self,
            _surface: SurfaceId,
            _x: u32,
            _y: u32,
            _width: u32,
            _height: u32,
        ) -> Result<()> {
            Ok(())
        }

        fn set_surface_destination_rect(
            &self,
            _surface: SurfaceId,
            _x: u32,
            _y: u32,
            _width: u32,
            _height: u32,
        ) -> Result<()> {
            Ok(())
        }

        fn set_surface_visibility(&self, _surface: SurfaceId, _visible: bool) -> Result<()> {
            Ok(())
        }

        fn add_surface_to_layer(&self, _layer: LayerId, _surface: SurfaceId) -> Result<()> {
            Ok(())
        }

        fn watch_surface(&self, surface: SurfaceId) -> Result<()> {
            self.record(format!("watch {surface}"));
            Ok(())
        }

        fn unwatch_surface(&self, _surface: SurfaceId) -> Result<()> {
            Ok(())
        }

        fn commit(&self) -> Result<()> {
            self.record("commit".to_owned());
            Ok(())
        }

        fn subscribe(&self, _sink: Arc<dyn NotificationSink>) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeProcessTable {
        parents: Mutex<HashMap<i32, i32>>,
    }

    impl FakeProcessTable {
        fn map(&self, child: i32, parent: i32) {
            let _ = self.parents.lock().unwrap().insert(child, parent);
        }
    }

    impl ProcessTable for FakeProcessTable {
        fn parent_of(&self, pid: Pid) -> Option<Pid> {
            self.parents
                .lock()
                .unwrap()
                .get(&pid.as_raw())
                .copied()
                .map(Pid::from_raw)
        }
    }

    #[derive(Default)]
    struct FakeHost {
        syncs: AtomicI32,
        reboots: AtomicI32,
        terminations: AtomicI32,
    }

    impl HostControl for FakeHost {
        fn sync_disks(&self) {
            let _ = self.syncs.fetch_add(1, Ordering::SeqCst);
        }

        fn reboot(&self) -> Result<()> {
            let _ = self.reboots.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn terminate_group(&self) {
            let _ = self.terminations.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct ScriptedReaper {
        events: Mutex<VecDeque<ReapEvent>>,
    }

    impl ScriptedReaper {
        fn push(&self, event: ReapEvent) {
            self.events.lock().unwrap().push_back(event);
        }

        fn remaining(&self) -> usize {
            self.events.lock().unwrap().len()
        }
    }

    impl ChildReaper for ScriptedReaper {
        fn wait_next(&self) -> Result<ReapEvent> {
            Ok(self
                .events
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(ReapEvent::Exhausted))
        }
    }

    fn config(policy: RespawnPolicy) -> LauncherConfig {
        LauncherConfig {
            containers: vec![ContainerConfig {
                name: "cluster".into(),
                policy,
                outputs: vec![OutputConfig {
                    display: "HDMI-A-1".into(),
                    layer: 100,
                }],
                storages: Vec::new(),
            }],
        }
    }

    struct Harness {
        supervisor: Supervisor,
        registry: Arc<Mutex<ContainerRegistry>>,
        runtime: Arc<FakeRuntime>,
        manager: Arc<FakeManager>,
        reconciler: Arc<DisplayReconciler>,
        table: Arc<FakeProcessTable>,
        host: Arc<FakeHost>,
        reaper: Arc<ScriptedReaper>,
    }

    fn harness(policy: RespawnPolicy) -> Harness {
        harness_with_runtime(policy, FakeRuntime::new())
    }

    fn harness_with_runtime(policy: RespawnPolicy, runtime: FakeRuntime) -> Harness {
        let registry = Arc::new(Mutex::new(ContainerRegistry::from_config(&config(policy))));
        let runtime = Arc::new(runtime);
        let manager = Arc::new(FakeManager::default());
        let table = Arc::new(FakeProcessTable::default());
        let reconciler = Arc::new(
            DisplayReconciler::new(
                Arc::clone(&manager) as Arc<dyn LayerManager>,
                Arc::clone(&table) as Arc<dyn ProcessTable>,
                Arc::clone(&registry),
            )
            .unwrap(),
        );
        let host = Arc::new(FakeHost::default());
        let reaper = Arc::new(ScriptedReaper::default());
        let supervisor = Supervisor::new(
            Arc::clone(&registry),
            Arc::clone(&runtime) as Arc<dyn ContainerRuntime>,
            Arc::clone(&reconciler),
            Arc::clone(&host) as Arc<dyn HostControl>,
            Arc::clone(&reaper) as Arc<dyn ChildReaper>,
        );
        Harness {
            supervisor,
            registry,
            runtime,
            manager,
            reconciler,
            table,
            host,
            reaper,
        }
    }

    fn live_pids(h: &Harness) -> (Pid, Pid) {
        let registry = h.registry.lock().unwrap();
        let container = registry.get("cluster").unwrap();
        (
            container.init_pid.unwrap(),
            container.monitor_pid.unwrap(),
        )
    }

    #[test]
    fn launch_records_pids_and_backs_outputs_with_layers() {
        let h = harness(RespawnPolicy::Respawn);
        h.supervisor.launch("cluster").unwrap();

        let (init, monitor) = live_pids(&h);
        assert_ne!(init, monitor);

        let calls = h.runtime.calls();
        assert_eq!(
            calls,
            vec!["create cluster", "start cluster", "wait cluster RUNNING", "monitor cluster"]
        );
        assert!(
            h.manager
                .calls()
                .contains(&"create_layer 100 1920x1080".to_owned())
        );
    }

    #[test]
    fn launch_attaches_storage_devices_in_order() {
        let registry_config = LauncherConfig {
            containers: vec![ContainerConfig {
                name: "cluster".into(),
                policy: RespawnPolicy::Respawn,
                outputs: vec![OutputConfig {
                    display: "HDMI-A-1".into(),
                    layer: 100,
                }],
                storages: vec![StorageConfig {
                    src: "/dev/mmcblk0p3".into(),
                    dst: "/dev/guest-data".into(),
                }],
            }],
        };
        let registry = Arc::new(Mutex::new(ContainerRegistry::from_config(&registry_config)));
        let runtime = Arc::new(FakeRuntime::new());
        let manager = Arc::new(FakeManager::default());
        let reconciler = Arc::new(
            DisplayReconciler::new(
                Arc::clone(&manager) as Arc<dyn LayerManager>,
                Arc::new(FakeProcessTable::default()),
                Arc::clone(&registry),
            )
            .unwrap(),
        );
        let supervisor = Supervisor::new(
            registry,
            Arc::clone(&runtime) as Arc<dyn ContainerRuntime>,
            reconciler,
            Arc::new(FakeHost::default()),
            Arc::new(ScriptedReaper::default()),
        );

        supervisor.launch("cluster").unwrap();
        assert!(
            runtime
                .calls()
                .contains(&"device cluster /dev/mmcblk0p3 /dev/guest-data".to_owned())
        );
    }

    #[test]
    fn launch_rejects_live_container() {
        let h = harness(RespawnPolicy::Respawn);
        h.supervisor.launch("cluster").unwrap();
        assert!(matches!(
            h.supervisor.launch("cluster"),
            Err(LxcvisorError::Runtime { .. })
        ));
    }

    #[test]
    fn launch_fails_when_running_is_never_reached() {
        let mut runtime = FakeRuntime::new();
        runtime.reach_running = false;
        let h = harness_with_runtime(RespawnPolicy::Respawn, runtime);
        assert!(matches!(
            h.supervisor.launch("cluster"),
            Err(LxcvisorError::Runtime { .. })
        ));
        // Nothing was recorded as running and no layer was created.
        assert!(h.registry.lock().unwrap().get("cluster").unwrap().init_pid.is_none());
        assert!(h.manager.calls().iter().all(|c| !c.starts_with("create_layer")));
    }

    #[test]
    fn respawn_relaunches_with_same_layers_and_fresh_pids() {
        let h = harness(RespawnPolicy::Respawn);
        h.supervisor.launch("cluster").unwrap();
        let first_init = h.registry.lock().unwrap().get("cluster").unwrap().init_pid;

        let outcome = h.supervisor.handle_stop("cluster").unwrap();
        assert_eq!(outcome, StopOutcome::Relaunched);

        let registry = h.registry.lock().unwrap();
        let container = registry.get("cluster").unwrap();
        assert!(container.init_pid.is_some());
        assert_ne!(container.init_pid, first_init);
        drop(registry);
        // The declared layer set is stable across restarts.
        assert_eq!(
            h.manager
                .calls()
                .iter()
                .filter(|c| c.starts_with("create_layer"))
                .collect::<Vec<_>>(),
            vec!["create_layer 100 1920x1080", "create_layer 100 1920x1080"]
        );
        assert_eq!(h.host.reboots.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn reused_surface_id_rebinds_after_respawn() {
        let h = harness(RespawnPolicy::Respawn);
        h.supervisor.launch("cluster").unwrap();
        let (init, _) = live_pids(&h);
        h.table.map(500, init.as_raw());
        h.manager.add_surface(7, 500, 0, 0);
        h.reconciler.object_changed(ObjectKind::Surface, 7, true);
        assert_eq!(
            h.registry.lock().unwrap().get("cluster").unwrap().outputs()[0].surface,
            Some(7)
        );

        assert_eq!(
            h.supervisor.handle_stop("cluster").unwrap(),
            StopOutcome::Relaunched
        );

        // The new guest's compositor reuses the surface id.
        let (init, _) = live_pids(&h);
        h.table.map(501, init.as_raw());
        h.manager.add_surface(7, 501, 0, 0);
        h.reconciler.object_changed(ObjectKind::Surface, 7, true);

        assert_eq!(
            h.registry.lock().unwrap().get("cluster").unwrap().outputs()[0].surface,
            Some(7)
        );
        assert_eq!(
            h.manager.calls().iter().filter(|c| *c == "watch 7").count(),
            2
        );
    }

    #[test]
    fn reboot_policy_syncs_then_reboots_without_respawn() {
        let h = harness(RespawnPolicy::RebootHost);
        h.supervisor.launch("cluster").unwrap();
        let starts_before = h.runtime.calls().len();

        let outcome = h.supervisor.handle_stop("cluster").unwrap();
        assert_eq!(outcome, StopOutcome::Rebooting);
        assert_eq!(h.host.syncs.load(Ordering::SeqCst), 1);
        assert_eq!(h.host.reboots.load(Ordering::SeqCst), 1);
        // No relaunch happened after the reboot request.
        assert_eq!(h.runtime.calls().len(), starts_before);
    }

    #[test]
    fn handle_stop_unknown_container_is_not_found() {
        let h = harness(RespawnPolicy::Respawn);
        assert!(matches!(
            h.supervisor.handle_stop("ghost"),
            Err(LxcvisorError::NotFound { .. })
        ));
    }

    #[test]
    fn run_respawns_container_whose_monitor_exits() {
        let h = harness(RespawnPolicy::Respawn);
        h.supervisor.launch("cluster").unwrap();
        let (_, monitor) = live_pids(&h);
        h.reaper.push(ReapEvent::Child(monitor));
        // Unrelated helper child reaped by the loop.
        h.reaper.push(ReapEvent::Child(Pid::from_raw(9999)));

        let term = AtomicBool::new(false);
        h.supervisor.run(&term).unwrap();

        assert!(h.registry.lock().unwrap().get("cluster").unwrap().init_pid.is_some());
        // Relaunched exactly once.
        assert_eq!(
            h.runtime
                .calls()
                .iter()
                .filter(|c| c.starts_with("start"))
                .count(),
            2
        );
        assert_eq!(h.host.terminations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn run_stops_reaping_after_reboot_request() {
        let h = harness(RespawnPolicy::RebootHost);
        h.supervisor.launch("cluster").unwrap();
        let (_, monitor) = live_pids(&h);
        h.reaper.push(ReapEvent::Child(monitor));
        h.reaper.push(ReapEvent::Child(Pid::from_raw(4242)));

        let term = AtomicBool::new(false);
        h.supervisor.run(&term).unwrap();

        assert_eq!(h.host.reboots.load(Ordering::SeqCst), 1);
        // The loop returned before consuming further exits.
        assert_eq!(h.reaper.remaining(), 1);
    }

    #[test]
    fn run_with_termination_requested_signals_group_once() {
        let h = harness(RespawnPolicy::Respawn);
        let term = AtomicBool::new(true);
        h.supervisor.run(&term).unwrap();
        assert_eq!(h.host.terminations.load(Ordering::SeqCst), 1);
        // No launch or respawn decisions were taken.
        assert!(h.runtime.calls().is_empty());
    }

    #[test]
    fn run_observes_flag_set_during_interrupted_wait() {
        struct SignalingReaper {
            term: Arc<AtomicBool>,
        }

        impl ChildReaper for SignalingReaper {
            fn wait_next(&self) -> Result<ReapEvent> {
                // Simulates SIGTERM arriving while blocked in the wait.
                self.term.store(true, Ordering::SeqCst);
                Ok(ReapEvent::Interrupted)
            }
        }

        let term = Arc::new(AtomicBool::new(false));
        let registry = Arc::new(Mutex::new(ContainerRegistry::from_config(&config(
            RespawnPolicy::Respawn,
        ))));
        let runtime = Arc::new(FakeRuntime::new());
        let manager = Arc::new(FakeManager::default());
        let reconciler = Arc::new(
            DisplayReconciler::new(
                Arc::clone(&manager) as Arc<dyn LayerManager>,
                Arc::new(FakeProcessTable::default()),
                Arc::clone(&registry),
            )
            .unwrap(),
        );
        let host = Arc::new(FakeHost::default());
        let supervisor = Supervisor::new(
            registry,
            Arc::clone(&runtime) as Arc<dyn ContainerRuntime>,
            reconciler,
            Arc::clone(&host) as Arc<dyn HostControl>,
            Arc::new(SignalingReaper {
                term: Arc::clone(&term),
            }),
        );

        supervisor.run(&term).unwrap();

        assert_eq!(host.terminations.load(Ordering::SeqCst), 1);
        assert!(runtime.calls().is_empty());
    }
}
