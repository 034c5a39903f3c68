//! lxcvisor daemon: launches a fixed set of LXC guest containers, keeps
//! each guest compositor's surfaces wired onto declared host compositor
//! layers, and respawns or reboots per container policy when a guest
//! stops.
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

mod host;
mod signals;
mod supervisor;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;
use lxcvisor_common::config;
use lxcvisor_common::constants::{APP_NAME, DEFAULT_CONFIG_PATH};
use lxcvisor_display::ivi::IviControlManager;
use lxcvisor_display::layer_manager::LayerManager;
use lxcvisor_display::reconciler::DisplayReconciler;
use lxcvisor_runtime::container::ContainerRegistry;
use lxcvisor_runtime::lxc::LxcCommandRuntime;
use lxcvisor_runtime::procfs::ProcFs;
use lxcvisor_runtime::runtime::ContainerRuntime;

use crate::host::{SystemControl, WaitpidReaper};
use crate::supervisor::Supervisor;

/// LXC guest container launcher and display supervisor.
#[derive(Debug, Parser)]
#[command(name = APP_NAME, version, about)]
struct Cli {
    /// Path to the launcher configuration file.
    #[arg(long, env = "LXCVISOR_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = config::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    tracing::info!(
        path = %cli.config.display(),
        containers = config.containers.len(),
        "configuration loaded"
    );

    signals::install().context("installing SIGTERM handler")?;

    let registry = Arc::new(Mutex::new(ContainerRegistry::from_config(&config)));
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(LxcCommandRuntime::new());

    let manager = Arc::new(IviControlManager::new());
    manager.wait_ready();
    let reconciler = Arc::new(DisplayReconciler::new(
        Arc::clone(&manager) as Arc<dyn LayerManager>,
        Arc::new(ProcFs::new()),
        Arc::clone(&registry),
    )?);
    let sink: Arc<dyn lxcvisor_display::layer_manager::NotificationSink> =
        Arc::clone(&reconciler) as Arc<dyn lxcvisor_display::layer_manager::NotificationSink>;
    manager
        .subscribe(sink)
        .context("subscribing to compositor notifications")?;

    let supervisor = Supervisor::new(
        registry,
        runtime,
        reconciler,
        Arc::new(SystemControl),
        Arc::new(WaitpidReaper),
    );
    supervisor.launch_all()?;
    supervisor.run(signals::termination_flag())?;
    tracing::info!("supervision loop ended");
    Ok(())
}
