//! System-wide constants and default paths.

use std::time::Duration;

/// Default path of the launcher configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/lxcvisor/lxcvisor.toml";

/// How long a container may take to reach RUNNING before startup is
/// treated as failed.
pub const RUNNING_WAIT: Duration = Duration::from_secs(10);

/// Settle delay between successive container launches, giving each guest
/// compositor time to come up before the next one races it.
pub const LAUNCH_SETTLE: Duration = Duration::from_secs(1);

/// Interval between compositor readiness and notification polls.
pub const COMPOSITOR_POLL: Duration = Duration::from_millis(500);

/// Application name used in diagnostics.
pub const APP_NAME: &str = "lxcvisor";
