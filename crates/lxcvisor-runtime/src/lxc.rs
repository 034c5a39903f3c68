//! LXC implementation of the container runtime contract.
//!
//! Drives the `lxc-info`, `lxc-start`, `lxc-wait`, and `lxc-device`
//! command-line tools. Containers are expected to be defined on the host
//! beforehand (`/var/lib/lxc/<name>`); lxcvisor never creates rootfs
//! images itself.

use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::time::Duration;

use lxcvisor_common::error::{LxcvisorError, Result};
use nix::unistd::Pid;

use crate::runtime::{ContainerRuntime, LifecycleState};

/// Runtime backed by the LXC command-line tools.
#[derive(Debug, Default)]
pub struct LxcCommandRuntime;

impl LxcCommandRuntime {
    /// Creates a new LXC command runtime.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn run(&self, container: &str, tool: &str, args: &[&str]) -> Result<Output> {
        let output = Command::new(tool)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| LxcvisorError::Runtime {
                container: container.to_owned(),
                message: format!("failed to run {tool}: {e}"),
            })?;
        tracing::trace!(container, tool, ?args, status = ?output.status, "runtime tool finished");
        Ok(output)
    }

    fn info(&self, name: &str, field: &str) -> Result<String> {
        let output = self.run(name, "lxc-info", &["-n", name, field])?;
        if !output.status.success() {
            return Err(LxcvisorError::Runtime {
                container: name.to_owned(),
                message: format!("lxc-info {field} failed: {}", stderr_excerpt(&output)),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl ContainerRuntime for LxcCommandRuntime {
    fn create(&self, name: &str) -> Result<()> {
        // lxc-info succeeds exactly when the container is defined.
        let output = self.run(name, "lxc-info", &["-n", name, "-s"])?;
        if output.status.success() {
            Ok(())
        } else {
            Err(LxcvisorError::Runtime {
                container: name.to_owned(),
                message: "container is not defined on this host".to_owned(),
            })
        }
    }

    fn is_running(&self, name: &str) -> bool {
        self.info(name, "-s")
            .ok()
            .and_then(|out| parse_info_value(&out, "State"))
            .is_some_and(|state| state == "RUNNING")
    }

    fn start(&self, name: &str) -> Result<()> {
        let output = self.run(name, "lxc-start", &["-n", name, "-d"])?;
        if output.status.success() {
            Ok(())
        } else {
            Err(LxcvisorError::Runtime {
                container: name.to_owned(),
                message: format!("lxc-start failed: {}", stderr_excerpt(&output)),
            })
        }
    }

    fn wait(&self, name: &str, state: LifecycleState, timeout: Option<Duration>) -> Result<bool> {
        let mut args = vec!["-n", name, "-s", state.as_str()];
        let secs;
        if let Some(timeout) = timeout {
            secs = timeout.as_secs().to_string();
            args.push("-t");
            args.push(&secs);
        }
        let output = self.run(name, "lxc-wait", &args)?;
        Ok(output.status.success())
    }

    fn init_pid(&self, name: &str) -> Result<Pid> {
        let out = self.info(name, "-p")?;
        parse_info_value(&out, "PID")
            .and_then(|pid| pid.parse::<i32>().ok())
            .map(Pid::from_raw)
            .ok_or_else(|| LxcvisorError::Runtime {
                container: name.to_owned(),
                message: format!("lxc-info reported no init PID: {}", out.trim()),
            })
    }

    fn add_device_node(&self, name: &str, src: &Path, dst: &Path) -> Result<()> {
        let src = src.to_string_lossy();
        let dst = dst.to_string_lossy();
        let output = self.run(name, "lxc-device", &["-n", name, "add", &src, &dst])?;
        if output.status.success() {
            Ok(())
        } else {
            Err(LxcvisorError::Runtime {
                container: name.to_owned(),
                message: format!(
                    "lxc-device add {src} {dst} failed: {}",
                    stderr_excerpt(&output)
                ),
            })
        }
    }

    fn spawn_stop_monitor(&self, name: &str) -> Result<Pid> {
        let child = Command::new("lxc-wait")
            .args(["-n", name, "-s", LifecycleState::Stopped.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| LxcvisorError::Runtime {
                container: name.to_owned(),
                message: format!("failed to spawn stop monitor: {e}"),
            })?;
        let pid = i32::try_from(child.id())
            .map(Pid::from_raw)
            .map_err(|_| LxcvisorError::Runtime {
                container: name.to_owned(),
                message: "monitor pid exceeds the host pid range".to_owned(),
            })?;
        tracing::debug!(container = name, monitor = %pid, "stop monitor spawned");
        // The Child handle is dropped here on purpose: the main loop
        // reaps the monitor through waitpid(-1).
        drop(child);
        Ok(pid)
    }

    fn release(&self, name: &str) {
        // The CLI runtime holds no per-container state.
        tracing::debug!(container = name, "runtime handle released");
    }
}

/// Extracts the value of a `Key: value` line from `lxc-info` output.
fn parse_info_value(output: &str, key: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let (k, v) = line.split_once(':')?;
        (k.trim() == key).then(|| v.trim().to_owned())
    })
}

fn stderr_excerpt(output: &Output) -> String {
    let text = String::from_utf8_lossy(&output.stderr);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        format!("exit status {}", output.status)
    } else {
        trimmed.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO_RUNNING: &str = "Name:           cluster-a\nState:          RUNNING\nPID:            1234\nIP:             10.0.3.2\n";

    #[test]
    fn parse_info_value_extracts_state() {
        assert_eq!(
            parse_info_value(INFO_RUNNING, "State").as_deref(),
            Some("RUNNING")
        );
    }

    #[test]
    fn parse_info_value_extracts_pid() {
        assert_eq!(parse_info_value(INFO_RUNNING, "PID").as_deref(), Some("1234"));
    }

    #[test]
    fn parse_info_value_missing_key() {
        assert_eq!(parse_info_value(INFO_RUNNING, "Memory"), None);
    }

    #[test]
    fn parse_info_value_empty_output() {
        assert_eq!(parse_info_value("", "State"), None);
    }

    #[test]
    fn lifecycle_state_spelling_matches_lxc() {
        assert_eq!(LifecycleState::Running.as_str(), "RUNNING");
        assert_eq!(LifecycleState::Stopped.as_str(), "STOPPED");
    }
}
