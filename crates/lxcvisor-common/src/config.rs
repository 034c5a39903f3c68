//! Launcher configuration model.
//!
//! The configuration is a TOML file declaring the fixed set of supervised
//! containers, each with its respawn policy, display outputs, and extra
//! storage device nodes:
//!
//! ```toml
//! [[container]]
//! name = "cluster-a"
//! policy = "respawn"
//!
//! [[container.output]]
//! display = "HDMI-A-1"
//! layer = 100
//!
//! [[container.storage]]
//! src = "/dev/sda1"
//! dst = "/dev/sda1"
//! ```
//!
//! The container set is fixed at startup; there is no reload.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LxcvisorError, Result};
use crate::types::{LayerId, RespawnPolicy};

/// Root launcher configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LauncherConfig {
    /// The supervised containers, in launch order.
    #[serde(rename = "container")]
    pub containers: Vec<ContainerConfig>,
}

/// Declaration of one supervised container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Container name as known to the container runtime.
    pub name: String,
    /// What to do when the container stops.
    #[serde(default)]
    pub policy: RespawnPolicy,
    /// Display outputs the container is allowed to present on.
    #[serde(rename = "output")]
    pub outputs: Vec<OutputConfig>,
    /// Extra storage device nodes attached after start.
    #[serde(default, rename = "storage")]
    pub storages: Vec<StorageConfig>,
}

/// One declared display output: a guest surface slot on a named connector,
/// rendered through a fixed compositor layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Connector name of the target screen (e.g. `HDMI-A-1`).
    pub display: String,
    /// Compositor layer id reserved for this output.
    pub layer: LayerId,
}

/// A storage device node made visible inside the container after start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Host path of the device node.
    pub src: PathBuf,
    /// Path of the device node inside the container.
    pub dst: PathBuf,
}

/// Loads and validates a launcher configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not valid TOML, or
/// fails [`LauncherConfig::validate`].
pub fn load(path: &Path) -> Result<LauncherConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LxcvisorError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let config: LauncherConfig =
        toml::from_str(&content).map_err(|e| LxcvisorError::Config {
            message: format!("{}: {e}", path.display()),
        })?;
    config.validate()?;
    Ok(config)
}

impl LauncherConfig {
    /// Validates the configuration invariants the supervisor relies on.
    ///
    /// Container names must be unique, every container must declare at
    /// least one output, layer ids must be unique across the whole file,
    /// and storage paths must be absolute.
    ///
    /// # Errors
    ///
    /// Returns [`LxcvisorError::Config`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.containers.is_empty() {
            return Err(config_error("no containers declared"));
        }

        let mut names = HashSet::new();
        let mut layers: HashSet<LayerId> = HashSet::new();

        for container in &self.containers {
            if container.name.is_empty() {
                return Err(config_error("container with empty name"));
            }
            if !names.insert(container.name.as_str()) {
                return Err(config_error(&format!(
                    "duplicate container name: {}",
                    container.name
                )));
            }
            if container.outputs.is_empty() {
                return Err(config_error(&format!(
                    "container {} declares no outputs",
                    container.name
                )));
            }
            for output in &container.outputs {
                if output.display.is_empty() {
                    return Err(config_error(&format!(
                        "container {} has an output with no display name",
                        container.name
                    )));
                }
                if !layers.insert(output.layer) {
                    return Err(config_error(&format!(
                        "layer id {} declared more than once",
                        output.layer
                    )));
                }
            }
            for storage in &container.storages {
                if !storage.src.is_absolute() || !storage.dst.is_absolute() {
                    return Err(config_error(&format!(
                        "container {} has a storage entry with a relative path",
                        container.name
                    )));
                }
            }
        }
        Ok(())
    }
}

fn config_error(message: &str) -> LxcvisorError {
    LxcvisorError::Config {
        message: message.to_owned(),
    }
}
