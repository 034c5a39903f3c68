//! Domain primitive types used across the lxcvisor workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Compositor layer identifier, declared per output in configuration and
/// stable for the container's lifetime.
pub type LayerId = u32;

/// Compositor surface identifier, assigned by the compositor at runtime.
pub type SurfaceId = u32;

/// Compositor screen identifier, discovered once at startup.
pub type ScreenId = u32;

/// What to do when a supervised container stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RespawnPolicy {
    /// Relaunch the container with its declared outputs.
    #[default]
    Respawn,
    /// Sync disks and reboot the whole host.
    RebootHost,
}

impl fmt::Display for RespawnPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Respawn => write!(f, "respawn"),
            Self::RebootHost => write!(f, "reboot-host"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn respawn_policy_defaults_to_respawn() {
        assert_eq!(RespawnPolicy::default(), RespawnPolicy::Respawn);
    }

    #[test]
    fn respawn_policy_serde_uses_kebab_case() {
        #[derive(Deserialize)]
        struct Probe {
            policy: RespawnPolicy,
        }
        let probe: Probe = toml::from_str("policy = \"reboot-host\"").unwrap();
        assert_eq!(probe.policy, RespawnPolicy::RebootHost);
    }
}
