//! Unified error types for the lxcvisor workspace.
//!
//! Fatal startup errors propagate out of `main` as these variants;
//! recoverable steady-state errors are logged at their origin and never
//! cross a crate boundary.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum LxcvisorError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A container runtime operation failed.
    #[error("runtime error for container {container}: {message}")]
    Runtime {
        /// Name of the container the operation targeted.
        container: String,
        /// Description of the failure.
        message: String,
    },

    /// A compositor (layer manager) operation failed.
    #[error("compositor error: {message}")]
    Compositor {
        /// Description of the failure.
        message: String,
    },

    /// A host-level operation (reboot, signal delivery) failed.
    #[error("host error: {message}")]
    Host {
        /// Description of the failure.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, LxcvisorError>;
