//! Container runtime boundary and registry for the lxcvisor daemon.
//!
//! Defines the [`runtime::ContainerRuntime`] collaborator contract with an
//! LXC command-line implementation, the `/proc`-based process-ancestry
//! resolver, and the shared container/output registry both the supervisor
//! and the display reconciler mutate.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod container;
pub mod lxc;
pub mod procfs;
pub mod runtime;
