//! Compositor integration for the lxcvisor daemon.
//!
//! Defines the layer-manager collaborator boundary, the display
//! reconciler that maps guest compositor surfaces onto declared container
//! outputs, and a backend driving the IVI layer-manager control client.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod ivi;
pub mod layer_manager;
pub mod reconciler;
