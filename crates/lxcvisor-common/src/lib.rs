//! # lxcvisor-common
//!
//! Shared types, error definitions, configuration model, and constants
//! used across the lxcvisor workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate and provides the foundational primitives that the
//! runtime, display, and daemon crates build upon.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
