//! Configuration loading and parameter resolution.
//!
//! This module provides:
//! - Loading of `.mdkit/config.toml` into an immutable [`ServiceConfig`](models::ServiceConfig)
//! - The three-tier parameter merge and per-stage validation
//! - Non-fatal parameter advice

pub mod advisor;
pub mod error;
pub mod loader;
pub mod models;
pub mod resolver;
