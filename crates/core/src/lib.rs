//! # mdk-core
//!
//! Workflow orchestration for molecular dynamics simulations.
//!
//! This crate provides:
//! - Configuration loading from the `.mdkit/` directory and three-tier
//!   parameter resolution
//! - A persistent workflow store with per-workflow run locks
//! - Stage execution of external engine commands with timeouts
//! - The simulation pipeline: prepare, minimize, equilibrate, produce, analyze
//! - Visualization sessions for a molecular viewer
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and parameter resolution
//! - [`error`]: The shared error taxonomy
//! - [`workflow`]: Workflow store, metadata persistence and disk quotas
//! - [`executor`]: External process execution
//! - [`pipeline`]: Stage plans and the pipeline coordinator
//! - [`viz`]: Visualization templates, sessions and the viewer launcher
//! - [`service`]: The service facade and protocol dispatch

pub mod config;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod service;
pub mod viz;
pub mod workflow;

pub use error::{OrchestratorError, OrchestratorResult};
pub use service::WorkflowService;
