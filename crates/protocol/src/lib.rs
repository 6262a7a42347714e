//! # mdk-protocol
//!
//! Core protocol definitions and data models for md-workflow-kit.
//!
//! This crate defines all shared data structures used for:
//! - Global configuration file parsing (`.mdkit/config.toml`)
//! - Persisted workflow state and stage execution records
//! - Typed simulation parameters
//! - Visualization session descriptions
//! - Communication between clients and the core service
//!
//! ## Modules
//!
//! - [`config_models`]: Global configuration from config.toml
//! - [`params_models`]: Effective simulation parameters
//! - [`workflow_models`]: Workflows, stage status, execution records
//! - [`session_models`]: Visualization session scripts
//! - [`ipc`]: Operations and Events for client-core communication
//!
//! ## Design Principles
//!
//! - Minimal dependencies: serde, ts-rs, uuid, and chrono
//! - TypeScript generation: All types derive `TS` for client compatibility
//! - Independent compilation: No dependencies on other md-workflow-kit crates

pub mod config_models;
pub mod ipc;
pub mod params_models;
pub mod session_models;
pub mod workflow_models;

// Re-export all public types for convenience
pub use config_models::*;
pub use ipc::*;
pub use params_models::*;
pub use session_models::*;
pub use workflow_models::*;
