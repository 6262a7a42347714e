//! Workflow bookkeeping.
//!
//! - [`store`]: the registry of tracked workflows and their run locks
//! - [`metadata`]: the `.workflow.json` document and atomic writes
//! - [`quota`]: per-directory disk usage checks

pub mod metadata;
pub mod quota;
pub mod store;

pub use store::{LogStream, RunGuard, WorkflowHandle, WorkflowStore};
