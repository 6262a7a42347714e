//! Shared helpers for the integration tests.
//!
//! - Fixtures: a temporary workspace, fake engine and viewer executables
//! - Assertions over workflows and event streams

pub mod assertions;
pub mod fixtures;

#[allow(unused_imports)]
pub use assertions::*;
pub use fixtures::*;
