//! The simulation pipeline.
//!
//! - [`stages`]: stage graph and command plans
//! - [`mdp`]: run-parameter file rendering
//! - [`analysis`]: analysis commands and `.xvg` summaries
//! - [`artifacts`]: per-stage file listings
//! - [`coordinator`]: `advance`, `run_to` and `analyze`

pub mod analysis;
pub mod artifacts;
pub mod coordinator;
pub mod mdp;
pub mod stages;

pub use coordinator::{AdvanceOptions, AnalysisReport, ParamsPreview, PipelineCoordinator};
