//! Visualization session models.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use ts_rs::TS;
use uuid::Uuid;

/// A declarative visualization session, ready to hand to the viewer.
///
/// Building a session never starts the viewer; launching is a separate step.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct SessionScript {
    #[ts(type = "string")]
    pub workflow_id: Uuid,

    /// Name of the built-in template the script was rendered from.
    pub template: String,

    /// Absolute path of the structure file.
    pub structure_file: PathBuf,

    /// Absolute path of the trajectory file, if one was requested.
    pub trajectory_file: Option<PathBuf>,

    /// Directory the viewer should run in. Always the workflow's `root_dir`.
    pub working_dir: PathBuf,

    /// Rendered Tcl script.
    pub script: String,
}

/// Returned once the viewer process has been spawned.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct LaunchReceipt {
    pub pid: Option<u32>,

    /// Where the session script was written.
    pub script_path: PathBuf,

    pub headless: bool,
}
