//! Global configuration models for `.mdkit/config.toml`.
//!
//! This module defines the structure of the global configuration file that
//! controls tool locations, the workspace, execution limits, and the
//! project-wide simulation defaults.

use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use ts_rs::TS;

/// Represents global settings from `.mdkit/config.toml`.
///
/// # Example
///
/// ```toml
/// # .mdkit/config.toml
/// [tools]
/// gmx_path = ""            # empty: look up `gmx` on PATH
/// vmd_path = "/opt/vmd/bin/vmd"
///
/// [workspace]
/// root = "workflows"
/// size_ceiling_mb = 20480
/// structure_search_paths = ["structures"]
///
/// [execution]
/// default_timeout_secs = 86400
/// termination_grace_secs = 5
///
/// [execution.stage_timeouts]
/// prepare = 600
///
/// [defaults.production]
/// nsteps = 250000
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, TS)]
#[serde(default)]
pub struct GlobalConfig {
    pub tools: ToolPaths,
    pub workspace: WorkspaceSettings,
    pub execution: ExecutionSettings,

    /// Simulation parameter defaults, merged over the built-in values.
    ///
    /// Kept as a free-form tree so that keys unknown to this version are
    /// passed through to the effective parameters.
    #[ts(type = "Record<string, unknown>")]
    pub defaults: serde_json::Value,
}

/// Locations of the external tools.
///
/// An empty path means "resolve from the execution environment".
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, TS)]
#[serde(default)]
pub struct ToolPaths {
    pub gmx_path: String,
    pub vmd_path: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(default)]
pub struct WorkspaceSettings {
    /// Directory under which default workflow directories are created.
    /// Relative paths are resolved against the directory holding `.mdkit/`.
    pub root: PathBuf,

    /// Per-workflow disk ceiling in megabytes. `0` disables the check.
    pub size_ceiling_mb: u64,

    /// Directories searched for structure files named by bare file name.
    pub structure_search_paths: Vec<PathBuf>,
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("workflows"),
            size_ceiling_mb: 10_240,
            structure_search_paths: Vec::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(default)]
pub struct ExecutionSettings {
    /// Timeout applied to a stage when no per-stage or per-call value is set.
    pub default_timeout_secs: u64,

    /// Time between the terminate signal and the forced kill.
    pub termination_grace_secs: u64,

    /// Per-stage timeout overrides, keyed by stage name.
    pub stage_timeouts: BTreeMap<String, u64>,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            default_timeout_secs: 24 * 60 * 60,
            termination_grace_secs: 5,
            stage_timeouts: BTreeMap::new(),
        }
    }
}
