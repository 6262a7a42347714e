//! The immutable service configuration.
//!
//! `ServiceConfig` is built once at startup (usually by
//! [`load_config`](crate::config::loader::load_config)), wrapped in an `Arc`,
//! and passed to each component constructor. Nothing reads configuration from
//! ambient global state.
//!
//! # Example
//!
//! ```rust,no_run
//! use mdk_core::config::loader::load_config;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config(Path::new(".")).await?;
//! println!("Workflows live under {}", config.workspace_root().display());
//! # Ok(())
//! # }
//! ```

use mdk_protocol::config_models::GlobalConfig;
use mdk_protocol::StageName;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the per-project configuration directory.
pub const CONFIG_DIR: &str = ".mdkit";

/// Name of the configuration file inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Settings read from `config.toml`, or the defaults.
    pub global: GlobalConfig,

    /// Directory that relative paths in `global` are resolved against.
    pub base_dir: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            global: GlobalConfig::default(),
            base_dir: PathBuf::from("."),
        }
    }
}

impl ServiceConfig {
    pub fn new(global: GlobalConfig, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            global,
            base_dir: base_dir.into(),
        }
    }

    /// Replace the workspace root, e.g. from a command-line flag.
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.global.workspace.root = root.into();
        self
    }

    pub fn with_gmx_path(mut self, path: impl Into<String>) -> Self {
        self.global.tools.gmx_path = path.into();
        self
    }

    pub fn with_vmd_path(mut self, path: impl Into<String>) -> Self {
        self.global.tools.vmd_path = path.into();
        self
    }

    pub fn with_size_ceiling_mb(mut self, megabytes: u64) -> Self {
        self.global.workspace.size_ceiling_mb = megabytes;
        self
    }

    pub fn with_termination_grace_secs(mut self, secs: u64) -> Self {
        self.global.execution.termination_grace_secs = secs;
        self
    }

    pub fn with_defaults(mut self, defaults: serde_json::Value) -> Self {
        self.global.defaults = defaults;
        self
    }

    pub fn with_structure_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.global.workspace.structure_search_paths.push(path.into());
        self
    }

    /// Directory under which default workflow directories are allocated.
    pub fn workspace_root(&self) -> PathBuf {
        self.resolve(&self.global.workspace.root)
    }

    /// Structure search paths, resolved against `base_dir`.
    pub fn structure_search_paths(&self) -> Vec<PathBuf> {
        self.global
            .workspace
            .structure_search_paths
            .iter()
            .map(|path| self.resolve(path))
            .collect()
    }

    /// Per-workflow size ceiling in bytes, or `None` when disabled.
    pub fn size_ceiling_bytes(&self) -> Option<u64> {
        match self.global.workspace.size_ceiling_mb {
            0 => None,
            mb => Some(mb.saturating_mul(1024 * 1024)),
        }
    }

    /// Time limit for a stage: per-stage override, else the default.
    pub fn stage_timeout(&self, stage: StageName) -> Duration {
        let secs = self
            .global
            .execution
            .stage_timeouts
            .get(stage.as_str())
            .copied()
            .unwrap_or(self.global.execution.default_timeout_secs);
        Duration::from_secs(secs)
    }

    pub fn termination_grace(&self) -> Duration {
        Duration::from_secs(self.global.execution.termination_grace_secs)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}
