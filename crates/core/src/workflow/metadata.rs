//! On-disk workflow metadata and the workspace registry.
//!
//! Every workflow directory holds a single `.workflow.json` file with the
//! full [`Workflow`] state. Writes go to a temporary file in the same
//! directory and are renamed into place, so a crash never leaves a partially
//! written document behind.

use crate::config::error::ConfigError;
use crate::error::{OrchestratorError, OrchestratorResult};
use mdk_protocol::{Workflow, WORKFLOW_SCHEMA_VERSION};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use uuid::Uuid;

/// Name of the metadata file inside a workflow's root directory.
pub const METADATA_FILE: &str = ".workflow.json";

/// Name of the registry file inside the workspace root.
pub const REGISTRY_FILE: &str = ".mdkit-registry.json";

pub fn metadata_path(root_dir: &Path) -> PathBuf {
    root_dir.join(METADATA_FILE)
}

/// Reads the metadata document of the workflow rooted at `root_dir`.
///
/// # Errors
///
/// Returns `OrchestratorError::Io` if the file is missing or unreadable, and
/// `OrchestratorError::Config` wrapping a JSON error if it cannot be parsed.
pub fn read_metadata(root_dir: &Path) -> OrchestratorResult<Workflow> {
    let path = metadata_path(root_dir);
    let content =
        std::fs::read_to_string(&path).map_err(|source| OrchestratorError::io(&path, source))?;
    let workflow: Workflow = serde_json::from_str(&content).map_err(|source| {
        ConfigError::JsonParse {
            path: path.clone(),
            source,
        }
    })?;

    if workflow.schema_version > WORKFLOW_SCHEMA_VERSION {
        return Err(ConfigError::InvalidConfig {
            path,
            reason: format!(
                "schema version {} is newer than supported version {}",
                workflow.schema_version, WORKFLOW_SCHEMA_VERSION
            ),
        }
        .into());
    }

    Ok(workflow)
}

/// Atomically replaces the metadata document of `workflow`.
pub fn write_metadata(workflow: &Workflow) -> OrchestratorResult<()> {
    let path = metadata_path(&workflow.root_dir);
    let json = to_json_bytes(&path, workflow)?;
    write_atomically(&path, &json)
}

/// Pretty-printed JSON of `value`, destined for `path`.
pub(crate) fn to_json_bytes<T: Serialize>(path: &Path, value: &T) -> OrchestratorResult<Vec<u8>> {
    serde_json::to_vec_pretty(value).map_err(|source| {
        ConfigError::JsonSerialize {
            path: path.to_path_buf(),
            source,
        }
        .into()
    })
}

/// Writes `bytes` to a sibling temp file and renames it over `path`.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> OrchestratorResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|source| OrchestratorError::io(dir, source))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|source| OrchestratorError::io(tmp.path(), source))?;
    tmp.persist(path)
        .map_err(|err| OrchestratorError::io(path, err.error))?;
    Ok(())
}

/// Index of workflows whose directories live outside the workspace root.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Registry {
    #[serde(default)]
    pub workflows: BTreeMap<Uuid, PathBuf>,
}

impl Registry {
    /// Loads the registry, treating a missing file as empty.
    pub fn load(workspace_root: &Path) -> OrchestratorResult<Self> {
        let path = workspace_root.join(REGISTRY_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content =
            std::fs::read_to_string(&path).map_err(|source| OrchestratorError::io(&path, source))?;
        let registry = serde_json::from_str(&content).map_err(|source| {
            ConfigError::JsonParse {
                path: path.clone(),
                source,
            }
        })?;
        Ok(registry)
    }

    pub fn save(&self, workspace_root: &Path) -> OrchestratorResult<()> {
        let path = workspace_root.join(REGISTRY_FILE);
        let json = to_json_bytes(&path, self)?;
        write_atomically(&path, &json)
    }
}
