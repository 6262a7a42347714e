//! Error taxonomy shared by the workflow components.

use crate::config::error::ConfigError;
use mdk_protocol::{ExitStatus, StageName};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// What kind of thing a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Workflow,
    Record,
    File,
    Executable,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResourceKind::Workflow => "workflow",
            ResourceKind::Record => "execution record",
            ResourceKind::File => "file",
            ResourceKind::Executable => "executable",
        };
        f.write_str(label)
    }
}

/// Errors raised by the store, executor, coordinator and session bridge.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("{kind} not found: {name}")]
    NotFound { kind: ResourceKind, name: String },

    #[error("directory {path:?} is already in use: {reason}")]
    DirectoryConflict { path: PathBuf, reason: String },

    #[error("directory {path:?} is not writable: {source}")]
    PermissionError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("workflow {workflow_id} uses {used_bytes} bytes, ceiling is {ceiling_bytes} bytes")]
    QuotaExceeded {
        workflow_id: Uuid,
        used_bytes: u64,
        ceiling_bytes: u64,
    },

    #[error("cannot run {stage}: prerequisite {missing} is {status}")]
    PrerequisiteNotMet {
        stage: StageName,
        missing: StageName,
        status: String,
    },

    #[error("workflow {workflow_id} is busy: {reason}")]
    Conflict { workflow_id: Uuid, reason: String },

    #[error("{stage} failed ({exit_status}):\n{stderr_excerpt}")]
    ProcessFailure {
        stage: StageName,
        exit_status: ExitStatus,
        detail: Option<String>,
        stderr_excerpt: String,
    },

    #[error("{stage} exceeded its {timeout_secs}s time limit:\n{stderr_excerpt}")]
    Timeout {
        stage: StageName,
        timeout_secs: u64,
        stderr_excerpt: String,
    },

    #[error("unknown template '{0}'")]
    UnknownTemplate(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl OrchestratorError {
    /// Stable, protocol-facing name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestratorError::NotFound { .. } => "NOT_FOUND",
            OrchestratorError::DirectoryConflict { .. } => "DIRECTORY_CONFLICT",
            OrchestratorError::PermissionError { .. } => "PERMISSION_ERROR",
            OrchestratorError::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            OrchestratorError::PrerequisiteNotMet { .. } => "PREREQUISITE_NOT_MET",
            OrchestratorError::Conflict { .. } => "CONFLICT_ERROR",
            OrchestratorError::ProcessFailure { .. } => "PROCESS_FAILURE",
            OrchestratorError::Timeout { .. } => "TIMEOUT",
            OrchestratorError::UnknownTemplate(_) => "UNKNOWN_TEMPLATE",
            OrchestratorError::Config(ConfigError::Validation { .. }) => "VALIDATION_ERROR",
            OrchestratorError::Config(_) => "CONFIG_ERROR",
            OrchestratorError::Io { .. } => "IO_ERROR",
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OrchestratorError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn workflow_not_found(id: Uuid) -> Self {
        OrchestratorError::NotFound {
            kind: ResourceKind::Workflow,
            name: id.to_string(),
        }
    }
}

/// Type alias for Result with OrchestratorError.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
