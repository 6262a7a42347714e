//! Inter-process communication protocol.
//!
//! This module defines the message types exchanged between a client (the
//! `mdk serve` stdio transport, or any other front end) and the core service.
//!
//! The protocol follows an Operation/Event pattern:
//! - `Op`: Requests sent from a client to the core
//! - `Event`: Replies and progress updates sent from the core to the client
//!
//! Long stage runs emit `StageStatusUpdate` events while they progress, so a
//! client can stay responsive and poll or listen instead of blocking.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use ts_rs::TS;
use uuid::Uuid;

use crate::params_models::AnalysisKind;
use crate::session_models::{LaunchReceipt, SessionScript};
use crate::workflow_models::{
    StageArtifacts, StageExecutionRecord, StageName, StageStatus, Workflow,
};

/// Operations sent from a client to the core.
///
/// Uses tagged enum serialization for TypeScript compatibility:
/// ```json
/// {
///   "type": "advanceStage",
///   "payload": {
///     "workflow_id": "uuid-here",
///     "stage": "minimize",
///     "force": false
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Op {
    /// Create a new workflow and its directory.
    CreateWorkflow {
        name: String,
        #[serde(default)]
        description: Option<String>,
        /// Directory to own. Derived from the workspace root when absent.
        #[serde(default)]
        directory: Option<PathBuf>,
    },

    /// List all tracked workflows in creation order.
    ListWorkflows,

    /// Fetch a single workflow.
    GetWorkflow {
        #[ts(type = "string")]
        workflow_id: Uuid,
    },

    /// Rename or re-describe a workflow.
    UpdateWorkflow {
        #[ts(type = "string")]
        workflow_id: Uuid,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },

    /// Stop tracking a workflow, optionally removing its directory.
    DeleteWorkflow {
        #[ts(type = "string")]
        workflow_id: Uuid,
        #[serde(default)]
        purge_files: bool,
    },

    /// Write a workflow's metadata document to a file.
    ExportWorkflow {
        #[ts(type = "string")]
        workflow_id: Uuid,
        output_file: PathBuf,
    },

    /// Create a new workflow from an exported document.
    ///
    /// Name, description and params are taken over; the new workflow gets a
    /// fresh id, a fresh directory and no records.
    ImportWorkflow {
        input_file: PathBuf,
        #[serde(default)]
        directory: Option<PathBuf>,
    },

    /// List the files each stage left in the workflow directory.
    ListArtifacts {
        #[ts(type = "string")]
        workflow_id: Uuid,
        /// Limit the listing to one stage.
        #[serde(default)]
        stage: Option<StageName>,
    },

    /// Run exactly one stage.
    AdvanceStage {
        #[ts(type = "string")]
        workflow_id: Uuid,
        stage: StageName,
        #[serde(default)]
        force: bool,
        /// Per-call parameter overrides (highest precedence tier).
        #[serde(default)]
        #[ts(type = "Record<string, unknown> | null")]
        overrides: Option<serde_json::Value>,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },

    /// Run every missing prerequisite and then the target stage.
    ///
    /// Runs in the background; progress arrives as events.
    RunTo {
        #[ts(type = "string")]
        workflow_id: Uuid,
        stage: StageName,
        #[serde(default)]
        #[ts(type = "Record<string, unknown> | null")]
        overrides: Option<serde_json::Value>,
    },

    /// Run one trajectory analysis.
    Analyze {
        #[ts(type = "string")]
        workflow_id: Uuid,
        kind: AnalysisKind,
        #[serde(default)]
        #[ts(type = "Record<string, unknown> | null")]
        overrides: Option<serde_json::Value>,
    },

    /// Render a visualization session script without launching anything.
    BuildSession {
        #[ts(type = "string")]
        workflow_id: Uuid,
        structure_file: PathBuf,
        #[serde(default)]
        trajectory_file: Option<PathBuf>,
        #[serde(default)]
        template: Option<String>,
    },

    /// Render a session and hand it to the viewer.
    LaunchSession {
        #[ts(type = "string")]
        workflow_id: Uuid,
        structure_file: PathBuf,
        #[serde(default)]
        trajectory_file: Option<PathBuf>,
        #[serde(default)]
        template: Option<String>,
        #[serde(default)]
        headless: bool,
    },

    /// List the built-in visualization templates.
    ListTemplates,

    /// Stop the transport loop.
    Shutdown,
}

/// Events sent from the core to a client.
///
/// ```json
/// {
///   "type": "stageStatusUpdate",
///   "payload": {
///     "workflow_id": "uuid-here",
///     "stage": "produce",
///     "status": "RUNNING"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Event {
    WorkflowCreated {
        workflow: Box<Workflow>,
    },

    WorkflowList {
        workflows: Vec<Workflow>,
    },

    WorkflowDetail {
        workflow: Box<Workflow>,
    },

    WorkflowDeleted {
        #[ts(type = "string")]
        workflow_id: Uuid,
        purged: bool,
    },

    WorkflowExported {
        #[ts(type = "string")]
        workflow_id: Uuid,
        path: PathBuf,
    },

    ArtifactList {
        #[ts(type = "string")]
        workflow_id: Uuid,
        stages: Vec<StageArtifacts>,
    },

    /// A stage changed status.
    StageStatusUpdate {
        #[ts(type = "string")]
        workflow_id: Uuid,
        stage: StageName,
        status: StageStatus,
    },

    /// A stage attempt finished and its record was persisted.
    StageCompleted {
        #[ts(type = "string")]
        workflow_id: Uuid,
        record: Box<StageExecutionRecord>,
    },

    /// A background `RunTo` was accepted.
    RunStarted {
        #[ts(type = "string")]
        workflow_id: Uuid,
        target: StageName,
    },

    /// A background `RunTo` finished, successfully or not.
    RunFinished {
        #[ts(type = "string")]
        workflow_id: Uuid,
        target: StageName,
        error: Option<String>,
    },

    AnalysisCompleted {
        #[ts(type = "string")]
        workflow_id: Uuid,
        record: Box<StageExecutionRecord>,
        summary: Vec<ColumnSummary>,
    },

    SessionReady {
        session: Box<SessionScript>,
    },

    SessionLaunched {
        receipt: LaunchReceipt,
    },

    TemplateList {
        templates: Vec<String>,
    },

    /// An operation failed.
    Error {
        /// Stable error kind, e.g. `PREREQUISITE_NOT_MET`.
        kind: String,
        message: String,
    },
}

/// Summary statistics for one data column of an analysis output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct ColumnSummary {
    pub column: usize,
    pub legend: Option<String>,
    pub samples: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}
