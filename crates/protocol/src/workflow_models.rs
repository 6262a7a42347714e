//! Workflow state models.
//!
//! This module defines the persisted shape of a workflow: its identity, the
//! per-stage status map, and the append-only log of stage execution records.
//! The same structures are written to `.workflow.json` inside each workflow
//! directory and sent over the protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use ts_rs::TS;
use uuid::Uuid;

/// Current version of the on-disk metadata layout.
pub const WORKFLOW_SCHEMA_VERSION: u32 = 1;

/// A named step of the simulation pipeline.
///
/// Variants are declared in pipeline order, so the derived `Ord` sorts stages
/// the way the pipeline runs them.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, TS)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Topology generation, solvation and ionization.
    Prepare,
    /// Energy minimization.
    Minimize,
    /// NVT followed by NPT equilibration.
    Equilibrate,
    /// Production run that writes the trajectory.
    Produce,
    /// Trajectory analysis. Repeatable, has no successor.
    Analyze,
}

impl StageName {
    /// All stages in pipeline order.
    pub const ALL: [StageName; 5] = [
        StageName::Prepare,
        StageName::Minimize,
        StageName::Equilibrate,
        StageName::Produce,
        StageName::Analyze,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Prepare => "prepare",
            StageName::Minimize => "minimize",
            StageName::Equilibrate => "equilibrate",
            StageName::Produce => "produce",
            StageName::Analyze => "analyze",
        }
    }

    /// Returns true for stages that may run any number of times.
    pub fn is_analysis(&self) -> bool {
        matches!(self, StageName::Analyze)
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StageName::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| format!("unknown stage '{s}'"))
    }
}

/// Lifecycle status of a single stage.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    /// The stage has never been launched.
    #[default]
    NotStarted,

    /// An external process for this stage is running.
    Running,

    /// The last attempt exited cleanly and produced its outputs.
    Succeeded,

    /// The last attempt failed, or was interrupted by a restart.
    Failed,

    /// The last attempt exceeded its time limit and was terminated.
    Timeout,
}

impl StageStatus {
    /// Returns true once an attempt has reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageStatus::Succeeded | StageStatus::Failed | StageStatus::Timeout
        )
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StageStatus::NotStarted => "NOT_STARTED",
            StageStatus::Running => "RUNNING",
            StageStatus::Succeeded => "SUCCEEDED",
            StageStatus::Failed => "FAILED",
            StageStatus::Timeout => "TIMEOUT",
        };
        f.write_str(label)
    }
}

/// Status of a stage together with an optional explanation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default, TS)]
pub struct StageState {
    pub status: StageStatus,

    /// Short reason attached to failures, e.g. `interrupted`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// Attempt number this status belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
}

impl StageState {
    pub fn new(status: StageStatus) -> Self {
        Self {
            status,
            detail: None,
            attempt: None,
        }
    }

    pub fn with_detail(status: StageStatus, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: Some(detail.into()),
            attempt: None,
        }
    }

    /// Marks `attempt` of a stage as running.
    pub fn running(attempt: u32) -> Self {
        Self {
            status: StageStatus::Running,
            detail: None,
            attempt: Some(attempt),
        }
    }

    /// The state a finished record leaves its stage in.
    pub fn from_record(record: &StageExecutionRecord, detail: Option<String>) -> Self {
        Self {
            status: record.status,
            detail,
            attempt: Some(record.attempt),
        }
    }
}

/// A fully resolved external command line.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct CommandLine {
    /// Resolved path of the executable.
    pub program: PathBuf,

    /// Arguments passed to the executable.
    pub args: Vec<String>,

    /// Text written to the process's standard input, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// How the process (or the first failing process) of an attempt ended.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(tag = "kind", content = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitStatus {
    /// The process exited on its own with this code.
    Exited(i32),

    /// The process was terminated after exceeding its time limit.
    Timeout,

    /// The process was killed by a signal or an explicit cancellation.
    Killed,

    /// The process could not be started, or its inputs could not be written.
    LaunchFailed,
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Exited(0))
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Exited(code) => write!(f, "exit code {code}"),
            ExitStatus::Timeout => f.write_str("TIMEOUT"),
            ExitStatus::Killed => f.write_str("KILLED"),
            ExitStatus::LaunchFailed => f.write_str("LAUNCH_FAILED"),
        }
    }
}

/// One attempt at running a stage.
///
/// Records are appended to their workflow and never edited afterwards. A
/// forced re-run produces a new record with a higher `attempt`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct StageExecutionRecord {
    /// 1-based attempt counter, per stage.
    pub attempt: u32,

    pub stage_name: StageName,

    /// Sub-kind of the run, used for analysis stages (e.g. `rmsd`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    pub commands: Vec<CommandLine>,

    pub start_time: DateTime<Utc>,

    pub end_time: DateTime<Utc>,

    pub exit_status: ExitStatus,

    /// Terminal status this attempt left the stage in.
    pub status: StageStatus,

    /// Captured standard output, relative to the workflow's `root_dir`.
    pub stdout_path: PathBuf,

    /// Captured standard error, relative to the workflow's `root_dir`.
    pub stderr_path: PathBuf,

    /// Output files verified after the run, relative to `root_dir`.
    #[serde(default)]
    pub outputs: Vec<PathBuf>,
}

/// A directory-scoped unit of simulation work.
#[derive(Serialize, Deserialize, Debug, Clone, TS)]
pub struct Workflow {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    #[ts(type = "string")]
    pub id: Uuid,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Absolute path of the directory this workflow owns.
    pub root_dir: PathBuf,

    /// Per-stage status, ordered by pipeline definition.
    pub stage_status: BTreeMap<StageName, StageState>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Snapshot of the merged parameter tree consumed by stages so far.
    pub params: serde_json::Value,

    /// Append-only log of stage attempts.
    #[serde(default)]
    pub records: Vec<StageExecutionRecord>,
}

/// The portable part of an exported workflow.
///
/// Reads both the full [`Workflow`] document written by an export and a
/// hand-written file with just these fields. Records, status and the
/// directory are never carried over.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct WorkflowTemplate {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default = "empty_params")]
    pub params: serde_json::Value,
}

fn empty_params() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// One file a stage left in the workflow directory.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct ArtifactFile {
    /// Relative to the workflow's `root_dir`.
    pub path: PathBuf,
    pub size_bytes: u64,
    /// True for engine checkpoint (`.cpt`) files.
    pub checkpoint: bool,
}

/// The files produced by one stage.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct StageArtifacts {
    pub stage: StageName,
    pub files: Vec<ArtifactFile>,
}

fn default_schema_version() -> u32 {
    WORKFLOW_SCHEMA_VERSION
}

impl Workflow {
    /// Create a workflow with every stage `NOT_STARTED` and empty params.
    pub fn new(id: Uuid, name: String, root_dir: PathBuf, created_at: DateTime<Utc>) -> Self {
        let stage_status = StageName::ALL
            .iter()
            .map(|stage| (*stage, StageState::default()))
            .collect();

        Self {
            schema_version: WORKFLOW_SCHEMA_VERSION,
            id,
            name,
            description: None,
            root_dir,
            stage_status,
            created_at,
            updated_at: created_at,
            params: empty_params(),
            records: Vec::new(),
        }
    }

    /// Status of a stage. Stages missing from the map count as not started.
    pub fn status_of(&self, stage: StageName) -> StageStatus {
        self.stage_status
            .get(&stage)
            .map(|state| state.status)
            .unwrap_or_default()
    }

    /// The stage currently marked RUNNING, if any.
    pub fn running_stage(&self) -> Option<StageName> {
        self.stage_status
            .iter()
            .find(|(_, state)| state.status == StageStatus::Running)
            .map(|(stage, _)| *stage)
    }

    /// The record of a given attempt, if it completed.
    pub fn record_for(&self, stage: StageName, attempt: u32) -> Option<&StageExecutionRecord> {
        self.records
            .iter()
            .find(|r| r.stage_name == stage && r.attempt == attempt)
    }

    /// The most recent successful record for `stage`, if any.
    pub fn latest_success(&self, stage: StageName) -> Option<&StageExecutionRecord> {
        self.records
            .iter()
            .rev()
            .find(|r| r.stage_name == stage && r.status == StageStatus::Succeeded)
    }

    /// The most recent record for `stage`, if any.
    pub fn latest_record(&self, stage: StageName) -> Option<&StageExecutionRecord> {
        self.records.iter().rev().find(|r| r.stage_name == stage)
    }

    /// Number of attempts recorded for `stage`.
    pub fn attempts(&self, stage: StageName) -> u32 {
        self.records
            .iter()
            .filter(|r| r.stage_name == stage)
            .map(|r| r.attempt)
            .max()
            .unwrap_or(0)
    }

    /// Attempt number for the next launch of `stage`.
    ///
    /// An interrupted attempt leaves no record but its number is kept in the
    /// stage state, so it is never reused.
    pub fn next_attempt(&self, stage: StageName) -> u32 {
        let marked = self
            .stage_status
            .get(&stage)
            .and_then(|state| state.attempt)
            .unwrap_or(0);
        self.attempts(stage).max(marked) + 1
    }
}
