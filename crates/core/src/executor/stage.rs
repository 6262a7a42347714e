//! Runs one stage attempt and records it.
//!
//! An attempt is: check the quota, mark the stage RUNNING, write the stage's
//! input files, run each command in order inside the workflow directory,
//! verify the expected outputs, and persist the record together with the
//! final status in one metadata write. A failing command stops the sequence.

use crate::config::models::ServiceConfig;
use crate::executor::process::{ProcessHandle, ProcessOutcome};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::workflow::quota;
use crate::workflow::RunGuard;
use chrono::Utc;
use mdk_protocol::ipc::Event;
use mdk_protocol::{
    CommandLine, ExitStatus, StageExecutionRecord, StageName, StageState, StageStatus,
};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tokio::time::Instant;
use tracing::{info, warn};

/// Directory, relative to a workflow's root, holding captured logs.
pub const LOG_DIR: &str = "logs";

/// Number of trailing stderr lines quoted in error messages.
pub const STDERR_EXCERPT_LINES: usize = 20;

/// A file the stage needs before its first command runs.
#[derive(Debug, Clone, PartialEq)]
pub enum StageInput {
    /// Write `contents` to `path`, relative to the workflow root.
    Write { path: PathBuf, contents: String },
    /// Copy an external file to `to`, relative to the workflow root.
    Copy { from: PathBuf, to: PathBuf },
}

impl StageInput {
    fn size(&self) -> u64 {
        match self {
            StageInput::Write { contents, .. } => contents.len() as u64,
            StageInput::Copy { from, .. } => std::fs::metadata(from).map(|m| m.len()).unwrap_or(0),
        }
    }
}

/// Everything needed to run one stage attempt.
#[derive(Debug, Clone)]
pub struct StageRequest {
    pub stage: StageName,
    /// Sub-kind, used by analysis runs.
    pub label: Option<String>,
    pub commands: Vec<CommandLine>,
    pub inputs: Vec<StageInput>,
    /// Files that must exist and be non-empty afterwards, relative to the root.
    pub expected_outputs: Vec<PathBuf>,
    /// Budget for the whole command sequence.
    pub timeout: Duration,
    /// Parameter snapshot stored together with the RUNNING mark.
    pub params: Option<Value>,
}

impl StageRequest {
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }
}

/// Result of running the command sequence, before it is recorded.
struct Attempt {
    exit_status: ExitStatus,
    status: StageStatus,
    detail: Option<String>,
    outputs: Vec<PathBuf>,
}

impl Attempt {
    fn failed(exit_status: ExitStatus, detail: impl Into<String>) -> Self {
        Self {
            exit_status,
            status: StageStatus::Failed,
            detail: Some(detail.into()),
            outputs: Vec::new(),
        }
    }
}

pub struct StageExecutor {
    config: Arc<ServiceConfig>,
    events_tx: Option<Sender<Event>>,
}

impl StageExecutor {
    pub fn new(config: Arc<ServiceConfig>) -> Self {
        Self {
            config,
            events_tx: None,
        }
    }

    /// Send status updates and completion events to `events_tx`.
    pub fn with_events(mut self, events_tx: Sender<Event>) -> Self {
        self.events_tx = Some(events_tx);
        self
    }

    async fn emit(&self, event: Event) {
        if let Some(tx) = &self.events_tx {
            let _ = tx.send(event).await;
        }
    }

    /// Runs one attempt of `request.stage` and persists its record.
    ///
    /// A failed or timed-out attempt is not an error here: the record is
    /// returned with the corresponding status and the caller decides how to
    /// report it.
    ///
    /// # Errors
    ///
    /// * `QuotaExceeded` if the workflow directory is at its size ceiling;
    ///   nothing is marked RUNNING and no parameters are stored in that case
    /// * `Io` if the metadata cannot be written
    pub async fn run(
        &self,
        guard: &RunGuard,
        request: StageRequest,
    ) -> OrchestratorResult<StageExecutionRecord> {
        let workflow = guard.snapshot().await;
        let root = workflow.root_dir.clone();
        let stage = request.stage;

        let incoming: u64 = request.inputs.iter().map(StageInput::size).sum();
        quota::ensure_capacity(workflow.id, &root, self.config.size_ceiling_bytes(), incoming)?;

        let attempt = workflow.next_attempt(stage);
        let params = request.params.clone();
        guard
            .mutate(move |wf| {
                if let Some(params) = params {
                    wf.params = params;
                }
                wf.stage_status.insert(stage, StageState::running(attempt));
            })
            .await?;
        self.emit(Event::StageStatusUpdate {
            workflow_id: workflow.id,
            stage,
            status: StageStatus::Running,
        })
        .await;
        info!(workflow_id = %workflow.id, %stage, attempt, label = ?request.label, "Stage started");

        let (stdout_path, stderr_path) = log_paths(stage, request.label.as_deref(), attempt);
        let start_time = Utc::now();
        let outcome = self
            .execute(&root, &request, &stdout_path, &stderr_path)
            .await;

        let record = StageExecutionRecord {
            attempt,
            stage_name: stage,
            label: request.label.clone(),
            commands: request.commands.clone(),
            start_time,
            end_time: Utc::now(),
            exit_status: outcome.exit_status,
            status: outcome.status,
            stdout_path,
            stderr_path,
            outputs: outcome.outputs,
        };

        let state = StageState::from_record(&record, outcome.detail.clone());
        let stored = record.clone();
        guard
            .mutate(move |wf| {
                wf.records.push(stored);
                wf.stage_status.insert(stage, state);
            })
            .await?;

        match record.status {
            StageStatus::Succeeded => {
                info!(workflow_id = %workflow.id, %stage, attempt, "Stage succeeded")
            }
            status => warn!(
                workflow_id = %workflow.id,
                %stage,
                attempt,
                %status,
                detail = ?outcome.detail,
                "Stage did not succeed"
            ),
        }

        self.emit(Event::StageStatusUpdate {
            workflow_id: workflow.id,
            stage,
            status: record.status,
        })
        .await;
        self.emit(Event::StageCompleted {
            workflow_id: workflow.id,
            record: Box::new(record.clone()),
        })
        .await;

        Ok(record)
    }

    async fn execute(
        &self,
        root: &Path,
        request: &StageRequest,
        stdout_rel: &Path,
        stderr_rel: &Path,
    ) -> Attempt {
        let (mut stdout, stderr) = match open_logs(root, stdout_rel, stderr_rel) {
            Ok(files) => files,
            Err(e) => return Attempt::failed(ExitStatus::LaunchFailed, format!("cannot open logs: {e}")),
        };

        if let Err(e) = materialize_inputs(root, request) {
            return Attempt::failed(ExitStatus::LaunchFailed, format!("cannot write inputs: {e}"));
        }

        let deadline = Instant::now() + request.timeout;
        let grace = self.config.termination_grace();

        for command in &request.commands {
            let _ = writeln!(stdout, "$ {command}");

            let handles = stdout.try_clone().and_then(|out| Ok((out, stderr.try_clone()?)));
            let (child_out, child_err) = match handles {
                Ok(files) => files,
                Err(e) => {
                    return Attempt::failed(ExitStatus::LaunchFailed, format!("cannot open logs: {e}"))
                }
            };

            let mut handle = match ProcessHandle::spawn(command, root, child_out, child_err, grace) {
                Ok(handle) => handle,
                Err(e) => {
                    return Attempt::failed(
                        ExitStatus::LaunchFailed,
                        format!("failed to launch {}: {e}", command.program.display()),
                    )
                }
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            match handle.wait_with_timeout(remaining).await {
                Ok(ProcessOutcome::Exited(Some(0))) => {}
                Ok(ProcessOutcome::Exited(Some(code))) => {
                    return Attempt::failed(ExitStatus::Exited(code), format!("`{command}` exited with code {code}"))
                }
                Ok(ProcessOutcome::Exited(None)) => {
                    return Attempt::failed(ExitStatus::Killed, format!("`{command}` was killed by a signal"))
                }
                Ok(ProcessOutcome::TimedOut) => {
                    return Attempt {
                        exit_status: ExitStatus::Timeout,
                        status: StageStatus::Timeout,
                        detail: Some(format!(
                            "time limit of {}s exceeded",
                            request.timeout.as_secs()
                        )),
                        outputs: Vec::new(),
                    }
                }
                Err(e) => {
                    let _ = handle.cancel().await;
                    return Attempt::failed(ExitStatus::Killed, format!("lost track of process: {e}"));
                }
            }
        }

        let missing: Vec<String> = request
            .expected_outputs
            .iter()
            .filter(|path| !is_non_empty_file(&root.join(path)))
            .map(|path| path.display().to_string())
            .collect();
        if !missing.is_empty() {
            return Attempt::failed(
                ExitStatus::Exited(0),
                format!("missing or empty output: {}", missing.join(", ")),
            );
        }

        Attempt {
            exit_status: ExitStatus::Exited(0),
            status: StageStatus::Succeeded,
            detail: None,
            outputs: request.expected_outputs.clone(),
        }
    }
}

/// Log file paths of an attempt, relative to the workflow root.
pub fn log_paths(stage: StageName, label: Option<&str>, attempt: u32) -> (PathBuf, PathBuf) {
    let stem = match label {
        Some(label) => format!("{stage}-{label}-{attempt}"),
        None => format!("{stage}-{attempt}"),
    };
    let dir = Path::new(LOG_DIR);
    (
        dir.join(format!("{stem}.stdout.log")),
        dir.join(format!("{stem}.stderr.log")),
    )
}

/// The last [`STDERR_EXCERPT_LINES`] lines of an attempt's stderr log.
pub fn stderr_excerpt(root: &Path, record: &StageExecutionRecord) -> String {
    let content = std::fs::read_to_string(root.join(&record.stderr_path)).unwrap_or_default();
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(STDERR_EXCERPT_LINES);
    lines[start..].join("\n")
}

/// Converts a non-successful record into the matching error.
pub fn record_error(
    root: &Path,
    record: &StageExecutionRecord,
    detail: Option<String>,
    timeout: Duration,
) -> OrchestratorError {
    let stderr_excerpt = stderr_excerpt(root, record);
    match record.exit_status {
        ExitStatus::Timeout => OrchestratorError::Timeout {
            stage: record.stage_name,
            timeout_secs: timeout.as_secs(),
            stderr_excerpt,
        },
        exit_status => OrchestratorError::ProcessFailure {
            stage: record.stage_name,
            exit_status,
            detail,
            stderr_excerpt,
        },
    }
}

fn open_logs(root: &Path, stdout_rel: &Path, stderr_rel: &Path) -> std::io::Result<(File, File)> {
    std::fs::create_dir_all(root.join(LOG_DIR))?;
    let open = |rel: &Path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(root.join(rel))
    };
    Ok((open(stdout_rel)?, open(stderr_rel)?))
}

fn materialize_inputs(root: &Path, request: &StageRequest) -> std::io::Result<()> {
    for input in &request.inputs {
        match input {
            StageInput::Write { path, contents } => {
                let target = root.join(path);
                ensure_parent(&target)?;
                std::fs::write(target, contents)?;
            }
            StageInput::Copy { from, to } => {
                let target = root.join(to);
                ensure_parent(&target)?;
                std::fs::copy(from, target)?;
            }
        }
    }
    for output in &request.expected_outputs {
        ensure_parent(&root.join(output))?;
    }
    Ok(())
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) => std::fs::create_dir_all(parent),
        None => Ok(()),
    }
}

fn is_non_empty_file(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}
