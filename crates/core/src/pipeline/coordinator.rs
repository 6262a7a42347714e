//! Pipeline coordinator: prerequisite checks, parameter resolution and
//! stage sequencing on top of the store and the executor.

use crate::config::advisor::advisories;
use crate::config::models::ServiceConfig;
use crate::config::resolver::{builtin_defaults, extend_snapshot, resolve, sections_of, validate};
use crate::error::{OrchestratorError, OrchestratorResult, ResourceKind};
use crate::executor::resolve_executable;
use crate::executor::stage::{record_error, StageExecutor};
use crate::pipeline::analysis::{parse_xvg, summarize};
use crate::pipeline::stages::{build_plan, path_to, prerequisites};
use crate::workflow::{RunGuard, WorkflowStore};
use mdk_protocol::ipc::{ColumnSummary, Event};
use mdk_protocol::{AnalysisKind, EffectiveParams, StageExecutionRecord, StageName, StageStatus, Workflow};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Executable names tried when no engine path is configured.
pub const GMX_CANDIDATES: &[&str] = &["gmx", "gmx_mpi"];

/// Per-call options of [`PipelineCoordinator::advance`].
#[derive(Debug, Clone, Default)]
pub struct AdvanceOptions {
    /// Re-run a stage that already succeeded.
    pub force: bool,
    /// Highest-precedence parameter tier. `Value::Null` means none.
    pub overrides: Value,
    /// Overrides the configured time limit of the stage.
    pub timeout: Option<Duration>,
}

impl AdvanceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_overrides(mut self, overrides: Value) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Merged parameters of a stage and the advice about them.
#[derive(Debug, Clone)]
pub struct ParamsPreview {
    pub effective: Value,
    pub advisories: Vec<String>,
}

/// The record of an analysis run and the statistics of its output.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub record: StageExecutionRecord,
    pub summary: Vec<ColumnSummary>,
}

pub struct PipelineCoordinator {
    config: Arc<ServiceConfig>,
    store: Arc<WorkflowStore>,
    executor: StageExecutor,
}

impl PipelineCoordinator {
    pub fn new(config: Arc<ServiceConfig>, store: Arc<WorkflowStore>) -> Self {
        let executor = StageExecutor::new(Arc::clone(&config));
        Self {
            config,
            store,
            executor,
        }
    }

    /// Forward stage progress events to `events_tx`.
    pub fn with_events(mut self, events_tx: Sender<Event>) -> Self {
        self.executor = StageExecutor::new(Arc::clone(&self.config)).with_events(events_tx);
        self
    }

    pub fn store(&self) -> &Arc<WorkflowStore> {
        &self.store
    }

    /// Runs exactly one stage.
    ///
    /// A stage that already succeeded is not re-run unless `options.force`
    /// is set; its latest successful record is returned instead.
    ///
    /// # Errors
    ///
    /// * `Conflict` if another stage of the workflow is running
    /// * `PrerequisiteNotMet` if a direct prerequisite has not succeeded
    /// * `Config(Validation)` if the merged parameters are invalid
    /// * `ProcessFailure` / `Timeout` after a failed attempt was recorded
    pub async fn advance(
        &self,
        workflow_id: Uuid,
        stage: StageName,
        options: AdvanceOptions,
    ) -> OrchestratorResult<StageExecutionRecord> {
        let guard = self.store.acquire(workflow_id).await?;
        self.advance_locked(&guard, stage, &options).await
    }

    /// Runs every not-yet-succeeded stage up to and including `target`.
    ///
    /// The run lock is held for the whole sequence. The first failure stops
    /// the run and is returned; records of the stages before it are kept.
    pub async fn run_to(
        &self,
        workflow_id: Uuid,
        target: StageName,
        overrides: Value,
    ) -> OrchestratorResult<Vec<StageExecutionRecord>> {
        let guard = self.store.acquire(workflow_id).await?;
        let options = AdvanceOptions::new().with_overrides(overrides);
        let mut records = Vec::new();

        for stage in path_to(target) {
            let workflow = guard.snapshot().await;
            if !stage.is_analysis() && workflow.status_of(stage) == StageStatus::Succeeded {
                debug!(workflow_id = %workflow_id, %stage, "Already succeeded, skipping");
                continue;
            }
            records.push(self.advance_locked(&guard, stage, &options).await?);
        }

        info!(workflow_id = %workflow_id, %target, ran = records.len(), "Run finished");
        Ok(records)
    }

    /// Runs one analysis of the production trajectory.
    ///
    /// Analyses always launch, may be repeated, and their overrides never
    /// change the workflow's stored parameters.
    pub async fn analyze(
        &self,
        workflow_id: Uuid,
        kind: AnalysisKind,
        overrides: Value,
    ) -> OrchestratorResult<AnalysisReport> {
        let mut overrides = if overrides.is_null() { json!({}) } else { overrides };
        if let Some(map) = overrides.as_object_mut() {
            let analysis = map.entry("analysis").or_insert_with(|| json!({}));
            if let Some(analysis) = analysis.as_object_mut() {
                analysis.insert("kind".to_string(), json!(kind));
            }
        }

        let guard = self.store.acquire(workflow_id).await?;
        let options = AdvanceOptions::new().with_overrides(overrides);
        let record = self
            .advance_locked(&guard, StageName::Analyze, &options)
            .await?;

        let summary = match record.outputs.first() {
            Some(output) => {
                let path = guard.root_dir().join(output);
                match std::fs::read_to_string(&path) {
                    Ok(content) => summarize(&parse_xvg(&content)),
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "Cannot read analysis output");
                        Vec::new()
                    }
                }
            }
            None => Vec::new(),
        };

        Ok(AnalysisReport { record, summary })
    }

    /// The parameters `stage` would run with, without running anything.
    ///
    /// # Errors
    ///
    /// The same parameter errors [`advance`](Self::advance) would raise.
    pub async fn preview_params(
        &self,
        workflow_id: Uuid,
        stage: StageName,
        overrides: &Value,
    ) -> OrchestratorResult<ParamsPreview> {
        let workflow = self.store.get(workflow_id).await?;
        let (effective, params) = self.merge_params(&workflow, stage, overrides)?;
        Ok(ParamsPreview {
            effective,
            advisories: advisories(&params, stage),
        })
    }

    /// Layers `overrides` onto the stored snapshot, resolves the three tiers
    /// and validates the result for `stage`. Sections consumed by a stage
    /// that has succeeded cannot change.
    fn merge_params(
        &self,
        workflow: &Workflow,
        stage: StageName,
        overrides: &Value,
    ) -> OrchestratorResult<(Value, EffectiveParams)> {
        // Only a successful run pins the sections it consumed; a failed
        // attempt may be retried with corrected values.
        let frozen: Vec<&str> = StageName::ALL
            .iter()
            .filter(|consumer| workflow.latest_success(**consumer).is_some())
            .flat_map(|consumer| sections_of(*consumer).iter().copied())
            .collect();
        let layered = extend_snapshot(&workflow.params, overrides, &frozen)?;
        let effective = resolve(&builtin_defaults(), &self.config.global.defaults, &layered);
        let params = validate(&effective, stage)?;
        Ok((effective, params))
    }

    async fn advance_locked(
        &self,
        guard: &RunGuard,
        stage: StageName,
        options: &AdvanceOptions,
    ) -> OrchestratorResult<StageExecutionRecord> {
        let workflow = guard.snapshot().await;

        if !stage.is_analysis() && workflow.status_of(stage) == StageStatus::Succeeded && !options.force {
            debug!(workflow_id = %workflow.id, %stage, "Stage already succeeded");
            return workflow
                .latest_success(stage)
                .cloned()
                .ok_or_else(|| OrchestratorError::NotFound {
                    kind: ResourceKind::Record,
                    name: format!("{} {stage}", workflow.id),
                });
        }

        for &required in prerequisites(stage) {
            let status = workflow.status_of(required);
            if status != StageStatus::Succeeded {
                return Err(OrchestratorError::PrerequisiteNotMet {
                    stage,
                    missing: required,
                    status: status.to_string(),
                });
            }
        }

        let (effective, params) = self.merge_params(&workflow, stage, &options.overrides)?;
        for note in advisories(&params, stage) {
            warn!(workflow_id = %workflow.id, %stage, "{note}");
        }

        let gmx = resolve_executable(&self.config.global.tools.gmx_path, GMX_CANDIDATES)?;
        let plan = build_plan(
            stage,
            &params,
            &gmx,
            &workflow.root_dir,
            &self.config.structure_search_paths(),
        )?;

        let timeout = options
            .timeout
            .unwrap_or_else(|| self.config.stage_timeout(stage));
        let mut request = plan.into_request(timeout);
        if !stage.is_analysis() && effective != workflow.params {
            request = request.with_params(effective);
        }
        let record = self.executor.run(guard, request).await?;

        if record.status == StageStatus::Succeeded {
            return Ok(record);
        }

        let detail = guard
            .snapshot()
            .await
            .stage_status
            .get(&stage)
            .and_then(|state| state.detail.clone());
        Err(record_error(guard.root_dir(), &record, detail, timeout))
    }
}
