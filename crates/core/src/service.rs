//! The workflow service: one entry point that owns every component.
//!
//! `WorkflowService` wires the store, the pipeline coordinator and the viewer
//! launcher to one immutable configuration, and maps protocol operations to
//! component calls. Front ends either call the typed methods directly or
//! send [`Op`]s through [`WorkflowService::dispatch`].

use crate::config::models::ServiceConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::pipeline::artifacts::list_artifacts;
use crate::pipeline::{AdvanceOptions, AnalysisReport, PipelineCoordinator};
use crate::viz::{build_session, list_templates, VisualizationLauncher, VmdLauncher};
use anyhow::Result;
use mdk_protocol::ipc::{Event, Op};
use mdk_protocol::{SessionScript, StageExecutionRecord, StageName};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

pub struct WorkflowService {
    config: Arc<ServiceConfig>,
    coordinator: Arc<PipelineCoordinator>,
    launcher: Arc<dyn VisualizationLauncher>,
    events_tx: mpsc::Sender<Event>,
}

impl WorkflowService {
    /// Opens the store, reconciling interrupted stages, and builds the
    /// components.
    ///
    /// # Arguments
    ///
    /// * `config` - The immutable service configuration
    /// * `events_tx` - Channel receiving stage progress and background results
    pub async fn new(config: Arc<ServiceConfig>, events_tx: mpsc::Sender<Event>) -> OrchestratorResult<Self> {
        let store = Arc::new(crate::workflow::WorkflowStore::open(Arc::clone(&config)).await?);
        let coordinator = PipelineCoordinator::new(Arc::clone(&config), store).with_events(events_tx.clone());
        let launcher = Arc::new(VmdLauncher::new(Arc::clone(&config)));

        Ok(Self {
            config,
            coordinator: Arc::new(coordinator),
            launcher,
            events_tx,
        })
    }

    /// Replaces the viewer launcher, e.g. with a test double.
    pub fn with_launcher(mut self, launcher: Arc<dyn VisualizationLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn config(&self) -> &Arc<ServiceConfig> {
        &self.config
    }

    pub fn store(&self) -> &Arc<crate::workflow::WorkflowStore> {
        self.coordinator.store()
    }

    pub fn coordinator(&self) -> &Arc<PipelineCoordinator> {
        &self.coordinator
    }

    /// Runs `run_to` on a background task.
    ///
    /// The outcome is also reported as [`Event::RunFinished`].
    pub fn spawn_run_to(
        &self,
        workflow_id: Uuid,
        target: StageName,
        overrides: Value,
    ) -> JoinHandle<OrchestratorResult<Vec<StageExecutionRecord>>> {
        let coordinator = Arc::clone(&self.coordinator);
        let events_tx = self.events_tx.clone();

        tokio::spawn(async move {
            let result = coordinator.run_to(workflow_id, target, overrides).await;
            if let Err(err) = &result {
                error!(workflow_id = %workflow_id, %target, error = %err, "Background run failed");
            }
            let _ = events_tx
                .send(Event::RunFinished {
                    workflow_id,
                    target,
                    error: result.as_ref().err().map(|e| e.to_string()),
                })
                .await;
            result
        })
    }

    /// Renders a session and starts the viewer on it.
    pub async fn launch_session(
        &self,
        workflow_id: Uuid,
        structure_file: &Path,
        trajectory_file: Option<&Path>,
        template: Option<&str>,
        headless: bool,
    ) -> OrchestratorResult<(SessionScript, mdk_protocol::LaunchReceipt)> {
        let workflow = self.store().get(workflow_id).await?;
        let session = build_session(&workflow, structure_file, trajectory_file, template)?;
        let receipt = self.launcher.launch(&session, headless).await?;
        Ok((session, receipt))
    }

    /// Handles one protocol operation.
    ///
    /// # Returns
    ///
    /// The reply event, or `None` for [`Op::Shutdown`]. Failures come back
    /// as [`Event::Error`] rather than `Err`.
    pub async fn dispatch(&self, op: Op) -> Option<Event> {
        match self.handle(op).await {
            Ok(event) => event,
            Err(err) => Some(error_event(&err)),
        }
    }

    async fn handle(&self, op: Op) -> Result<Option<Event>> {
        let store = self.store();
        let event = match op {
            Op::CreateWorkflow {
                name,
                description,
                directory,
            } => {
                let workflow = store.create(&name, directory.as_deref(), description).await?;
                Event::WorkflowCreated {
                    workflow: Box::new(workflow),
                }
            }
            Op::ListWorkflows => Event::WorkflowList {
                workflows: store.list().await,
            },
            Op::GetWorkflow { workflow_id } => Event::WorkflowDetail {
                workflow: Box::new(store.get(workflow_id).await?),
            },
            Op::UpdateWorkflow {
                workflow_id,
                name,
                description,
            } => Event::WorkflowDetail {
                workflow: Box::new(store.update(workflow_id, name, description).await?),
            },
            Op::DeleteWorkflow {
                workflow_id,
                purge_files,
            } => {
                store.delete(workflow_id, purge_files).await?;
                Event::WorkflowDeleted {
                    workflow_id,
                    purged: purge_files,
                }
            }
            Op::ExportWorkflow {
                workflow_id,
                output_file,
            } => Event::WorkflowExported {
                workflow_id,
                path: store.export(workflow_id, &output_file).await?,
            },
            Op::ImportWorkflow {
                input_file,
                directory,
            } => {
                let workflow = store.import(&input_file, directory.as_deref()).await?;
                Event::WorkflowCreated {
                    workflow: Box::new(workflow),
                }
            }
            Op::ListArtifacts { workflow_id, stage } => {
                let workflow = store.get(workflow_id).await?;
                Event::ArtifactList {
                    workflow_id,
                    stages: list_artifacts(&workflow, stage),
                }
            }
            Op::AdvanceStage {
                workflow_id,
                stage,
                force,
                overrides,
                timeout_secs,
            } => {
                let mut options = AdvanceOptions::new()
                    .with_force(force)
                    .with_overrides(overrides.unwrap_or(Value::Null));
                if let Some(secs) = timeout_secs {
                    options = options.with_timeout(Duration::from_secs(secs));
                }
                let record = self.coordinator.advance(workflow_id, stage, options).await?;
                Event::StageCompleted {
                    workflow_id,
                    record: Box::new(record),
                }
            }
            Op::RunTo {
                workflow_id,
                stage,
                overrides,
            } => {
                // Fail fast on unknown ids and busy workflows.
                if store.is_busy(workflow_id).await? {
                    return Err(OrchestratorError::Conflict {
                        workflow_id,
                        reason: "a stage is already running".to_string(),
                    }
                    .into());
                }
                let _run = self.spawn_run_to(workflow_id, stage, overrides.unwrap_or(Value::Null));
                Event::RunStarted {
                    workflow_id,
                    target: stage,
                }
            }
            Op::Analyze {
                workflow_id,
                kind,
                overrides,
            } => {
                let AnalysisReport { record, summary } = self
                    .coordinator
                    .analyze(workflow_id, kind, overrides.unwrap_or(Value::Null))
                    .await?;
                Event::AnalysisCompleted {
                    workflow_id,
                    record: Box::new(record),
                    summary,
                }
            }
            Op::BuildSession {
                workflow_id,
                structure_file,
                trajectory_file,
                template,
            } => {
                let workflow = store.get(workflow_id).await?;
                let session = build_session(
                    &workflow,
                    &structure_file,
                    trajectory_file.as_deref(),
                    template.as_deref(),
                )?;
                Event::SessionReady {
                    session: Box::new(session),
                }
            }
            Op::LaunchSession {
                workflow_id,
                structure_file,
                trajectory_file,
                template,
                headless,
            } => {
                let (_, receipt) = self
                    .launch_session(
                        workflow_id,
                        &structure_file,
                        trajectory_file.as_deref(),
                        template.as_deref(),
                        headless,
                    )
                    .await?;
                Event::SessionLaunched { receipt }
            }
            Op::ListTemplates => Event::TemplateList {
                templates: list_templates(),
            },
            Op::Shutdown => {
                info!("Shutdown requested");
                return Ok(None);
            }
        };
        Ok(Some(event))
    }
}

/// Converts an error into a protocol error event.
pub fn error_event(err: &anyhow::Error) -> Event {
    let kind = err
        .downcast_ref::<OrchestratorError>()
        .map(OrchestratorError::kind)
        .unwrap_or("INTERNAL_ERROR");
    Event::Error {
        kind: kind.to_string(),
        message: format!("{err:#}"),
    }
}
