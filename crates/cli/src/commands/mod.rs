//! Subcommand implementations.

pub mod pipeline;
pub mod serve;
pub mod session;
pub mod workflow;

use crate::output::describe_event;
use color_eyre::eyre::{bail, Result};
use mdk_core::error::{OrchestratorError, ResourceKind};
use mdk_core::WorkflowService;
use mdk_protocol::ipc::Event;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Finds a workflow by id, or by name when the name is unique.
pub async fn resolve_workflow(service: &WorkflowService, ident: &str) -> Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(ident) {
        service.store().get(id).await?;
        return Ok(id);
    }

    let matches: Vec<Uuid> = service
        .store()
        .list()
        .await
        .into_iter()
        .filter(|workflow| workflow.name == ident)
        .map(|workflow| workflow.id)
        .collect();

    match matches.as_slice() {
        [id] => Ok(*id),
        [] => Err(OrchestratorError::NotFound {
            kind: ResourceKind::Workflow,
            name: ident.to_string(),
        }
        .into()),
        ids => {
            let ids: Vec<String> = ids.iter().map(Uuid::to_string).collect();
            bail!(
                "'{ident}' matches {} workflows, use an id: {}",
                ids.len(),
                ids.join(", ")
            )
        }
    }
}

/// Echoes stage progress to stderr until the channel closes.
///
/// Events are only drained in `--json` mode so stdout stays parseable.
pub fn spawn_progress(mut rx: mpsc::Receiver<Event>, quiet: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if quiet {
                continue;
            }
            if let Some(line) = describe_event(&event) {
                eprintln!("{line}");
            }
        }
    })
}
