//! Workflow bookkeeping subcommands: `create`, `list`, `show`, `rename`,
//! `delete`, `export`, `import` and `artifacts`.

use crate::cli::{ArtifactsArgs, CreateArgs, DeleteArgs, ExportArgs, ImportArgs, RenameArgs, WorkflowArg};
use crate::commands::resolve_workflow;
use crate::output::{print_artifacts, print_json, print_workflow, print_workflow_list};
use mdk_core::pipeline::artifacts::list_artifacts;
use color_eyre::eyre::{bail, Result};
use colored::Colorize;
use mdk_core::WorkflowService;
use serde_json::json;
use tracing::info;

pub async fn create(service: &WorkflowService, args: CreateArgs, json: bool) -> Result<()> {
    let workflow = service
        .store()
        .create(&args.name, args.dir.as_deref(), args.description)
        .await?;
    info!(workflow_id = %workflow.id, "Workflow created");

    if json {
        return print_json(&workflow);
    }
    println!("{} {} ({})", "Created".green().bold(), workflow.name, workflow.id);
    println!("  directory: {}", workflow.root_dir.display());
    Ok(())
}

pub async fn list(service: &WorkflowService, json: bool) -> Result<()> {
    let workflows = service.store().list().await;
    if json {
        return print_json(&workflows);
    }
    print_workflow_list(&workflows);
    Ok(())
}

pub async fn show(service: &WorkflowService, args: WorkflowArg, json: bool) -> Result<()> {
    let id = resolve_workflow(service, &args.workflow).await?;
    let workflow = service.store().get(id).await?;
    if json {
        return print_json(&workflow);
    }
    print_workflow(&workflow);
    Ok(())
}

pub async fn rename(service: &WorkflowService, args: RenameArgs, json: bool) -> Result<()> {
    if args.name.is_none() && args.description.is_none() {
        bail!("Nothing to change: pass --name and/or --description");
    }
    let id = resolve_workflow(service, &args.workflow).await?;
    let workflow = service.store().update(id, args.name, args.description).await?;
    if json {
        return print_json(&workflow);
    }
    println!("{} {} ({})", "Updated".green().bold(), workflow.name, workflow.id);
    Ok(())
}

pub async fn delete(service: &WorkflowService, args: DeleteArgs, json: bool) -> Result<()> {
    let id = resolve_workflow(service, &args.workflow).await?;
    let workflow = service.store().get(id).await?;
    service.store().delete(id, args.purge).await?;

    if json {
        return print_json(&json!({ "workflow_id": id, "purged": args.purge }));
    }
    if args.purge {
        println!("{} {} and removed {}", "Deleted".green().bold(), workflow.name, workflow.root_dir.display());
    } else {
        println!(
            "{} {}; files kept in {}",
            "Deleted".green().bold(),
            workflow.name,
            workflow.root_dir.display()
        );
    }
    Ok(())
}

pub async fn export(service: &WorkflowService, args: ExportArgs, json: bool) -> Result<()> {
    let id = resolve_workflow(service, &args.workflow).await?;
    let path = service.store().export(id, &args.output).await?;

    if json {
        return print_json(&json!({ "workflow_id": id, "path": path }));
    }
    println!("{} {} to {}", "Exported".green().bold(), id, path.display());
    Ok(())
}

pub async fn import(service: &WorkflowService, args: ImportArgs, json: bool) -> Result<()> {
    let workflow = service
        .store()
        .import(&args.input, args.dir.as_deref())
        .await?;
    info!(workflow_id = %workflow.id, source = %args.input.display(), "Workflow imported");

    if json {
        return print_json(&workflow);
    }
    println!("{} {} ({})", "Imported".green().bold(), workflow.name, workflow.id);
    println!("  directory: {}", workflow.root_dir.display());
    Ok(())
}

pub async fn artifacts(service: &WorkflowService, args: ArtifactsArgs, json: bool) -> Result<()> {
    let id = resolve_workflow(service, &args.workflow).await?;
    let workflow = service.store().get(id).await?;
    let mut stages = list_artifacts(&workflow, args.stage);
    if args.checkpoints {
        for stage in &mut stages {
            stage.files.retain(|file| file.checkpoint);
        }
    }

    if json {
        return print_json(&stages);
    }
    print_artifacts(&stages);
    Ok(())
}
