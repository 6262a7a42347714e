//! `session` and `templates`.

use crate::cli::SessionArgs;
use crate::commands::resolve_workflow;
use crate::output::print_json;
use color_eyre::eyre::Result;
use colored::Colorize;
use mdk_core::viz::{build_session, list_templates};
use mdk_core::WorkflowService;
use serde_json::json;

pub async fn session(service: &WorkflowService, args: SessionArgs, json: bool) -> Result<()> {
    let id = resolve_workflow(service, &args.workflow).await?;

    if args.launch || args.headless {
        let (session, receipt) = service
            .launch_session(
                id,
                &args.structure,
                args.trajectory.as_deref(),
                args.template.as_deref(),
                args.headless,
            )
            .await?;
        if json {
            return print_json(&json!({ "session": session, "receipt": receipt }));
        }
        let pid = receipt
            .pid
            .map(|pid| pid.to_string())
            .unwrap_or_else(|| "?".to_string());
        println!("{} viewer (pid {pid})", "Launched".green().bold());
        println!("  script: {}", receipt.script_path.display());
        return Ok(());
    }

    let workflow = service.store().get(id).await?;
    let session = build_session(
        &workflow,
        &args.structure,
        args.trajectory.as_deref(),
        args.template.as_deref(),
    )?;
    if json {
        return print_json(&session);
    }
    print!("{}", session.script);
    Ok(())
}

pub fn templates(json: bool) -> Result<()> {
    let templates = list_templates();
    if json {
        return print_json(&templates);
    }
    for name in templates {
        println!("{name}");
    }
    Ok(())
}
