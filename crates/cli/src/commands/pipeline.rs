//! `advance`, `run-to`, `analyze`, `params` and `logs`.

use crate::cli::{AdvanceArgs, AnalyzeArgs, LogsArgs, ParamsArgs, RunToArgs};
use crate::commands::resolve_workflow;
use crate::output::{print_json, print_record_line, print_summary};
use crate::overrides::collect_overrides;
use color_eyre::eyre::Result;
use colored::Colorize;
use mdk_core::pipeline::AdvanceOptions;
use mdk_core::workflow::LogStream;
use mdk_core::WorkflowService;
use serde_json::json;
use std::time::Duration;

pub async fn advance(service: &WorkflowService, args: AdvanceArgs, json: bool) -> Result<()> {
    let id = resolve_workflow(service, &args.workflow).await?;
    let mut options = AdvanceOptions::new()
        .with_force(args.force)
        .with_overrides(collect_overrides(&args.overrides)?);
    if let Some(secs) = args.timeout {
        options = options.with_timeout(Duration::from_secs(secs));
    }

    let record = service.coordinator().advance(id, args.stage, options).await?;
    if json {
        return print_json(&record);
    }
    print_record_line(&record);
    Ok(())
}

pub async fn run_to(service: &WorkflowService, args: RunToArgs, json: bool) -> Result<()> {
    let id = resolve_workflow(service, &args.workflow).await?;
    let overrides = collect_overrides(&args.overrides)?;

    let records = service.coordinator().run_to(id, args.stage, overrides).await?;
    if json {
        return print_json(&records);
    }
    if records.is_empty() {
        println!("Nothing to do: {} already succeeded.", args.stage);
    }
    for record in &records {
        print_record_line(record);
    }
    Ok(())
}

pub async fn analyze(service: &WorkflowService, args: AnalyzeArgs, json: bool) -> Result<()> {
    let id = resolve_workflow(service, &args.workflow).await?;
    let overrides = collect_overrides(&args.overrides)?;

    let report = service.coordinator().analyze(id, args.kind, overrides).await?;
    if json {
        return print_json(&json!({ "record": report.record, "summary": report.summary }));
    }
    print_record_line(&report.record);
    for output in &report.record.outputs {
        println!("  output: {}", output.display());
    }
    print_summary(&report.summary);
    Ok(())
}

pub async fn params(service: &WorkflowService, args: ParamsArgs, json: bool) -> Result<()> {
    let id = resolve_workflow(service, &args.workflow).await?;
    let overrides = collect_overrides(&args.overrides)?;

    let preview = service
        .coordinator()
        .preview_params(id, args.stage, &overrides)
        .await?;
    if json {
        return print_json(&json!({
            "stage": args.stage,
            "effective": preview.effective,
            "advisories": preview.advisories,
        }));
    }
    println!("{}", serde_json::to_string_pretty(&preview.effective)?);
    for note in &preview.advisories {
        println!("{} {note}", "note:".yellow().bold());
    }
    Ok(())
}

pub async fn logs(service: &WorkflowService, args: LogsArgs) -> Result<()> {
    let id = resolve_workflow(service, &args.workflow).await?;
    let stream = if args.stderr {
        LogStream::Stderr
    } else {
        LogStream::Stdout
    };
    let content = service.store().read_log(id, args.stage, stream).await?;
    print!("{content}");
    Ok(())
}
