//! Text and JSON rendering of command results.

use colored::{ColoredString, Colorize};
use color_eyre::eyre::Result;
use mdk_protocol::ipc::{ColumnSummary, Event};
use mdk_protocol::{StageArtifacts, StageExecutionRecord, StageName, StageStatus, Workflow};
use serde::Serialize;

/// Prints `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn status_label(status: StageStatus) -> ColoredString {
    let label = status.to_string();
    match status {
        StageStatus::NotStarted => label.dimmed(),
        StageStatus::Running => label.cyan().bold(),
        StageStatus::Succeeded => label.green(),
        StageStatus::Failed => label.red().bold(),
        StageStatus::Timeout => label.yellow().bold(),
    }
}

/// One character per stage, e.g. `✓✓✗··`.
fn progress(workflow: &Workflow) -> String {
    StageName::ALL
        .iter()
        .map(|stage| match workflow.status_of(*stage) {
            StageStatus::NotStarted => "·".dimmed().to_string(),
            StageStatus::Running => "▶".cyan().to_string(),
            StageStatus::Succeeded => "✓".green().to_string(),
            StageStatus::Failed => "✗".red().to_string(),
            StageStatus::Timeout => "⏱".yellow().to_string(),
        })
        .collect()
}

pub fn print_workflow_list(workflows: &[Workflow]) {
    if workflows.is_empty() {
        println!("No workflows yet. Create one with `mdk create <NAME>`.");
        return;
    }
    for workflow in workflows {
        println!(
            "{}  {}  {:<24}  {}",
            workflow.id.to_string().dimmed(),
            progress(workflow),
            workflow.name.bold(),
            workflow.root_dir.display()
        );
    }
}

pub fn print_workflow(workflow: &Workflow) {
    println!("{} {}", workflow.name.bold(), format!("({})", workflow.id).dimmed());
    if let Some(description) = &workflow.description {
        println!("  {description}");
    }
    println!("  directory: {}", workflow.root_dir.display());
    println!(
        "  created:   {}  updated: {}",
        workflow.created_at.format("%Y-%m-%d %H:%M:%S"),
        workflow.updated_at.format("%Y-%m-%d %H:%M:%S")
    );

    println!("\n{}", "Stages".underline());
    for stage in StageName::ALL {
        let state = workflow.stage_status.get(&stage).cloned().unwrap_or_default();
        let detail = state.detail.map(|d| format!("  {d}")).unwrap_or_default();
        println!("  {:<12} {}{}", stage.as_str(), status_label(state.status), detail.dimmed());
    }

    if !workflow.records.is_empty() {
        println!("\n{}", "Attempts".underline());
        for record in &workflow.records {
            print_record_line(record);
        }
    }
}

pub fn print_record_line(record: &StageExecutionRecord) {
    let name = match &record.label {
        Some(label) => format!("{}:{label}", record.stage_name),
        None => record.stage_name.to_string(),
    };
    let seconds = (record.end_time - record.start_time).num_milliseconds() as f64 / 1000.0;
    println!(
        "  #{:<3} {:<18} {:<10} {:<14} {:>8.1}s  {}",
        record.attempt,
        name,
        status_label(record.status),
        record.exit_status.to_string(),
        seconds,
        record.start_time.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
    );
}

pub fn print_summary(summary: &[ColumnSummary]) {
    if summary.is_empty() {
        println!("No numeric data in the analysis output.");
        return;
    }
    println!(
        "  {:<20} {:>8} {:>12} {:>12} {:>12} {:>12}",
        "column", "samples", "mean", "std", "min", "max"
    );
    for column in summary {
        let name = column
            .legend
            .clone()
            .unwrap_or_else(|| format!("column {}", column.column));
        println!(
            "  {:<20} {:>8} {:>12.4} {:>12.4} {:>12.4} {:>12.4}",
            name, column.samples, column.mean, column.std, column.min, column.max
        );
    }
}

pub fn print_artifacts(stages: &[StageArtifacts]) {
    for stage in stages {
        println!("{}", stage.stage.as_str().underline());
        if stage.files.is_empty() {
            println!("  {}", "no files".dimmed());
            continue;
        }
        for file in &stage.files {
            let marker = if file.checkpoint { "checkpoint".yellow().to_string() } else { String::new() };
            println!("  {:<32} {:>12}  {}", file.path.display(), file.size_bytes, marker);
        }
    }
}

/// A one-line description of a progress event, for stderr.
pub fn describe_event(event: &Event) -> Option<String> {
    match event {
        Event::StageStatusUpdate { stage, status, .. } => {
            Some(format!("{} {:<12} {}", "▶".cyan(), stage.as_str(), status_label(*status)))
        }
        Event::StageCompleted { record, .. } => Some(format!(
            "  {} attempt {} ({}), logs in {}",
            record.stage_name,
            record.attempt,
            record.exit_status,
            record.stdout_path.display()
        )),
        _ => None,
    }
}
