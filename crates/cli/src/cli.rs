use clap::{Args, Parser, Subcommand};
use mdk_protocol::{AnalysisKind, StageName};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "mdk - run molecular dynamics workflows stage by stage and inspect them with a viewer"
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Read configuration from this file instead of ./.mdkit/config.toml
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory under which new workflow directories are created
    #[arg(long, global = true, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a file in addition to the console
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a workflow and its directory
    Create(CreateArgs),

    /// List all workflows
    List,

    /// Show a workflow's stages and execution records
    Show(WorkflowArg),

    /// Rename a workflow or change its description
    Rename(RenameArgs),

    /// Stop tracking a workflow
    Delete(DeleteArgs),

    /// Write a workflow's metadata document to a JSON file
    Export(ExportArgs),

    /// Create a new workflow from an exported JSON file
    Import(ImportArgs),

    /// List the files each stage left in the workflow directory
    Artifacts(ArtifactsArgs),

    /// Run exactly one stage
    Advance(AdvanceArgs),

    /// Run every missing stage up to and including a target stage
    RunTo(RunToArgs),

    /// Run a trajectory analysis
    Analyze(AnalyzeArgs),

    /// Show the parameters a stage would run with
    Params(ParamsArgs),

    /// Print the captured output of the latest stage attempt
    Logs(LogsArgs),

    /// Build a viewer session script, optionally launching the viewer
    Session(SessionArgs),

    /// List the built-in visualization templates
    Templates,

    /// Serve the JSON-lines protocol on stdin/stdout
    Serve,
}

#[derive(Args, Debug)]
pub struct WorkflowArg {
    /// Workflow id or unique name
    pub workflow: String,
}

/// Per-call parameter overrides.
#[derive(Args, Debug, Default)]
pub struct OverrideArgs {
    /// Override one parameter, e.g. --set production.nsteps=500000
    #[arg(long = "set", value_name = "KEY.PATH=VALUE")]
    pub set: Vec<String>,

    /// Read overrides from a .toml, .yaml or .json file
    #[arg(long, value_name = "FILE")]
    pub params: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Human-readable workflow name
    pub name: String,

    /// Own this directory instead of a new one under the workspace
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args, Debug)]
pub struct RenameArgs {
    /// Workflow id or unique name
    pub workflow: String,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Workflow id or unique name
    pub workflow: String,

    /// Also remove the workflow directory and everything in it
    #[arg(long)]
    pub purge: bool,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Workflow id or unique name
    pub workflow: String,

    /// File to write
    pub output: PathBuf,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// File written by `mdk export`
    pub input: PathBuf,

    /// Own this directory instead of a new one under the workspace
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ArtifactsArgs {
    /// Workflow id or unique name
    pub workflow: String,

    /// Only list this stage
    #[arg(long)]
    pub stage: Option<StageName>,

    /// Only list checkpoint files
    #[arg(long)]
    pub checkpoints: bool,
}

#[derive(Args, Debug)]
pub struct AdvanceArgs {
    /// Workflow id or unique name
    pub workflow: String,

    /// prepare, minimize, equilibrate, produce or analyze
    pub stage: StageName,

    /// Re-run the stage even if it already succeeded
    #[arg(long)]
    pub force: bool,

    /// Time limit in seconds, replacing the configured one
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}

#[derive(Args, Debug)]
pub struct RunToArgs {
    /// Workflow id or unique name
    pub workflow: String,

    /// Last stage to run
    pub stage: StageName,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Workflow id or unique name
    pub workflow: String,

    /// rmsd, rmsf, gyrate, hbond, sasa, density, distance, angle or
    /// secondary_structure
    pub kind: AnalysisKind,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}

#[derive(Args, Debug)]
pub struct ParamsArgs {
    /// Workflow id or unique name
    pub workflow: String,

    pub stage: StageName,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}

#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Workflow id or unique name
    pub workflow: String,

    /// Stage to read; the most recent attempt of any stage by default
    #[arg(long)]
    pub stage: Option<StageName>,

    /// Print stderr instead of stdout
    #[arg(long)]
    pub stderr: bool,
}

#[derive(Args, Debug)]
pub struct SessionArgs {
    /// Workflow id or unique name
    pub workflow: String,

    /// Structure file inside the workflow directory
    pub structure: PathBuf,

    /// Trajectory file inside the workflow directory
    #[arg(long)]
    pub trajectory: Option<PathBuf>,

    /// Built-in template name (see `mdk templates`)
    #[arg(long)]
    pub template: Option<String>,

    /// Start the viewer on the session
    #[arg(long)]
    pub launch: bool,

    /// Run the viewer without a display; implies --launch
    #[arg(long)]
    pub headless: bool,
}
