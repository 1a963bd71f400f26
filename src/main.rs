use bombench::dtrack::UPLOAD_TABLE;
use bombench::logging::init_tracing;
use bombench::{
    BenchConfig, Layout, RunOptions, RunSummary, SubjectKind, Tool, collect_metrics,
    run_benchmark, upload_documents,
};
use clap::{Args, Parser, Subcommand};
use std::env;
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::error;

const API_KEY_ENV: &str = "BOMBENCH_DTRACK_API_KEY";

#[derive(Parser, Debug, Clone)]
#[command(version, about, arg_required_else_help(true))]
struct Cli {
    /// Log filter applied when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Generate an SBOM per subject and tool, score each one and write the result table
    Run(RunArgs),
    /// Upload every generated SBOM to Dependency-Track
    Upload(TrackerArgs),
    /// Read current project metrics back from Dependency-Track into the upload table
    Metrics(TrackerArgs),
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// File listing one subject per line, either `name,locator` or a bare locator
    #[arg(short, long)]
    subjects: PathBuf,

    /// What every line of the subject list refers to
    #[arg(short, long, value_enum, default_value_t = SubjectKind::Repo)]
    kind: SubjectKind,

    /// Result table. The default is `result.csv` in the workspace
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Root folder for checkouts, artifacts, SBOMs and logs
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Optional comma-separated list of the tools to run.
    /// If not provided, all the tools will be used.
    #[arg(short, long, value_delimiter = ',', value_enum)]
    tools: Vec<Tool>,

    /// Optional TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Do not check that the required programs are installed before starting
    #[arg(long, default_value_t = false)]
    skip_preflight: bool,
}

#[derive(Args, Debug, Clone)]
struct TrackerArgs {
    /// Workspace whose `sboms/` folder holds the documents
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Upload table. The default is `result-upload-dtrack.csv` in the workspace
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Optional TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;
    execute(cli.command).await.inspect_err(|e| error!("{}", e))
}

async fn execute(command: Command) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Run(args) => {
            let config = BenchConfig::load(args.config.as_deref())?;
            let mut options = RunOptions::new(args.subjects, args.kind);
            options.workspace = args.workspace;
            options.output = args.output;
            if !args.tools.is_empty() {
                options.tools = args.tools;
            }
            options.preflight = !args.skip_preflight;

            let RunSummary { output, rows, .. } = run_benchmark(&options, &config).await?;
            println!("Wrote {} rows to", rows);
            println!("{}", output.display());
        }
        Command::Upload(args) => {
            let config = tracker_config(args.config.as_deref())?;
            let layout = Layout::new(&args.workspace);
            let table = upload_table(&args.workspace, args.output);
            let summary = upload_documents(&layout, &config.dependency_track, &table).await?;
            println!(
                "Uploaded {} documents, {} failed",
                summary.uploaded, summary.failed
            );
            println!("{}", table.display());
        }
        Command::Metrics(args) => {
            let config = tracker_config(args.config.as_deref())?;
            let layout = Layout::new(&args.workspace);
            let table = upload_table(&args.workspace, args.output);
            let summary = collect_metrics(&layout, &config.dependency_track, &table).await?;
            println!(
                "Collected metrics for {} of {} projects",
                summary.with_metrics, summary.projects
            );
            println!("{}", table.display());
        }
    }
    Ok(())
}

/// Configuration for the Dependency-Track commands; the API key may come from
/// the environment when the file does not carry one.
fn tracker_config(path: Option<&Path>) -> Result<BenchConfig, Box<dyn Error>> {
    let mut config = BenchConfig::load(path)?;
    if config.dependency_track.api_key.is_none() {
        config.dependency_track.api_key = env::var(API_KEY_ENV).ok();
    }
    Ok(config)
}

fn upload_table(workspace: &Path, output: Option<PathBuf>) -> PathBuf {
    output.unwrap_or_else(|| workspace.join(UPLOAD_TABLE))
}
