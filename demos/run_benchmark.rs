use bombench::{BenchConfig, RunOptions, SubjectKind, Tool, run_benchmark};
use std::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    bombench::logging::init_tracing("info")?;
    let subjects = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "./subjects.txt".to_string());
    let mut options = RunOptions::new(subjects, SubjectKind::Image);
    options.workspace = "./bench".into();
    options.tools = vec![Tool::Syft, Tool::Trivy];

    let summary = run_benchmark(&options, &BenchConfig::default()).await?;
    println!(
        "Benchmarked {} subjects into {} rows ({} generation and {} scoring failures)",
        summary.subjects, summary.rows, summary.generation_failures, summary.scoring_failures
    );
    println!("{}", summary.output.display());
    Ok(())
}
