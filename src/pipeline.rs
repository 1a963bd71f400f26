//! The benchmark run: every subject through acquisition, then every tool
//! through generation and scoring, one result row per (subject, tool).

use crate::acquire::Acquirer;
use crate::config::BenchConfig;
use crate::error::{BenchError, StageFailure};
use crate::layout::Layout;
use crate::score;
use crate::sink::{ResultRow, ResultSink};
use crate::subject::{self, Subject, SubjectKind};
use crate::tool::{self, Artifact, Tool};
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

const PROGRESS_BAR_TEMPLATE: &str = "{elapsed} {wide_bar} {pos}/{len} ETA:{eta}";
const DEFAULT_RESULT_FILE: &str = "result.csv";

/// What to benchmark in one run.
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub subjects: PathBuf,
    pub kind: SubjectKind,
    pub workspace: PathBuf,
    /// Result table; `<workspace>/result.csv` when not set.
    pub output: Option<PathBuf>,
    /// Generators in processing order.
    pub tools: Vec<Tool>,
    /// Check that every required program is installed before starting.
    pub preflight: bool,
}

impl RunOptions {
    pub fn new(subjects: impl Into<PathBuf>, kind: SubjectKind) -> Self {
        Self {
            subjects: subjects.into(),
            kind,
            workspace: PathBuf::from("."),
            output: None,
            tools: Tool::ALL.to_vec(),
            preflight: true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub output: PathBuf,
    pub subjects: usize,
    pub rows: usize,
    pub acquisition_failures: usize,
    pub generation_failures: usize,
    pub scoring_failures: usize,
}

impl RunSummary {
    fn record(&mut self, failure: &StageFailure) {
        match failure {
            StageFailure::Acquisition(_) => self.acquisition_failures += 1,
            StageFailure::Generation(_) => self.generation_failures += 1,
            StageFailure::Scoring(_) => self.scoring_failures += 1,
        }
    }
}

/// Runs the whole benchmark.
///
/// Only an unusable subject list, a missing program, or a failure writing
/// the result table ends the run early; every other failure is confined to
/// its subject or (subject, tool) pair and shows up as blank cells.
pub async fn run_benchmark(
    options: &RunOptions,
    config: &BenchConfig,
) -> Result<RunSummary, BenchError> {
    let tools = options.tools.iter().copied().unique().collect_vec();
    if tools.is_empty() {
        return Err(BenchError::Config {
            field: "tools".to_string(),
            reason: "at least one tool required".to_string(),
        });
    }
    let subjects = subject::load_subjects(&options.subjects, options.kind, config.delimiter)?;
    if options.preflight {
        preflight(config, options.kind, &tools)?;
    }

    let root = std::path::absolute(&options.workspace)
        .map_err(|e| BenchError::io(&options.workspace, e))?;
    let layout = Layout::new(root);
    let output = options
        .output
        .clone()
        .unwrap_or_else(|| layout.root().join(DEFAULT_RESULT_FILE));

    info!(
        workspace = %layout.root().display(),
        subjects = subjects.len(),
        tools = %tools.iter().join(","),
        output = %output.display(),
        "starting benchmark"
    );

    let mut sink = ResultSink::create(&output)?;
    let mut summary = RunSummary {
        output: output.clone(),
        subjects: subjects.len(),
        ..RunSummary::default()
    };
    let orchestrator = Orchestrator {
        config,
        layout: &layout,
        tools: &tools,
    };
    let progress_bar = ProgressBar::new(subjects.len() as u64).with_style(
        ProgressStyle::with_template(PROGRESS_BAR_TEMPLATE).unwrap_or(ProgressStyle::default_bar()),
    );
    for (index, subject) in subjects.iter().enumerate() {
        info!(
            subject = %subject.id,
            locator = %subject.locator,
            "[{}/{}]",
            index + 1,
            subjects.len()
        );
        orchestrator
            .run_subject(subject, &mut sink, &mut summary)
            .await?;
        progress_bar.inc(1);
    }
    progress_bar.finish();

    summary.rows = sink.rows_written();
    info!(
        rows = summary.rows,
        acquisition_failures = summary.acquisition_failures,
        generation_failures = summary.generation_failures,
        scoring_failures = summary.scoring_failures,
        output = %summary.output.display(),
        "benchmark finished"
    );
    Ok(summary)
}

struct Orchestrator<'a> {
    config: &'a BenchConfig,
    layout: &'a Layout,
    tools: &'a [Tool],
}

impl Orchestrator<'_> {
    /// Emits exactly one row per configured tool for `subject`.
    async fn run_subject<W: Write>(
        &self,
        subject: &Subject,
        sink: &mut ResultSink<W>,
        summary: &mut RunSummary,
    ) -> Result<(), BenchError> {
        let artifact = match Acquirer::new(self.config, self.layout)
            .acquire(subject)
            .await
        {
            Ok(artifact) => artifact,
            Err(failure) => {
                error!(subject = %subject.id, %failure, "skipping all tools for subject");
                summary.record(&failure);
                for tool in self.tools {
                    sink.write_row(&ResultRow::blank(&subject.id, *tool))?;
                }
                return Ok(());
            }
        };

        for tool in self.tools {
            let (row, failure) = self.run_pair(subject, &artifact, *tool).await;
            if let Some(failure) = failure {
                summary.record(&failure);
            }
            sink.write_row(&row)?;
        }
        Ok(())
    }

    /// Generation then scoring for one tool; a failed stage skips the rest.
    async fn run_pair(
        &self,
        subject: &Subject,
        artifact: &Artifact,
        tool: Tool,
    ) -> (ResultRow, Option<StageFailure>) {
        let mut row = ResultRow::blank(&subject.id, tool);
        let output = self.layout.sbom_path(subject.kind, &subject.id, tool);

        let document = match tool::generate(
            tool,
            &self.config.tools,
            artifact,
            &output,
            &self.transcript(subject, tool, "gen"),
        )
        .await
        {
            Ok(document) => document,
            Err(failure) => {
                warn!(subject = %subject.id, %tool, %failure, "skipping scoring");
                return (row, Some(failure));
            }
        };
        row.generation_elapsed = Some(document.invocation.elapsed_seconds);
        info!(
            subject = %subject.id,
            %tool,
            elapsed = %format!("{:.2}", document.invocation.elapsed_seconds),
            "generated"
        );

        match score::score(
            &self.config.scorer,
            &document.path,
            &self.transcript(subject, tool, "score"),
        )
        .await
        {
            Ok((result, _)) => {
                if result.score.is_none() {
                    warn!(
                        subject = %subject.id,
                        %tool,
                        "scorer output had no score, see transcript"
                    );
                }
                info!(
                    subject = %subject.id,
                    %tool,
                    score = ?result.score,
                    grade = ?result.grade.map(|g| g.to_string()),
                    components = ?result.component_count,
                    "scored"
                );
                row.score = result;
                (row, None)
            }
            Err(failure) => {
                warn!(subject = %subject.id, %tool, %failure, "scoring failed");
                (row, Some(failure))
            }
        }
    }

    fn transcript(&self, subject: &Subject, tool: Tool, stage: &str) -> PathBuf {
        self.layout
            .transcript_path(subject.kind, &subject.id, &format!("{}.{}", tool, stage))
    }
}

/// Fails with every program the run needs but cannot find.
pub fn preflight(config: &BenchConfig, kind: SubjectKind, tools: &[Tool]) -> Result<(), BenchError> {
    let mut required: Vec<&str> = vec![];
    if kind != SubjectKind::Image {
        required.push(&config.git);
    }
    required.extend(tools.iter().map(|tool| tool.program(&config.tools)));
    required.push(&config.scorer.program);

    let missing = required
        .into_iter()
        .filter(|program| !program_exists(program))
        .map(str::to_string)
        .collect_vec();
    match missing.is_empty() {
        true => Ok(()),
        false => Err(BenchError::MissingPrograms(missing)),
    }
}

/// Whether `program` names an existing file, either directly (when it
/// contains a path separator) or through `PATH`.
pub fn program_exists(program: &str) -> bool {
    let path = Path::new(program);
    if path.components().count() > 1 {
        return path.is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir| {
                let candidate = dir.join(program);
                candidate.is_file() || (cfg!(windows) && candidate.with_extension("exe").is_file())
            })
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolPrograms;

    #[test]
    fn program_lookup() {
        assert!(program_exists("sh"));
        assert!(!program_exists("bombench-definitely-not-installed"));
        assert!(!program_exists("/nonexistent/dir/syft"));
    }

    #[test]
    fn preflight_reports_all_missing_programs() {
        let mut config = BenchConfig {
            tools: ToolPrograms {
                syft: "sh".to_string(),
                trivy: "missing-trivy-xyz".to_string(),
                cdxgen: "missing-cdxgen-xyz".to_string(),
            },
            ..BenchConfig::default()
        };
        config.scorer.program = "sh".to_string();
        config.git = "sh".to_string();

        match preflight(&config, SubjectKind::Repo, &Tool::ALL) {
            Err(BenchError::MissingPrograms(missing)) => {
                assert_eq!(missing, ["missing-trivy-xyz", "missing-cdxgen-xyz"])
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(preflight(&config, SubjectKind::Repo, &[Tool::Syft]).is_ok());
    }

    #[test]
    fn images_do_not_need_git() {
        let mut config = BenchConfig::default();
        config.git = "missing-git-xyz".to_string();
        config.tools.syft = "sh".to_string();
        config.scorer.program = "sh".to_string();
        assert!(preflight(&config, SubjectKind::Image, &[Tool::Syft]).is_ok());
        assert!(preflight(&config, SubjectKind::Repo, &[Tool::Syft]).is_err());
    }

    #[tokio::test]
    async fn missing_subject_list_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = RunOptions::new(dir.path().join("none.txt"), SubjectKind::Repo);
        options.workspace = dir.path().to_path_buf();
        options.preflight = false;
        let result = run_benchmark(&options, &BenchConfig::default()).await;
        assert!(matches!(result, Err(BenchError::Registry { .. })));
        assert!(!dir.path().join(DEFAULT_RESULT_FILE).exists());
    }

    #[tokio::test]
    async fn empty_tool_selection_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = RunOptions::new(dir.path().join("subjects.txt"), SubjectKind::Image);
        options.tools.clear();
        assert!(matches!(
            run_benchmark(&options, &BenchConfig::default()).await,
            Err(BenchError::Config { .. })
        ));
    }

    #[cfg(unix)]
    mod subprocess {
        use super::*;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;

        fn script(dir: &Path, name: &str, body: &str) -> String {
            let path = dir.join(name);
            fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path.to_string_lossy().into_owned()
        }

        /// Image subjects: syft writes a document, trivy fails, cdxgen writes nothing.
        fn image_config(bin: &Path) -> BenchConfig {
            let mut config = BenchConfig::default();
            config.tools.syft = script(
                bin,
                "syft",
                "printf '{\"components\":[{},{},{}]}' > \"${4#cyclonedx-json=}\"",
            );
            config.tools.trivy = script(bin, "trivy", "exit 1");
            config.tools.cdxgen = script(bin, "cdxgen", "exit 0");
            config.scorer.program = script(
                bin,
                "sbomqs",
                "echo 'SBOM Quality Score: 8.5/10.0  Grade: B'",
            );
            config
        }

        #[tokio::test]
        async fn one_row_per_subject_and_tool() {
            let bin = tempfile::tempdir().unwrap();
            let work = tempfile::tempdir().unwrap();
            let list = work.path().join("images.txt");
            fs::write(&list, "nginx:1.27\n# skipped\nalpine:3.20\n").unwrap();
            let mut options = RunOptions::new(&list, SubjectKind::Image);
            options.workspace = work.path().to_path_buf();

            let summary = run_benchmark(&options, &image_config(bin.path()))
                .await
                .unwrap();

            assert_eq!(summary.rows, 6);
            assert_eq!(summary.generation_failures, 4);
            assert_eq!(summary.scoring_failures, 0);
            let table = fs::read_to_string(work.path().join("result.csv")).unwrap();
            let lines = table.lines().collect_vec();
            assert_eq!(lines.len(), 7);
            assert!(lines[1].starts_with("nginx_1.27,syft,"));
            assert!(lines[1].ends_with(",8.5000,B,3"));
            assert_eq!(lines[2], "nginx_1.27,trivy,,,,");
            assert_eq!(lines[3], "nginx_1.27,cdxgen,,,,");
            assert!(lines[4].starts_with("alpine_3.20,syft,"));
            assert!(work
                .path()
                .join("logs/image/nginx_1.27__trivy.gen.log")
                .is_file());
            assert!(work
                .path()
                .join("logs/image/nginx_1.27__syft.score.log")
                .is_file());
        }

        #[tokio::test]
        async fn rerun_replaces_the_table() {
            let bin = tempfile::tempdir().unwrap();
            let work = tempfile::tempdir().unwrap();
            let list = work.path().join("images.txt");
            fs::write(&list, "nginx:1.27\n").unwrap();
            let config = image_config(bin.path());
            let mut options = RunOptions::new(&list, SubjectKind::Image);
            options.workspace = work.path().to_path_buf();
            options.tools = vec![Tool::Syft, Tool::Trivy];

            run_benchmark(&options, &config).await.unwrap();
            run_benchmark(&options, &config).await.unwrap();

            let table = fs::read_to_string(work.path().join("result.csv")).unwrap();
            assert_eq!(table.lines().count(), 3);
        }

        #[tokio::test]
        async fn failed_acquisition_blanks_every_tool() {
            let bin = tempfile::tempdir().unwrap();
            let work = tempfile::tempdir().unwrap();
            let list = work.path().join("repos.txt");
            fs::write(&list, "gone,https://example.invalid/gone.git\n").unwrap();
            let mut config = image_config(bin.path());
            config.git = script(bin.path(), "git", "exit 128");
            let mut options = RunOptions::new(&list, SubjectKind::Repo);
            options.workspace = work.path().to_path_buf();

            let summary = run_benchmark(&options, &config).await.unwrap();

            assert_eq!(summary.acquisition_failures, 1);
            let table = fs::read_to_string(work.path().join("result.csv")).unwrap();
            assert_eq!(
                table.lines().skip(1).collect_vec(),
                ["gone,syft,,,,", "gone,trivy,,,,", "gone,cdxgen,,,,"]
            );
        }
    }
}
