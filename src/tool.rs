use crate::config::ToolPrograms;
use crate::error::StageFailure;
use crate::process::{self, CommandSpec, Invocation};
use clap::ValueEnum;
use std::ffi::OsString;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// The local, addressable thing a generator scans.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Artifact {
    /// A checked-out working tree; tools run with it as working directory.
    Directory(PathBuf),
    /// A built or pre-built package file.
    File(PathBuf),
    /// A container image reference.
    Image(String),
}

impl Display for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Artifact::Directory(path) | Artifact::File(path) => write!(f, "{}", path.display()),
            Artifact::Image(reference) => write!(f, "{}", reference),
        }
    }
}

/// SBOM generators under benchmark.
///
/// Each variant knows its own argument template; adding a generator means
/// adding a variant.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
pub enum Tool {
    Syft,
    Trivy,
    Cdxgen,
}

impl Tool {
    pub const ALL: [Tool; 3] = [Tool::Syft, Tool::Trivy, Tool::Cdxgen];

    pub fn name(&self) -> &'static str {
        match self {
            Tool::Syft => "syft",
            Tool::Trivy => "trivy",
            Tool::Cdxgen => "cdxgen",
        }
    }

    pub fn program<'a>(&self, programs: &'a ToolPrograms) -> &'a str {
        match self {
            Tool::Syft => &programs.syft,
            Tool::Trivy => &programs.trivy,
            Tool::Cdxgen => &programs.cdxgen,
        }
    }

    /// Arguments asking the tool to scan `artifact` and write a
    /// CycloneDX-JSON document to `output`.
    pub fn arguments_for(&self, artifact: &Artifact, output: &Path) -> Vec<OsString> {
        let out = output.as_os_str().to_os_string();
        let mut syft_output = OsString::from("cyclonedx-json=");
        syft_output.push(output.as_os_str());
        match (self, artifact) {
            (Tool::Syft, Artifact::Directory(_)) => {
                vec!["dir:.".into(), "-o".into(), syft_output]
            }
            (Tool::Syft, Artifact::File(file)) => {
                vec![file.into(), "-o".into(), syft_output]
            }
            (Tool::Syft, Artifact::Image(image)) => {
                vec!["scan".into(), image.into(), "-o".into(), syft_output]
            }
            (Tool::Trivy, Artifact::Directory(_)) => vec![
                "fs".into(),
                ".".into(),
                "--format".into(),
                "cyclonedx".into(),
                "--output".into(),
                out,
            ],
            (Tool::Trivy, Artifact::File(file)) => vec![
                "fs".into(),
                file.into(),
                "--format".into(),
                "cyclonedx".into(),
                "--output".into(),
                out,
            ],
            (Tool::Trivy, Artifact::Image(image)) => vec![
                "image".into(),
                "--quiet".into(),
                "--format".into(),
                "cyclonedx".into(),
                "--output".into(),
                out,
                image.into(),
            ],
            (Tool::Cdxgen, Artifact::Directory(_)) => {
                vec!["-r".into(), "-o".into(), out, ".".into()]
            }
            (Tool::Cdxgen, Artifact::File(file)) => vec![
                "-t".into(),
                "java".into(),
                "-o".into(),
                out,
                file.into(),
            ],
            (Tool::Cdxgen, Artifact::Image(image)) => vec![
                "-t".into(),
                "docker".into(),
                "-o".into(),
                out,
                image.into(),
            ],
        }
    }

    pub fn command(&self, programs: &ToolPrograms, artifact: &Artifact, output: &Path) -> CommandSpec {
        let mut spec =
            CommandSpec::new(self.program(programs)).args(self.arguments_for(artifact, output));
        if let Artifact::Directory(dir) = artifact {
            spec = spec.current_dir(dir);
        }
        if *self == Tool::Trivy {
            spec = spec.default_env("TRIVY_NO_PROGRESS", "1");
        }
        spec
    }
}

impl FromStr for Tool {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "syft" => Ok(Tool::Syft),
            "trivy" => Ok(Tool::Trivy),
            "cdxgen" => Ok(Tool::Cdxgen),
            _ => Err(()),
        }
    }
}

impl Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A document a generator wrote, together with the call that wrote it.
#[derive(Clone, Debug)]
pub struct SbomDocument {
    pub path: PathBuf,
    pub invocation: Invocation,
}

/// Runs `tool` against `artifact`, writing the document to `output`.
///
/// Success requires exit code zero and a non-empty file at `output`
/// afterwards. Any document left from a previous run is removed first so
/// it cannot be mistaken for fresh output.
pub async fn generate(
    tool: Tool,
    programs: &ToolPrograms,
    artifact: &Artifact,
    output: &Path,
    transcript: &Path,
) -> Result<SbomDocument, StageFailure> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            StageFailure::Generation(format!("cannot create {}: {}", parent.display(), e))
        })?;
    }
    match fs::remove_file(output) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(StageFailure::Generation(format!(
                "cannot remove stale {}: {}",
                output.display(),
                e
            )));
        }
    }

    let invocation = process::run(&tool.command(programs, artifact, output), transcript).await;
    if !invocation.succeeded() {
        return Err(StageFailure::Generation(format!(
            "{} exited with {} after {:.2}s",
            tool, invocation.exit_code, invocation.elapsed_seconds
        )));
    }
    match fs::metadata(output) {
        Ok(metadata) if metadata.is_file() && metadata.len() > 0 => Ok(SbomDocument {
            path: output.to_path_buf(),
            invocation,
        }),
        Ok(_) => Err(StageFailure::Generation(format!(
            "{} exited 0 but {} is empty",
            tool,
            output.display()
        ))),
        Err(_) => Err(StageFailure::Generation(format!(
            "{} exited 0 but wrote no {}",
            tool,
            output.display()
        ))),
    }
}
