//! Materializes the artifact a subject's tools will scan.

use crate::config::BenchConfig;
use crate::error::StageFailure;
use crate::layout::Layout;
use crate::process::{self, CommandSpec};
use crate::subject::{Subject, SubjectKind};
use crate::tool::Artifact;
use itertools::Itertools;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{info, warn};

pub struct Acquirer<'a> {
    config: &'a BenchConfig,
    layout: &'a Layout,
}

impl<'a> Acquirer<'a> {
    pub fn new(config: &'a BenchConfig, layout: &'a Layout) -> Self {
        Self { config, layout }
    }

    pub async fn acquire(&self, subject: &Subject) -> Result<Artifact, StageFailure> {
        match subject.kind {
            SubjectKind::Image => Ok(Artifact::Image(subject.locator.clone())),
            SubjectKind::Repo => Ok(Artifact::Directory(self.checkout(subject).await?)),
            SubjectKind::Binary => {
                let local = Path::new(&subject.locator);
                if local.is_file() {
                    let path = std::path::absolute(local).map_err(|e| {
                        StageFailure::Acquisition(format!("{}: {}", subject.locator, e))
                    })?;
                    info!(subject = %subject.id, path = %path.display(), "using pre-built binary");
                    return Ok(Artifact::File(path));
                }
                let checkout = self.checkout(subject).await?;
                Ok(Artifact::File(self.build(subject, &checkout).await?))
            }
        }
    }

    /// Shallow-clones the subject unless a checkout already exists.
    async fn checkout(&self, subject: &Subject) -> Result<PathBuf, StageFailure> {
        let dir = self.layout.checkout_dir(&subject.id);
        ensure_owned(&dir, subject)?;
        if is_checkout(&dir) {
            info!(subject = %subject.id, "checkout exists, skipping clone");
            return Ok(dir);
        }
        if dir.exists() {
            warn!(subject = %subject.id, dir = %dir.display(), "removing incomplete checkout");
            fs::remove_dir_all(&dir).map_err(|e| {
                StageFailure::Acquisition(format!("cannot remove {}: {}", dir.display(), e))
            })?;
        }
        let repos_dir = self.layout.repos_dir();
        fs::create_dir_all(&repos_dir).map_err(|e| {
            StageFailure::Acquisition(format!("cannot create {}: {}", repos_dir.display(), e))
        })?;

        info!(subject = %subject.id, locator = %subject.locator, "cloning");
        let spec = CommandSpec::new(&self.config.git)
            .args(["clone", "--depth", "1"])
            .arg(&subject.locator)
            .arg(&dir)
            .current_dir(&repos_dir);
        let transcript = self
            .layout
            .transcript_path(subject.kind, &subject.id, "git_clone");
        let invocation = process::run(&spec, &transcript).await;
        if !invocation.succeeded() {
            return Err(StageFailure::Acquisition(format!(
                "clone exited with {} after {:.2}s",
                invocation.exit_code, invocation.elapsed_seconds
            )));
        }
        if !is_checkout(&dir) {
            return Err(StageFailure::Acquisition(format!(
                "clone left no repository at {}",
                dir.display()
            )));
        }
        Ok(dir)
    }

    /// Builds the checkout and copies the newest output into the subject's
    /// artifact directory. Runs on every call: build outputs are never reused
    /// across runs.
    async fn build(&self, subject: &Subject, checkout: &Path) -> Result<PathBuf, StageFailure> {
        let wrapper = checkout.join("mvnw");
        let program = match wrapper.is_file() {
            true => {
                make_executable(&wrapper);
                wrapper.to_string_lossy().into_owned()
            }
            false => self.config.build.maven.clone(),
        };
        let spec = CommandSpec::new(program)
            .args(["-q", "-DskipTests", "clean", "package"])
            .current_dir(checkout);
        let transcript = self.layout.transcript_path(subject.kind, &subject.id, "build");
        info!(subject = %subject.id, command = %spec.command_line(), "building");
        let invocation = process::run(&spec, &transcript).await;
        if !invocation.succeeded() {
            return Err(StageFailure::Acquisition(format!(
                "build exited with {} after {:.2}s",
                invocation.exit_code, invocation.elapsed_seconds
            )));
        }

        let output_dir = checkout.join(&self.config.build.output_dir);
        let newest = newest_artifact(&output_dir, &self.config.build.extensions)
            .map_err(|e| {
                StageFailure::Acquisition(format!("cannot list {}: {}", output_dir.display(), e))
            })?
            .ok_or_else(|| {
                StageFailure::Acquisition(format!(
                    "build produced no .{} file in {}",
                    self.config.build.extensions.join("/."),
                    output_dir.display()
                ))
            })?;

        let artifact_dir = self.layout.artifact_dir(&subject.id);
        ensure_owned(&artifact_dir, subject)?;
        let copied = copy_into_fresh_dir(&newest, &artifact_dir).map_err(|e| {
            StageFailure::Acquisition(format!(
                "cannot copy {} to {}: {}",
                newest.display(),
                artifact_dir.display(),
                e
            ))
        })?;
        info!(
            subject = %subject.id,
            artifact = %copied.display(),
            elapsed = invocation.elapsed_seconds,
            "build ok"
        );
        Ok(copied)
    }
}

/// `dir` must end in the subject id itself; ids like `..` would otherwise
/// point at a parent that gets removed and recreated.
fn ensure_owned(dir: &Path, subject: &Subject) -> Result<(), StageFailure> {
    match dir.file_name() == Some(OsStr::new(&subject.id)) {
        true => Ok(()),
        false => Err(StageFailure::Acquisition(format!(
            "subject id {:?} is not a plain directory name",
            subject.id
        ))),
    }
}

/// A directory counts as a checkout when it carries a `.git` marker.
pub fn is_checkout(dir: &Path) -> bool {
    dir.join(".git").exists()
}

/// The most recently modified file in `dir` with one of `extensions`.
///
/// Files with equal modification times are ordered by file name, so the
/// lexically smallest name wins the tie. A missing directory yields `None`.
pub fn newest_artifact(dir: &Path, extensions: &[String]) -> io::Result<Option<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let mut candidates: Vec<(SystemTime, PathBuf)> = vec![];
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.iter().any(|wanted| wanted == ext));
        let metadata = entry.metadata()?;
        if matches && metadata.is_file() {
            candidates.push((metadata.modified()?, path));
        }
    }
    Ok(candidates
        .into_iter()
        .sorted_by(|(a_time, a_path), (b_time, b_path)| {
            b_time.cmp(a_time).then_with(|| a_path.file_name().cmp(&b_path.file_name()))
        })
        .map(|(_, path)| path)
        .next())
}

fn copy_into_fresh_dir(source: &Path, dir: &Path) -> io::Result<PathBuf> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;
    let file_name = source
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "artifact has no file name"))?;
    let destination = dir.join(file_name);
    fs::copy(source, &destination)?;
    Ok(destination)
}

#[cfg(unix)]
fn make_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    // a read-only checkout may refuse; the build attempt reports the real error
    if let Ok(metadata) = fs::metadata(path) {
        let mut permissions = metadata.permissions();
        permissions.set_mode(permissions.mode() | 0o111);
        let _ = fs::set_permissions(path, permissions);
    }
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) {}
