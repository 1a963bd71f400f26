//! Blocking subprocess execution with a persisted transcript.

use std::ffi::OsString;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, warn};

/// Exit code recorded when the program could not be started or was killed
/// by a signal.
pub const NO_EXIT_CODE: i32 = -1;

/// One external program call to make.
#[derive(Clone, Debug)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
    /// Variables set only when the inherited environment lacks them.
    pub default_env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: vec![],
            cwd: None,
            default_env: vec![],
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn default_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_env.push((key.into(), value.into()));
        self
    }

    /// The command line as it would be typed in a shell.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().map(|arg| arg.to_string_lossy().into_owned()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// The captured outcome of one subprocess call.
///
/// Subject, tool and stage are not stored here: they are encoded in
/// `transcript_path` (`logs/<kind>/<subject>__<tool>.<stage>.log`, see
/// [`crate::layout::Layout::transcript_path`]), which is the record's key.
#[derive(Clone, Debug)]
pub struct Invocation {
    pub command_line: String,
    pub exit_code: i32,
    pub elapsed_seconds: f64,
    pub stdout: String,
    pub stderr: String,
    pub transcript_path: PathBuf,
}

impl Invocation {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs `spec` to completion and writes its transcript to `transcript_path`.
///
/// A program that cannot be started is reported as an invocation with
/// [`NO_EXIT_CODE`] and the spawn error as its stderr, so callers handle it
/// like any other non-zero exit. Elapsed time is wall-clock time of the call.
pub async fn run(spec: &CommandSpec, transcript_path: &Path) -> Invocation {
    let command_line = spec.command_line();
    debug!(command = %command_line, "running");

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }
    for (key, value) in &spec.default_env {
        if std::env::var_os(key).is_none() {
            command.env(key, value);
        }
    }

    let start = Instant::now();
    let output = command.output().await;
    let elapsed_seconds = start.elapsed().as_secs_f64();

    let (exit_code, stdout, stderr) = match output {
        Ok(output) => (
            output.status.code().unwrap_or(NO_EXIT_CODE),
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ),
        Err(e) => (
            NO_EXIT_CODE,
            String::new(),
            format!("failed to start {}: {}", spec.program, e),
        ),
    };

    let invocation = Invocation {
        command_line,
        exit_code,
        elapsed_seconds,
        stdout,
        stderr,
        transcript_path: transcript_path.to_path_buf(),
    };
    if let Err(e) = write_transcript(&invocation) {
        warn!(path = %transcript_path.display(), error = %e, "failed to write transcript");
    }
    invocation
}

/// Renders an invocation in the transcript format.
pub fn render_transcript(invocation: &Invocation) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "$ {}", invocation.command_line);
    let _ = writeln!(out, "exit_code: {}", invocation.exit_code);
    let _ = writeln!(out, "elapsed: {:.3} s", invocation.elapsed_seconds);
    out.push('\n');
    out.push_str("=== STDOUT ===\n");
    out.push_str(&invocation.stdout);
    if !invocation.stdout.ends_with('\n') {
        out.push('\n');
    }
    out.push('\n');
    out.push_str("=== STDERR ===\n");
    out.push_str(&invocation.stderr);
    if !invocation.stderr.ends_with('\n') {
        out.push('\n');
    }
    out
}

fn write_transcript(invocation: &Invocation) -> std::io::Result<()> {
    if let Some(parent) = invocation.transcript_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&invocation.transcript_path, render_transcript(invocation))
}
