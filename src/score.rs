//! Quality scoring of generated documents.
//!
//! The scorer prints a line such as
//! `SBOM Quality Score: 8.5/10.0  Grade: B Components: 224`; nothing else in
//! its output is relied upon. Parsing is best-effort and every field is
//! optional: a missing value stays unknown and is never reported as zero.

use crate::config::ScorerConfig;
use crate::error::StageFailure;
use crate::process::{self, CommandSpec, Invocation};
use regex::Regex;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

const SCORE_LINE_MARKER: &str = "SBOM Quality Score";

static SCORE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"SBOM Quality Score:\s*([0-9]+(?:\.[0-9]+)?)\s*/\s*10(?:\.0+)?").unwrap());
static GRADE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Grade:\s*([A-F][+-]?)").unwrap());
static COMPONENTS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Components:\s*([0-9]+)").unwrap());

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScoreResult {
    /// Quality score out of 10.
    pub score: Option<f64>,
    pub grade: Option<Grade>,
    pub component_count: Option<u64>,
}

impl ScoreResult {
    pub fn is_empty(&self) -> bool {
        self.score.is_none() && self.grade.is_none() && self.component_count.is_none()
    }
}

/// A letter grade `A`–`F` with an optional `+`/`-` modifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Grade {
    pub letter: char,
    pub modifier: Option<char>,
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.modifier {
            Some(modifier) => write!(f, "{}{}", self.letter, modifier),
            None => write!(f, "{}", self.letter),
        }
    }
}

impl std::str::FromStr for Grade {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let letter = chars.next().filter(|c| ('A'..='F').contains(c)).ok_or(())?;
        let modifier = chars.next();
        if chars.next().is_some() || modifier.is_some_and(|m| m != '+' && m != '-') {
            return Err(());
        }
        Ok(Grade { letter, modifier })
    }
}

/// Extracts score, grade and component count from scorer output.
///
/// Prefers the line carrying the score marker, then the first line on which
/// any field matches (the last non-blank line included).
pub fn parse_score_output(text: &str) -> ScoreResult {
    let lines: Vec<&str> = text.lines().collect();
    if let Some(line) = lines.iter().find(|line| line.contains(SCORE_LINE_MARKER)) {
        let result = parse_line(line);
        if !result.is_empty() {
            return result;
        }
    }
    lines
        .iter()
        .map(|line| parse_line(line))
        .find(|result| !result.is_empty())
        .unwrap_or_default()
}

fn parse_line(line: &str) -> ScoreResult {
    let score = SCORE_REGEX
        .captures(line)
        .and_then(|c| c[1].parse::<f64>().ok())
        .filter(|score| (0.0..=10.0).contains(score));
    let grade = GRADE_REGEX
        .captures(line)
        .and_then(|c| c[1].parse::<Grade>().ok());
    let component_count = COMPONENTS_REGEX
        .captures(line)
        .and_then(|c| c[1].parse::<u64>().ok());
    ScoreResult {
        score,
        grade,
        component_count,
    }
}

/// Counts the `components` list of a CycloneDX JSON document, either at the
/// top level or under a `bom` wrapper. `None` when the file is unreadable,
/// not JSON, or carries no such list.
pub fn count_components(document: &Path) -> Option<u64> {
    let content = fs::read_to_string(document).ok()?;
    let value: Value = serde_json::from_str(&content).ok()?;
    let components = value
        .get("components")
        .and_then(Value::as_array)
        .or_else(|| {
            value
                .get("bom")
                .and_then(|bom| bom.get("components"))
                .and_then(Value::as_array)
        })?;
    Some(components.len() as u64)
}

/// Scores `document` with the external scorer.
///
/// A non-zero scorer exit is a [`StageFailure::Scoring`]. A zero exit with
/// unparsable output is not: it yields whatever fields could be recovered,
/// with the component count taken from the document itself when the scorer
/// did not report one.
pub async fn score(
    scorer: &ScorerConfig,
    document: &Path,
    transcript: &Path,
) -> Result<(ScoreResult, Invocation), StageFailure> {
    let spec = CommandSpec::new(&scorer.program)
        .args(["score", "--profile", scorer.profile.as_str()])
        .arg(document);
    let invocation = process::run(&spec, transcript).await;
    if !invocation.succeeded() {
        return Err(StageFailure::Scoring(format!(
            "{} exited with {}",
            scorer.program, invocation.exit_code
        )));
    }

    let mut result = parse_score_output(&invocation.stdout);
    if result.score.is_none() {
        let from_stderr = parse_score_output(&invocation.stderr);
        if from_stderr.score.is_some() {
            result = from_stderr;
        }
    }
    if result.component_count.is_none() {
        result.component_count = count_components(document);
    }
    Ok((result, invocation))
}
