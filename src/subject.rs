use crate::error::BenchError;
use clap::ValueEnum;
use std::collections::HashMap;
use std::fmt::Display;
use std::fs;
use std::path::{Component, Path};
use std::str::FromStr;
use tracing::warn;

const UNNAMED_ID: &str = "_";

/// What a subject list line refers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
pub enum SubjectKind {
    /// A source repository, scanned as a checked-out working tree.
    Repo,
    /// A container image reference, scanned as-is.
    Image,
    /// A compiled package: either a local file or a repository to build.
    Binary,
}

impl FromStr for SubjectKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "repo" => Ok(SubjectKind::Repo),
            "image" => Ok(SubjectKind::Image),
            "binary" => Ok(SubjectKind::Binary),
            _ => Err(()),
        }
    }
}

impl Display for SubjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let str = match self {
            SubjectKind::Repo => "repo",
            SubjectKind::Image => "image",
            SubjectKind::Binary => "binary",
        };
        write!(f, "{}", str)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subject {
    /// Namespace key for every file produced for this subject.
    pub id: String,
    pub locator: String,
    pub kind: SubjectKind,
}

/// Reads and parses the subject list at `path`.
///
/// A missing file or a list without a single subject is fatal: there is
/// nothing to benchmark.
pub fn load_subjects(
    path: &Path,
    kind: SubjectKind,
    delimiter: char,
) -> Result<Vec<Subject>, BenchError> {
    let content = fs::read_to_string(path).map_err(|e| BenchError::Registry {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let subjects = parse_subjects(&content, kind, delimiter);
    if subjects.is_empty() {
        return Err(BenchError::Registry {
            path: path.to_path_buf(),
            reason: "no subjects listed".to_string(),
        });
    }
    Ok(subjects)
}

/// Parses a subject listing, preserving line order.
///
/// Each non-blank line not starting with `#` is either `name<delimiter>locator`
/// or a bare `locator`.
pub fn parse_subjects(content: &str, kind: SubjectKind, delimiter: char) -> Vec<Subject> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut subjects = vec![];
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (name, locator) = match line.split_once(delimiter) {
            Some((name, locator)) => (name.trim(), locator.trim()),
            None => ("", line),
        };
        if locator.is_empty() {
            warn!(line, "skipping subject line without a locator");
            continue;
        }
        let base_id = match sanitize(name) {
            Some(id) => id,
            None => {
                if !name.is_empty() {
                    warn!(name, locator, "subject name is not a usable directory name, deriving one");
                }
                derive_id(locator, kind)
            }
        };
        let occurrences = seen.entry(base_id.clone()).or_insert(0);
        *occurrences += 1;
        let id = match *occurrences {
            1 => base_id,
            n => {
                let id = format!("{}-{}", base_id, n);
                warn!(subject = %id, locator, "duplicate subject id, renamed");
                id
            }
        };
        subjects.push(Subject {
            id,
            locator: locator.to_string(),
            kind,
        });
    }
    subjects
}

/// Derives a subject id from its locator.
///
/// Image references keep their tag (`nginx:1.27` → `nginx_1.27`) since the
/// bare name collides across tags; everything else uses the final path
/// segment without a `.git` or `@version` suffix.
pub fn derive_id(locator: &str, kind: SubjectKind) -> String {
    if kind == SubjectKind::Image {
        return sanitize(locator).unwrap_or_else(|| UNNAMED_ID.to_string());
    }
    let segment = locator
        .trim_end_matches('/')
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(locator);
    let segment = segment.split_once('@').map_or(segment, |(name, _)| name);
    let segment = segment.strip_suffix(".git").unwrap_or(segment);
    sanitize(segment)
        .or_else(|| sanitize(locator))
        .unwrap_or_else(|| UNNAMED_ID.to_string())
}

/// Rewrites `value` into a single normal path component, or `None` when
/// nothing usable is left (empty, `.` or `..`).
fn sanitize(value: &str) -> Option<String> {
    let id = value.replace('/', "__").replace([':', '\\'], "_");
    let mut components = Path::new(&id).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Some(id),
        _ => None,
    }
}
