//! Error types.
//!
//! [`BenchError`] is the fatal tier: anything that stops a whole command.
//! [`StageFailure`] is the per-subject / per-tool tier, always caught by the
//! orchestrator and turned into blank cells in the result table.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    /// The subject list could not be read or produced nothing to benchmark.
    #[error("subject list {path}: {reason}")]
    Registry { path: PathBuf, reason: String },

    #[error("config error: {field}: {reason}")]
    Config { field: String, reason: String },

    #[error("config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("required programs not found: {}", .0.join(", "))]
    MissingPrograms(Vec<String>),

    #[error("no SBOM documents found under {0}")]
    NoDocuments(PathBuf),

    #[error("io error: {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl BenchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BenchError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A failure isolated to one subject or one (subject, tool) pair.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StageFailure {
    /// Clone or build failed, or the build left no recognizable artifact.
    #[error("acquisition failed: {0}")]
    Acquisition(String),

    /// Generator exited non-zero, or exited zero without writing its document.
    #[error("generation failed: {0}")]
    Generation(String),

    /// Scorer exited non-zero.
    #[error("scoring failed: {0}")]
    Scoring(String),
}

impl StageFailure {
    pub fn stage(&self) -> &'static str {
        match self {
            StageFailure::Acquisition(_) => "acquisition",
            StageFailure::Generation(_) => "generation",
            StageFailure::Scoring(_) => "scoring",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_programs_lists_every_name() {
        let err = BenchError::MissingPrograms(vec!["syft".to_string(), "sbomqs".to_string()]);
        assert_eq!(err.to_string(), "required programs not found: syft, sbomqs");
    }

    #[test]
    fn stage_names() {
        assert_eq!(StageFailure::Acquisition(String::new()).stage(), "acquisition");
        assert_eq!(StageFailure::Generation(String::new()).stage(), "generation");
        assert_eq!(StageFailure::Scoring(String::new()).stage(), "scoring");
    }
}
