//! Benchmark configuration.
//!
//! Every field has a default so an empty (or absent) TOML file is a valid
//! configuration. Values given on the command line override the file.

use crate::error::BenchError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Field separator in the subject list.
    pub delimiter: char,
    /// Program used to clone repository subjects.
    pub git: String,
    pub tools: ToolPrograms,
    pub scorer: ScorerConfig,
    pub build: BuildConfig,
    pub dependency_track: DependencyTrackConfig,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            delimiter: ',',
            git: "git".to_string(),
            tools: ToolPrograms::default(),
            scorer: ScorerConfig::default(),
            build: BuildConfig::default(),
            dependency_track: DependencyTrackConfig::default(),
        }
    }
}

/// Program names (or paths) of the generator tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPrograms {
    pub syft: String,
    pub trivy: String,
    pub cdxgen: String,
}

impl Default for ToolPrograms {
    fn default() -> Self {
        Self {
            syft: "syft".to_string(),
            trivy: "trivy".to_string(),
            cdxgen: "cdxgen".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    pub program: String,
    /// Scoring profile passed as `--profile`.
    pub profile: String,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            program: "sbomqs".to_string(),
            profile: "ntia".to_string(),
        }
    }
}

/// How binary subjects are built from a checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Used when the checkout carries no `mvnw` wrapper.
    pub maven: String,
    /// Extensions recognized as build outputs, without the dot.
    pub extensions: Vec<String>,
    /// Directory, relative to the checkout, scanned for build outputs.
    pub output_dir: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            maven: "mvn".to_string(),
            extensions: vec!["jar".to_string(), "war".to_string()],
            output_dir: "target".to_string(),
        }
    }
}

/// Connection settings for the Dependency-Track server used by `upload`
/// and `metrics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencyTrackConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub project_version: String,
    /// Pause between consecutive uploads.
    pub upload_delay_secs: u64,
    pub timeout_secs: u64,
}

impl Default for DependencyTrackConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8081".to_string(),
            api_key: None,
            project_version: "1.0".to_string(),
            upload_delay_secs: 2,
            timeout_secs: 120,
        }
    }
}

impl BenchConfig {
    /// Loads the configuration from `path`, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, BenchError> {
        let config = match path {
            Some(path) => {
                let content = fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;
                toml::from_str::<BenchConfig>(&content).map_err(|source| {
                    BenchError::ConfigParse {
                        path: path.to_path_buf(),
                        source,
                    }
                })?
            }
            None => BenchConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BenchError> {
        if self.delimiter.is_whitespace() || self.delimiter == '#' {
            return Err(config_error(
                "delimiter",
                "must be a visible character other than '#'",
            ));
        }
        if self.git.trim().is_empty() {
            return Err(config_error("git", "must not be empty"));
        }
        for (field, program) in [
            ("tools.syft", &self.tools.syft),
            ("tools.trivy", &self.tools.trivy),
            ("tools.cdxgen", &self.tools.cdxgen),
            ("scorer.program", &self.scorer.program),
            ("build.maven", &self.build.maven),
        ] {
            if program.trim().is_empty() {
                return Err(config_error(field, "must not be empty"));
            }
        }
        if self.build.extensions.is_empty() {
            return Err(config_error(
                "build.extensions",
                "at least one extension required",
            ));
        }
        if !(self.dependency_track.url.starts_with("http://")
            || self.dependency_track.url.starts_with("https://"))
        {
            return Err(config_error(
                "dependency_track.url",
                "must start with http:// or https://",
            ));
        }
        if self.dependency_track.timeout_secs == 0 {
            return Err(config_error("dependency_track.timeout_secs", "must be > 0"));
        }
        Ok(())
    }
}

fn config_error(field: &str, reason: &str) -> BenchError {
    BenchError::Config {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
