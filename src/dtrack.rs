//! Dependency-Track upload and metrics read-back.
//!
//! Every document under `sboms/<kind>/` becomes one project named
//! `<prefix>.<app>.<tool>`, where the document file is `<app>.<tool>.cdx.json`.

use crate::config::DependencyTrackConfig;
use crate::error::BenchError;
use crate::layout::Layout;
use crate::subject::SubjectKind;
use clap::ValueEnum;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const UPLOAD_TABLE: &str = "result-upload-dtrack.csv";

const DOCUMENT_SUFFIX: &str = ".cdx.json";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BomDocument {
    pub kind: SubjectKind,
    pub path: PathBuf,
    pub project: String,
}

/// Splits `<app>.<tool>.cdx.json` into `(app, tool)`. The app part may
/// itself contain dots.
pub fn derive_app_and_tool(file_name: &str) -> Option<(&str, &str)> {
    let stem = file_name.strip_suffix(DOCUMENT_SUFFIX)?;
    let (app, tool) = stem.rsplit_once('.')?;
    if app.is_empty() || tool.is_empty() {
        return None;
    }
    Some((app, tool))
}

pub fn project_name(kind: SubjectKind, file_name: &str) -> Option<String> {
    let prefix = match kind {
        SubjectKind::Repo => "src",
        SubjectKind::Image => "image",
        SubjectKind::Binary => "binary",
    };
    derive_app_and_tool(file_name).map(|(app, tool)| format!("{}.{}.{}", prefix, app, tool))
}

/// Lists the generated documents, kinds in declaration order and file names
/// ascending within a kind. File names that do not follow the naming scheme
/// are skipped.
pub fn find_documents(layout: &Layout) -> Result<Vec<BomDocument>, BenchError> {
    let mut documents = Vec::new();
    for kind in SubjectKind::value_variants() {
        let dir = layout.sboms_root().join(kind.to_string());
        if !dir.is_dir() {
            continue;
        }
        let mut paths = fs::read_dir(&dir)
            .map_err(|e| BenchError::io(&dir, e))?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.is_file())
            .collect::<Vec<_>>();
        paths.sort();
        for path in paths {
            let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if !file_name.ends_with(DOCUMENT_SUFFIX) {
                continue;
            }
            match project_name(*kind, file_name) {
                Some(project) => documents.push(BomDocument {
                    kind: *kind,
                    project,
                    path,
                }),
                None => warn!(document = %path.display(), "skipping document with unexpected name"),
            }
        }
    }
    if documents.is_empty() {
        return Err(BenchError::NoDocuments(layout.sboms_root()));
    }
    Ok(documents)
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Ok,
    Fail,
    Unknown,
}

impl Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let str = match self {
            UploadStatus::Ok => "ok",
            UploadStatus::Fail => "fail",
            UploadStatus::Unknown => "unknown",
        };
        write!(f, "{}", str)
    }
}

/// One line of the upload table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub project: String,
    pub status: UploadStatus,
    pub risk_score: Option<f64>,
    pub total_vulnerabilities: Option<u64>,
    pub critical: Option<u64>,
    pub high: Option<u64>,
    pub medium: Option<u64>,
    pub low: Option<u64>,
    pub unassigned: Option<u64>,
}

impl UploadRecord {
    pub fn new(project: &str, status: UploadStatus) -> Self {
        Self {
            project: project.to_string(),
            status,
            risk_score: None,
            total_vulnerabilities: None,
            critical: None,
            high: None,
            medium: None,
            low: None,
            unassigned: None,
        }
    }

    /// Replaces every metric cell; `None` blanks them.
    pub fn apply_metrics(&mut self, metrics: Option<&ProjectMetrics>) {
        self.risk_score = metrics.and_then(|m| m.inherited_risk_score);
        self.total_vulnerabilities = metrics.and_then(|m| m.vulnerabilities);
        self.critical = metrics.and_then(|m| m.critical);
        self.high = metrics.and_then(|m| m.high);
        self.medium = metrics.and_then(|m| m.medium);
        self.low = metrics.and_then(|m| m.low);
        self.unassigned = metrics.and_then(|m| m.unassigned);
    }
}

/// Subset of the server's current project metrics.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectMetrics {
    pub inherited_risk_score: Option<f64>,
    pub vulnerabilities: Option<u64>,
    pub critical: Option<u64>,
    pub high: Option<u64>,
    pub medium: Option<u64>,
    pub low: Option<u64>,
    pub unassigned: Option<u64>,
}

#[derive(Deserialize)]
struct ProjectRef {
    uuid: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server answered {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Thin client over the three Dependency-Track endpoints the benchmark uses.
pub struct DependencyTrackClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    project_version: String,
}

impl DependencyTrackClient {
    pub fn new(config: &DependencyTrackConfig) -> Result<Self, BenchError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| BenchError::Config {
                field: "dependency_track.api_key".to_string(),
                reason: "required for upload and metrics".to_string(),
            })?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key,
            project_version: config.project_version.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path)
    }

    pub async fn upload_bom(&self, project: &str, document: &Path) -> Result<(), TrackerError> {
        let bytes = tokio::fs::read(document)
            .await
            .map_err(|source| TrackerError::Read {
                path: document.to_path_buf(),
                source,
            })?;
        let file_name = document
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "bom.json".to_string());
        let form = Form::new()
            .text("autoCreate", "true")
            .text("projectName", project.to_string())
            .text("projectVersion", self.project_version.clone())
            .part("bom", Part::bytes(bytes).file_name(file_name));
        let response = self
            .http
            .post(self.endpoint("bom"))
            .header("X-Api-Key", &self.api_key)
            .multipart(form)
            .send()
            .await?;
        check_status(response).await.map(|_| ())
    }

    pub async fn lookup_project(&self, project: &str) -> Result<String, TrackerError> {
        let response = self
            .http
            .get(self.endpoint("project/lookup"))
            .header("X-Api-Key", &self.api_key)
            .query(&[("name", project), ("version", self.project_version.as_str())])
            .send()
            .await?;
        let found: ProjectRef = check_status(response).await?.json().await?;
        Ok(found.uuid)
    }

    pub async fn current_metrics(&self, uuid: &str) -> Result<ProjectMetrics, TrackerError> {
        let response = self
            .http
            .get(self.endpoint(&format!("metrics/project/{}/current", uuid)))
            .header("X-Api-Key", &self.api_key)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    pub async fn project_metrics(&self, project: &str) -> Result<ProjectMetrics, TrackerError> {
        let uuid = self.lookup_project(project).await?;
        debug!(project, uuid = %uuid, "project found");
        self.current_metrics(&uuid).await
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, TrackerError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TrackerError::Status { status, body })
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub uploaded: usize,
    pub failed: usize,
}

/// Uploads every document and writes a fresh upload table at `table`.
pub async fn upload_documents(
    layout: &Layout,
    config: &DependencyTrackConfig,
    table: &Path,
) -> Result<UploadSummary, BenchError> {
    let documents = find_documents(layout)?;
    let client = DependencyTrackClient::new(config)?;
    let mut summary = UploadSummary::default();
    let mut records = Vec::with_capacity(documents.len());

    for (index, document) in documents.iter().enumerate() {
        if index > 0 && config.upload_delay_secs > 0 {
            tokio::time::sleep(Duration::from_secs(config.upload_delay_secs)).await;
        }
        let status = match client.upload_bom(&document.project, &document.path).await {
            Ok(()) => {
                info!(project = %document.project, "uploaded");
                summary.uploaded += 1;
                UploadStatus::Ok
            }
            Err(e) => {
                warn!(project = %document.project, "upload failed: {}", e);
                summary.failed += 1;
                UploadStatus::Fail
            }
        };
        records.push(UploadRecord::new(&document.project, status));
    }

    write_table(table, &records)?;
    info!(
        uploaded = summary.uploaded,
        failed = summary.failed,
        table = %table.display(),
        "upload finished"
    );
    Ok(summary)
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetricsSummary {
    pub projects: usize,
    pub with_metrics: usize,
}

/// Reads current metrics for every document's project and merges them into
/// the upload table, keeping each row's upload status.
pub async fn collect_metrics(
    layout: &Layout,
    config: &DependencyTrackConfig,
    table: &Path,
) -> Result<MetricsSummary, BenchError> {
    let documents = find_documents(layout)?;
    let client = DependencyTrackClient::new(config)?;
    let mut records = read_table(table)?;
    let mut summary = MetricsSummary::default();

    for document in &documents {
        summary.projects += 1;
        let metrics = match client.project_metrics(&document.project).await {
            Ok(metrics) => {
                summary.with_metrics += 1;
                Some(metrics)
            }
            Err(e) => {
                warn!(project = %document.project, "no metrics: {}", e);
                None
            }
        };
        merge_metrics(&mut records, &document.project, metrics.as_ref());
    }

    write_table(table, &records)?;
    info!(
        projects = summary.projects,
        with_metrics = summary.with_metrics,
        table = %table.display(),
        "metrics collected"
    );
    Ok(summary)
}

pub fn merge_metrics(records: &mut Vec<UploadRecord>, project: &str, metrics: Option<&ProjectMetrics>) {
    match records.iter_mut().find(|record| record.project == project) {
        Some(record) => record.apply_metrics(metrics),
        None => {
            let mut record = UploadRecord::new(project, UploadStatus::Unknown);
            record.apply_metrics(metrics);
            records.push(record);
        }
    }
}

/// Existing upload table rows; an absent table reads as empty.
pub fn read_table(path: &Path) -> Result<Vec<UploadRecord>, BenchError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::Reader::from_path(path)?;
    let records = reader
        .deserialize::<UploadRecord>()
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

pub fn write_table(path: &Path, records: &[UploadRecord]) -> Result<(), BenchError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| BenchError::io(parent, e))?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush().map_err(|e| BenchError::io(path, e))?;
    Ok(())
}
