use crate::error::BenchError;
use crate::score::ScoreResult;
use crate::tool::Tool;
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub const RESULT_HEADER: [&str; 6] = [
    "subject",
    "tool",
    "generation_elapsed_seconds",
    "quality_score",
    "grade",
    "component_count",
];

/// The outcome of one (subject, tool) pair. Stages that failed or never ran
/// leave their fields `None`.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultRow {
    pub subject_id: String,
    pub tool: Tool,
    pub generation_elapsed: Option<f64>,
    pub score: ScoreResult,
}

impl ResultRow {
    pub fn blank(subject_id: &str, tool: Tool) -> Self {
        Self {
            subject_id: subject_id.to_string(),
            tool,
            generation_elapsed: None,
            score: ScoreResult::default(),
        }
    }

    /// The row as table cells; unknown values are empty strings.
    pub fn cells(&self) -> [String; 6] {
        [
            self.subject_id.clone(),
            self.tool.to_string(),
            self.generation_elapsed
                .map(|elapsed| format!("{:.3}", elapsed))
                .unwrap_or_default(),
            self.score
                .score
                .map(|score| format!("{:.4}", score))
                .unwrap_or_default(),
            self.score
                .grade
                .map(|grade| grade.to_string())
                .unwrap_or_default(),
            self.score
                .component_count
                .map(|count| count.to_string())
                .unwrap_or_default(),
        ]
    }
}

/// Writes result rows as they are finalized.
///
/// The table is created fresh when the sink is opened; rows of earlier runs
/// are never merged in.
pub struct ResultSink<W: Write> {
    writer: csv::Writer<W>,
    rows_written: usize,
}

impl ResultSink<File> {
    pub fn create(path: &Path) -> Result<Self, BenchError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| BenchError::io(parent, e))?;
        }
        let file = File::create(path).map_err(|e| BenchError::io(path, e))?;
        Self::from_writer(file)
    }
}

impl<W: Write> ResultSink<W> {
    pub fn from_writer(inner: W) -> Result<Self, BenchError> {
        let mut writer = csv::Writer::from_writer(inner);
        writer.write_record(RESULT_HEADER)?;
        writer.flush().map_err(csv::Error::from)?;
        Ok(Self {
            writer,
            rows_written: 0,
        })
    }

    pub fn write_row(&mut self, row: &ResultRow) -> Result<(), BenchError> {
        self.writer.write_record(row.cells())?;
        self.writer.flush().map_err(csv::Error::from)?;
        self.rows_written += 1;
        Ok(())
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    pub fn into_inner(self) -> Result<W, BenchError> {
        self.writer
            .into_inner()
            .map_err(|e| BenchError::Csv(csv::Error::from(e.into_error())))
    }
}
