pub mod acquire;
pub mod config;
pub mod dtrack;
pub mod error;
pub mod layout;
pub mod logging;
pub mod pipeline;
pub mod process;
pub mod score;
pub mod sink;
pub mod subject;
pub mod tool;

pub use config::BenchConfig;
pub use dtrack::{collect_metrics, upload_documents};
pub use error::{BenchError, StageFailure};
pub use layout::Layout;
pub use pipeline::{RunOptions, RunSummary, run_benchmark};
pub use subject::SubjectKind;
pub use tool::Tool;
