use crate::subject::SubjectKind;
use crate::tool::Tool;
use std::path::{Path, PathBuf};

/// Where every file of a run lives, relative to the workspace root.
///
/// Each subject owns the paths keyed by its id; nothing else writes there
/// while that subject is being processed.
#[derive(Clone, Debug)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn repos_dir(&self) -> PathBuf {
        self.root.join("repos")
    }

    pub fn checkout_dir(&self, id: &str) -> PathBuf {
        self.repos_dir().join(id)
    }

    pub fn artifact_dir(&self, id: &str) -> PathBuf {
        self.root.join("artifacts").join(id)
    }

    pub fn sboms_root(&self) -> PathBuf {
        self.root.join("sboms")
    }

    pub fn sbom_path(&self, kind: SubjectKind, id: &str, tool: Tool) -> PathBuf {
        self.sboms_root()
            .join(kind.to_string())
            .join(format!("{}.{}.cdx.json", id, tool))
    }

    /// Transcript of one subprocess call; `stage` names the call, e.g.
    /// `git_clone` or `syft.gen`.
    pub fn transcript_path(&self, kind: SubjectKind, id: &str, stage: &str) -> PathBuf {
        self.root
            .join("logs")
            .join(kind.to_string())
            .join(format!("{}__{}.log", id, stage))
    }
}
