use std::path::PathBuf;
use thiserror::Error;

/// アーカイブ展開のエラー
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Failed to open archive {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error reading archive: {0}")]
    Read(#[source] std::io::Error),

    #[error("Archive entry escapes the staging directory: {}", .0.display())]
    UnsafePath(PathBuf),

    #[error("Failed to create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file {}: {source}", path.display())]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Staging directory error ({}): {source}", path.display())]
    StagingIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("build image {tag}: {status}\n{output}")]
    BuildTool {
        tag: String,
        status: String,
        output: String,
    },

    #[error("push image {tag}: {status}\n{output}")]
    PushTool {
        tag: String,
        status: String,
        output: String,
    },

    #[error("Extraction task aborted: {0}")]
    ExtractionAborted(String),
}

impl BuildError {
    /// このエラーが発生したパイプラインのステージ
    pub fn stage(&self) -> crate::BuildStage {
        use crate::BuildStage;
        match self {
            BuildError::StagingIo { .. } => BuildStage::Staging,
            BuildError::Extraction(_) | BuildError::ExtractionAborted(_) => {
                BuildStage::Extracting
            }
            BuildError::BuildTool { .. } => BuildStage::Building,
            BuildError::PushTool { .. } => BuildStage::Pushing,
        }
    }
}

pub type BuildResult<T> = std::result::Result<T, BuildError>;
pub type Result<T> = BuildResult<T>;
