use crate::command::ToolCommand;
use crate::error::{BuildError, Result};
use async_trait::async_trait;
use std::path::Path;

/// ビルドレシピのデフォルトファイル名
pub const DEFAULT_BUILD_FILE: &str = "Containerfile.vddk";

/// イメージビルドの抽象
///
/// 展開済みのビルドコンテキストから `tag` のイメージを作る。
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    async fn build(&self, context_dir: &Path, tag: &str) -> Result<()>;
}

/// `podman build` によるビルド
#[derive(Debug, Clone)]
pub struct PodmanBuilder {
    program: String,
    build_file: String,
}

impl Default for PodmanBuilder {
    fn default() -> Self {
        Self::new("podman", DEFAULT_BUILD_FILE)
    }
}

impl PodmanBuilder {
    pub fn new(program: impl Into<String>, build_file: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            build_file: build_file.into(),
        }
    }

    fn command(&self, context_dir: &Path, tag: &str) -> ToolCommand {
        ToolCommand::new(&self.program)
            .arg("build")
            .arg("-f")
            .arg(&self.build_file)
            .arg("-t")
            .arg(tag)
            .arg(context_dir.display().to_string())
    }
}

#[async_trait]
impl ImageBuilder for PodmanBuilder {
    async fn build(&self, context_dir: &Path, tag: &str) -> Result<()> {
        tracing::info!("Building image: {}", tag);

        let cmd = self.command(context_dir, tag);
        let run = cmd.run().await.map_err(|e| BuildError::BuildTool {
            tag: tag.to_string(),
            status: format!("failed to start {}: {}", cmd.program(), e),
            output: String::new(),
        })?;

        if !run.success() {
            return Err(BuildError::BuildTool {
                tag: tag.to_string(),
                status: run.status.to_string(),
                output: run.combined,
            });
        }

        tracing::info!("Successfully built: {}", tag);
        Ok(())
    }
}
