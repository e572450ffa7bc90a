//! ビルドパイプライン
//!
//! スロットを取得済みのリクエスト 1 件について
//! `Staging -> Extracting -> Building -> Pushing -> CleaningUp -> Done`
//! を一方向に進めます。どのステージで失敗しても CleaningUp と
//! スロット解放は必ず実行されます。

use crate::builder::ImageBuilder;
use crate::error::{BuildError, BuildResult};
use crate::pusher::{ImagePusher, RegistryCredentials};
use crate::slot::BuildPermit;
use crate::stager::ArchiveStager;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// パイプラインのステージ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Staging,
    Extracting,
    Building,
    Pushing,
    CleaningUp,
    Done,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildStage::Staging => "staging",
            BuildStage::Extracting => "extracting",
            BuildStage::Building => "building",
            BuildStage::Pushing => "pushing",
            BuildStage::CleaningUp => "cleaning-up",
            BuildStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// 受け付け済みのビルド要求
#[derive(Clone)]
pub struct BuildRequest {
    /// アップロードされた tar.gz（パイプライン終了時に削除される）
    pub archive_path: PathBuf,
    /// デフォルトのイメージ名を上書きする名前
    pub image_name: Option<String>,
    /// 認可に使った Bearer トークン（プッシュの認証にも流用）
    pub credential: Option<String>,
}

impl BuildRequest {
    pub fn new(archive_path: impl Into<PathBuf>) -> Self {
        Self {
            archive_path: archive_path.into(),
            image_name: None,
            credential: None,
        }
    }

    /// 空文字列は未指定として扱う
    pub fn with_image_name(mut self, image_name: Option<String>) -> Self {
        self.image_name = image_name.filter(|name| !name.is_empty());
        self
    }

    pub fn with_credential(mut self, credential: Option<String>) -> Self {
        self.credential = credential.filter(|token| !token.is_empty());
        self
    }
}

impl fmt::Debug for BuildRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildRequest")
            .field("archive_path", &self.archive_path)
            .field("image_name", &self.image_name)
            .field("credential", &self.credential.as_ref().map(|_| "***"))
            .finish()
    }
}

/// パイプラインの固定設定
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// プッシュ先レジストリのホスト
    pub registry_host: String,
    /// リクエストで指定が無いときのイメージ名
    pub default_image_name: String,
    /// 展開先（全ビルドで同じディレクトリを使い回す）
    pub staging_dir: PathBuf,
}

/// ビルドパイプライン本体
pub struct BuildOrchestrator {
    settings: OrchestratorSettings,
    builder: Arc<dyn ImageBuilder>,
    pusher: Arc<dyn ImagePusher>,
}

impl BuildOrchestrator {
    pub fn new(
        settings: OrchestratorSettings,
        builder: Arc<dyn ImageBuilder>,
        pusher: Arc<dyn ImagePusher>,
    ) -> Self {
        Self {
            settings,
            builder,
            pusher,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// `{registry_host}/{image_name}` 形式のタグ
    pub fn image_tag(&self, image_name: Option<&str>) -> String {
        let name = image_name
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.settings.default_image_name);
        format!("{}/{}", self.settings.registry_host, name)
    }

    /// パイプラインを別タスクで開始
    ///
    /// 結果はログにのみ残る。`JoinHandle` はテストや呼び出し側の待機用。
    pub fn spawn(
        self: &Arc<Self>,
        request: BuildRequest,
        permit: BuildPermit,
    ) -> JoinHandle<BuildResult<String>> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move { orchestrator.run(request, permit).await })
    }

    /// パイプラインを最後まで実行
    ///
    /// `permit` はこの関数を抜けるとき（パニック時を含む）に解放される。
    pub async fn run(&self, request: BuildRequest, permit: BuildPermit) -> BuildResult<String> {
        let span = tracing::info_span!("build", archive = %request.archive_path.display());

        async move {
            let result = {
                let mut staging =
                    StagingArea::new(&self.settings.staging_dir, &request.archive_path);
                let result = self.execute(&request, &staging).await;

                tracing::info!(stage = %BuildStage::CleaningUp, "Cleaning up...");
                staging.cleanup();
                result
            };

            match &result {
                Ok(tag) => {
                    tracing::info!(stage = %BuildStage::Done, tag = %tag, "Image build and push completed successfully")
                }
                Err(e) => {
                    tracing::error!(stage = %BuildStage::Done, failed_at = %e.stage(), "Build pipeline failed: {}", e)
                }
            }

            drop(permit);
            result
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, request: &BuildRequest, staging: &StagingArea) -> BuildResult<String> {
        tracing::info!(stage = %BuildStage::Staging, "Preparing staging directory");
        staging.prepare()?;

        tracing::info!(stage = %BuildStage::Extracting, "Extracting uploaded file...");
        let archive = request.archive_path.clone();
        let dest = staging.dir().to_path_buf();
        let summary = tokio::task::spawn_blocking(move || ArchiveStager::extract(&archive, &dest))
            .await
            .map_err(|e| BuildError::ExtractionAborted(e.to_string()))??;
        tracing::debug!("Extracted {} files", summary.files);

        let tag = self.image_tag(request.image_name.as_deref());

        tracing::info!(stage = %BuildStage::Building, tag = %tag, "Building image");
        self.builder.build(staging.dir(), &tag).await?;

        tracing::info!(stage = %BuildStage::Pushing, tag = %tag, "Pushing image");
        let credentials = request
            .credential
            .as_deref()
            .map(RegistryCredentials::from_token);
        self.pusher.push(&tag, credentials.as_ref()).await?;

        Ok(tag)
    }
}

/// ステージングディレクトリとアップロードファイルの所有者
///
/// `cleanup` を呼ばずにドロップされた場合（パニック時など）もドロップで削除する。
struct StagingArea {
    dir: PathBuf,
    archive: PathBuf,
    cleaned: bool,
}

impl StagingArea {
    fn new(dir: &Path, archive: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            archive: archive.to_path_buf(),
            cleaned: false,
        }
    }

    fn dir(&self) -> &Path {
        &self.dir
    }

    /// 前回の残骸を消して空のディレクトリを作る
    fn prepare(&self) -> BuildResult<()> {
        let staging_err = |source| BuildError::StagingIo {
            path: self.dir.clone(),
            source,
        };

        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => tracing::warn!("Removed leftover staging directory {}", self.dir.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(staging_err(e)),
        }

        std::fs::create_dir_all(&self.dir).map_err(staging_err)
    }

    fn cleanup(&mut self) {
        if self.cleaned {
            return;
        }
        self.cleaned = true;

        remove_logged(&self.dir, "extracted directory", |p| std::fs::remove_dir_all(p));
        remove_logged(&self.archive, "tar.gz file", |p| std::fs::remove_file(p));
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn remove_logged(path: &Path, what: &str, remove: fn(&Path) -> io::Result<()>) {
    match remove(path) {
        Ok(()) => tracing::debug!("Removed {} {}", what, path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove {} {}: {}", what, path.display(), e),
    }
}
