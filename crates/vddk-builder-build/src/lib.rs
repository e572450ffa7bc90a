//! vddk-builder のビルドパイプライン
//!
//! アップロードされたビルドコンテキストの展開、単一ビルドスロットによる
//! 同時実行制御、外部ツール（podman / skopeo）によるビルドとプッシュを提供します。

pub mod builder;
pub mod command;
pub mod error;
pub mod orchestrator;
pub mod pusher;
pub mod slot;
pub mod stager;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use builder::{DEFAULT_BUILD_FILE, ImageBuilder, PodmanBuilder};
pub use error::{BuildError, BuildResult, ExtractionError};
pub use orchestrator::{BuildOrchestrator, BuildRequest, BuildStage, OrchestratorSettings};
pub use pusher::{ImagePusher, RegistryCredentials, SkopeoPusher};
pub use slot::{BuildPermit, BuildSlot};
pub use stager::{ArchiveStager, ExtractSummary};
