//! テスト用のビルダー / プッシャー
//!
//! 外部コマンドを起動せず、呼び出しを記録するだけの実装です。
//! `test-utils` feature で他クレートのテストからも使えます。

use crate::builder::ImageBuilder;
use crate::error::{BuildError, BuildResult};
use crate::pusher::{ImagePusher, RegistryCredentials};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// `build` 呼び出しの記録
#[derive(Debug, Clone)]
pub struct BuildCall {
    pub context_dir: PathBuf,
    pub tag: String,
    /// 呼び出し時点でコンテキスト直下にあったファイル名
    pub files: Vec<String>,
}

/// `push` 呼び出しの記録
#[derive(Debug, Clone)]
pub struct PushCall {
    pub tag: String,
    pub credentials: Option<RegistryCredentials>,
}

/// ビルドを途中で止めておくためのゲート
#[derive(Debug, Default)]
pub struct BuildGate {
    started: Notify,
    release: Notify,
}

impl BuildGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// ビルドが開始されるまで待つ
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    /// 止めているビルドを進める
    pub fn release(&self) {
        self.release.notify_one();
    }
}

enum Behavior {
    Succeed,
    Fail(String),
    Panic,
}

pub struct RecordingBuilder {
    calls: Mutex<Vec<BuildCall>>,
    behavior: Behavior,
    gate: Option<Arc<BuildGate>>,
}

impl Default for RecordingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBuilder {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            behavior: Behavior::Succeed,
            gate: None,
        }
    }

    pub fn failing(status: impl Into<String>) -> Self {
        Self {
            behavior: Behavior::Fail(status.into()),
            ..Self::new()
        }
    }

    pub fn panicking() -> Self {
        Self {
            behavior: Behavior::Panic,
            ..Self::new()
        }
    }

    /// `gate.release()` が呼ばれるまでビルドを完了させない
    pub fn gated(gate: Arc<BuildGate>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> Vec<BuildCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ImageBuilder for RecordingBuilder {
    async fn build(&self, context_dir: &Path, tag: &str) -> BuildResult<()> {
        let mut files: Vec<String> = std::fs::read_dir(context_dir)
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .map(|entry| entry.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        files.sort();

        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(BuildCall {
                context_dir: context_dir.to_path_buf(),
                tag: tag.to_string(),
                files,
            });

        if let Some(gate) = &self.gate {
            gate.started.notify_one();
            gate.release.notified().await;
        }

        match &self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail(status) => Err(BuildError::BuildTool {
                tag: tag.to_string(),
                status: status.clone(),
                output: "STEP 1/2: FROM scratch\nError: simulated failure".to_string(),
            }),
            Behavior::Panic => panic!("simulated builder panic"),
        }
    }
}

pub struct RecordingPusher {
    calls: Mutex<Vec<PushCall>>,
    fail_with: Option<String>,
}

impl Default for RecordingPusher {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingPusher {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_with: None,
        }
    }

    pub fn failing(status: impl Into<String>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_with: Some(status.into()),
        }
    }

    pub fn calls(&self) -> Vec<PushCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// プッシュ済みのタグ一覧
    pub fn pushed_tags(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.tag).collect()
    }
}

#[async_trait]
impl ImagePusher for RecordingPusher {
    async fn push(&self, tag: &str, credentials: Option<&RegistryCredentials>) -> BuildResult<()> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(PushCall {
                tag: tag.to_string(),
                credentials: credentials.cloned(),
            });

        match &self.fail_with {
            None => Ok(()),
            Some(status) => Err(BuildError::PushTool {
                tag: tag.to_string(),
                status: status.clone(),
                output: "Error writing blob: simulated failure".to_string(),
            }),
        }
    }
}
