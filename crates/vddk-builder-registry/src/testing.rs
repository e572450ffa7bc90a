//! テスト用の `ImageProbe`

use crate::error::{ProbeError, Result};
use crate::probe::{ImageProbe, split_image_name};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

/// 問い合わせ 1 件の記録
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeCall {
    pub name: String,
    pub tag: String,
    pub token: Option<String>,
}

/// メモリ上のタグ一覧で答えるプローブ
#[derive(Debug, Default)]
pub struct StaticProbe {
    existing: Mutex<HashSet<String>>,
    unreachable: bool,
    calls: Mutex<Vec<ProbeCall>>,
}

impl StaticProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// 常に 502 応答扱いのエラーを返す
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    /// `name:tag` 形式で存在するイメージを追加
    pub fn insert(&self, reference: impl Into<String>) {
        self.existing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(reference.into());
    }

    pub fn calls(&self) -> Vec<ProbeCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ImageProbe for StaticProbe {
    async fn image_exists(&self, image: &str, token: Option<&str>) -> Result<bool> {
        let (name, tag) = split_image_name(image);
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ProbeCall {
                name: name.to_string(),
                tag: tag.to_string(),
                token: token.map(str::to_string),
            });

        if self.unreachable {
            return Err(ProbeError::UnexpectedStatus(502));
        }

        let reference = format!("{}:{}", name, tag);
        Ok(self
            .existing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&reference))
    }
}
