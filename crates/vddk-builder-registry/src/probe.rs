//! マニフェストの存在確認

use crate::error::{ProbeError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use std::time::Duration;

/// Docker v2 と OCI の両方のマニフェストを受け付ける
pub const MANIFEST_ACCEPT: &str =
    "application/vnd.docker.distribution.manifest.v2+json, application/vnd.oci.image.manifest.v1+json";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// イメージ存在確認の抽象
#[async_trait]
pub trait ImageProbe: Send + Sync {
    /// `image`（`name` または `name:tag`）がレジストリに存在するか
    async fn image_exists(&self, image: &str, token: Option<&str>) -> Result<bool>;
}

/// イメージ名とタグを分離
///
/// `:` でちょうど 2 つに分かれる場合のみ後半をタグとみなし、
/// それ以外は `latest` を補う。
///
/// # Examples
/// - `vddk` -> `("vddk", "latest")`
/// - `vddk:v2` -> `("vddk", "v2")`
pub fn split_image_name(image: &str) -> (&str, &str) {
    let mut parts = image.split(':');
    let name = parts.next().unwrap_or(image);
    match (parts.next(), parts.next()) {
        (Some(tag), None) => (name, tag),
        _ => (name, "latest"),
    }
}

/// レジストリの `/v2/<name>/manifests/<tag>` に HEAD を送るプローブ
///
/// クラスタ内レジストリは自己署名証明書のため、TLS 検証は無効にする。
#[derive(Debug, Clone)]
pub struct RegistryProbe {
    base_url: String,
    client: reqwest::Client,
}

impl RegistryProbe {
    /// `registry_host`（例: `registry.local:5000`）に HTTPS で問い合わせる
    pub fn new(registry_host: &str) -> Result<Self> {
        Self::with_base_url(format!("https://{}", registry_host))
    }

    /// スキーム込みのベース URL を指定
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ProbeError::ClientBuild)?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn manifest_url(&self, image: &str) -> String {
        let (name, tag) = split_image_name(image);
        format!("{}/v2/{}/manifests/{}", self.base_url, name, tag)
    }
}

#[async_trait]
impl ImageProbe for RegistryProbe {
    async fn image_exists(&self, image: &str, token: Option<&str>) -> Result<bool> {
        let url = self.manifest_url(image);
        tracing::debug!("Probing manifest: {}", url);

        let mut request = self.client.head(&url).header(ACCEPT, MANIFEST_ACCEPT);
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            other => Err(ProbeError::UnexpectedStatus(other.as_u16())),
        }
    }
}
