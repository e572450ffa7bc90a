//! Delegated permission checks
//!
//! The caller's own token is used to ask the Kubernetes API server what that
//! identity is allowed to do (`SelfSubjectAccessReview`).

use crate::error::{AuthError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Answers "may the identity behind `token` perform `verb` on `resource`"
#[async_trait]
pub trait AccessReviewer: Send + Sync {
    async fn check_access(&self, token: &str, verb: &str, resource: &str) -> Result<bool>;
}

const REVIEW_PATH: &str = "/apis/authorization.k8s.io/v1/selfsubjectaccessreviews";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SelfSubjectAccessReview<'a> {
    api_version: &'static str,
    kind: &'static str,
    spec: ReviewSpec<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReviewSpec<'a> {
    resource_attributes: ResourceAttributes<'a>,
}

#[derive(Debug, Serialize)]
struct ResourceAttributes<'a> {
    verb: &'a str,
    resource: &'a str,
}

#[derive(Debug, Deserialize)]
struct ReviewResponse {
    #[serde(default)]
    status: Option<ReviewStatus>,
}

#[derive(Debug, Deserialize)]
struct ReviewStatus {
    #[serde(default)]
    allowed: bool,
    #[serde(default)]
    reason: Option<String>,
}

/// `SelfSubjectAccessReview` against the Kubernetes REST API
///
/// TLS verification is disabled: the in-cluster API server presents a
/// certificate signed by the cluster CA, which this service does not load.
#[derive(Debug, Clone)]
pub struct KubeAccessReviewer {
    api_server: String,
    client: reqwest::Client,
}

impl KubeAccessReviewer {
    pub fn new(api_server: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(AuthError::ClientBuild)?;

        Ok(Self {
            api_server: api_server.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn review_url(&self) -> String {
        format!("{}{}", self.api_server, REVIEW_PATH)
    }
}

#[async_trait]
impl AccessReviewer for KubeAccessReviewer {
    async fn check_access(&self, token: &str, verb: &str, resource: &str) -> Result<bool> {
        let review = SelfSubjectAccessReview {
            api_version: "authorization.k8s.io/v1",
            kind: "SelfSubjectAccessReview",
            spec: ReviewSpec {
                resource_attributes: ResourceAttributes { verb, resource },
            },
        };

        let response = self
            .client
            .post(self.review_url())
            .bearer_auth(token)
            .json(&review)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::UnexpectedStatus(status.as_u16()));
        }

        let body: ReviewResponse = response.json().await?;
        let (allowed, reason) = body
            .status
            .map(|s| (s.allowed, s.reason))
            .unwrap_or((false, None));

        tracing::debug!(
            verb,
            resource,
            allowed,
            reason = reason.as_deref().unwrap_or(""),
            "Access review completed"
        );

        Ok(allowed)
    }
}
