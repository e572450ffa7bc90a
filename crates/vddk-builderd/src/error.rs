//! HTTP-facing errors
//!
//! Every admission failure is answered synchronously with a plain-text body.
//! Failures after a build has been dispatched never reach this type; they are
//! only logged by the orchestrator.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::path::PathBuf;
use thiserror::Error;
use vddk_builder_auth::DenialReason;
use vddk_builder_registry::ProbeError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    AuthorizationDenied(DenialReason),

    #[error("Server is busy processing another build. Please try again later.")]
    SlotBusy,

    #[error("{0}")]
    MalformedRequest(&'static str),

    #[error("Failed to save file")]
    StagingIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error checking image: {0}")]
    Probe(#[from] ProbeError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::AuthorizationDenied(_) => StatusCode::UNAUTHORIZED,
            ApiError::SlotBusy => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::StagingIo { .. } | ApiError::Probe(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::StagingIo { path, source } => {
                tracing::error!("Failed to save upload {}: {}", path.display(), source)
            }
            ApiError::Probe(e) => tracing::error!("Registry probe failed: {}", e),
            _ => tracing::debug!(status = status.as_u16(), "Request rejected: {}", self),
        }

        (status, format!("{}\n", self)).into_response()
    }
}
