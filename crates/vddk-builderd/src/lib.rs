//! vddk-builderd
//!
//! HTTPS front end that accepts a build context upload, runs one build at a
//! time, and answers whether an image is already present in the registry.

pub mod error;
pub mod handlers;
pub mod tls;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use std::path::PathBuf;
use std::sync::Arc;
use vddk_builder_auth::AuthorizationGate;
use vddk_builder_build::{BuildOrchestrator, BuildSlot};
use vddk_builder_registry::ImageProbe;

pub use error::ApiError;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<AuthorizationGate>,
    pub slot: BuildSlot,
    pub orchestrator: Arc<BuildOrchestrator>,
    pub probe: Arc<dyn ImageProbe>,
    pub upload_dir: PathBuf,
}

/// Routes for `/upload` and `/check-image`
///
/// Other methods on either path are answered with `405`.
pub fn app(state: AppState, upload_max_bytes: usize) -> Router {
    Router::new()
        .route("/upload", post(handlers::upload))
        .route("/check-image", get(handlers::check_image))
        .layer(DefaultBodyLimit::max(upload_max_bytes))
        .with_state(state)
}
