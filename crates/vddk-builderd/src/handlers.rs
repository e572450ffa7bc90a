use crate::AppState;
use crate::error::ApiError;
use axum::extract::multipart::{Field, MultipartRejection};
use axum::extract::{Multipart, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use vddk_builder_auth::AuthorizationDecision;
use vddk_builder_build::BuildRequest;

/// Multipart field carrying the build context
pub const FILE_FIELD: &str = "file";

/// Stored name when the client sends no usable file name
pub const DEFAULT_UPLOAD_NAME: &str = "upload.tar.gz";

#[derive(Debug, Default, Deserialize)]
pub struct ImageQuery {
    #[serde(default)]
    pub image: Option<String>,
}

/// Returns the verified credential, `None` when authorization is not enforced
async fn authorize(state: &AppState, headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());

    match state.gate.authorize(header).await {
        AuthorizationDecision::Permitted { credential } => Ok(credential),
        AuthorizationDecision::Denied { reason } => Err(ApiError::AuthorizationDenied(reason)),
    }
}

/// `GET /check-image?image=<name>`
pub async fn check_image(
    State(state): State<AppState>,
    Query(query): Query<ImageQuery>,
    headers: HeaderMap,
) -> Result<(StatusCode, String), ApiError> {
    let image = query
        .image
        .filter(|image| !image.is_empty())
        .ok_or(ApiError::MalformedRequest("Missing 'image' query parameter"))?;

    let credential = authorize(&state, &headers).await?;

    if state.probe.image_exists(&image, credential.as_deref()).await? {
        Ok((
            StatusCode::OK,
            format!("Image {} exists in the registry.\n", image),
        ))
    } else {
        Ok((
            StatusCode::NOT_FOUND,
            format!("Image {} not found in the registry.\n", image),
        ))
    }
}

/// `POST /upload?image=<name>`
///
/// Answers as soon as the archive is on disk; the build itself runs detached
/// and holds the slot until it finishes.
pub async fn upload(
    State(state): State<AppState>,
    Query(query): Query<ImageQuery>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<String, ApiError> {
    let credential = authorize(&state, &headers).await?;

    let permit = state.slot.try_acquire().ok_or_else(|| {
        tracing::info!("Upload rejected: a build is already running");
        ApiError::SlotBusy
    })?;

    let mut multipart = multipart.map_err(|e| {
        tracing::debug!("Upload is not a multipart body: {}", e);
        ApiError::MalformedRequest("Failed to parse file")
    })?;

    let archive_path = receive_file(&mut multipart, &state.upload_dir).await?;
    tracing::info!("File uploaded: {}", archive_path.display());

    let request = BuildRequest::new(&archive_path)
        .with_image_name(query.image)
        .with_credential(credential);
    drop(state.orchestrator.spawn(request, permit));

    Ok(format!("File uploaded successfully: {}\n", archive_path.display()))
}

/// Final path component of the client-supplied name
pub fn upload_file_name(client_name: Option<&str>) -> String {
    client_name
        .and_then(|name| Path::new(name).file_name())
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_UPLOAD_NAME)
        .to_string()
}

async fn receive_file(multipart: &mut Multipart, upload_dir: &Path) -> Result<PathBuf, ApiError> {
    loop {
        let field = multipart.next_field().await.map_err(|e| {
            tracing::debug!("Malformed multipart body: {}", e);
            ApiError::MalformedRequest("Failed to parse file")
        })?;
        let Some(mut field) = field else {
            return Err(ApiError::MalformedRequest("Failed to parse file"));
        };
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let path = upload_dir.join(upload_file_name(field.file_name()));
        if let Err(e) = write_field(&mut field, &path).await {
            if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                if remove_err.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        "Failed to remove partial upload {}: {}",
                        path.display(),
                        remove_err
                    );
                }
            }
            return Err(e);
        }
        return Ok(path);
    }
}

async fn write_field(field: &mut Field<'_>, path: &Path) -> Result<(), ApiError> {
    let staging_io = |source| ApiError::StagingIo {
        path: path.to_path_buf(),
        source,
    };

    let mut file = tokio::fs::File::create(path).await.map_err(staging_io)?;

    while let Some(chunk) = field.chunk().await.map_err(|e| {
        tracing::debug!("Upload stream interrupted: {}", e);
        ApiError::MalformedRequest("Failed to parse file")
    })? {
        file.write_all(&chunk).await.map_err(staging_io)?;
    }
    file.flush().await.map_err(staging_io)?;

    Ok(())
}
