use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{sanitize_file_name, MultipartForm};
use crate::{
    auth::AuthUser,
    db::StoredFile,
    error::ApiError,
    jobs::signals,
    models::{attachment::validate_upload, UploadedFile},
    state::AppState,
};

pub const ATTACHMENTS_DIR: &str = "attachments";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: &'static str,
    pub batch_id: Uuid,
    pub attachments: Vec<UploadedFile>,
}

/// Upload one to three documents as a new batch
/// POST /upload_attachments/ (multipart field: files)
pub async fn upload_attachments(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let form = MultipartForm::read(multipart).await?;
    let files: Vec<_> = form
        .files
        .into_iter()
        .filter(|(name, _)| name == "files" || name == "files[]")
        .map(|(_, mut file)| {
            file.file_name = sanitize_file_name(&file.file_name);
            file
        })
        .collect();

    // nothing touches the disk unless every file is acceptable
    let kinds = validate_upload(&files).map_err(|errors| {
        warn!("Rejected upload from user {}: {:?}", auth.user_id, errors);
        ApiError::Validation(errors.join(" "))
    })?;

    let batch_id = Uuid::new_v4();
    let dir = state.config.media.root.join(ATTACHMENTS_DIR).join(batch_id.to_string());
    tokio::fs::create_dir_all(&dir).await.map_err(|e| {
        error!("Failed to create {}: {}", dir.display(), e);
        ApiError::Internal(anyhow::anyhow!("Failed to store uploaded files"))
    })?;

    let mut stored = Vec::with_capacity(files.len());
    for (file, kind) in files.iter().zip(kinds) {
        let id = Uuid::new_v4();
        let path = dir.join(format!("{}.{}", id, kind.extension()));

        if let Err(e) = tokio::fs::write(&path, &file.bytes).await {
            error!("Failed to write {}: {}", path.display(), e);
            remove_batch_dir(&dir).await;
            return Err(ApiError::Internal(anyhow::anyhow!("Failed to store uploaded files")));
        }

        stored.push(StoredFile {
            id,
            file_name: file.file_name.clone(),
            file_path: path.to_string_lossy().into_owned(),
        });
    }

    let attachments = match state.db.create_attachments(auth.user_id, batch_id, &stored).await {
        Ok(attachments) => attachments,
        Err(e) => {
            remove_batch_dir(&dir).await;
            return Err(e);
        }
    };

    for attachment in &attachments {
        signals::attachment_created(&state, attachment).await;
    }

    info!("User {} uploaded {} files as batch {}", auth.user_id, attachments.len(), batch_id);
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse { message: "Files uploaded successfully.", batch_id, attachments }),
    ))
}

async fn remove_batch_dir(dir: &std::path::Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        warn!("Failed to clean up {}: {}", dir.display(), e);
    }
}

/// Attachments of the signed-in user, newest first
/// GET /user/attachments/
pub async fn list_attachments(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let attachments = state.db.list_attachments(auth.user_id).await?;

    info!("Retrieved {} attachments for user {}", attachments.len(), auth.user_id);
    Ok((StatusCode::OK, Json(attachments)))
}
