use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::MultipartForm;
use crate::{
    auth::AuthUser,
    error::ApiError,
    models::{attachment::validate_profile_picture, user::UpdateAccount},
    state::AppState,
};

/// Public URL prefix under which profile pictures are served.
pub const PROFILE_PICS_URL: &str = "/media/profile_pics";
pub const PROFILE_PICS_DIR: &str = "profile_pics";

/// Update name fields and/or the profile picture
/// PUT /api/update_account/ (multipart: first_name, last_name, profile_picture)
pub async fn update_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let form = MultipartForm::read(multipart).await?;

    let first_name = form.field("first_name").map(|v| v.trim().to_string());
    let last_name = form.field("last_name").map(|v| v.trim().to_string());
    let picture = form
        .files
        .into_iter()
        .find(|(name, _)| name == "profile_picture")
        .map(|(_, file)| file);

    let mut update = UpdateAccount {
        first_name,
        last_name,
        profile_picture: picture.as_ref().map(|file| file.file_name.clone()),
    };
    update.validate().map_err(ApiError::Validation)?;

    let profile_pics = state.config.media.root.join(PROFILE_PICS_DIR);
    let mut previous_picture = None;
    let mut new_picture = None;

    if let Some(file) = picture {
        let extension = validate_profile_picture(&file).map_err(ApiError::Validation)?;
        previous_picture = state.db.get_user_by_id(auth.user_id).await?.profile_picture;

        let stored_name = format!("{}_{}.{}", auth.user_id, Uuid::new_v4().simple(), extension);
        let path = profile_pics.join(&stored_name);

        tokio::fs::create_dir_all(&profile_pics).await.map_err(|e| {
            error!("Failed to create {}: {}", profile_pics.display(), e);
            ApiError::Internal(anyhow::anyhow!("Failed to store profile picture"))
        })?;
        tokio::fs::write(&path, &file.bytes).await.map_err(|e| {
            error!("Failed to write profile picture {}: {}", stored_name, e);
            ApiError::Internal(anyhow::anyhow!("Failed to store profile picture"))
        })?;

        update.profile_picture = Some(format!("{}/{}", PROFILE_PICS_URL, stored_name));
        new_picture = Some(path);
    }

    let result = state
        .db
        .update_user_profile(
            auth.user_id,
            update.first_name.as_deref(),
            update.last_name.as_deref(),
            update.profile_picture.as_deref(),
        )
        .await;

    let user = match result {
        Ok(user) => user,
        Err(e) => {
            if let Some(path) = new_picture {
                remove_picture(&path).await;
            }
            return Err(e);
        }
    };

    // only files this service stored are removed; OAuth picture URLs are left alone
    if new_picture.is_some() {
        if let Some(path) = previous_picture.as_deref().and_then(|url| stored_picture_path(&profile_pics, url)) {
            remove_picture(&path).await;
        }
    }

    info!("Successfully updated account of user {}", user.id);
    Ok((StatusCode::OK, Json(user)))
}

/// On-disk location of a picture URL issued by this service.
fn stored_picture_path(profile_pics: &Path, url: &str) -> Option<PathBuf> {
    let name = url.strip_prefix(PROFILE_PICS_URL)?.strip_prefix('/')?;
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
        return None;
    }
    Some(profile_pics.join(name))
}

async fn remove_picture(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!("Failed to remove profile picture {}: {}", path.display(), e);
    }
}
