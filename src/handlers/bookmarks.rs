use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::ApiJson;
use crate::{
    auth::AuthUser,
    error::ApiError,
    models::{bookmark::ListBookmarksQuery, CreateBookmarkRequest},
    state::AppState,
};

/// List bookmarks, optionally filtered by content type
/// GET /api/bookmarks/?content_type=summary|flashcard|quiz
pub async fn list_bookmarks(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    query: Result<Query<ListBookmarksQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::validation(e.body_text()))?;

    let bookmarks = state.db.list_bookmarks(auth.user_id, query.content_type).await?;

    info!("Retrieved {} bookmarks for user {}", bookmarks.len(), auth.user_id);
    Ok((StatusCode::OK, Json(bookmarks)))
}

/// Bookmark a summary, flashcard or quiz
/// POST /api/bookmarks/
pub async fn create_bookmark(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(request): ApiJson<CreateBookmarkRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let bookmark = state
        .db
        .create_bookmark(auth.user_id, request.content_type, request.object_id)
        .await?;

    Ok((StatusCode::CREATED, Json(bookmark)))
}

/// Remove one of the caller's bookmarks
/// DELETE /api/bookmarks/:id
pub async fn delete_bookmark(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    bookmark_id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(bookmark_id) = bookmark_id.map_err(|_| ApiError::validation("Invalid bookmark ID format"))?;

    state.db.delete_bookmark(auth.user_id, bookmark_id).await?;

    Ok(StatusCode::NO_CONTENT)
}
