use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::services::ServeDir;

use crate::{
    handlers::{
        account::{update_account, PROFILE_PICS_DIR, PROFILE_PICS_URL},
        attachments::{list_attachments, upload_attachments},
        auth::{
            change_password, google_callback, google_login, refresh_token, reset_password, signin, signout,
            signup, userinfo, verify_otp,
        },
        bookmarks::{create_bookmark, delete_bookmark, list_bookmarks},
        health_check,
        study::{get_flash_cards, get_quiz, get_summary, list_flashcards, list_quizzes, list_summaries},
    },
    middleware::apply_middleware,
    models::attachment::{MAX_FILES_PER_UPLOAD, MAX_FILE_SIZE, MAX_PROFILE_PICTURE_SIZE},
    state::AppState,
};

/// Slack for multipart boundaries and text fields on top of the file payload.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Create the Axum router with all endpoints and middleware
pub fn create_router(state: Arc<AppState>) -> Router {
    let profile_pics = ServeDir::new(state.config.media.root.join(PROFILE_PICS_DIR));

    let router = Router::new()
        // Health check endpoint
        .route("/health", get(health_check))
        // Authentication endpoints
        .route("/api/auth/signup/", post(signup))
        .route("/api/auth/google/login/", get(google_login))
        .route("/api/auth/google/callback/", get(google_callback))
        .route("/api/signin/", post(signin))
        .route("/api/signout/", post(signout))
        .route("/api/refresh_token/", post(refresh_token))
        .route("/api/userinfo/", get(userinfo))
        .route(
            "/api/update_account/",
            put(update_account).layer(DefaultBodyLimit::max(MAX_PROFILE_PICTURE_SIZE + MULTIPART_OVERHEAD)),
        )
        .route("/api/change_password/", post(change_password))
        .route("/api/reset_password/", post(reset_password))
        .route("/api/verify_otp/", post(verify_otp))
        // Uploads and AI generated study material
        .route(
            "/upload_attachments/",
            post(upload_attachments)
                .layer(DefaultBodyLimit::max(MAX_FILES_PER_UPLOAD * MAX_FILE_SIZE + MULTIPART_OVERHEAD)),
        )
        .route("/get_summary/", post(get_summary))
        .route("/get_flash_cards/", post(get_flash_cards))
        .route("/get_quiz/", post(get_quiz))
        // Bookmarks
        .route("/api/bookmarks/", get(list_bookmarks).post(create_bookmark))
        .route("/api/bookmarks/:id", delete(delete_bookmark))
        // Per-user listings
        .route("/user/summaries/", get(list_summaries))
        .route("/user/flashcards/", get(list_flashcards))
        .route("/user/quizzes/", get(list_quizzes))
        .route("/user/attachments/", get(list_attachments))
        .nest_service(PROFILE_PICS_URL, profile_pics)
        .with_state(state);

    apply_middleware(router)
}
