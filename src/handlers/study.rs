// Summaries, flashcards and quizzes generated by the AI service.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::ApiJson;
use crate::{
    auth::AuthUser,
    error::ApiError,
    models::{
        attachment::combine_batch_text,
        study::{GenerateFlashcardsRequest, GenerateQuizRequest, GenerateSummaryRequest},
        Flashcard, Quiz, Summary,
    },
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub message: &'static str,
    pub summary: Summary,
}

#[derive(Debug, Serialize)]
pub struct FlashcardsResponse {
    pub message: &'static str,
    pub summary_id: Uuid,
    pub flashcards: Vec<Flashcard>,
}

#[derive(Debug, Serialize)]
pub struct QuizResponse {
    pub message: &'static str,
    pub quiz: Quiz,
}

/// Summarize a fully processed upload batch
/// POST /get_summary/
pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(request): ApiJson<GenerateSummaryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let files = state.db.list_batch(auth.user_id, request.batch_id).await?;
    if files.is_empty() {
        return Err(ApiError::not_found("Batch"));
    }

    if !request.regenerate {
        if let Some(summary) = state.db.find_summary_for_batch(auth.user_id, request.batch_id).await? {
            info!("Returning stored summary {} for batch {}", summary.id, request.batch_id);
            return Ok((StatusCode::OK, Json(SummaryResponse { message: "Summary retrieved.", summary })));
        }
    }

    let text = combine_batch_text(&files).map_err(|e| ApiError::Validation(e.to_string()))?;

    info!("Summarizing batch {} ({} files)", request.batch_id, files.len());
    let content = state.ai.summarize(&text).await?;
    let summary = state.db.save_summary(auth.user_id, request.batch_id, &content).await?;

    Ok((
        StatusCode::CREATED,
        Json(SummaryResponse { message: "Summary generated successfully.", summary }),
    ))
}

/// Generate flashcards from a summary
/// POST /get_flash_cards/
pub async fn get_flash_cards(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(request): ApiJson<GenerateFlashcardsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let count = request.count().map_err(ApiError::Validation)?;
    let summary = state.db.get_summary(auth.user_id, request.summary_id).await?;

    let drafts = state.ai.flashcards(&summary.content, count).await?;
    let flashcards = state.db.create_flashcards(auth.user_id, summary.id, &drafts).await?;

    info!("Generated {} flashcards from summary {}", flashcards.len(), summary.id);
    Ok((
        StatusCode::CREATED,
        Json(FlashcardsResponse {
            message: "Flashcards generated successfully.",
            summary_id: summary.id,
            flashcards,
        }),
    ))
}

/// Generate a multiple-choice quiz from a summary
/// POST /get_quiz/
pub async fn get_quiz(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(request): ApiJson<GenerateQuizRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let num_questions = request.num_questions().map_err(ApiError::Validation)?;
    let summary = state.db.get_summary(auth.user_id, request.summary_id).await?;

    let drafts = state.ai.quiz(&summary.content, request.difficulty, num_questions).await?;
    let quiz = state
        .db
        .create_quiz(auth.user_id, summary.id, request.difficulty, &drafts)
        .await?;

    info!("Generated quiz {} from summary {}", quiz.id, summary.id);
    Ok((StatusCode::CREATED, Json(QuizResponse { message: "Quiz generated successfully.", quiz })))
}

/// GET /user/summaries/
pub async fn list_summaries(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let summaries = state.db.list_summaries(auth.user_id).await?;
    Ok((StatusCode::OK, Json(summaries)))
}

/// GET /user/flashcards/
pub async fn list_flashcards(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let flashcards = state.db.list_flashcards(auth.user_id).await?;
    Ok((StatusCode::OK, Json(flashcards)))
}

/// GET /user/quizzes/
pub async fn list_quizzes(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let quizzes = state.db.list_quizzes(auth.user_id).await?;
    Ok((StatusCode::OK, Json(quizzes)))
}
