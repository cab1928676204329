// Study-material generation backed by an external chat-completions service.

pub mod chat;

use async_trait::async_trait;

use crate::error::ApiError;
use crate::models::{Difficulty, FlashcardDraft, QuestionDraft};

pub use chat::ChatCompletionsClient;

/// Operations the handlers need from the AI service.
#[async_trait]
pub trait AiClient: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String, ApiError>;

    async fn flashcards(&self, summary: &str, count: u32) -> Result<Vec<FlashcardDraft>, ApiError>;

    async fn quiz(
        &self,
        summary: &str,
        difficulty: Difficulty,
        num_questions: u32,
    ) -> Result<Vec<QuestionDraft>, ApiError>;
}
