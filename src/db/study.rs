use std::collections::HashMap;

use tokio_postgres::Row;
use tracing::info;
use uuid::Uuid;

use super::Database;
use crate::error::ApiError;
use crate::models::{Difficulty, Flashcard, FlashcardDraft, QuestionDraft, Quiz, QuizQuestion, Summary};

const SUMMARY_COLUMNS: &str = "id, user_id, batch_id, content, created_at";
const FLASHCARD_COLUMNS: &str = "id, user_id, summary_id, term, definition, created_at";
const QUESTION_COLUMNS: &str = "id, quiz_id, position, question_text, choices, correct_index";

fn summary_from_row(row: &Row) -> Summary {
    Summary {
        id: row.get("id"),
        user_id: row.get("user_id"),
        batch_id: row.get("batch_id"),
        content: row.get("content"),
        created_at: row.get("created_at"),
    }
}

fn flashcard_from_row(row: &Row) -> Flashcard {
    Flashcard {
        id: row.get("id"),
        user_id: row.get("user_id"),
        summary_id: row.get("summary_id"),
        term: row.get("term"),
        definition: row.get("definition"),
        created_at: row.get("created_at"),
    }
}

fn question_from_row(row: &Row) -> QuizQuestion {
    QuizQuestion {
        id: row.get("id"),
        quiz_id: row.get("quiz_id"),
        position: row.get("position"),
        question_text: row.get("question_text"),
        choices: row.get("choices"),
        correct_index: row.get("correct_index"),
    }
}

fn quiz_from_row(row: &Row, questions: Vec<QuizQuestion>) -> Quiz {
    Quiz {
        id: row.get("id"),
        user_id: row.get("user_id"),
        summary_id: row.get("summary_id"),
        difficulty: row.get("difficulty"),
        created_at: row.get("created_at"),
        questions,
    }
}

impl Database {
    pub async fn find_summary_for_batch(&self, user_id: Uuid, batch_id: Uuid) -> Result<Option<Summary>, ApiError> {
        let client = self.get_connection().await?;
        let query = format!(
            "SELECT {} FROM summaries WHERE batch_id = $1 AND user_id = $2",
            SUMMARY_COLUMNS
        );

        let row = client.query_opt(&query, &[&batch_id, &user_id]).await?;
        Ok(row.map(|row| summary_from_row(&row)))
    }

    /// Stores the summary of a batch, replacing the content of an earlier one
    /// so that flashcards and quizzes built on it keep their reference.
    pub async fn save_summary(&self, user_id: Uuid, batch_id: Uuid, content: &str) -> Result<Summary, ApiError> {
        let client = self.get_connection().await?;
        let query = format!(
            r#"
            INSERT INTO summaries (user_id, batch_id, content)
            VALUES ($1, $2, $3)
            ON CONFLICT (batch_id) DO UPDATE SET content = EXCLUDED.content, created_at = NOW()
            WHERE summaries.user_id = EXCLUDED.user_id
            RETURNING {}
            "#,
            SUMMARY_COLUMNS
        );

        let row = client
            .query_opt(&query, &[&user_id, &batch_id, &content])
            .await?
            .ok_or_else(|| ApiError::not_found("Batch"))?;

        let summary = summary_from_row(&row);
        info!("Stored summary {} for batch {}", summary.id, batch_id);
        Ok(summary)
    }

    /// A summary owned by `user_id`; anything else is reported as not found.
    pub async fn get_summary(&self, user_id: Uuid, summary_id: Uuid) -> Result<Summary, ApiError> {
        let client = self.get_connection().await?;
        let query = format!("SELECT {} FROM summaries WHERE id = $1 AND user_id = $2", SUMMARY_COLUMNS);

        client
            .query_opt(&query, &[&summary_id, &user_id])
            .await?
            .map(|row| summary_from_row(&row))
            .ok_or_else(|| ApiError::not_found("Summary"))
    }

    pub async fn list_summaries(&self, user_id: Uuid) -> Result<Vec<Summary>, ApiError> {
        let client = self.get_connection().await?;
        let query = format!(
            "SELECT {} FROM summaries WHERE user_id = $1 ORDER BY created_at DESC",
            SUMMARY_COLUMNS
        );

        let rows = client.query(&query, &[&user_id]).await?;
        Ok(rows.iter().map(summary_from_row).collect())
    }

    pub async fn create_flashcards(
        &self,
        user_id: Uuid,
        summary_id: Uuid,
        drafts: &[FlashcardDraft],
    ) -> Result<Vec<Flashcard>, ApiError> {
        let mut client = self.get_connection().await?;
        let transaction = client.transaction().await?;

        let query = format!(
            r#"
            INSERT INTO flashcards (user_id, summary_id, term, definition, created_at)
            VALUES ($1, $2, $3, $4, clock_timestamp())
            RETURNING {}
            "#,
            FLASHCARD_COLUMNS
        );
        let statement = transaction.prepare(&query).await?;

        let mut cards = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let row = transaction
                .query_one(&statement, &[&user_id, &summary_id, &draft.term, &draft.definition])
                .await?;
            cards.push(flashcard_from_row(&row));
        }

        transaction.commit().await?;

        info!("Created {} flashcards for summary {}", cards.len(), summary_id);
        Ok(cards)
    }

    pub async fn list_flashcards(&self, user_id: Uuid) -> Result<Vec<Flashcard>, ApiError> {
        let client = self.get_connection().await?;
        let query = format!(
            "SELECT {} FROM flashcards WHERE user_id = $1 ORDER BY created_at DESC",
            FLASHCARD_COLUMNS
        );

        let rows = client.query(&query, &[&user_id]).await?;
        Ok(rows.iter().map(flashcard_from_row).collect())
    }

    /// Inserts a quiz and its questions atomically.
    pub async fn create_quiz(
        &self,
        user_id: Uuid,
        summary_id: Uuid,
        difficulty: Difficulty,
        drafts: &[QuestionDraft],
    ) -> Result<Quiz, ApiError> {
        let mut client = self.get_connection().await?;
        let transaction = client.transaction().await?;

        let quiz_row = transaction
            .query_one(
                r#"
                INSERT INTO quizzes (user_id, summary_id, difficulty)
                VALUES ($1, $2, $3)
                RETURNING id, user_id, summary_id, difficulty, created_at
                "#,
                &[&user_id, &summary_id, &difficulty],
            )
            .await?;
        let quiz_id: Uuid = quiz_row.get("id");

        let query = format!(
            r#"
            INSERT INTO quiz_questions (quiz_id, position, question_text, choices, correct_index)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            QUESTION_COLUMNS
        );
        let statement = transaction.prepare(&query).await?;

        let mut questions = Vec::with_capacity(drafts.len());
        for (position, draft) in drafts.iter().enumerate() {
            let position = position as i32;
            let correct_index = draft.correct_index as i32;
            let row = transaction
                .query_one(
                    &statement,
                    &[&quiz_id, &position, &draft.question, &draft.choices, &correct_index],
                )
                .await?;
            questions.push(question_from_row(&row));
        }

        transaction.commit().await?;

        info!("Created {} quiz {} with {} questions", difficulty, quiz_id, questions.len());
        Ok(quiz_from_row(&quiz_row, questions))
    }

    /// Quizzes of a user, newest first, each with its questions in order.
    pub async fn list_quizzes(&self, user_id: Uuid) -> Result<Vec<Quiz>, ApiError> {
        let client = self.get_connection().await?;

        let quiz_rows = client
            .query(
                "SELECT id, user_id, summary_id, difficulty, created_at FROM quizzes \
                 WHERE user_id = $1 ORDER BY created_at DESC",
                &[&user_id],
            )
            .await?;

        let quiz_ids: Vec<Uuid> = quiz_rows.iter().map(|row| row.get("id")).collect();
        if quiz_ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = format!(
            "SELECT {} FROM quiz_questions WHERE quiz_id = ANY($1) ORDER BY quiz_id, position",
            QUESTION_COLUMNS
        );
        let question_rows = client.query(&query, &[&quiz_ids]).await?;

        let mut by_quiz: HashMap<Uuid, Vec<QuizQuestion>> = HashMap::new();
        for row in &question_rows {
            let question = question_from_row(row);
            by_quiz.entry(question.quiz_id).or_default().push(question);
        }

        Ok(quiz_rows
            .iter()
            .map(|row| {
                let id: Uuid = row.get("id");
                quiz_from_row(row, by_quiz.remove(&id).unwrap_or_default())
            })
            .collect())
    }
}
