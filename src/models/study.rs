use std::fmt;

use chrono::{DateTime, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_FLASHCARD_COUNT: u32 = 10;
pub const MAX_FLASHCARD_COUNT: u32 = 30;
pub const DEFAULT_QUESTION_COUNT: u32 = 5;
pub const MAX_QUESTION_COUNT: u32 = 20;
pub const MIN_CHOICES: usize = 2;
pub const MAX_CHOICES: usize = 6;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub id: Uuid,
    pub user_id: Uuid,
    pub batch_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flashcard {
    pub id: Uuid,
    pub user_id: Uuid,
    pub summary_id: Uuid,
    pub term: String,
    pub definition: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "lowercase")]
#[postgres(name = "quiz_difficulty")]
pub enum Difficulty {
    #[postgres(name = "easy")]
    Easy,
    #[default]
    #[postgres(name = "medium")]
    Medium,
    #[postgres(name = "hard")]
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    pub id: Uuid,
    pub user_id: Uuid,
    pub summary_id: Uuid,
    pub difficulty: Difficulty,
    pub created_at: DateTime<Utc>,
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub position: i32,
    pub question_text: String,
    pub choices: Vec<String>,
    pub correct_index: i32,
}

/// Flashcard content produced by the AI service, before it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlashcardDraft {
    pub term: String,
    pub definition: String,
}

/// Quiz question produced by the AI service, before it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionDraft {
    pub question: String,
    pub choices: Vec<String>,
    pub correct_index: usize,
}

impl FlashcardDraft {
    pub fn validate(&self) -> Result<(), String> {
        if self.term.trim().is_empty() {
            return Err("Flashcard term is empty".to_string());
        }
        if self.definition.trim().is_empty() {
            return Err(format!("Flashcard '{}' has no definition", self.term.trim()));
        }
        Ok(())
    }
}

impl QuestionDraft {
    pub fn validate(&self) -> Result<(), String> {
        if self.question.trim().is_empty() {
            return Err("Question text is empty".to_string());
        }
        if self.choices.len() < MIN_CHOICES || self.choices.len() > MAX_CHOICES {
            return Err(format!(
                "Question '{}' has {} choices, expected {}-{}",
                self.question.trim(),
                self.choices.len(),
                MIN_CHOICES,
                MAX_CHOICES
            ));
        }
        if self.choices.iter().any(|c| c.trim().is_empty()) {
            return Err(format!("Question '{}' has an empty choice", self.question.trim()));
        }
        if self.correct_index >= self.choices.len() {
            return Err(format!(
                "Question '{}' has correct_index {} out of range",
                self.question.trim(),
                self.correct_index
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateSummaryRequest {
    pub batch_id: Uuid,
    #[serde(default)]
    pub regenerate: bool,
}

#[derive(Debug, Deserialize)]
pub struct GenerateFlashcardsRequest {
    pub summary_id: Uuid,
    pub count: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateQuizRequest {
    pub summary_id: Uuid,
    #[serde(default)]
    pub difficulty: Difficulty,
    pub num_questions: Option<u32>,
}

impl GenerateFlashcardsRequest {
    pub fn count(&self) -> Result<u32, String> {
        bounded(self.count, DEFAULT_FLASHCARD_COUNT, MAX_FLASHCARD_COUNT, "count")
    }
}

impl GenerateQuizRequest {
    pub fn num_questions(&self) -> Result<u32, String> {
        bounded(self.num_questions, DEFAULT_QUESTION_COUNT, MAX_QUESTION_COUNT, "num_questions")
    }
}

fn bounded(value: Option<u32>, default: u32, max: u32, field: &str) -> Result<u32, String> {
    match value {
        None => Ok(default),
        Some(v) if (1..=max).contains(&v) => Ok(v),
        Some(_) => Err(format!("{} must be between 1 and {}", field, max)),
    }
}
