use std::fmt;

use chrono::{DateTime, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of record a bookmark points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "lowercase")]
#[postgres(name = "bookmark_content_type")]
pub enum ContentType {
    #[postgres(name = "summary")]
    Summary,
    #[postgres(name = "flashcard")]
    Flashcard,
    #[postgres(name = "quiz")]
    Quiz,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Summary => "summary",
            ContentType::Flashcard => "flashcard",
            ContentType::Quiz => "quiz",
        }
    }

    /// Table holding the referenced records.
    pub fn table(&self) -> &'static str {
        match self {
            ContentType::Summary => "summaries",
            ContentType::Flashcard => "flashcards",
            ContentType::Quiz => "quizzes",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content_type: ContentType,
    pub object_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBookmarkRequest {
    pub content_type: ContentType,
    pub object_id: Uuid,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListBookmarksQuery {
    pub content_type: Option<ContentType>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_bookmark_request_deserialization() {
        let request: CreateBookmarkRequest = serde_json::from_str(
            r#"{"content_type":"flashcard","object_id":"123e4567-e89b-12d3-a456-426614174000"}"#,
        )
        .expect("Failed to deserialize CreateBookmarkRequest");

        assert_eq!(request.content_type, ContentType::Flashcard);
        assert_eq!(request.content_type.table(), "flashcards");
    }

    #[test]
    fn test_unknown_content_type_rejected() {
        let result = serde_json::from_str::<CreateBookmarkRequest>(
            r#"{"content_type":"attachment","object_id":"123e4567-e89b-12d3-a456-426614174000"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_content_type_display() {
        assert_eq!(ContentType::Summary.to_string(), "summary");
        assert_eq!(ContentType::Quiz.table(), "quizzes");
    }
}
