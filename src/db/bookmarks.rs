use tokio_postgres::Row;
use tracing::info;
use uuid::Uuid;

use super::Database;
use crate::error::ApiError;
use crate::models::{Bookmark, ContentType};

const BOOKMARK_COLUMNS: &str = "id, user_id, content_type, object_id, created_at";

fn bookmark_from_row(row: &Row) -> Bookmark {
    Bookmark {
        id: row.get("id"),
        user_id: row.get("user_id"),
        content_type: row.get("content_type"),
        object_id: row.get("object_id"),
        created_at: row.get("created_at"),
    }
}

impl Database {
    /// Bookmarks a summary, flashcard or quiz the user owns.
    pub async fn create_bookmark(
        &self,
        user_id: Uuid,
        content_type: ContentType,
        object_id: Uuid,
    ) -> Result<Bookmark, ApiError> {
        let client = self.get_connection().await?;

        // the table name comes from a closed enum, never from input
        let ownership_query = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1 AND user_id = $2)",
            content_type.table()
        );
        let owned: bool = client
            .query_one(&ownership_query, &[&object_id, &user_id])
            .await?
            .get(0);

        if !owned {
            return Err(ApiError::not_found(format!("{} {}", content_type, object_id)));
        }

        let query = format!(
            r#"
            INSERT INTO bookmarks (user_id, content_type, object_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, content_type, object_id) DO NOTHING
            RETURNING {}
            "#,
            BOOKMARK_COLUMNS
        );

        let row = client
            .query_opt(&query, &[&user_id, &content_type, &object_id])
            .await?
            .ok_or_else(|| ApiError::conflict("Bookmark already exists"))?;

        let bookmark = bookmark_from_row(&row);
        info!("User {} bookmarked {} {}", user_id, content_type, object_id);
        Ok(bookmark)
    }

    pub async fn list_bookmarks(
        &self,
        user_id: Uuid,
        content_type: Option<ContentType>,
    ) -> Result<Vec<Bookmark>, ApiError> {
        let client = self.get_connection().await?;

        let rows = match content_type {
            Some(content_type) => {
                let query = format!(
                    "SELECT {} FROM bookmarks WHERE user_id = $1 AND content_type = $2 ORDER BY created_at DESC",
                    BOOKMARK_COLUMNS
                );
                client.query(&query, &[&user_id, &content_type]).await?
            }
            None => {
                let query = format!(
                    "SELECT {} FROM bookmarks WHERE user_id = $1 ORDER BY created_at DESC",
                    BOOKMARK_COLUMNS
                );
                client.query(&query, &[&user_id]).await?
            }
        };

        Ok(rows.iter().map(bookmark_from_row).collect())
    }

    pub async fn delete_bookmark(&self, user_id: Uuid, bookmark_id: Uuid) -> Result<(), ApiError> {
        let client = self.get_connection().await?;

        let deleted = client
            .execute(
                "DELETE FROM bookmarks WHERE id = $1 AND user_id = $2",
                &[&bookmark_id, &user_id],
            )
            .await?;

        if deleted == 0 {
            return Err(ApiError::not_found("Bookmark"));
        }

        info!("Deleted bookmark {} of user {}", bookmark_id, user_id);
        Ok(())
    }
}
