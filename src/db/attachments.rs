use tokio_postgres::Row;
use tracing::{info, warn};
use uuid::Uuid;

use super::Database;
use crate::error::ApiError;
use crate::models::{AttachmentStatus, UploadedFile};

const ATTACHMENT_COLUMNS: &str =
    "id, user_id, batch_id, file_name, file_path, status, extracted_text, error, uploaded_at, updated_at";

fn attachment_from_row(row: &Row) -> UploadedFile {
    UploadedFile {
        id: row.get("id"),
        user_id: row.get("user_id"),
        batch_id: row.get("batch_id"),
        file_name: row.get("file_name"),
        file_path: row.get("file_path"),
        status: row.get("status"),
        extracted_text: row.get("extracted_text"),
        error: row.get("error"),
        uploaded_at: row.get("uploaded_at"),
        updated_at: row.get("updated_at"),
    }
}

/// A file that has been written to disk and needs a row.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub id: Uuid,
    pub file_name: String,
    pub file_path: String,
}

impl Database {
    /// Inserts every file of a batch as `pending` in one transaction.
    pub async fn create_attachments(
        &self,
        user_id: Uuid,
        batch_id: Uuid,
        files: &[StoredFile],
    ) -> Result<Vec<UploadedFile>, ApiError> {
        let mut client = self.get_connection().await?;
        let transaction = client.transaction().await?;

        let query = format!(
            r#"
            INSERT INTO attachments (id, user_id, batch_id, file_name, file_path, uploaded_at)
            VALUES ($1, $2, $3, $4, $5, clock_timestamp())
            RETURNING {}
            "#,
            ATTACHMENT_COLUMNS
        );
        let statement = transaction.prepare(&query).await?;

        let mut created = Vec::with_capacity(files.len());
        for file in files {
            let row = transaction
                .query_one(&statement, &[&file.id, &user_id, &batch_id, &file.file_name, &file.file_path])
                .await?;
            created.push(attachment_from_row(&row));
        }

        transaction.commit().await?;

        info!("Created {} attachments in batch {} for user {}", created.len(), batch_id, user_id);
        Ok(created)
    }

    pub async fn get_attachment(&self, attachment_id: Uuid) -> Result<UploadedFile, ApiError> {
        let client = self.get_connection().await?;
        let query = format!("SELECT {} FROM attachments WHERE id = $1", ATTACHMENT_COLUMNS);

        client
            .query_opt(&query, &[&attachment_id])
            .await?
            .map(|row| attachment_from_row(&row))
            .ok_or_else(|| ApiError::not_found("Attachment"))
    }

    /// Files of one batch owned by `user_id`, in upload order. Empty when the
    /// batch does not exist or belongs to someone else.
    pub async fn list_batch(&self, user_id: Uuid, batch_id: Uuid) -> Result<Vec<UploadedFile>, ApiError> {
        let client = self.get_connection().await?;
        let query = format!(
            "SELECT {} FROM attachments WHERE batch_id = $1 AND user_id = $2 ORDER BY uploaded_at ASC",
            ATTACHMENT_COLUMNS
        );

        let rows = client.query(&query, &[&batch_id, &user_id]).await?;
        Ok(rows.iter().map(attachment_from_row).collect())
    }

    pub async fn list_attachments(&self, user_id: Uuid) -> Result<Vec<UploadedFile>, ApiError> {
        let client = self.get_connection().await?;
        let query = format!(
            "SELECT {} FROM attachments WHERE user_id = $1 ORDER BY uploaded_at DESC",
            ATTACHMENT_COLUMNS
        );

        let rows = client.query(&query, &[&user_id]).await?;
        Ok(rows.iter().map(attachment_from_row).collect())
    }

    /// Ids of attachments never picked up by a worker, oldest first.
    pub async fn pending_attachment_ids(&self) -> Result<Vec<Uuid>, ApiError> {
        let client = self.get_connection().await?;

        let rows = client
            .query(
                "SELECT id FROM attachments WHERE status = 'pending' ORDER BY uploaded_at ASC",
                &[],
            )
            .await?;

        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    pub async fn mark_attachment_processing(&self, attachment_id: Uuid) -> Result<UploadedFile, ApiError> {
        self.transition_attachment(attachment_id, AttachmentStatus::Processing, None, None)
            .await
    }

    pub async fn mark_attachment_completed(
        &self,
        attachment_id: Uuid,
        extracted_text: &str,
    ) -> Result<UploadedFile, ApiError> {
        self.transition_attachment(attachment_id, AttachmentStatus::Completed, Some(extracted_text), None)
            .await
    }

    pub async fn mark_attachment_failed(&self, attachment_id: Uuid, reason: &str) -> Result<UploadedFile, ApiError> {
        self.transition_attachment(attachment_id, AttachmentStatus::Failed, None, Some(reason))
            .await
    }

    /// Moves an attachment to `next`, but only from a status that allows it.
    /// The allowed source statuses go into the `WHERE` clause so two workers
    /// cannot both claim the same file.
    async fn transition_attachment(
        &self,
        attachment_id: Uuid,
        next: AttachmentStatus,
        extracted_text: Option<&str>,
        error: Option<&str>,
    ) -> Result<UploadedFile, ApiError> {
        let allowed_from: Vec<&str> = [
            AttachmentStatus::Pending,
            AttachmentStatus::Processing,
            AttachmentStatus::Completed,
            AttachmentStatus::Failed,
        ]
        .iter()
        .filter(|status| status.can_transition_to(next))
        .map(|status| status.as_str())
        .collect();

        let client = self.get_connection().await?;
        let query = format!(
            r#"
            UPDATE attachments
            SET status = $1,
                extracted_text = COALESCE($2, extracted_text),
                error = $3,
                updated_at = NOW()
            WHERE id = $4 AND status::text = ANY($5)
            RETURNING {}
            "#,
            ATTACHMENT_COLUMNS
        );

        let row = client
            .query_opt(&query, &[&next, &extracted_text, &error, &attachment_id, &allowed_from])
            .await?;

        match row {
            Some(row) => {
                let attachment = attachment_from_row(&row);
                info!("Attachment {} is now {}", attachment.id, attachment.status);
                Ok(attachment)
            }
            None => {
                let current = self.get_attachment(attachment_id).await?;
                warn!(
                    "Rejected attachment {} transition {} -> {}",
                    attachment_id, current.status, next
                );
                Err(ApiError::conflict(format!(
                    "Attachment cannot move from {} to {}",
                    current.status, next
                )))
            }
        }
    }
}
