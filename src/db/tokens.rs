use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::info;
use uuid::Uuid;

use super::Database;
use crate::error::ApiError;
use crate::models::PasswordResetOtp;

fn otp_from_row(row: &Row) -> PasswordResetOtp {
    PasswordResetOtp {
        id: row.get("id"),
        user_id: row.get("user_id"),
        code_hash: row.get("code_hash"),
        expires_at: row.get("expires_at"),
        attempts: row.get("attempts"),
        consumed_at: row.get("consumed_at"),
        created_at: row.get("created_at"),
    }
}

impl Database {
    /// Records a refresh token id as revoked. Returns `false` when it was
    /// already revoked, which makes rotation single-use under concurrency.
    pub async fn blacklist_token(
        &self,
        jti: Uuid,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, ApiError> {
        let client = self.get_connection().await?;

        let inserted = client
            .execute(
                r#"
                INSERT INTO blacklisted_tokens (jti, user_id, expires_at)
                VALUES ($1, $2, $3)
                ON CONFLICT (jti) DO NOTHING
                "#,
                &[&jti, &user_id, &expires_at],
            )
            .await?;

        Ok(inserted == 1)
    }

    pub async fn delete_expired_blacklisted_tokens(&self) -> Result<u64, ApiError> {
        let client = self.get_connection().await?;

        let deleted = client
            .execute("DELETE FROM blacklisted_tokens WHERE expires_at < NOW()", &[])
            .await?;

        Ok(deleted)
    }

    /// Stores a new reset code, invalidating any code still outstanding.
    pub async fn create_password_reset_otp(
        &self,
        user_id: Uuid,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<PasswordResetOtp, ApiError> {
        let mut client = self.get_connection().await?;
        let transaction = client.transaction().await?;

        let invalidated = transaction
            .execute(
                "UPDATE password_reset_otps SET consumed_at = NOW() WHERE user_id = $1 AND consumed_at IS NULL",
                &[&user_id],
            )
            .await?;

        let row = transaction
            .query_one(
                r#"
                INSERT INTO password_reset_otps (user_id, code_hash, expires_at)
                VALUES ($1, $2, $3)
                RETURNING id, user_id, code_hash, expires_at, attempts, consumed_at, created_at
                "#,
                &[&user_id, &code_hash, &expires_at],
            )
            .await?;

        transaction.commit().await?;

        info!(invalidated, "Issued password reset code for user {}", user_id);
        Ok(otp_from_row(&row))
    }

    /// The newest unconsumed reset code of a user, expired or not.
    pub async fn active_password_reset_otp(&self, user_id: Uuid) -> Result<Option<PasswordResetOtp>, ApiError> {
        let client = self.get_connection().await?;

        let row = client
            .query_opt(
                r#"
                SELECT id, user_id, code_hash, expires_at, attempts, consumed_at, created_at
                FROM password_reset_otps
                WHERE user_id = $1 AND consumed_at IS NULL
                ORDER BY created_at DESC
                LIMIT 1
                "#,
                &[&user_id],
            )
            .await?;

        Ok(row.map(|row| otp_from_row(&row)))
    }

    /// Uses up one verification attempt of a live code and returns the new
    /// attempt count. `None` when the code is consumed, expired or already at
    /// `max_attempts`, so no more than `max_attempts` guesses are ever checked.
    pub async fn claim_otp_attempt(&self, otp_id: Uuid, max_attempts: i32) -> Result<Option<i32>, ApiError> {
        let client = self.get_connection().await?;

        let row = client
            .query_opt(
                r#"
                UPDATE password_reset_otps
                SET attempts = attempts + 1
                WHERE id = $1 AND consumed_at IS NULL AND expires_at > NOW() AND attempts < $2
                RETURNING attempts
                "#,
                &[&otp_id, &max_attempts],
            )
            .await?;

        Ok(row.map(|row| row.get(0)))
    }

    /// Sets the new password and consumes the code in one transaction.
    /// Fails if the code was consumed concurrently.
    pub async fn complete_password_reset(
        &self,
        user_id: Uuid,
        otp_id: Uuid,
        password_hash: &str,
    ) -> Result<(), ApiError> {
        let mut client = self.get_connection().await?;
        let transaction = client.transaction().await?;

        let consumed = transaction
            .execute(
                "UPDATE password_reset_otps SET consumed_at = NOW() WHERE id = $1 AND consumed_at IS NULL",
                &[&otp_id],
            )
            .await?;

        if consumed == 0 {
            return Err(ApiError::validation("Invalid or expired code."));
        }

        transaction
            .execute(
                "UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2",
                &[&password_hash, &user_id],
            )
            .await?;

        transaction.commit().await?;

        info!("Password reset completed for user {}", user_id);
        Ok(())
    }

    /// Removes codes that expired or were already used.
    pub async fn delete_stale_otps(&self) -> Result<u64, ApiError> {
        let client = self.get_connection().await?;

        let deleted = client
            .execute(
                "DELETE FROM password_reset_otps WHERE expires_at < NOW() OR consumed_at IS NOT NULL",
                &[],
            )
            .await?;

        Ok(deleted)
    }
}
