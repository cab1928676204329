use tokio_postgres::Row;
use tracing::info;
use uuid::Uuid;

use super::Database;
use crate::error::ApiError;
use crate::models::{NewUser, User};

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, profile_picture, \
                            is_oauth, is_active, is_staff, created_at, updated_at";

fn user_from_row(row: &Row) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        profile_picture: row.get("profile_picture"),
        is_oauth: row.get("is_oauth"),
        is_active: row.get("is_active"),
        is_staff: row.get("is_staff"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

impl Database {
    /// Inserts a user. A duplicate email surfaces as `ApiError::Conflict`.
    pub async fn create_user(&self, user: NewUser) -> Result<User, ApiError> {
        let client = self.get_connection().await?;

        let query = format!(
            r#"
            INSERT INTO users (email, password_hash, first_name, last_name, profile_picture, is_oauth)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        let row = client
            .query_one(
                &query,
                &[
                    &user.email,
                    &user.password_hash,
                    &user.first_name,
                    &user.last_name,
                    &user.profile_picture,
                    &user.is_oauth,
                ],
            )
            .await?;

        let created = user_from_row(&row);
        info!("Created user with id: {}", created.id);
        Ok(created)
    }

    pub async fn get_user_by_id(&self, user_id: Uuid) -> Result<User, ApiError> {
        let client = self.get_connection().await?;
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);

        client
            .query_opt(&query, &[&user_id])
            .await?
            .map(|row| user_from_row(&row))
            .ok_or_else(|| ApiError::not_found("User"))
    }

    /// Looks up a user by an already normalized email.
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ApiError> {
        let client = self.get_connection().await?;
        let query = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);

        let row = client.query_opt(&query, &[&email]).await?;
        Ok(row.map(|row| user_from_row(&row)))
    }

    /// Updates whichever profile fields are `Some`.
    pub async fn update_user_profile(
        &self,
        user_id: Uuid,
        first_name: Option<&str>,
        last_name: Option<&str>,
        profile_picture: Option<&str>,
    ) -> Result<User, ApiError> {
        let client = self.get_connection().await?;

        let mut set_parts = Vec::new();
        let mut params: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = Vec::new();

        if let Some(ref first_name) = first_name {
            params.push(first_name);
            set_parts.push(format!("first_name = ${}", params.len()));
        }

        if let Some(ref last_name) = last_name {
            params.push(last_name);
            set_parts.push(format!("last_name = ${}", params.len()));
        }

        if let Some(ref profile_picture) = profile_picture {
            params.push(profile_picture);
            set_parts.push(format!("profile_picture = ${}", params.len()));
        }

        set_parts.push("updated_at = NOW()".to_string());
        params.push(&user_id);

        let query = format!(
            "UPDATE users SET {} WHERE id = ${} RETURNING {}",
            set_parts.join(", "),
            params.len(),
            USER_COLUMNS
        );

        let row = client
            .query_opt(&query, &params)
            .await?
            .ok_or_else(|| ApiError::not_found("User"))?;

        let updated = user_from_row(&row);
        info!("Updated profile of user {}", updated.id);
        Ok(updated)
    }

    pub async fn set_password(&self, user_id: Uuid, password_hash: &str) -> Result<(), ApiError> {
        let client = self.get_connection().await?;

        let updated = client
            .execute(
                "UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2",
                &[&password_hash, &user_id],
            )
            .await?;

        if updated == 0 {
            return Err(ApiError::not_found("User"));
        }

        info!("Password changed for user {}", user_id);
        Ok(())
    }

    /// Fills in a profile picture only when the account has none yet.
    pub async fn set_profile_picture_if_empty(&self, user_id: Uuid, picture: &str) -> Result<User, ApiError> {
        let client = self.get_connection().await?;
        let query = format!(
            r#"
            UPDATE users
            SET profile_picture = COALESCE(NULLIF(profile_picture, ''), $1), updated_at = NOW()
            WHERE id = $2
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        client
            .query_opt(&query, &[&picture, &user_id])
            .await?
            .map(|row| user_from_row(&row))
            .ok_or_else(|| ApiError::not_found("User"))
    }
}
