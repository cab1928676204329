//! PostgreSQL access: connection pool, startup migrations and the
//! repository methods (one `impl Database` block per aggregate).

mod attachments;
mod bookmarks;
mod study;
mod tokens;
mod users;

pub use attachments::StoredFile;

use deadpool_postgres::{Config, Object, Pool, Runtime};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tracing::{error, info, warn};

use crate::config::DatabaseConfig;
use crate::error::ApiError;

/// Ordered, idempotent schema statements run at startup.
const MIGRATIONS: &[(&str, &str)] = &[
    ("uuid extension", r#"CREATE EXTENSION IF NOT EXISTS "uuid-ossp""#),
    (
        "attachment_status type",
        r#"
        DO $$ BEGIN
            CREATE TYPE attachment_status AS ENUM ('pending', 'processing', 'completed', 'failed');
        EXCEPTION WHEN duplicate_object THEN null;
        END $$
        "#,
    ),
    (
        "quiz_difficulty type",
        r#"
        DO $$ BEGIN
            CREATE TYPE quiz_difficulty AS ENUM ('easy', 'medium', 'hard');
        EXCEPTION WHEN duplicate_object THEN null;
        END $$
        "#,
    ),
    (
        "bookmark_content_type type",
        r#"
        DO $$ BEGIN
            CREATE TYPE bookmark_content_type AS ENUM ('summary', 'flashcard', 'quiz');
        EXCEPTION WHEN duplicate_object THEN null;
        END $$
        "#,
    ),
    (
        "users table",
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id UUID PRIMARY KEY DEFAULT uuid_generate_v4(),
            email VARCHAR(255) UNIQUE NOT NULL,
            password_hash TEXT,
            first_name VARCHAR(50) NOT NULL DEFAULT 'Unknown',
            last_name VARCHAR(50) NOT NULL DEFAULT 'Unknown',
            profile_picture TEXT,
            is_oauth BOOLEAN NOT NULL DEFAULT FALSE,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            is_staff BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "attachments table",
        r#"
        CREATE TABLE IF NOT EXISTS attachments (
            id UUID PRIMARY KEY DEFAULT uuid_generate_v4(),
            user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            batch_id UUID NOT NULL,
            file_name VARCHAR(255) NOT NULL,
            file_path TEXT NOT NULL,
            status attachment_status NOT NULL DEFAULT 'pending',
            extracted_text TEXT,
            error TEXT,
            uploaded_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    ("attachments batch index", "CREATE INDEX IF NOT EXISTS idx_attachments_batch_id ON attachments(batch_id)"),
    ("attachments user index", "CREATE INDEX IF NOT EXISTS idx_attachments_user_id ON attachments(user_id, uploaded_at DESC)"),
    (
        "summaries table",
        r#"
        CREATE TABLE IF NOT EXISTS summaries (
            id UUID PRIMARY KEY DEFAULT uuid_generate_v4(),
            user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            batch_id UUID UNIQUE NOT NULL,
            content TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    ("summaries user index", "CREATE INDEX IF NOT EXISTS idx_summaries_user_id ON summaries(user_id, created_at DESC)"),
    (
        "flashcards table",
        r#"
        CREATE TABLE IF NOT EXISTS flashcards (
            id UUID PRIMARY KEY DEFAULT uuid_generate_v4(),
            user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            summary_id UUID NOT NULL REFERENCES summaries(id) ON DELETE CASCADE,
            term TEXT NOT NULL,
            definition TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    ("flashcards user index", "CREATE INDEX IF NOT EXISTS idx_flashcards_user_id ON flashcards(user_id, created_at DESC)"),
    (
        "quizzes table",
        r#"
        CREATE TABLE IF NOT EXISTS quizzes (
            id UUID PRIMARY KEY DEFAULT uuid_generate_v4(),
            user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            summary_id UUID NOT NULL REFERENCES summaries(id) ON DELETE CASCADE,
            difficulty quiz_difficulty NOT NULL DEFAULT 'medium',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    ("quizzes user index", "CREATE INDEX IF NOT EXISTS idx_quizzes_user_id ON quizzes(user_id, created_at DESC)"),
    (
        "quiz_questions table",
        r#"
        CREATE TABLE IF NOT EXISTS quiz_questions (
            id UUID PRIMARY KEY DEFAULT uuid_generate_v4(),
            quiz_id UUID NOT NULL REFERENCES quizzes(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            question_text TEXT NOT NULL,
            choices TEXT[] NOT NULL CHECK (cardinality(choices) BETWEEN 2 AND 6),
            correct_index INTEGER NOT NULL CHECK (correct_index >= 0 AND correct_index < cardinality(choices)),
            UNIQUE (quiz_id, position)
        )
        "#,
    ),
    (
        "bookmarks table",
        r#"
        CREATE TABLE IF NOT EXISTS bookmarks (
            id UUID PRIMARY KEY DEFAULT uuid_generate_v4(),
            user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            content_type bookmark_content_type NOT NULL,
            object_id UUID NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (user_id, content_type, object_id)
        )
        "#,
    ),
    (
        "blacklisted_tokens table",
        r#"
        CREATE TABLE IF NOT EXISTS blacklisted_tokens (
            jti UUID PRIMARY KEY,
            user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            expires_at TIMESTAMPTZ NOT NULL,
            blacklisted_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    ("blacklisted_tokens expiry index", "CREATE INDEX IF NOT EXISTS idx_blacklisted_tokens_expires_at ON blacklisted_tokens(expires_at)"),
    (
        "password_reset_otps table",
        r#"
        CREATE TABLE IF NOT EXISTS password_reset_otps (
            id UUID PRIMARY KEY DEFAULT uuid_generate_v4(),
            user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            code_hash VARCHAR(64) NOT NULL,
            expires_at TIMESTAMPTZ NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            consumed_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    ("password_reset_otps user index", "CREATE INDEX IF NOT EXISTS idx_password_reset_otps_user_id ON password_reset_otps(user_id, created_at DESC)"),
];

/// Repository layer holding the deadpool connection pool.
#[derive(Clone)]
pub struct Database {
    pool: Pool,
}

impl Database {
    /// Builds the pool and checks that a connection can be made.
    pub async fn new(config: &DatabaseConfig) -> Result<Self, ApiError> {
        info!("Creating PostgreSQL connection pool for host: {}:{}", config.host, config.port);

        let db = Database { pool: Self::create_pool(config)? };
        db.health_check().await?;

        Ok(db)
    }

    /// Builds the pool without opening a connection. Connections are made on
    /// first use.
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self, ApiError> {
        Ok(Database { pool: Self::create_pool(config)? })
    }

    fn create_pool(config: &DatabaseConfig) -> Result<Pool, ApiError> {
        let mut pg_config = Config::new();

        pg_config.host = Some(config.host.clone());
        pg_config.port = Some(config.port);
        pg_config.dbname = Some(config.database.clone());
        pg_config.user = Some(config.username.clone());
        pg_config.password = Some(config.password.clone());
        pg_config.connect_timeout = Some(config.connection_timeout);

        pg_config.ssl_mode = Some(match config.ssl_mode.as_str() {
            "disable" => deadpool_postgres::SslMode::Disable,
            "prefer" => deadpool_postgres::SslMode::Prefer,
            "require" => deadpool_postgres::SslMode::Require,
            other => {
                warn!("Unknown SSL mode '{}', defaulting to 'require'", other);
                deadpool_postgres::SslMode::Require
            }
        });

        pg_config.manager = Some(deadpool_postgres::ManagerConfig {
            recycling_method: deadpool_postgres::RecyclingMethod::Fast,
        });

        let mut pool_config = deadpool_postgres::PoolConfig::new(config.max_connections as usize);
        pool_config.timeouts.wait = Some(config.connection_timeout);
        pool_config.timeouts.create = Some(config.connection_timeout);
        pg_config.pool = Some(pool_config);

        let tls_connector = TlsConnector::builder().build().map_err(|e| {
            error!("Failed to create TLS connector: {}", e);
            ApiError::Database(format!("TLS connector creation failed: {}", e))
        })?;
        let tls = MakeTlsConnector::new(tls_connector);

        pg_config.create_pool(Some(Runtime::Tokio1), tls).map_err(|e| {
            error!("Failed to create connection pool: {}", e);
            ApiError::Database(format!("Connection pool creation failed: {}", e))
        })
    }

    async fn get_connection(&self) -> Result<Object, ApiError> {
        self.pool.get().await.map_err(ApiError::from)
    }

    pub async fn health_check(&self) -> Result<(), ApiError> {
        let client = self.get_connection().await?;

        client.execute("SELECT 1", &[]).await.map_err(|e| {
            error!("Database health check failed: {}", e);
            ApiError::Database(format!("Health check failed: {}", e))
        })?;

        info!("Database health check successful");
        Ok(())
    }

    /// Creates enum types, tables and indexes that do not exist yet.
    pub async fn migrate(&self) -> Result<(), ApiError> {
        info!("Running database migrations");

        let client = self.get_connection().await?;

        for (name, statement) in MIGRATIONS {
            client.batch_execute(statement).await.map_err(|e| {
                error!("Migration step '{}' failed: {}", name, e);
                ApiError::Database(format!("Migration step '{}' failed: {}", name, e))
            })?;
        }

        info!(steps = MIGRATIONS.len(), "Database migrations completed successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_types_precede_tables() {
        let position = |name: &str| MIGRATIONS.iter().position(|(n, _)| *n == name).unwrap();
        assert!(position("attachment_status type") < position("attachments table"));
        assert!(position("quiz_difficulty type") < position("quizzes table"));
        assert!(position("bookmark_content_type type") < position("bookmarks table"));
        assert!(position("users table") < position("attachments table"));
        assert!(position("summaries table") < position("flashcards table"));
    }

    #[tokio::test]
    async fn test_connect_lazy_does_not_touch_the_network() {
        let config = DatabaseConfig::from_connection_string("postgres://u:p@127.0.0.1:1/app?sslmode=disable")
            .expect("valid url");
        assert!(Database::connect_lazy(&config).is_ok());
    }
}
