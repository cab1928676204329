// Shared setup for the integration tests.

#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    response::Response,
    Router,
};
use serde_json::Value;

use study_assistant_api::{
    ai::AiClient,
    config::{
        AiConfig, AuthConfig, Config, DatabaseConfig, EmailConfig, Environment, GoogleConfig, JobsConfig,
        MediaConfig,
    },
    create_router,
    jobs::JobQueue,
    mail::LogMailer,
    models::{Difficulty, FlashcardDraft, QuestionDraft},
    ApiError, AppState, Database,
};

pub const STRONG_PASSWORD: &str = "Str0ng!pass";

/// Settings pointing at an unreachable database and AI service.
pub fn config() -> Config {
    Config {
        port: 8080,
        database: DatabaseConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            database: "study_test".to_string(),
            username: "test".to_string(),
            password: "test".to_string(),
            ssl_mode: "disable".to_string(),
            max_connections: 2,
            connection_timeout: Duration::from_secs(1),
            connection_string: None,
        },
        environment: Environment::Local,
        auth: AuthConfig {
            secret_key: "integration-secret-key-with-enough-bytes".to_string(),
            access_token_lifetime: Duration::from_secs(120 * 60),
            refresh_token_lifetime: Duration::from_secs(24 * 60 * 60),
            otp_lifetime: Duration::from_secs(10 * 60),
            otp_max_attempts: 5,
        },
        email: EmailConfig {
            host: None,
            port: 587,
            username: None,
            password: None,
            use_tls: true,
            from_address: "no-reply@localhost".to_string(),
            subject_prefix: String::new(),
            timeout: Duration::from_secs(1),
        },
        google: GoogleConfig {
            client_id: "integration-client".to_string(),
            client_secret: "integration-secret".to_string(),
            redirect_uri: "http://127.0.0.1:8080/api/auth/google/callback/".to_string(),
        },
        ai: AiConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            api_key: String::new(),
            model: "deepseek-chat".to_string(),
            timeout: Duration::from_secs(1),
        },
        media: MediaConfig { root: std::env::temp_dir().join("study-assistant-api-tests") },
        jobs: JobsConfig {
            worker_count: 1,
            queue_capacity: 8,
            maintenance_interval: Duration::from_secs(3600),
        },
    }
}

/// Canned AI responses so generation endpoints run without the network.
pub struct StubAi;

#[async_trait]
impl AiClient for StubAi {
    async fn summarize(&self, text: &str) -> Result<String, ApiError> {
        Ok(format!("Summary of {} characters", text.chars().count()))
    }

    async fn flashcards(&self, _summary: &str, count: u32) -> Result<Vec<FlashcardDraft>, ApiError> {
        Ok((0..count)
            .map(|i| FlashcardDraft { term: format!("Term {}", i), definition: format!("Definition {}", i) })
            .collect())
    }

    async fn quiz(&self, _summary: &str, _difficulty: Difficulty, num_questions: u32) -> Result<Vec<QuestionDraft>, ApiError> {
        Ok((0..num_questions)
            .map(|i| QuestionDraft {
                question: format!("Question {}", i),
                choices: vec!["Yes".to_string(), "No".to_string()],
                correct_index: 0,
            })
            .collect())
    }
}

/// Router and state over `config`. Queued jobs are dropped: nothing drains
/// the queue, so enqueueing fails fast and is only logged.
pub fn app_with(config: Config, db: Database) -> (Router, Arc<AppState>) {
    let (jobs, _receiver) = JobQueue::new(config.jobs.queue_capacity);
    let state = Arc::new(AppState::new(config, db, Arc::new(StubAi), Arc::new(LogMailer), jobs).expect("state"));
    (create_router(Arc::clone(&state)), state)
}

/// App over a pool that never connects.
pub fn lazy_app() -> (Router, Arc<AppState>) {
    let config = config();
    let db = Database::connect_lazy(&config.database).expect("lazy pool");
    app_with(config, db)
}

static MIGRATED: tokio::sync::Mutex<bool> = tokio::sync::Mutex::const_new(false);

/// App over the database named by `TEST_DATABASE_URL`, migrated once per
/// test binary. `None` when the variable is unset.
pub async fn database_app() -> Option<(Router, Arc<AppState>)> {
    let url = match std::env::var("TEST_DATABASE_URL") {
        Ok(url) if !url.trim().is_empty() => url,
        _ => {
            eprintln!("TEST_DATABASE_URL is not set, skipping database test");
            return None;
        }
    };

    let mut config = config();
    config.database = DatabaseConfig::from_connection_string(&url).expect("valid TEST_DATABASE_URL");
    config.database.max_connections = 10;
    config.database.connection_timeout = Duration::from_secs(10);

    let db = Database::connect_lazy(&config.database).expect("pool");
    {
        let mut migrated = MIGRATED.lock().await;
        if !*migrated {
            db.migrate().await.expect("migrations");
            *migrated = true;
        }
    }

    Some(app_with(config, db))
}

pub fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

/// `(code, message)` of an error envelope.
pub async fn error_body(response: Response) -> (String, String) {
    let json = json_body(response).await;
    (
        json["error"]["code"].as_str().unwrap_or_default().to_string(),
        json["error"]["message"].as_str().unwrap_or_default().to_string(),
    )
}

pub fn unique_email() -> String {
    format!("student-{}@example.com", uuid::Uuid::new_v4().simple())
}
