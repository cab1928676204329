use std::sync::Arc;
use std::time::Duration;

use crate::ai::AiClient;
use crate::auth::{GoogleOAuth, TokenService};
use crate::config::Config;
use crate::db::Database;
use crate::jobs::JobQueue;
use crate::mail::Mailer;

const OAUTH_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Shared by every handler and background worker as `Arc<AppState>`.
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub tokens: TokenService,
    pub google: GoogleOAuth,
    pub ai: Arc<dyn AiClient>,
    pub mailer: Arc<dyn Mailer>,
    pub jobs: JobQueue,
}

impl AppState {
    pub fn new(
        config: Config,
        db: Database,
        ai: Arc<dyn AiClient>,
        mailer: Arc<dyn Mailer>,
        jobs: JobQueue,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(OAUTH_HTTP_TIMEOUT).build()?;

        Ok(AppState {
            tokens: TokenService::new(&config.auth),
            google: GoogleOAuth::new(config.google.clone(), http),
            config,
            db,
            ai,
            mailer,
            jobs,
        })
    }
}

/// State over a lazily connected pool, for tests that never reach the database.
#[cfg(test)]
pub(crate) fn test_state(
    mailer: Arc<dyn Mailer>,
) -> (Arc<AppState>, tokio::sync::mpsc::Receiver<crate::jobs::Job>) {
    let config = crate::config::test_config();
    let db = Database::connect_lazy(&config.database).expect("lazy pool");
    let ai = crate::ai::ChatCompletionsClient::new(config.ai.clone()).expect("ai client");
    let (jobs, receiver) = JobQueue::new(config.jobs.queue_capacity);

    let state = AppState::new(config, db, Arc::new(ai), mailer, jobs).expect("state");
    (Arc::new(state), receiver)
}
