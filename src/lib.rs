// Library root for the study assistant API

pub mod ai;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extraction;
pub mod handlers;
pub mod jobs;
pub mod mail;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
