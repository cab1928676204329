use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tracing::{error, info, warn};

use study_assistant_api::{
    ai::ChatCompletionsClient,
    config::Config,
    create_router,
    db::Database,
    jobs::{self, JobQueue},
    mail,
    middleware::init_tracing,
    state::AppState,
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    if let Err(e) = init_tracing() {
        eprintln!("Failed to initialize tracing: {}", e);
        std::process::exit(1);
    }

    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(config) => {
            info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    // Initialize database connection
    let database = match Database::new(&config.database).await {
        Ok(db) => {
            info!("Database connection established");
            db
        }
        Err(e) => {
            error!("Failed to connect to database: {:#}", e);
            std::process::exit(1);
        }
    };

    // Run database migrations
    if let Err(e) = database.migrate().await {
        error!("Failed to run database migrations: {}", e);
        std::process::exit(1);
    }
    info!("Database migrations completed successfully");

    let ai = match ChatCompletionsClient::new(config.ai.clone()) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create AI client: {:#}", e);
            std::process::exit(1);
        }
    };

    let mailer = match mail::from_config(&config.email) {
        Ok(mailer) => mailer,
        Err(e) => {
            error!("Failed to configure email delivery: {:#}", e);
            std::process::exit(1);
        }
    };

    let (queue, receiver) = JobQueue::new(config.jobs.queue_capacity);
    let worker_count = config.jobs.worker_count;
    let maintenance_interval = config.jobs.maintenance_interval;
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    let state = match AppState::new(config, database.clone(), Arc::new(ai), mailer, queue) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to build application state: {:#}", e);
            std::process::exit(1);
        }
    };

    // Background workers and periodic cleanup
    jobs::spawn_workers(Arc::clone(&state), worker_count, receiver);
    if let Err(e) = jobs::requeue_pending(&state).await {
        warn!("Failed to requeue pending attachments: {}", e);
    }
    jobs::spawn_maintenance(database, maintenance_interval);

    // Create the Axum router with all endpoints
    let app = create_router(state);

    info!("Starting server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            info!("Server listening on {}", addr);
            listener
        }
        Err(e) => {
            error!("Failed to bind to address {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    // Start the server with graceful shutdown handling
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    info!("Server shutdown complete");
}

/// Graceful shutdown signal handler
/// Listens for SIGTERM and SIGINT signals
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal, initiating graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM signal, initiating graceful shutdown");
        },
    }
}
