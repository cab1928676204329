//! Background work: a bounded queue drained by a fixed pool of tokio workers,
//! the lifecycle hooks that feed it, and periodic maintenance.

pub mod maintenance;
pub mod signals;

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::extraction::{extract_text, FileKind};
use crate::mail::EmailMessage;
use crate::state::AppState;

pub use maintenance::spawn_maintenance;

#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    ExtractText { attachment_id: Uuid },
    SendEmail(EmailMessage),
}

impl Job {
    fn name(&self) -> &'static str {
        match self {
            Job::ExtractText { .. } => "extract_text",
            Job::SendEmail(_) => "send_email",
        }
    }
}

/// Sending half of the job channel. Cloned into request state.
#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<Job>,
}

impl JobQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Job>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (JobQueue { sender }, receiver)
    }

    /// Waits for queue space when the workers are behind.
    pub async fn enqueue(&self, job: Job) -> Result<(), ApiError> {
        let name = job.name();
        self.sender
            .send(job)
            .await
            .map_err(|_| ApiError::Internal(anyhow::anyhow!("Job queue is closed, dropped {} job", name)))
    }
}

/// Starts `count` workers sharing one receiver.
pub fn spawn_workers(state: Arc<AppState>, count: usize, receiver: mpsc::Receiver<Job>) -> Vec<JoinHandle<()>> {
    let receiver = Arc::new(Mutex::new(receiver));

    (0..count)
        .map(|worker_id| {
            let state = Arc::clone(&state);
            let receiver = Arc::clone(&receiver);

            tokio::spawn(async move {
                info!(worker_id, "Job worker started");
                loop {
                    // hold the lock only while waiting for the next job
                    let job = { receiver.lock().await.recv().await };
                    match job {
                        Some(job) => run_job(&state, job, worker_id).await,
                        None => break,
                    }
                }
                info!(worker_id, "Job worker stopped");
            })
        })
        .collect()
}

/// Puts attachments left `pending` by a previous run back on the queue.
pub async fn requeue_pending(state: &AppState) -> Result<usize, ApiError> {
    let pending = state.db.pending_attachment_ids().await?;
    for attachment_id in &pending {
        state.jobs.enqueue(Job::ExtractText { attachment_id: *attachment_id }).await?;
    }

    if !pending.is_empty() {
        info!("Requeued {} pending attachments", pending.len());
    }
    Ok(pending.len())
}

async fn run_job(state: &AppState, job: Job, worker_id: usize) {
    let name = job.name();
    let result = match job {
        Job::ExtractText { attachment_id } => process_attachment(state, attachment_id).await,
        Job::SendEmail(message) => {
            let to = message.to.clone();
            state.mailer.send(message).await.map_err(|e| {
                error!("Error sending email to {}: {:#}", to, e);
                ApiError::Internal(e)
            })
        }
    };

    if let Err(e) = result {
        warn!(worker_id, job = name, "Job failed: {}", e);
    }
}

/// Runs text extraction for one attachment and records the outcome on it.
/// Extraction errors mark the attachment `failed`; they are not retried.
async fn process_attachment(state: &AppState, attachment_id: Uuid) -> Result<(), ApiError> {
    let attachment = state.db.mark_attachment_processing(attachment_id).await?;

    let Some(kind) = FileKind::from_file_name(&attachment.file_name) else {
        state
            .db
            .mark_attachment_failed(attachment_id, "Unsupported file type")
            .await?;
        return Ok(());
    };

    let bytes = match tokio::fs::read(&attachment.file_path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Could not read {}: {}", attachment.file_path, e);
            state
                .db
                .mark_attachment_failed(attachment_id, &format!("Stored file could not be read: {}", e))
                .await?;
            return Ok(());
        }
    };

    // parsers are CPU bound and may panic on malformed input
    let outcome = tokio::task::spawn_blocking(move || extract_text(kind, &bytes)).await;

    match outcome {
        Ok(Ok(text)) => {
            info!(
                attachment_id = %attachment_id,
                kind = kind.extension(),
                chars = text.chars().count(),
                "Extracted text"
            );
            state.db.mark_attachment_completed(attachment_id, &text).await?;
        }
        Ok(Err(e)) => {
            error!("Extraction failed for {}: {}", attachment.file_name, e);
            state.db.mark_attachment_failed(attachment_id, &e.to_string()).await?;
        }
        Err(e) => {
            error!("Extraction task for {} aborted: {}", attachment.file_name, e);
            state
                .db
                .mark_attachment_failed(attachment_id, "The document could not be parsed")
                .await?;
        }
    }

    Ok(())
}
