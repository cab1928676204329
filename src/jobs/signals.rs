//! Hooks fired after records are created. They only enqueue work; a failure
//! to enqueue is logged and never fails the request that created the record.

use tracing::{error, info};

use super::Job;
use crate::mail::templates;
use crate::models::{UploadedFile, User};
use crate::state::AppState;

/// Queues the welcome email for a new account.
pub async fn user_created(state: &AppState, user: &User) {
    let message = templates::welcome(&user.email, &user.first_name, &state.config.email.subject_prefix);

    match state.jobs.enqueue(Job::SendEmail(message)).await {
        Ok(()) => info!("Queued welcome email for user {}", user.id),
        Err(e) => error!("Failed to queue welcome email for user {}: {}", user.id, e),
    }
}

/// Queues text extraction for a newly stored attachment.
pub async fn attachment_created(state: &AppState, attachment: &UploadedFile) {
    let job = Job::ExtractText { attachment_id: attachment.id };

    match state.jobs.enqueue(job).await {
        Ok(()) => info!("Queued text extraction for attachment {}", attachment.id),
        Err(e) => error!("Failed to queue text extraction for attachment {}: {}", attachment.id, e),
    }
}
