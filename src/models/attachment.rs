use std::fmt;

use chrono::{DateTime, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::extraction::FileKind;

pub const MAX_FILES_PER_UPLOAD: usize = 3;
pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;
pub const MAX_PROFILE_PICTURE_SIZE: usize = 5 * 1024 * 1024;
pub const PROFILE_PICTURE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Processing state of an uploaded file, stored as the `attachment_status`
/// Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "lowercase")]
#[postgres(name = "attachment_status")]
pub enum AttachmentStatus {
    #[postgres(name = "pending")]
    Pending,
    #[postgres(name = "processing")]
    Processing,
    #[postgres(name = "completed")]
    Completed,
    #[postgres(name = "failed")]
    Failed,
}

impl AttachmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentStatus::Pending => "pending",
            AttachmentStatus::Processing => "processing",
            AttachmentStatus::Completed => "completed",
            AttachmentStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AttachmentStatus::Completed | AttachmentStatus::Failed)
    }

    /// `pending → processing → completed | failed`; a pending file may also
    /// fail directly (e.g. the stored file vanished before a worker picked it up).
    pub fn can_transition_to(&self, next: AttachmentStatus) -> bool {
        use AttachmentStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Processing, Completed) | (Processing, Failed) | (Pending, Failed)
        )
    }
}

impl fmt::Display for AttachmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file uploaded by a user as part of a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub batch_id: Uuid,
    pub file_name: String,
    #[serde(skip_serializing, default)]
    pub file_path: String,
    pub status: AttachmentStatus,
    pub extracted_text: Option<String>,
    pub error: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A file received in a multipart request, not yet written to disk.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl IncomingFile {
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }
}

/// Validates a whole upload before anything is written. Every problem is
/// reported, not just the first.
pub fn validate_upload(files: &[IncomingFile]) -> Result<Vec<FileKind>, Vec<String>> {
    if files.is_empty() {
        return Err(vec!["At least one file must be provided.".to_string()]);
    }

    if files.len() > MAX_FILES_PER_UPLOAD {
        return Err(vec![format!(
            "You can upload at most {} files at a time.",
            MAX_FILES_PER_UPLOAD
        )]);
    }

    let mut errors = Vec::new();
    let mut kinds = Vec::with_capacity(files.len());

    for file in files {
        match FileKind::from_file_name(&file.file_name) {
            Some(kind) => kinds.push(kind),
            None => errors.push(format!(
                "Unsupported file extension for file {}. Allowed: pdf, docx, txt, pptx.",
                file.file_name
            )),
        }

        if file.bytes.is_empty() {
            errors.push(format!("The file {} is empty.", file.file_name));
        } else if file.bytes.len() > MAX_FILE_SIZE {
            errors.push(format!("The file {} is too large. Max size: 10MB.", file.file_name));
        }
    }

    if errors.is_empty() {
        Ok(kinds)
    } else {
        Err(errors)
    }
}

/// Returns the normalized extension of an acceptable profile picture.
pub fn validate_profile_picture(file: &IncomingFile) -> Result<String, String> {
    let extension = file
        .extension()
        .filter(|ext| PROFILE_PICTURE_EXTENSIONS.contains(&ext.as_str()))
        .ok_or_else(|| "Unsupported file extension. Allowed: jpg, jpeg, png.".to_string())?;

    if file.bytes.is_empty() {
        return Err("The image is empty.".to_string());
    }

    if file.bytes.len() > MAX_PROFILE_PICTURE_SIZE {
        return Err("The image is too large. Max size: 5MB.".to_string());
    }

    Ok(extension)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    Empty,
    NotProcessed,
    Failed(Vec<String>),
    NoText,
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchError::Empty => f.write_str("The batch contains no files."),
            BatchError::NotProcessed => f.write_str("Not all files have been processed yet."),
            BatchError::Failed(names) => write!(
                f,
                "Text extraction failed for: {}. Please upload these files again.",
                names.join(", ")
            ),
            BatchError::NoText => f.write_str("No text could be extracted from the uploaded files."),
        }
    }
}

/// Joins the extracted text of a fully processed batch, in upload order.
///
/// Files still pending or processing block the whole batch; so does any failed
/// file. Blank extractions are skipped as long as at least one file has text.
pub fn combine_batch_text(files: &[UploadedFile]) -> Result<String, BatchError> {
    if files.is_empty() {
        return Err(BatchError::Empty);
    }

    if files.iter().any(|f| !f.status.is_terminal()) {
        return Err(BatchError::NotProcessed);
    }

    let failed: Vec<String> = files
        .iter()
        .filter(|f| f.status == AttachmentStatus::Failed)
        .map(|f| f.file_name.clone())
        .collect();
    if !failed.is_empty() {
        return Err(BatchError::Failed(failed));
    }

    let mut ordered: Vec<&UploadedFile> = files.iter().collect();
    ordered.sort_by_key(|f| f.uploaded_at);

    let parts: Vec<&str> = ordered
        .iter()
        .filter_map(|f| f.extracted_text.as_deref())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .collect();

    if parts.is_empty() {
        return Err(BatchError::NoText);
    }

    Ok(parts.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn incoming(name: &str, size: usize) -> IncomingFile {
        IncomingFile { file_name: name.to_string(), bytes: vec![b'a'; size] }
    }

    fn uploaded(name: &str, status: AttachmentStatus, text: Option<&str>, offset_secs: i64) -> UploadedFile {
        let at = Utc::now() + Duration::seconds(offset_secs);
        UploadedFile {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            batch_id: Uuid::nil(),
            file_name: name.to_string(),
            file_path: format!("media/attachments/{}", name),
            status,
            extracted_text: text.map(str::to_string),
            error: None,
            uploaded_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_status_transitions() {
        use AttachmentStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Pending.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Completed));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&AttachmentStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
        assert_eq!(AttachmentStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_upload_accepts_supported_files() {
        let files = vec![incoming("notes.pdf", 10), incoming("Slides.PPTX", 10), incoming("a.txt", 1)];
        let kinds = validate_upload(&files).expect("valid upload");
        assert_eq!(kinds, vec![FileKind::Pdf, FileKind::Pptx, FileKind::Txt]);
    }

    #[test]
    fn test_upload_enforces_file_limit() {
        let files: Vec<IncomingFile> = (0..4).map(|i| incoming(&format!("f{}.txt", i), 5)).collect();
        let errors = validate_upload(&files).unwrap_err();
        assert_eq!(errors, vec!["You can upload at most 3 files at a time.".to_string()]);

        assert!(validate_upload(&[]).is_err());
    }

    #[test]
    fn test_upload_reports_every_problem() {
        let files = vec![
            incoming("virus.exe", 10),
            incoming("empty.txt", 0),
            incoming("huge.pdf", MAX_FILE_SIZE + 1),
        ];
        let errors = validate_upload(&files).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors[0].contains("virus.exe"));
        assert!(errors[1].contains("empty"));
        assert!(errors[2].contains("too large"));
    }

    #[test]
    fn test_profile_picture_rules() {
        assert_eq!(validate_profile_picture(&incoming("me.JPG", 100)).unwrap(), "jpg");
        assert!(validate_profile_picture(&incoming("me.gif", 100)).is_err());
        assert!(validate_profile_picture(&incoming("me.png", MAX_PROFILE_PICTURE_SIZE + 1)).is_err());
        assert!(validate_profile_picture(&incoming("noext", 100)).is_err());
    }

    #[test]
    fn test_combine_requires_completed_batch() {
        let files = vec![
            uploaded("a.txt", AttachmentStatus::Completed, Some("first"), 0),
            uploaded("b.txt", AttachmentStatus::Processing, None, 1),
        ];
        assert_eq!(combine_batch_text(&files), Err(BatchError::NotProcessed));
        assert_eq!(combine_batch_text(&[]), Err(BatchError::Empty));
    }

    #[test]
    fn test_combine_reports_failed_files() {
        let files = vec![
            uploaded("a.txt", AttachmentStatus::Completed, Some("first"), 0),
            uploaded("b.pdf", AttachmentStatus::Failed, None, 1),
        ];
        assert_eq!(
            combine_batch_text(&files),
            Err(BatchError::Failed(vec!["b.pdf".to_string()]))
        );
    }

    #[test]
    fn test_combine_joins_in_upload_order_and_skips_blank() {
        let files = vec![
            uploaded("second.txt", AttachmentStatus::Completed, Some(" second "), 5),
            uploaded("blank.txt", AttachmentStatus::Completed, Some("   "), 3),
            uploaded("first.txt", AttachmentStatus::Completed, Some("first"), 0),
        ];
        assert_eq!(combine_batch_text(&files).unwrap(), "first\n\nsecond");

        let all_blank = vec![uploaded("blank.txt", AttachmentStatus::Completed, Some(""), 0)];
        assert_eq!(combine_batch_text(&all_blank), Err(BatchError::NoText));
    }
}
