// HTTP handlers for the REST API

pub mod account;
pub mod attachments;
pub mod auth;
pub mod bookmarks;
pub mod study;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Multipart, Request},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;

use crate::error::ApiError;
use crate::models::IncomingFile;

/// Health check handler
/// Returns "OK" with 200 status for monitoring purposes
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// `Json<T>` whose rejections render as a 400 in the API error envelope.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiError::validation(rejection.body_text())),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

pub(crate) fn message(message: &'static str) -> Json<MessageResponse> {
    Json(MessageResponse { message })
}

/// Multipart contents split into text fields and files, in arrival order.
#[derive(Debug, Default)]
pub(crate) struct MultipartForm {
    pub fields: Vec<(String, String)>,
    pub files: Vec<(String, IncomingFile)>,
}

impl MultipartForm {
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = MultipartForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::validation(format!("Invalid multipart body: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::validation(format!("Failed to read uploaded file: {}", e)))?;
                    form.files.push((name, IncomingFile { file_name, bytes: bytes.to_vec() }));
                }
                None => {
                    let value = field
                        .text()
                        .await
                        .map_err(|e| ApiError::validation(format!("Invalid form field '{}': {}", name, e)))?;
                    form.fields.push((name, value));
                }
            }
        }

        Ok(form)
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Last path component of a client supplied file name.
pub(crate) fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("").trim();
    let base: String = base.chars().filter(|c| !c.is_control()).take(255).collect();
    if base.is_empty() || base == "." || base == ".." {
        "upload".to_string()
    } else {
        base
    }
}
