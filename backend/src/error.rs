use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use shared::ErrorResponse;

use crate::analysis::factors::FactorError;
use crate::inference::InferenceError;
use crate::report::RenderError;

/// Failure of a single request. Every variant is answered with 400 and a
/// `{"detail": ...}` body.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Invalid base64 image: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Could not decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("Invalid JSON in {field}: {source}")]
    Json {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("Missing field: {0}")]
    MissingField(&'static str),
    #[error("Upload exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("Invalid upload: {0}")]
    Upload(String),
    #[error("Invalid factors: {0}")]
    Factors(#[from] FactorError),
    #[error("Detection failed: {0}")]
    Inference(#[from] InferenceError),
    #[error("Report generation failed: {0}")]
    Render(#[from] RenderError),
    #[error("Could not encode image: {0}")]
    Encode(#[source] image::ImageError),
    #[error("Worker error: {0}")]
    Blocking(String),
}

impl AnalysisError {
    pub fn json(field: &'static str, source: serde_json::Error) -> Self {
        AnalysisError::Json { field, source }
    }
}

impl ResponseError for AnalysisError {
    fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            detail: self.to_string(),
        })
    }
}
