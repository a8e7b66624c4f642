use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error as ThisError;

use super::validation::FieldErrors;

#[derive(Debug, ThisError)]
pub enum QuillError {
    #[error("Upstream error with status: {0}")]
    UpstreamStatus(StatusCode),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Password hashing error: {0}")]
    Hash(String),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("OAuth flow error [{code}]: {message}")]
    OauthFlow { code: String, message: String },

    #[error(transparent)]
    Validation(#[from] FieldErrors),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Forbidden: {0}")]
    Forbidden(&'static str),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl QuillError {
    pub(crate) fn oauth_flow(code: &str, message: impl Into<String>) -> Self {
        QuillError::OauthFlow {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl IntoResponse for QuillError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_body) = match self {
            QuillError::Validation(errors) => {
                let status = StatusCode::BAD_REQUEST;
                let body = ApiErrorObject {
                    code: "VALIDATION".to_string(),
                    message: "Submission failed validation.".to_string(),
                    details: serde_json::to_value(&errors).ok(),
                };
                (status, body)
            }

            QuillError::NotFound(entity) => {
                let status = StatusCode::NOT_FOUND;
                let body = ApiErrorObject {
                    code: "NOT_FOUND".to_string(),
                    message: format!("{entity} not found."),
                    details: None,
                };
                (status, body)
            }

            QuillError::Forbidden(reason) => {
                let status = StatusCode::FORBIDDEN;
                let body = ApiErrorObject {
                    code: "FORBIDDEN".to_string(),
                    message: reason.to_string(),
                    details: None,
                };
                (status, body)
            }

            QuillError::OauthFlow { code, message } => {
                let status = StatusCode::FORBIDDEN;
                let body = ApiErrorObject {
                    code,
                    message,
                    details: None,
                };
                (status, body)
            }

            QuillError::UpstreamStatus(_)
            | QuillError::Reqwest(_)
            | QuillError::Url(_)
            | QuillError::Json(_) => {
                let status = StatusCode::BAD_GATEWAY;
                let body = ApiErrorObject {
                    code: "UPSTREAM_ERROR".to_string(),
                    message: "Upstream service error.".to_string(),
                    details: None,
                };
                (status, body)
            }

            QuillError::Database(_) | QuillError::Hash(_) | QuillError::Unexpected(_) => {
                let status = StatusCode::INTERNAL_SERVER_ERROR;
                let body = ApiErrorObject {
                    code: "INTERNAL_ERROR".to_string(),
                    message: "An internal server error occurred.".to_string(),
                    details: None,
                };
                (status, body)
            }
        };
        (status, Json(ApiErrorBody { inner: error_body })).into_response()
    }
}

/// Standardized API error response payload.
#[derive(Serialize)]
pub struct ApiErrorObject {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Serialize)]
pub struct ApiErrorBody {
    #[serde(rename = "error")]
    pub inner: ApiErrorObject,
}
