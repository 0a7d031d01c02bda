use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use scheduler::DataAccessError;

/// Rejections of an ingest payload before anything is written.
#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Missing fields")]
    MissingFields,

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Malformed body: {0}")]
    MalformedBody(String),
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Database error")]
    Database(#[source] anyhow::Error),
}

impl From<DataAccessError> for ApiError {
    fn from(err: DataAccessError) -> Self {
        ApiError::Database(err.into())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Database(cause) = &self {
            error!(error = %format!("{cause:#}"), "request failed on database access");
        }

        let body = Json(json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}
