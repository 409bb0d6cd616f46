//! API error type and its HTTP mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use meshsync_state::StateError;

use crate::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body failed validation; nothing was stored.
    #[error(transparent)]
    Invalid(#[from] StateError),

    #[error("{0} not found")]
    NotFound(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Invalid(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.to_string()),
        };
        (status, Json(body)).into_response()
    }
}
