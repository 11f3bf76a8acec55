use crate::completion::CompletionError;
use axum::Json;
use axum::response::{IntoResponse, Response};
use http::header::WWW_AUTHENTICATE;
use http::{HeaderValue, StatusCode};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid CORS origin: {0}")]
    InvalidOrigin(String),
}

/// Errors returned to API clients
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Authentication required")]
    MissingToken,

    #[error("Invalid authorization token")]
    InvalidToken,

    #[error("Completion error: {0}")]
    Completion(#[from] CompletionError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingToken => StatusCode::UNAUTHORIZED,
            ApiError::InvalidToken => StatusCode::FORBIDDEN,
            ApiError::Completion(_) => StatusCode::BAD_GATEWAY,
            ApiError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

#[derive(Serialize)]
struct ApiErrorResponse {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ApiErrorResponse {
            detail: self.to_string(),
        });

        let mut response = (status, body).into_response();
        if matches!(self, ApiError::MissingToken | ApiError::InvalidToken) {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
