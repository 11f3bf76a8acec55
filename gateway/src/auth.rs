use crate::api::AppState;
use crate::errors::ApiError;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use http::HeaderMap;
use http::header::AUTHORIZATION;

/// Checks the `Authorization: Bearer <token>` header against `expected`.
pub fn authorize(headers: &HeaderMap, expected: &str) -> Result<(), ApiError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
        .ok_or(ApiError::MissingToken)?;

    if token != expected {
        return Err(ApiError::InvalidToken);
    }
    Ok(())
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Middleware rejecting requests without the configured bearer token.
pub async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Err(e) = authorize(request.headers(), state.bearer_token()) {
        tracing::warn!(path = request.uri().path(), error = %e, "Rejected request");
        return Err(e);
    }
    Ok(next.run(request).await)
}
