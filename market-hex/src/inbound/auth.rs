//! Authentication middleware resolving API keys to a [`Principal`].

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use market_types::{AppError, MarketRepository, Principal};

use super::handlers::{ApiError, AppState};

/// Extracts the API key from the Authorization header.
/// Expected format: "Bearer <api_key>" or just "<api_key>"
fn extract_api_key(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?.trim();
    Some(header.strip_prefix("Bearer ").unwrap_or(header).trim())
}

/// Routes reachable without a key.
fn is_public(method: &Method, path: &str) -> bool {
    path == "/health"
        || (path == "/api/users" && method == Method::POST)
        || path.starts_with("/swagger-ui")
        || path.starts_with("/api-docs")
}

/// Authentication middleware.
///
/// Hashes the presented key, resolves it to a user and stores the resulting
/// [`Principal`] in the request extensions for handlers to extract.
/// Missing or unknown keys get 401.
pub async fn auth_middleware<R: MarketRepository>(
    State(state): State<Arc<AppState<R>>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if is_public(request.method(), request.uri().path()) {
        return next.run(request).await;
    }

    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok());

    let api_key = match extract_api_key(auth_header) {
        Some(key) if !key.is_empty() => key,
        _ => {
            return unauthorized("Missing or invalid Authorization header");
        }
    };

    let key_hash = market_repo::security::hash_api_key(api_key);

    match state.service.authenticate(&key_hash).await {
        Ok(Some(principal)) => {
            tracing::debug!(user_id = %principal.user_id, "authenticated");
            request.extensions_mut().insert::<Principal>(principal);
            next.run(request).await
        }
        Ok(None) => unauthorized("Invalid API key"),
        Err(e) => {
            tracing::error!("API key verification failed: {}", e);
            ApiError(e).into_response()
        }
    }
}

fn unauthorized(message: &str) -> Response {
    ApiError(AppError::Unauthorized(message.to_string())).into_response()
}
