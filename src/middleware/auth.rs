//! Bearer token authentication.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::debug;

use crate::{
    auth::jwt::Claims,
    handlers::auth::hash_token,
    telemetry::{record_auth_attempt, AuthOutcome},
    AppState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthFailure {
    MissingHeader,
    BadFormat,
    InvalidToken,
    Revoked,
}

impl AuthFailure {
    fn into_response(self) -> Response {
        let (message, code) = match self {
            AuthFailure::MissingHeader => ("Missing authorization header", "MISSING_AUTH_HEADER"),
            AuthFailure::BadFormat => ("Invalid authorization header format", "INVALID_AUTH_FORMAT"),
            AuthFailure::InvalidToken => ("Invalid or expired token", "INVALID_TOKEN"),
            AuthFailure::Revoked => ("Token has been revoked", "TOKEN_REVOKED"),
        };
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": message, "code": code})),
        )
            .into_response()
    }
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Claims, AuthFailure> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthFailure::MissingHeader)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AuthFailure::BadFormat)?;

    let claims = state
        .jwt_config
        .verify_access_token(token)
        .map_err(|_| AuthFailure::InvalidToken)?;

    let revocation = &state.cache.token_revocation;
    if revocation.is_token_revoked(&hash_token(token)).await {
        record_auth_attempt("access", AuthOutcome::TokenRevoked);
        return Err(AuthFailure::Revoked);
    }

    if let Some(user_id) = claims.user_id() {
        if revocation.is_user_token_revoked(user_id, claims.iat).await {
            record_auth_attempt("access", AuthOutcome::TokenRevoked);
            return Err(AuthFailure::Revoked);
        }
    }

    Ok(claims)
}

/// Rejects the request with 401 unless it carries a valid access token.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let claims = authenticate(&state, req.headers())
        .await
        .map_err(AuthFailure::into_response)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Attaches claims when a valid token is present; otherwise the request
/// continues anonymously.
pub async fn optional_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    if req.headers().contains_key(header::AUTHORIZATION) {
        match authenticate(&state, req.headers()).await {
            Ok(claims) => {
                req.extensions_mut().insert(claims);
            }
            Err(failure) => debug!(reason = ?failure, "Ignoring unusable token on public route"),
        }
    }

    next.run(req).await
}
