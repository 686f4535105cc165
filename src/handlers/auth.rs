//! Authentication handlers: token issue and rotation, logout and the caller's own profile.

use axum::{
    extract::{Multipart, State},
    http::{header, HeaderMap, StatusCode},
    Extension, Json,
};
use chrono::{Duration, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    audit::{AuditEntry, AuditEventType, AuditService},
    auth::{jwt::Claims, password::PasswordService},
    error::{get_db_conn, ApiError, ApiResult},
    handlers::users::{
        apply_profile, find_user, load_user_response, replace_profile_image, ProfileInput,
        UserResponse,
    },
    helpers::ClientIp,
    models::User,
    schema::{refresh_tokens, users},
    telemetry::{record_auth_attempt, AuthOutcome},
    AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "jdoe")]
    pub username: String,
    #[schema(example = "securepassword123")]
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    #[schema(example = "eyJhbGciOiJFZERTQSIsInR5cCI6IkpXVCJ9...")]
    pub refresh_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserResponse,
    #[schema(example = "eyJhbGciOiJFZERTQSIsInR5cCI6IkpXVCJ9...")]
    pub access_token: String,
    #[schema(example = "eyJhbGciOiJFZERTQSIsInR5cCI6IkpXVCJ9...")]
    pub refresh_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateMeRequest {
    pub email: Option<String>,
    #[serde(flatten)]
    pub profile: ProfileInput,
}

#[derive(Debug, Serialize, ToSchema, Default)]
pub struct ErrorResponse {
    #[schema(example = "Invalid credentials")]
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "INVALID_CREDENTIALS")]
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = refresh_tokens)]
struct NewRefreshToken {
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: chrono::NaiveDateTime,
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

fn store_refresh_token(
    conn: &mut PgConnection,
    user_id: Uuid,
    token: &str,
    expires_in_days: i64,
) -> Result<(), diesel::result::Error> {
    let token_hash = hash_token(token);
    let expires_at = (Utc::now() + Duration::days(expires_in_days)).naive_utc();

    diesel::insert_into(refresh_tokens::table)
        .values(&NewRefreshToken {
            user_id,
            token_hash,
            expires_at,
        })
        .execute(conn)?;

    Ok(())
}

fn verify_stored_token(conn: &mut PgConnection, token: &str) -> Result<Uuid, &'static str> {
    let token_hash = hash_token(token);
    let now = Utc::now().naive_utc();

    let result: Result<(Uuid, chrono::NaiveDateTime), _> = refresh_tokens::table
        .filter(refresh_tokens::token_hash.eq(&token_hash))
        .select((refresh_tokens::user_id, refresh_tokens::expires_at))
        .first(conn);

    match result {
        Ok((user_id, expires_at)) => {
            if expires_at < now {
                let _ = diesel::delete(
                    refresh_tokens::table.filter(refresh_tokens::token_hash.eq(&token_hash)),
                )
                .execute(conn);
                Err("Refresh token has expired")
            } else {
                Ok(user_id)
            }
        }
        Err(_) => Err("Invalid refresh token"),
    }
}

/// Removes `token` only when it was issued to `user_id`.
fn invalidate_token(
    conn: &mut PgConnection,
    user_id: Uuid,
    token: &str,
) -> Result<usize, diesel::result::Error> {
    let token_hash = hash_token(token);
    diesel::delete(
        refresh_tokens::table
            .filter(refresh_tokens::token_hash.eq(&token_hash))
            .filter(refresh_tokens::user_id.eq(user_id)),
    )
    .execute(conn)
}

fn cleanup_expired_tokens(conn: &mut PgConnection, user_id: Uuid) {
    let now = Utc::now().naive_utc();
    let result = diesel::delete(
        refresh_tokens::table
            .filter(refresh_tokens::user_id.eq(user_id))
            .filter(refresh_tokens::expires_at.lt(now)),
    )
    .execute(conn);

    if let Ok(count) = result {
        if count > 0 {
            info!(user_id = %user_id, deleted_count = count, "Cleaned up expired refresh tokens");
        }
    }
}

fn generate_tokens(
    state: &AppState,
    conn: &mut PgConnection,
    user: &User,
) -> ApiResult<(String, String)> {
    let access_token = state
        .jwt_config
        .generate_access_token(user.id, &user.username)
        .map_err(|e| {
            error!(error = %e, "Token generation failed");
            ApiError::internal("Token generation failed", "TOKEN_GENERATION_ERROR")
        })?;

    let refresh_token = state
        .jwt_config
        .generate_refresh_token(user.id)
        .map_err(|e| {
            error!(error = %e, "Token generation failed");
            ApiError::internal("Token generation failed", "TOKEN_GENERATION_ERROR")
        })?;

    store_refresh_token(
        conn,
        user.id,
        &refresh_token,
        state.jwt_config.refresh_token_expiry_days(),
    )
    .map_err(|e| {
        error!(error = %e, "Failed to store refresh token");
        ApiError::internal("Token storage failed", "TOKEN_STORAGE_ERROR")
    })?;

    Ok((access_token, refresh_token))
}

fn login_failed(
    conn: &mut PgConnection,
    username: &str,
    ip: Option<String>,
    reason: &str,
    actor: Option<Uuid>,
) {
    let mut entry = AuditEntry::new(
        AuditEventType::LoginFailed,
        format!("Failed login for {}", username),
    )
    .ip(ip)
    .details(format!("reason={}", reason))
    .failed();
    if let Some(actor) = actor {
        entry = entry.actor(actor);
    }
    AuditService::record(conn, entry);
}

#[utoipa::path(
    post,
    path = "/api/token",
    tag = "Authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 403, description = "Account inactive", body = ErrorResponse),
        (status = 423, description = "Account locked", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let username = payload.username.trim().to_string();

    if let Some(remaining) = state.lockout.lockout_remaining(&username).await {
        warn!(username = %username, "Login attempt for locked account");
        record_auth_attempt("login", AuthOutcome::AccountLocked);
        return Err(ApiError::locked(
            format!("Account is locked. Try again in {} seconds", remaining),
            "ACCOUNT_LOCKED",
        ));
    }

    let mut conn = get_db_conn(&state.db_pool)?;

    let user: Option<User> = users::table
        .filter(users::username.eq(&username))
        .select(User::as_select())
        .first(&mut conn)
        .optional()
        .map_err(ApiError::from_db)?;

    let Some(user) = user else {
        warn!(username = %username, "Login attempt for non-existent user");
        record_auth_attempt("login", AuthOutcome::InvalidCredentials);
        let _ = state.lockout.record_failed_attempt(&username).await;
        login_failed(&mut conn, &username, ip, "unknown_user", None);
        return Err(ApiError::unauthorized(
            "Invalid credentials",
            "INVALID_CREDENTIALS",
        ));
    };

    let is_valid = PasswordService::verify_password(&payload.password, &user.password_hash)
        .map_err(|e| {
            error!(error = %e, "Password verification error");
            ApiError::internal("Password verification error", "PASSWORD_VERIFY_ERROR")
        })?;

    if !is_valid {
        warn!(user_id = %user.id, "Failed login attempt - invalid password");
        record_auth_attempt("login", AuthOutcome::InvalidCredentials);
        let _ = state.lockout.record_failed_attempt(&username).await;
        login_failed(&mut conn, &username, ip, "invalid_password", Some(user.id));
        return Err(ApiError::unauthorized(
            "Invalid credentials",
            "INVALID_CREDENTIALS",
        ));
    }

    if !user.is_active {
        warn!(user_id = %user.id, "Login attempt for inactive user");
        record_auth_attempt("login", AuthOutcome::AccountInactive);
        login_failed(&mut conn, &username, ip, "account_inactive", Some(user.id));
        return Err(ApiError::forbidden(
            "Account is inactive",
            "ACCOUNT_INACTIVE",
        ));
    }

    let _ = state.lockout.clear_failed_attempts(&username).await;
    cleanup_expired_tokens(&mut conn, user.id);

    let (access_token, refresh_token) = generate_tokens(&state, &mut conn, &user)?;

    let user: User = diesel::update(users::table.find(user.id))
        .set(users::last_login.eq(Some(Utc::now().naive_utc())))
        .returning(User::as_returning())
        .get_result(&mut conn)
        .map_err(ApiError::from_db)?;

    AuditService::record(
        &mut conn,
        AuditEntry::new(
            AuditEventType::UserLogin,
            format!("User {} logged in", user.username),
        )
        .actor(user.id)
        .ip(ip),
    );

    record_auth_attempt("login", AuthOutcome::Success);
    info!(user_id = %user.id, username = %user.username, "User logged in");

    let user = load_user_response(&mut conn, user).map_err(ApiError::from_db)?;
    Ok(Json(AuthResponse {
        user,
        access_token,
        refresh_token,
    }))
}

#[utoipa::path(
    post,
    path = "/api/token/refresh",
    tag = "Authentication",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens refreshed", body = RefreshResponse),
        (status = 401, description = "Invalid or expired refresh token", body = ErrorResponse),
        (status = 403, description = "User account is inactive", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let refresh_claims = state
        .jwt_config
        .verify_refresh_token(&payload.refresh_token)
        .map_err(|_| {
            ApiError::unauthorized("Invalid or expired refresh token", "INVALID_REFRESH_TOKEN")
        })?;

    let user_id = Uuid::parse_str(&refresh_claims.sub).map_err(|e| {
        error!(error = %e, "Invalid user ID in refresh token");
        ApiError::unauthorized("Invalid token format", "INVALID_TOKEN_FORMAT")
    })?;

    let mut conn = get_db_conn(&state.db_pool)?;

    let stored_user_id = verify_stored_token(&mut conn, &payload.refresh_token).map_err(|msg| {
        warn!(user_id = %user_id, "Refresh token not found in database");
        ApiError::unauthorized(msg, "INVALID_REFRESH_TOKEN")
    })?;

    if stored_user_id != user_id {
        warn!(claimed_user_id = %user_id, stored_user_id = %stored_user_id, "Refresh token user mismatch");
        return Err(ApiError::unauthorized(
            "Invalid refresh token",
            "TOKEN_USER_MISMATCH",
        ));
    }

    let user: User = users::table
        .find(user_id)
        .select(User::as_select())
        .first(&mut conn)
        .map_err(|_| ApiError::unauthorized("User not found", "USER_NOT_FOUND"))?;

    if !user.is_active {
        return Err(ApiError::forbidden(
            "User account is inactive",
            "ACCOUNT_INACTIVE",
        ));
    }

    if state.rotate_refresh_tokens {
        invalidate_token(&mut conn, user.id, &payload.refresh_token).map_err(|e| {
            error!(error = %e, "Failed to invalidate old refresh token");
            ApiError::internal("Token invalidation failed", "TOKEN_INVALIDATION_ERROR")
        })?;

        let (access_token, refresh_token) = generate_tokens(&state, &mut conn, &user)?;

        info!(user_id = %user.id, "Tokens refreshed (rotated)");

        Ok(Json(RefreshResponse {
            access_token,
            refresh_token,
        }))
    } else {
        let access_token = state
            .jwt_config
            .generate_access_token(user.id, &user.username)
            .map_err(|e| {
                error!(error = %e, "Token generation failed");
                ApiError::internal("Token generation failed", "TOKEN_GENERATION_ERROR")
            })?;

        info!(user_id = %user.id, "Access token refreshed");

        Ok(Json(RefreshResponse {
            access_token,
            refresh_token: payload.refresh_token,
        }))
    }
}

#[utoipa::path(
    post,
    path = "/api/logout",
    tag = "Authentication",
    request_body = RefreshRequest,
    responses(
        (status = 204, description = "Logged out"),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    Json(payload): Json<RefreshRequest>,
) -> ApiResult<StatusCode> {
    let user_id = claims
        .user_id()
        .ok_or_else(|| ApiError::unauthorized("Invalid token", "INVALID_TOKEN"))?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let removed = invalidate_token(&mut conn, user_id, &payload.refresh_token).unwrap_or(0);

    AuditService::record(
        &mut conn,
        AuditEntry::new(
            AuditEventType::UserLogout,
            format!("User {} logged out", claims.username),
        )
        .actor(user_id)
        .ip(ip),
    );
    drop(conn);

    let remaining_secs = (claims.exp - Utc::now().timestamp()).max(0) as u64;
    if let Some(token) = bearer_token(&headers).filter(|_| remaining_secs > 0) {
        if let Err(e) = state
            .cache
            .token_revocation
            .revoke_token(&hash_token(token), remaining_secs)
            .await
        {
            warn!(error = %e, "Access token not revoked on logout");
        }
    }

    info!(user_id = %user_id, refresh_tokens_removed = removed, "User logged out");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/logout-all",
    tag = "Authentication",
    responses(
        (status = 204, description = "Logged out from all devices"),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn logout_all(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ClientIp(ip): ClientIp,
) -> ApiResult<StatusCode> {
    let user_id = claims
        .user_id()
        .ok_or_else(|| ApiError::unauthorized("Invalid token", "INVALID_TOKEN"))?;

    let mut conn = get_db_conn(&state.db_pool)?;

    let deleted_count =
        diesel::delete(refresh_tokens::table.filter(refresh_tokens::user_id.eq(user_id)))
            .execute(&mut conn)
            .map_err(|e| {
                error!(error = %e, "Failed to delete refresh tokens");
                ApiError::internal("Failed to logout", "LOGOUT_ERROR")
            })?;

    AuditService::record(
        &mut conn,
        AuditEntry::new(
            AuditEventType::UserLogout,
            format!("User {} logged out everywhere", claims.username),
        )
        .actor(user_id)
        .ip(ip)
        .details(format!("sessions={}", deleted_count)),
    );
    drop(conn);

    let access_token_ttl = state.jwt_config.access_token_expiry as u64;
    let _ = state
        .cache
        .token_revocation
        .revoke_all_user_tokens(user_id, access_token_ttl)
        .await;

    info!(user_id = %user_id, tokens_deleted = deleted_count, "User logged out from all devices");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/me",
    tag = "Authentication",
    responses(
        (status = 200, description = "Current user with profile and effective permissions", body = UserResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<UserResponse>> {
    let user_id = claims
        .user_id()
        .ok_or_else(|| ApiError::unauthorized("Invalid user ID in token", "INVALID_USER_ID"))?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let user = find_user(&mut conn, user_id)?;
    let response = load_user_response(&mut conn, user).map_err(ApiError::from_db)?;
    Ok(Json(response))
}

#[utoipa::path(
    patch,
    path = "/api/me",
    tag = "Authentication",
    request_body = UpdateMeRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ClientIp(ip): ClientIp,
    Json(payload): Json<UpdateMeRequest>,
) -> ApiResult<Json<UserResponse>> {
    let user_id = claims
        .user_id()
        .ok_or_else(|| ApiError::unauthorized("Invalid user ID in token", "INVALID_USER_ID"))?;

    let mut conn = get_db_conn(&state.db_pool)?;

    let user = conn
        .transaction::<_, diesel::result::Error, _>(|conn| {
            if let Some(email) = &payload.email {
                diesel::update(users::table.find(user_id))
                    .set((
                        users::email.eq(email.trim()),
                        users::updated_at.eq(Utc::now().naive_utc()),
                    ))
                    .execute(conn)?;
            }
            apply_profile(conn, user_id, payload.profile.self_service())?;

            users::table
                .find(user_id)
                .select(User::as_select())
                .first(conn)
        })
        .map_err(ApiError::from_db)?;

    AuditService::record(
        &mut conn,
        AuditEntry::new(
            AuditEventType::ProfileSelfUpdate,
            format!("User {} updated own profile", user.username),
        )
        .actor(user_id)
        .ip(ip),
    );

    info!(user_id = %user_id, "Profile self-update");

    let response = load_user_response(&mut conn, user).map_err(ApiError::from_db)?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/api/me/image",
    tag = "Authentication",
    request_body(content_type = "multipart/form-data", description = "`image` file part"),
    responses(
        (status = 200, description = "Profile image replaced", body = UserResponse),
        (status = 400, description = "Missing or unsupported file", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn upload_my_image(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> ApiResult<Json<UserResponse>> {
    let user_id = claims
        .user_id()
        .ok_or_else(|| ApiError::unauthorized("Invalid user ID in token", "INVALID_USER_ID"))?;

    Ok(Json(replace_profile_image(&state, user_id, multipart).await?))
}
