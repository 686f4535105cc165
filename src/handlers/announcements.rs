use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::{
        jwt::Claims,
        permissions::{self, Permission},
    },
    error::{get_db_conn, ApiError, ApiResult},
    handlers::StatusResponse,
    helpers::required_text,
    models::{Announcement, AnnouncementChangeset, NewAnnouncement},
    schema::announcements,
    AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct AnnouncementRequest {
    #[schema(example = "Workshop moved to Friday")]
    pub title: Option<String>,
    pub content: Option<String>,
}

fn find_announcement(conn: &mut PgConnection, id: Uuid) -> ApiResult<Announcement> {
    announcements::table
        .find(id)
        .select(Announcement::as_select())
        .first(conn)
        .optional()
        .map_err(ApiError::from_db)?
        .ok_or_else(|| ApiError::not_found("Announcement not found", "ANNOUNCEMENT_NOT_FOUND"))
}

#[utoipa::path(
    get,
    path = "/api/announcements/public",
    tag = "Announcements",
    responses((status = 200, description = "Published announcements, newest first", body = Vec<Announcement>))
)]
pub async fn public_announcements(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<Announcement>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let list = announcements::table
        .filter(announcements::published_at.is_not_null())
        .order(announcements::published_at.desc())
        .select(Announcement::as_select())
        .load(&mut conn)
        .map_err(ApiError::from_db)?;
    Ok(Json(list))
}

#[utoipa::path(
    get,
    path = "/api/announcements",
    tag = "Announcements",
    responses(
        (status = 200, description = "All announcements including drafts", body = Vec<Announcement>),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_announcements(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<Announcement>>> {
    permissions::require(&state, &claims, Permission::ManageAnnouncements).await?;
    let mut conn = get_db_conn(&state.db_pool)?;
    let list = announcements::table
        .order(announcements::created_at.desc())
        .select(Announcement::as_select())
        .load(&mut conn)
        .map_err(ApiError::from_db)?;
    Ok(Json(list))
}

#[utoipa::path(
    get,
    path = "/api/announcements/{id}",
    tag = "Announcements",
    params(("id" = Uuid, Path, description = "Announcement ID")),
    responses(
        (status = 200, description = "Announcement", body = Announcement),
        (status = 404, description = "Announcement not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_announcement(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Announcement>> {
    permissions::require(&state, &claims, Permission::ManageAnnouncements).await?;
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(find_announcement(&mut conn, id)?))
}

#[utoipa::path(
    post,
    path = "/api/announcements",
    tag = "Announcements",
    request_body = AnnouncementRequest,
    responses(
        (status = 201, description = "Draft created", body = Announcement),
        (status = 400, description = "Title missing", body = crate::handlers::auth::ErrorResponse),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_announcement(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<AnnouncementRequest>,
) -> ApiResult<(StatusCode, Json<Announcement>)> {
    let actor = permissions::require(&state, &claims, Permission::ManageAnnouncements).await?;
    let title = required_text(payload.title.as_deref(), "Title is required", "TITLE_REQUIRED")?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let announcement: Announcement = diesel::insert_into(announcements::table)
        .values(&NewAnnouncement {
            title,
            content: payload.content.unwrap_or_default(),
            author_id: Some(actor.id),
        })
        .returning(Announcement::as_returning())
        .get_result(&mut conn)
        .map_err(ApiError::from_db)?;

    info!(announcement_id = %announcement.id, user_id = %actor.id, "Announcement drafted");
    Ok((StatusCode::CREATED, Json(announcement)))
}

#[utoipa::path(
    patch,
    path = "/api/announcements/{id}",
    tag = "Announcements",
    params(("id" = Uuid, Path, description = "Announcement ID")),
    request_body = AnnouncementRequest,
    responses(
        (status = 200, description = "Announcement updated", body = Announcement),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Announcement not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_announcement(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AnnouncementRequest>,
) -> ApiResult<Json<Announcement>> {
    permissions::require(&state, &claims, Permission::ManageAnnouncements).await?;
    let mut conn = get_db_conn(&state.db_pool)?;
    find_announcement(&mut conn, id)?;

    let changes = AnnouncementChangeset {
        title: payload
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()),
        content: payload.content,
        published_at: None,
        updated_at: Some(Utc::now().naive_utc()),
    };

    let announcement = diesel::update(announcements::table.find(id))
        .set(&changes)
        .returning(Announcement::as_returning())
        .get_result(&mut conn)
        .map_err(ApiError::from_db)?;
    Ok(Json(announcement))
}

#[utoipa::path(
    delete,
    path = "/api/announcements/{id}",
    tag = "Announcements",
    params(("id" = Uuid, Path, description = "Announcement ID")),
    responses(
        (status = 204, description = "Announcement deleted"),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Announcement not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_announcement(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let actor = permissions::require(&state, &claims, Permission::ManageAnnouncements).await?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let deleted = diesel::delete(announcements::table.find(id))
        .execute(&mut conn)
        .map_err(ApiError::from_db)?;
    if deleted == 0 {
        return Err(ApiError::not_found(
            "Announcement not found",
            "ANNOUNCEMENT_NOT_FOUND",
        ));
    }

    info!(announcement_id = %id, user_id = %actor.id, "Announcement deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/announcements/{id}/publish",
    tag = "Announcements",
    params(("id" = Uuid, Path, description = "Announcement ID")),
    responses(
        (status = 200, description = "Published now", body = StatusResponse),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Announcement not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn publish_announcement(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<StatusResponse>> {
    let actor = permissions::require(&state, &claims, Permission::ManageAnnouncements).await?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let now = Utc::now().naive_utc();
    let updated = diesel::update(announcements::table.find(id))
        .set((
            announcements::published_at.eq(Some(now)),
            announcements::updated_at.eq(now),
        ))
        .execute(&mut conn)
        .map_err(ApiError::from_db)?;
    if updated == 0 {
        return Err(ApiError::not_found(
            "Announcement not found",
            "ANNOUNCEMENT_NOT_FOUND",
        ));
    }

    info!(announcement_id = %id, user_id = %actor.id, "Announcement published");
    Ok(Json(StatusResponse::new("published")))
}
