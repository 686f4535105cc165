//! Role management handlers.

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
    audit::{AuditEntry, AuditEventType, AuditService},
    auth::{
        jwt::Claims,
        permissions::{self, Permission},
    },
    error::{get_db_conn, ApiError, ApiResult},
    helpers::{required_text, ClientIp},
    models::{NewRole, Role, RoleChangeset},
    schema::roles,
    AppState,
};

/// Permission flags; omitted flags are left unchanged on update and off on create.
#[derive(Debug, Default, Clone, Deserialize, ToSchema)]
pub struct RoleFlags {
    pub can_manage_users: Option<bool>,
    pub can_manage_projects: Option<bool>,
    pub can_manage_events: Option<bool>,
    pub can_manage_team: Option<bool>,
    pub can_manage_gallery: Option<bool>,
    pub can_manage_announcements: Option<bool>,
    pub can_manage_security: Option<bool>,
    pub can_manage_sponsorship: Option<bool>,
    pub can_manage_messages: Option<bool>,
    pub can_manage_forms: Option<bool>,
    pub can_manage_content: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRoleRequest {
    #[schema(example = "WEB_LEAD")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub flags: RoleFlags,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRoleRequest {
    pub name: Option<String>,
    #[serde(flatten)]
    pub flags: RoleFlags,
}

impl RoleFlags {
    fn new_role(&self, name: String) -> NewRole {
        NewRole {
            name,
            can_manage_users: self.can_manage_users.unwrap_or(false),
            can_manage_projects: self.can_manage_projects.unwrap_or(false),
            can_manage_events: self.can_manage_events.unwrap_or(false),
            can_manage_team: self.can_manage_team.unwrap_or(false),
            can_manage_gallery: self.can_manage_gallery.unwrap_or(false),
            can_manage_announcements: self.can_manage_announcements.unwrap_or(false),
            can_manage_security: self.can_manage_security.unwrap_or(false),
            can_manage_sponsorship: self.can_manage_sponsorship.unwrap_or(false),
            can_manage_messages: self.can_manage_messages.unwrap_or(false),
            can_manage_forms: self.can_manage_forms.unwrap_or(false),
            can_manage_content: self.can_manage_content.unwrap_or(false),
        }
    }

    fn changeset(&self, name: Option<String>) -> RoleChangeset {
        RoleChangeset {
            name,
            can_manage_users: self.can_manage_users,
            can_manage_projects: self.can_manage_projects,
            can_manage_events: self.can_manage_events,
            can_manage_team: self.can_manage_team,
            can_manage_gallery: self.can_manage_gallery,
            can_manage_announcements: self.can_manage_announcements,
            can_manage_security: self.can_manage_security,
            can_manage_sponsorship: self.can_manage_sponsorship,
            can_manage_messages: self.can_manage_messages,
            can_manage_forms: self.can_manage_forms,
            can_manage_content: self.can_manage_content,
            updated_at: Some(Utc::now().naive_utc()),
        }
    }
}

fn find_role(conn: &mut PgConnection, role_id: Uuid) -> ApiResult<Role> {
    roles::table
        .find(role_id)
        .select(Role::as_select())
        .first(conn)
        .optional()
        .map_err(ApiError::from_db)?
        .ok_or_else(|| ApiError::not_found("Role not found", "ROLE_NOT_FOUND"))
}

#[utoipa::path(
    get,
    path = "/api/roles",
    tag = "Roles",
    responses(
        (status = 200, description = "All roles", body = Vec<Role>),
        (status = 401, description = "Unauthorized", body = crate::handlers::auth::ErrorResponse),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_roles(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<Role>>> {
    permissions::require(&state, &claims, Permission::ManageSecurity).await?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let all: Vec<Role> = roles::table
        .order(roles::name.asc())
        .select(Role::as_select())
        .load(&mut conn)
        .map_err(ApiError::from_db)?;

    Ok(Json(all))
}

#[utoipa::path(
    post,
    path = "/api/roles",
    tag = "Roles",
    request_body = CreateRoleRequest,
    responses(
        (status = 201, description = "Role created", body = Role),
        (status = 400, description = "Name missing", body = crate::handlers::auth::ErrorResponse),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 409, description = "Role already exists", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_role(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ClientIp(ip): ClientIp,
    Json(payload): Json<CreateRoleRequest>,
) -> ApiResult<(StatusCode, Json<Role>)> {
    let actor = permissions::require(&state, &claims, Permission::ManageSecurity).await?;
    let name = required_text(payload.name.as_deref(), "Role name is required", "NAME_REQUIRED")?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let role: Role = diesel::insert_into(roles::table)
        .values(&payload.flags.new_role(name))
        .returning(Role::as_returning())
        .get_result(&mut conn)
        .map_err(ApiError::from_db)?;

    AuditService::record(
        &mut conn,
        AuditEntry::new(AuditEventType::RoleCreated, format!("Created role {}", role.name))
            .actor(actor.id)
            .ip(ip),
    );
    drop(conn);

    permissions::invalidate_everyone(&state).await;
    info!(role_id = %role.id, role_name = %role.name, "Created role");

    Ok((StatusCode::CREATED, Json(role)))
}

#[utoipa::path(
    get,
    path = "/api/roles/{id}",
    tag = "Roles",
    params(("id" = Uuid, Path, description = "Role ID")),
    responses(
        (status = 200, description = "Role", body = Role),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Role not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_role(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(role_id): Path<Uuid>,
) -> ApiResult<Json<Role>> {
    permissions::require(&state, &claims, Permission::ManageSecurity).await?;
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(find_role(&mut conn, role_id)?))
}

#[utoipa::path(
    patch,
    path = "/api/roles/{id}",
    tag = "Roles",
    params(("id" = Uuid, Path, description = "Role ID")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = Role),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Role not found", body = crate::handlers::auth::ErrorResponse),
        (status = 409, description = "Role name taken", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_role(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ClientIp(ip): ClientIp,
    Path(role_id): Path<Uuid>,
    Json(payload): Json<UpdateRoleRequest>,
) -> ApiResult<Json<Role>> {
    let actor = permissions::require(&state, &claims, Permission::ManageSecurity).await?;
    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);

    let mut conn = get_db_conn(&state.db_pool)?;
    find_role(&mut conn, role_id)?;

    let role: Role = diesel::update(roles::table.find(role_id))
        .set(&payload.flags.changeset(name))
        .returning(Role::as_returning())
        .get_result(&mut conn)
        .map_err(ApiError::from_db)?;

    AuditService::record(
        &mut conn,
        AuditEntry::new(AuditEventType::RoleModified, format!("Updated role {}", role.name))
            .actor(actor.id)
            .ip(ip),
    );
    drop(conn);

    permissions::invalidate_everyone(&state).await;
    info!(role_id = %role.id, role_name = %role.name, "Updated role");

    Ok(Json(role))
}

#[utoipa::path(
    delete,
    path = "/api/roles/{id}",
    tag = "Roles",
    params(("id" = Uuid, Path, description = "Role ID")),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Role not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_role(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ClientIp(ip): ClientIp,
    Path(role_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let actor = permissions::require(&state, &claims, Permission::ManageSecurity).await?;
    let mut conn = get_db_conn(&state.db_pool)?;
    let role = find_role(&mut conn, role_id)?;

    diesel::delete(roles::table.find(role_id))
        .execute(&mut conn)
        .map_err(ApiError::from_db)?;

    AuditService::record(
        &mut conn,
        AuditEntry::new(AuditEventType::RoleDeleted, format!("Deleted role {}", role.name))
            .actor(actor.id)
            .ip(ip),
    );
    drop(conn);

    permissions::invalidate_everyone(&state).await;
    info!(role_id = %role_id, role_name = %role.name, "Deleted role");

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_role_defaults_flags_off() {
        let flags = RoleFlags {
            can_manage_events: Some(true),
            ..Default::default()
        };
        let role = flags.new_role("EVENTS".to_string());
        assert!(role.can_manage_events);
        assert!(!role.can_manage_security);
        assert!(!role.can_manage_content);
    }

    #[test]
    fn test_changeset_keeps_omitted_flags() {
        let flags = RoleFlags {
            can_manage_forms: Some(false),
            ..Default::default()
        };
        let changes = flags.changeset(None);
        assert_eq!(changes.can_manage_forms, Some(false));
        assert!(changes.can_manage_users.is_none());
        assert!(changes.updated_at.is_some());
    }

    #[test]
    fn test_flat_request_shape() {
        let payload: CreateRoleRequest = serde_json::from_value(serde_json::json!({
            "name": "WEB_LEAD",
            "can_manage_projects": true
        }))
        .unwrap();
        assert_eq!(payload.name.as_deref(), Some("WEB_LEAD"));
        assert_eq!(payload.flags.can_manage_projects, Some(true));
    }
}
