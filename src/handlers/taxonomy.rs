//! SIGs, team positions and custom profile field definitions.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use diesel::prelude::*;
use diesel::result::Error as DieselError;
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
    handlers::{users::DEFAULT_POSITION_RANK, ReorderRequest, StatusResponse},
    helpers::{double_option, required_text, unchanged_or, ClientIp},
    models::{
        NewProfileFieldDefinition, NewSig, NewTeamPosition, ProfileFieldChangeset,
        ProfileFieldDefinition, Sig, SigChangeset, TeamPosition, TeamPositionChangeset,
    },
    schema::{events, member_profiles, profile_field_definitions, sigs, team_positions},
    types::ProfileFieldType,
    AppState,
};

// ============================================================================
// SIGs
// ============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct SigRequest {
    #[schema(example = "Robotics")]
    pub name: Option<String>,
    pub description: Option<String>,
    pub order: Option<i32>,
}

fn find_sig(conn: &mut PgConnection, sig_id: Uuid) -> ApiResult<Sig> {
    sigs::table
        .find(sig_id)
        .select(Sig::as_select())
        .first(conn)
        .optional()
        .map_err(ApiError::from_db)?
        .ok_or_else(|| ApiError::not_found("SIG not found", "SIG_NOT_FOUND"))
}

#[utoipa::path(
    get,
    path = "/api/sigs",
    tag = "Taxonomy",
    responses((status = 200, description = "SIGs by order, then name", body = Vec<Sig>))
)]
pub async fn list_sigs(State(state): State<AppState>) -> ApiResult<Json<Vec<Sig>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let all = sigs::table
        .order((sigs::display_order.asc(), sigs::name.asc()))
        .select(Sig::as_select())
        .load(&mut conn)
        .map_err(ApiError::from_db)?;
    Ok(Json(all))
}

#[utoipa::path(
    post,
    path = "/api/sigs",
    tag = "Taxonomy",
    request_body = SigRequest,
    responses(
        (status = 201, description = "SIG created", body = Sig),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 409, description = "Name taken", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_sig(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<SigRequest>,
) -> ApiResult<(StatusCode, Json<Sig>)> {
    permissions::require(&state, &claims, Permission::ManageSecurity).await?;
    let name = required_text(payload.name.as_deref(), "SIG name is required", "NAME_REQUIRED")?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let sig: Sig = diesel::insert_into(sigs::table)
        .values(&NewSig {
            name,
            description: payload.description.unwrap_or_default(),
            display_order: payload.order.unwrap_or(0),
        })
        .returning(Sig::as_returning())
        .get_result(&mut conn)
        .map_err(ApiError::from_db)?;

    info!(sig_id = %sig.id, name = %sig.name, "SIG created");
    Ok((StatusCode::CREATED, Json(sig)))
}

/// Renaming a SIG carries the new name to every profile and event that used the old one.
#[utoipa::path(
    patch,
    path = "/api/sigs/{id}",
    tag = "Taxonomy",
    params(("id" = Uuid, Path, description = "SIG ID")),
    request_body = SigRequest,
    responses(
        (status = 200, description = "SIG updated", body = Sig),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "SIG not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_sig(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ClientIp(ip): ClientIp,
    Path(sig_id): Path<Uuid>,
    Json(payload): Json<SigRequest>,
) -> ApiResult<Json<Sig>> {
    let actor = permissions::require(&state, &claims, Permission::ManageSecurity).await?;
    let mut conn = get_db_conn(&state.db_pool)?;
    let current = find_sig(&mut conn, sig_id)?;

    let changes = SigChangeset {
        name: payload
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string),
        description: payload.description,
        display_order: payload.order,
    };

    let (sig, profiles_moved) = conn
        .transaction::<_, DieselError, _>(|conn| {
            let sig: Sig = unchanged_or(
                diesel::update(sigs::table.find(sig_id))
                    .set(&changes)
                    .returning(Sig::as_returning())
                    .get_result(conn),
                || sigs::table.find(sig_id).select(Sig::as_select()).first(conn),
            )?;

            let mut moved = 0;
            if sig.name != current.name {
                moved = diesel::update(
                    member_profiles::table.filter(member_profiles::sig.eq(&current.name)),
                )
                .set(member_profiles::sig.eq(&sig.name))
                .execute(conn)?;

                diesel::update(events::table.filter(events::sig.eq(&current.name)))
                    .set(events::sig.eq(&sig.name))
                    .execute(conn)?;
            }
            Ok((sig, moved))
        })
        .map_err(ApiError::from_db)?;

    if sig.name != current.name {
        AuditService::record(
            &mut conn,
            AuditEntry::new(
                AuditEventType::SigRenamed,
                format!("Renamed SIG {} to {}", current.name, sig.name),
            )
            .actor(actor.id)
            .ip(ip)
            .details(format!("profiles={}", profiles_moved)),
        );
        info!(sig_id = %sig_id, from = %current.name, to = %sig.name, profiles = profiles_moved, "SIG renamed");
    }

    Ok(Json(sig))
}

#[utoipa::path(
    delete,
    path = "/api/sigs/{id}",
    tag = "Taxonomy",
    params(("id" = Uuid, Path, description = "SIG ID")),
    responses(
        (status = 204, description = "SIG deleted"),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "SIG not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_sig(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(sig_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    permissions::require(&state, &claims, Permission::ManageSecurity).await?;
    let mut conn = get_db_conn(&state.db_pool)?;
    let deleted = diesel::delete(sigs::table.find(sig_id))
        .execute(&mut conn)
        .map_err(ApiError::from_db)?;
    if deleted == 0 {
        return Err(ApiError::not_found("SIG not found", "SIG_NOT_FOUND"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/sigs/reorder-sigs",
    tag = "Taxonomy",
    request_body = ReorderRequest,
    responses(
        (status = 200, description = "Order saved", body = StatusResponse),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn reorder_sigs(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ReorderRequest>,
) -> ApiResult<Json<StatusResponse>> {
    permissions::require(&state, &claims, Permission::ManageSecurity).await?;
    let mut conn = get_db_conn(&state.db_pool)?;
    conn.transaction::<_, DieselError, _>(|conn| {
        for item in &payload.items {
            diesel::update(sigs::table.find(item.id))
                .set(sigs::display_order.eq(item.order))
                .execute(conn)?;
        }
        Ok(())
    })
    .map_err(ApiError::from_db)?;
    Ok(Json(StatusResponse::new("updated")))
}

// ============================================================================
// Team positions
// ============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct PositionRequest {
    #[schema(example = "President")]
    pub name: Option<String>,
    pub rank: Option<i32>,
    /// Role granted to holders of this position; `null` unlinks.
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<Uuid>)]
    pub role_link_id: Option<Option<Uuid>>,
}

#[utoipa::path(
    get,
    path = "/api/positions",
    tag = "Taxonomy",
    responses((status = 200, description = "Positions by rank, then name", body = Vec<TeamPosition>))
)]
pub async fn list_positions(State(state): State<AppState>) -> ApiResult<Json<Vec<TeamPosition>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let all = team_positions::table
        .order((team_positions::rank.asc(), team_positions::name.asc()))
        .select(TeamPosition::as_select())
        .load(&mut conn)
        .map_err(ApiError::from_db)?;
    Ok(Json(all))
}

#[utoipa::path(
    post,
    path = "/api/positions",
    tag = "Taxonomy",
    request_body = PositionRequest,
    responses(
        (status = 201, description = "Position created", body = TeamPosition),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 409, description = "Name taken", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_position(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<PositionRequest>,
) -> ApiResult<(StatusCode, Json<TeamPosition>)> {
    permissions::require(&state, &claims, Permission::ManageSecurity).await?;
    let name = required_text(
        payload.name.as_deref(),
        "Position name is required",
        "NAME_REQUIRED",
    )?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let position: TeamPosition = diesel::insert_into(team_positions::table)
        .values(&NewTeamPosition {
            name,
            rank: payload.rank.unwrap_or(DEFAULT_POSITION_RANK),
            role_link_id: payload.role_link_id.flatten(),
        })
        .returning(TeamPosition::as_returning())
        .get_result(&mut conn)
        .map_err(ApiError::from_db)?;
    drop(conn);

    permissions::invalidate_everyone(&state).await;
    info!(position_id = %position.id, name = %position.name, "Team position created");
    Ok((StatusCode::CREATED, Json(position)))
}

#[utoipa::path(
    patch,
    path = "/api/positions/{id}",
    tag = "Taxonomy",
    params(("id" = Uuid, Path, description = "Position ID")),
    request_body = PositionRequest,
    responses(
        (status = 200, description = "Position updated", body = TeamPosition),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Position not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_position(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(position_id): Path<Uuid>,
    Json(payload): Json<PositionRequest>,
) -> ApiResult<Json<TeamPosition>> {
    permissions::require(&state, &claims, Permission::ManageSecurity).await?;

    let changes = TeamPositionChangeset {
        name: payload
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string),
        rank: payload.rank,
        role_link_id: payload.role_link_id,
    };

    let mut conn = get_db_conn(&state.db_pool)?;
    let position: TeamPosition = unchanged_or(
        diesel::update(team_positions::table.find(position_id))
            .set(&changes)
            .returning(TeamPosition::as_returning())
            .get_result(&mut conn),
        || {
            team_positions::table
                .find(position_id)
                .select(TeamPosition::as_select())
                .first(&mut conn)
        },
    )
    .map_err(|e| match e {
        DieselError::NotFound => ApiError::not_found("Position not found", "POSITION_NOT_FOUND"),
        other => ApiError::from_db(other),
    })?;
    drop(conn);

    permissions::invalidate_everyone(&state).await;
    Ok(Json(position))
}

#[utoipa::path(
    delete,
    path = "/api/positions/{id}",
    tag = "Taxonomy",
    params(("id" = Uuid, Path, description = "Position ID")),
    responses(
        (status = 204, description = "Position deleted"),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Position not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_position(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(position_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    permissions::require(&state, &claims, Permission::ManageSecurity).await?;
    let mut conn = get_db_conn(&state.db_pool)?;
    let deleted = diesel::delete(team_positions::table.find(position_id))
        .execute(&mut conn)
        .map_err(ApiError::from_db)?;
    drop(conn);
    if deleted == 0 {
        return Err(ApiError::not_found("Position not found", "POSITION_NOT_FOUND"));
    }

    permissions::invalidate_everyone(&state).await;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Profile field definitions
// ============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProfileFieldRequest {
    #[schema(example = "T-shirt size")]
    pub label: Option<String>,
    #[schema(example = "tshirt_size")]
    pub key: Option<String>,
    #[schema(example = "text")]
    pub field_type: Option<String>,
    pub is_required: Option<bool>,
    pub order: Option<i32>,
    pub limit_to_sig: Option<Uuid>,
}

/// Keys are lowercase slugs: letters, digits, `_` and `-`.
fn is_slug(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

fn parse_field_type(value: Option<&str>) -> ApiResult<Option<ProfileFieldType>> {
    value
        .map(|v| {
            ProfileFieldType::parse(v.trim()).ok_or_else(|| {
                ApiError::bad_request(
                    format!("Unsupported field type '{}'", v),
                    "INVALID_FIELD_TYPE",
                )
            })
        })
        .transpose()
}

fn parse_key(value: Option<&str>) -> ApiResult<Option<String>> {
    match value.map(str::trim) {
        None => Ok(None),
        Some(key) if is_slug(key) => Ok(Some(key.to_string())),
        Some(_) => Err(ApiError::bad_request(
            "Key must be a lowercase slug",
            "INVALID_KEY",
        )),
    }
}

#[utoipa::path(
    get,
    path = "/api/profile-fields",
    tag = "Taxonomy",
    responses(
        (status = 200, description = "Field definitions by order", body = Vec<ProfileFieldDefinition>),
        (status = 401, description = "Unauthorized", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_profile_fields(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> ApiResult<Json<Vec<ProfileFieldDefinition>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let all = profile_field_definitions::table
        .order((
            profile_field_definitions::display_order.asc(),
            profile_field_definitions::label.asc(),
        ))
        .select(ProfileFieldDefinition::as_select())
        .load(&mut conn)
        .map_err(ApiError::from_db)?;
    Ok(Json(all))
}

#[utoipa::path(
    post,
    path = "/api/profile-fields",
    tag = "Taxonomy",
    request_body = ProfileFieldRequest,
    responses(
        (status = 201, description = "Field defined", body = ProfileFieldDefinition),
        (status = 400, description = "Invalid key or type", body = crate::handlers::auth::ErrorResponse),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 409, description = "Key taken", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_profile_field(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ClientIp(ip): ClientIp,
    Json(payload): Json<ProfileFieldRequest>,
) -> ApiResult<(StatusCode, Json<ProfileFieldDefinition>)> {
    let actor = permissions::require(&state, &claims, Permission::ManageSecurity).await?;

    let label = required_text(payload.label.as_deref(), "Label is required", "LABEL_REQUIRED")?;
    let key = parse_key(payload.key.as_deref())?
        .ok_or_else(|| ApiError::bad_request("Key is required", "KEY_REQUIRED"))?;
    let field_type = parse_field_type(payload.field_type.as_deref())?
        .unwrap_or(ProfileFieldType::Text);

    let mut conn = get_db_conn(&state.db_pool)?;
    let field: ProfileFieldDefinition = diesel::insert_into(profile_field_definitions::table)
        .values(&NewProfileFieldDefinition {
            label,
            key,
            field_type: field_type.as_str().to_string(),
            is_required: payload.is_required.unwrap_or(false),
            display_order: payload.order.unwrap_or(0),
            limit_to_sig_id: payload.limit_to_sig,
        })
        .returning(ProfileFieldDefinition::as_returning())
        .get_result(&mut conn)
        .map_err(ApiError::from_db)?;

    AuditService::record(
        &mut conn,
        AuditEntry::new(AuditEventType::FieldCreated, format!("Def field {}", field.label))
            .actor(actor.id)
            .ip(ip),
    );

    info!(field_id = %field.id, key = %field.key, "Profile field defined");
    Ok((StatusCode::CREATED, Json(field)))
}

#[utoipa::path(
    patch,
    path = "/api/profile-fields/{id}",
    tag = "Taxonomy",
    params(("id" = Uuid, Path, description = "Field definition ID")),
    request_body = ProfileFieldRequest,
    responses(
        (status = 200, description = "Field updated", body = ProfileFieldDefinition),
        (status = 400, description = "Invalid key or type", body = crate::handlers::auth::ErrorResponse),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Field not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_profile_field(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(field_id): Path<Uuid>,
    Json(payload): Json<ProfileFieldRequest>,
) -> ApiResult<Json<ProfileFieldDefinition>> {
    permissions::require(&state, &claims, Permission::ManageSecurity).await?;

    let changes = ProfileFieldChangeset {
        label: payload
            .label
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string),
        key: parse_key(payload.key.as_deref())?,
        field_type: parse_field_type(payload.field_type.as_deref())?
            .map(|t| t.as_str().to_string()),
        is_required: payload.is_required,
        display_order: payload.order,
        limit_to_sig_id: payload.limit_to_sig.map(Some),
    };

    let mut conn = get_db_conn(&state.db_pool)?;
    let field = unchanged_or(
        diesel::update(profile_field_definitions::table.find(field_id))
            .set(&changes)
            .returning(ProfileFieldDefinition::as_returning())
            .get_result(&mut conn),
        || {
            profile_field_definitions::table
                .find(field_id)
                .select(ProfileFieldDefinition::as_select())
                .first(&mut conn)
        },
    )
    .map_err(|e| match e {
        DieselError::NotFound => ApiError::not_found("Field not found", "FIELD_NOT_FOUND"),
        other => ApiError::from_db(other),
    })?;

    Ok(Json(field))
}

#[utoipa::path(
    delete,
    path = "/api/profile-fields/{id}",
    tag = "Taxonomy",
    params(("id" = Uuid, Path, description = "Field definition ID")),
    responses(
        (status = 204, description = "Field deleted"),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Field not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_profile_field(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(field_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    permissions::require(&state, &claims, Permission::ManageSecurity).await?;
    let mut conn = get_db_conn(&state.db_pool)?;
    let deleted = diesel::delete(profile_field_definitions::table.find(field_id))
        .execute(&mut conn)
        .map_err(ApiError::from_db)?;
    if deleted == 0 {
        return Err(ApiError::not_found("Field not found", "FIELD_NOT_FOUND"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/profile-fields/reorder-fields",
    tag = "Taxonomy",
    request_body = ReorderRequest,
    responses(
        (status = 200, description = "Order saved", body = StatusResponse),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn reorder_profile_fields(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ReorderRequest>,
) -> ApiResult<Json<StatusResponse>> {
    permissions::require(&state, &claims, Permission::ManageSecurity).await?;
    let mut conn = get_db_conn(&state.db_pool)?;
    conn.transaction::<_, DieselError, _>(|conn| {
        for item in &payload.items {
            diesel::update(profile_field_definitions::table.find(item.id))
                .set(profile_field_definitions::display_order.eq(item.order))
                .execute(conn)?;
        }
        Ok(())
    })
    .map_err(ApiError::from_db)?;
    Ok(Json(StatusResponse::new("updated")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_keys() {
        assert!(is_slug("tshirt_size"));
        assert!(is_slug("github-handle2"));
        assert!(!is_slug(""));
        assert!(!is_slug("T-Shirt"));
        assert!(!is_slug("with space"));
    }

    #[test]
    fn test_field_type_parsing() {
        assert_eq!(
            parse_field_type(Some("url")).unwrap(),
            Some(ProfileFieldType::Url)
        );
        assert_eq!(parse_field_type(None).unwrap(), None);
        assert!(parse_field_type(Some("select")).is_err());
    }

    #[test]
    fn test_key_parsing() {
        assert_eq!(parse_key(Some(" size ")).unwrap().as_deref(), Some("size"));
        assert!(parse_key(Some("Size")).is_err());
        assert_eq!(parse_key(None).unwrap(), None);
    }

    #[test]
    fn test_position_request_distinguishes_null_link() {
        let unlink: PositionRequest =
            serde_json::from_value(serde_json::json!({"role_link_id": null})).unwrap();
        assert_eq!(unlink.role_link_id, Some(None));

        let untouched: PositionRequest =
            serde_json::from_value(serde_json::json!({"rank": 3})).unwrap();
        assert_eq!(untouched.role_link_id, None);
    }
}
