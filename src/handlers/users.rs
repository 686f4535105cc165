//! User management, the shared user representation and the public team roster.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::Response,
    Extension, Json,
};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{error, info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    audit::{AuditEntry, AuditEventType, AuditService},
    auth::{
        jwt::Claims,
        password::PasswordService,
        permissions::{self, Actor, EffectivePermissions, Permission},
    },
    error::{get_db_conn, ApiError, ApiResult},
    handlers::{ReorderRequest, StatusResponse},
    helpers::{csv_attachment, ClientIp},
    models::{
        MemberProfile, MemberProfileChangeset, NewMemberProfile, NewUser, NewUserRole, Role, User,
        UserChangeset,
    },
    pagination::{Page, PaginationParams},
    schema::{member_profiles, roles, team_positions, user_roles, users},
    types::UserCategory,
    uploads::{MediaKind, MultipartForm},
    AppState,
};

/// Display order for members whose position matches no known team position.
pub const DEFAULT_POSITION_RANK: i32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoleSummary {
    pub id: Uuid,
    #[schema(example = "WEB_LEAD")]
    pub name: String,
}

/// The serialized account returned by login, `/api/me` and management.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    #[schema(example = "jdoe")]
    pub username: String,
    pub email: String,
    #[schema(example = "MEMBER")]
    pub role: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub last_login: Option<NaiveDateTime>,
    pub date_joined: NaiveDateTime,
    pub roles: Vec<RoleSummary>,
    pub profile: Option<MemberProfile>,
    pub permissions: Vec<Permission>,
}

/// Roster entry for the public team page.
#[derive(Debug, Serialize, ToSchema)]
pub struct TeamMemberResponse {
    pub id: Uuid,
    pub username: String,
    pub roles: Vec<String>,
    pub profile: MemberProfile,
}

/// Profile fields accepted by management and self-service updates.
#[derive(Debug, Default, Clone, Deserialize, ToSchema)]
pub struct ProfileInput {
    pub full_name: Option<String>,
    pub roll_number: Option<String>,
    pub department: Option<String>,
    pub year_of_joining: Option<i32>,
    pub sig: Option<String>,
    pub position: Option<String>,
    pub team_name: Option<String>,
    pub year: Option<String>,
    pub branch: Option<String>,
    pub description: Option<String>,
    pub linkedin_url: Option<String>,
    pub github_url: Option<String>,
    pub instagram_url: Option<String>,
    pub is_public: Option<bool>,
    pub is_alumni: Option<bool>,
    #[schema(value_type = Option<Object>)]
    pub custom_fields: Option<serde_json::Value>,
}

impl ProfileInput {
    /// What a member may change on their own profile.
    pub fn self_service(&self) -> MemberProfileChangeset {
        MemberProfileChangeset {
            full_name: self.full_name.clone(),
            roll_number: self.roll_number.clone(),
            department: self.department.clone(),
            year_of_joining: self.year_of_joining.map(Some),
            sig: self.sig.clone(),
            year: self.year.clone(),
            description: self.description.clone(),
            linkedin_url: self.linkedin_url.clone(),
            github_url: self.github_url.clone(),
            instagram_url: self.instagram_url.clone(),
            is_public: self.is_public,
            custom_fields: self.custom_fields.clone().filter(|v| v.is_object()),
            ..Default::default()
        }
    }

    /// Management changes. Position, SIG and team name need security clearance
    /// and are dropped silently without it.
    pub fn managed(&self, sensitive: bool) -> MemberProfileChangeset {
        let mut changes = MemberProfileChangeset {
            team_name: None,
            branch: self.branch.clone(),
            is_alumni: self.is_alumni,
            ..self.self_service()
        };
        if sensitive {
            changes.position = self.position.clone();
            changes.sig = self.sig.clone();
            changes.team_name = self.team_name.clone();
        } else {
            changes.sig = None;
        }
        changes
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    #[schema(example = "jdoe")]
    pub username: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
    /// Roster category (ADMIN, MEMBER, CANDIDATE); needs security clearance.
    pub role: Option<String>,
    pub role_ids: Option<Vec<Uuid>>,
    #[serde(flatten)]
    pub profile: ProfileInput,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub is_active: Option<bool>,
    pub password: Option<String>,
    pub role: Option<String>,
    pub role_ids: Option<Vec<Uuid>>,
    #[serde(flatten)]
    pub profile: ProfileInput,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TeamQuery {
    /// `alumni` lists alumni; anything else lists current members.
    #[serde(rename = "type")]
    #[param(rename = "type")]
    pub member_type: Option<String>,
}

// ============================================================================
// Shared loading helpers
// ============================================================================

fn linked_role<'a>(linked: &'a [(String, Role)], position: &str) -> Option<&'a Role> {
    let wanted = position.trim();
    if wanted.is_empty() {
        return None;
    }
    linked
        .iter()
        .find(|(name, _)| name.to_lowercase() == wanted.to_lowercase())
        .map(|(_, role)| role)
}

/// Serializes a batch of users with their assigned roles, profiles and
/// effective permissions in a fixed number of queries.
pub fn load_user_responses(
    conn: &mut PgConnection,
    accounts: Vec<User>,
) -> QueryResult<Vec<UserResponse>> {
    let ids: Vec<Uuid> = accounts.iter().map(|u| u.id).collect();

    let mut assigned: HashMap<Uuid, Vec<Role>> = HashMap::new();
    let pairs: Vec<(Uuid, Role)> = user_roles::table
        .inner_join(roles::table)
        .filter(user_roles::user_id.eq_any(&ids))
        .order(roles::name.asc())
        .select((user_roles::user_id, Role::as_select()))
        .load(conn)?;
    for (user_id, role) in pairs {
        assigned.entry(user_id).or_default().push(role);
    }

    let mut profiles: HashMap<Uuid, MemberProfile> = member_profiles::table
        .filter(member_profiles::user_id.eq_any(&ids))
        .select(MemberProfile::as_select())
        .load(conn)?
        .into_iter()
        .map(|p| (p.user_id, p))
        .collect();

    let linked: Vec<(String, Role)> = team_positions::table
        .inner_join(roles::table)
        .select((team_positions::name, Role::as_select()))
        .load(conn)?;

    Ok(accounts
        .into_iter()
        .map(|user| {
            let own_roles = assigned.remove(&user.id).unwrap_or_default();
            let profile = profiles.remove(&user.id);
            let position_role = profile
                .as_ref()
                .and_then(|p| linked_role(&linked, &p.position));
            let perms = EffectivePermissions::from_roles(
                user.is_superuser,
                user.is_active,
                own_roles.iter().chain(position_role),
            );

            UserResponse {
                id: user.id,
                username: user.username,
                email: user.email,
                role: user.role,
                is_active: user.is_active,
                is_superuser: user.is_superuser,
                last_login: user.last_login,
                date_joined: user.created_at,
                roles: own_roles
                    .into_iter()
                    .map(|r| RoleSummary {
                        id: r.id,
                        name: r.name,
                    })
                    .collect(),
                profile,
                permissions: perms.effective_list(),
            }
        })
        .collect())
}

pub fn load_user_response(conn: &mut PgConnection, user: User) -> QueryResult<UserResponse> {
    load_user_responses(conn, vec![user])?
        .pop()
        .ok_or(DieselError::NotFound)
}

pub fn find_user(conn: &mut PgConnection, user_id: Uuid) -> ApiResult<User> {
    users::table
        .find(user_id)
        .select(User::as_select())
        .first(conn)
        .optional()
        .map_err(ApiError::from_db)?
        .ok_or_else(|| ApiError::not_found("User not found", "USER_NOT_FOUND"))
}

/// Returns the user's profile, creating an empty one on first use.
pub fn ensure_profile(conn: &mut PgConnection, user_id: Uuid) -> QueryResult<MemberProfile> {
    diesel::insert_into(member_profiles::table)
        .values(&NewMemberProfile { user_id })
        .on_conflict(member_profiles::user_id)
        .do_nothing()
        .execute(conn)?;

    member_profiles::table
        .filter(member_profiles::user_id.eq(user_id))
        .select(MemberProfile::as_select())
        .first(conn)
}

fn rank_for(positions: &[(String, i32)], position: &str) -> i32 {
    let wanted = position.trim().to_lowercase();
    positions
        .iter()
        .find(|(name, _)| name.to_lowercase() == wanted)
        .map(|(_, rank)| *rank)
        .unwrap_or(DEFAULT_POSITION_RANK)
}

/// Rank of the team position named `position`, matched case-insensitively.
pub fn position_rank(conn: &mut PgConnection, position: &str) -> QueryResult<i32> {
    let positions: Vec<(String, i32)> = team_positions::table
        .select((team_positions::name, team_positions::rank))
        .load(conn)?;
    Ok(rank_for(&positions, position))
}

/// Writes profile changes, deriving the display order from a newly set position.
pub fn apply_profile(
    conn: &mut PgConnection,
    user_id: Uuid,
    mut changes: MemberProfileChangeset,
) -> QueryResult<MemberProfile> {
    ensure_profile(conn, user_id)?;

    if let Some(position) = changes.position.as_deref() {
        if !position.trim().is_empty() {
            changes.display_order = Some(position_rank(conn, position)?);
        }
    }
    changes.updated_at = Some(Utc::now().naive_utc());

    diesel::update(member_profiles::table.filter(member_profiles::user_id.eq(user_id)))
        .set(&changes)
        .returning(MemberProfile::as_returning())
        .get_result(conn)
}

fn role_names(conn: &mut PgConnection, user_id: Uuid) -> QueryResult<BTreeSet<String>> {
    Ok(user_roles::table
        .inner_join(roles::table)
        .filter(user_roles::user_id.eq(user_id))
        .select(roles::name)
        .load::<String>(conn)?
        .into_iter()
        .collect())
}

/// Replaces the user's role assignments. Unknown ids are skipped. Returns the
/// before and after role names when the assignment actually changed.
fn replace_roles(
    conn: &mut PgConnection,
    user_id: Uuid,
    role_ids: &[Uuid],
) -> QueryResult<Option<(BTreeSet<String>, BTreeSet<String>)>> {
    let before = role_names(conn, user_id)?;

    let valid: Vec<Uuid> = roles::table
        .filter(roles::id.eq_any(role_ids))
        .select(roles::id)
        .load(conn)?;

    diesel::delete(user_roles::table.filter(user_roles::user_id.eq(user_id))).execute(conn)?;

    let rows: Vec<NewUserRole> = valid
        .into_iter()
        .map(|role_id| NewUserRole { user_id, role_id })
        .collect();
    if !rows.is_empty() {
        diesel::insert_into(user_roles::table)
            .values(&rows)
            .execute(conn)?;
    }

    let after = role_names(conn, user_id)?;
    Ok((before != after).then_some((before, after)))
}

fn format_names(names: &BTreeSet<String>) -> String {
    format!(
        "[{}]",
        names.iter().cloned().collect::<Vec<_>>().join(", ")
    )
}

pub(crate) fn hash_new_password(state: &AppState, password: &str) -> ApiResult<String> {
    state
        .password_policy
        .validate(password)
        .map_err(|e| ApiError::bad_request(e.to_string(), "PASSWORD_POLICY_VIOLATION"))?;

    PasswordService::hash_password_with_cost(password, state.password_hash_cost).map_err(|e| {
        error!(error = %e, "Password hashing failed");
        ApiError::internal("Failed to process password", "PASSWORD_HASH_ERROR")
    })
}

fn parse_category(value: &str) -> ApiResult<UserCategory> {
    UserCategory::parse(value.trim()).ok_or_else(|| {
        ApiError::bad_request(
            format!("Unknown role category '{}'", value),
            "INVALID_CATEGORY",
        )
    })
}

/// Only superusers may change or remove another superuser.
fn guard_superuser(actor: &Actor, target: &User) -> ApiResult<()> {
    if target.is_superuser && !actor.is_superuser() {
        warn!(actor = %actor.id, target = %target.id, "Attempt to modify a superuser");
        return Err(ApiError::forbidden(
            "Only a superuser can modify a superuser account",
            "SUPERUSER_PROTECTED",
        ));
    }
    Ok(())
}

/// Stores an uploaded `image` part as the user's profile picture.
pub(crate) async fn replace_profile_image(
    state: &AppState,
    user_id: Uuid,
    multipart: Multipart,
) -> ApiResult<UserResponse> {
    let form = MultipartForm::read(multipart).await?;
    let file = form.require_file("image")?;
    let stored = state.media.save(MediaKind::ProfileImage, file).await?;

    let (previous, response) = {
        let mut conn = get_db_conn(&state.db_pool)?;
        let user = find_user(&mut conn, user_id)?;
        let previous = ensure_profile(&mut conn, user_id)
            .map_err(ApiError::from_db)?
            .image;

        diesel::update(member_profiles::table.filter(member_profiles::user_id.eq(user_id)))
            .set((
                member_profiles::image.eq(Some(&stored)),
                member_profiles::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(&mut conn)
            .map_err(ApiError::from_db)?;

        let response = load_user_response(&mut conn, user).map_err(ApiError::from_db)?;
        (previous, response)
    };

    if let Some(old) = previous.filter(|old| *old != stored) {
        state.media.remove(&old).await;
    }

    info!(user_id = %user_id, path = %stored, "Profile image updated");
    Ok(response)
}

// ============================================================================
// Management endpoints
// ============================================================================

#[utoipa::path(
    get,
    path = "/api/management",
    tag = "Users",
    params(PaginationParams),
    responses(
        (status = 200, description = "Paginated users with profiles", body = Page<UserResponse>),
        (status = 401, description = "Unauthorized", body = crate::handlers::auth::ErrorResponse),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Json<Page<UserResponse>>> {
    permissions::require(&state, &claims, Permission::ManageUsers).await?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let total: i64 = users::table
        .count()
        .get_result(&mut conn)
        .map_err(ApiError::from_db)?;

    let (limit, offset) = pagination.limit_offset();
    let accounts: Vec<User> = users::table
        .order(users::username.asc())
        .limit(limit)
        .offset(offset)
        .select(User::as_select())
        .load(&mut conn)
        .map_err(ApiError::from_db)?;

    let data = load_user_responses(&mut conn, accounts).map_err(ApiError::from_db)?;
    Ok(Json(Page::new(data, pagination, total)))
}

#[utoipa::path(
    post,
    path = "/api/management",
    tag = "Users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Missing credentials or username taken", body = crate::handlers::auth::ErrorResponse),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ClientIp(ip): ClientIp,
    Json(payload): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    let actor = permissions::require(&state, &claims, Permission::ManageUsers).await?;
    let sensitive = actor.can(Permission::ManageSecurity);

    let username = payload
        .username
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty());
    let password = payload.password.as_deref().filter(|p| !p.is_empty());
    let (Some(username), Some(password)) = (username, password) else {
        return Err(ApiError::bad_request(
            "Username and password required",
            "MISSING_CREDENTIALS",
        ));
    };

    let category = match payload.role.as_deref().filter(|_| sensitive) {
        Some(value) => parse_category(value)?,
        None => UserCategory::Member,
    };
    let password_hash = hash_new_password(&state, password)?;
    let email = payload.email.clone().unwrap_or_default().trim().to_string();

    let mut conn = get_db_conn(&state.db_pool)?;

    let user = conn
        .transaction::<_, DieselError, _>(|conn| {
            let user: User = diesel::insert_into(users::table)
                .values(&NewUser {
                    username: username.to_string(),
                    email: email.clone(),
                    password_hash,
                    role: category.as_str().to_string(),
                    is_superuser: false,
                })
                .returning(User::as_returning())
                .get_result(conn)?;

            if let Some(role_ids) = &payload.role_ids {
                replace_roles(conn, user.id, role_ids)?;
            }

            let mut profile = payload.profile.managed(sensitive);
            profile.email = Some(email.clone());
            apply_profile(conn, user.id, profile)?;
            Ok(user)
        })
        .map_err(|e| match e {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                ApiError::bad_request("A user with that username already exists", "USERNAME_TAKEN")
            }
            other => ApiError::from_db(other),
        })?;

    AuditService::record(
        &mut conn,
        AuditEntry::new(
            AuditEventType::UserCreated,
            format!("Created user {}", user.username),
        )
        .actor(actor.id)
        .ip(ip),
    );

    info!(user_id = %user.id, username = %user.username, created_by = %actor.id, "User created");

    let response = load_user_response(&mut conn, user).map_err(ApiError::from_db)?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    get,
    path = "/api/management/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User details", body = UserResponse),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "User not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<UserResponse>> {
    permissions::require(&state, &claims, Permission::ManageUsers).await?;
    let mut conn = get_db_conn(&state.db_pool)?;
    let user = find_user(&mut conn, user_id)?;
    let response = load_user_response(&mut conn, user).map_err(ApiError::from_db)?;
    Ok(Json(response))
}

#[utoipa::path(
    patch,
    path = "/api/management/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 400, description = "Invalid input", body = crate::handlers::auth::ErrorResponse),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "User not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ClientIp(ip): ClientIp,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> ApiResult<Json<UserResponse>> {
    let actor = permissions::require(&state, &claims, Permission::ManageUsers).await?;
    let sensitive = actor.can(Permission::ManageSecurity);
    let mut conn = get_db_conn(&state.db_pool)?;

    let user = find_user(&mut conn, user_id)?;
    guard_superuser(&actor, &user)?;

    let mut changes: Vec<String> = Vec::new();
    let mut account = UserChangeset {
        updated_at: Some(Utc::now().naive_utc()),
        ..Default::default()
    };

    if let Some(username) = payload
        .username
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty() && *u != user.username)
    {
        changes.push(format!(
            "Username changed from {} to {}",
            user.username, username
        ));
        account.username = Some(username.to_string());
    }

    if let Some(email) = payload.email.as_deref().map(str::trim) {
        if email != user.email {
            account.email = Some(email.to_string());
        }
    }

    if let Some(active) = payload.is_active.filter(|a| *a != user.is_active) {
        changes.push(format!("Active status changed to {}", active));
        account.is_active = Some(active);
    }

    if let Some(password) = payload.password.as_deref().filter(|p| !p.is_empty()) {
        account.password_hash = Some(hash_new_password(&state, password)?);
        changes.push("Password updated".to_string());
    }

    if let Some(value) = payload.role.as_deref().filter(|_| sensitive) {
        let category = parse_category(value)?;
        if category.as_str() != user.role {
            changes.push(format!("Category changed to {}", category));
            account.role = Some(category.as_str().to_string());
        }
    }

    let mut profile_changes = payload.profile.managed(sensitive);
    if payload.email.is_some() {
        profile_changes.email = account.email.clone();
    }
    let position_changed = profile_changes.position.is_some();

    let (updated, roles_changed) = conn
        .transaction::<_, DieselError, _>(|conn| {
            let updated: User = diesel::update(users::table.find(user_id))
                .set(&account)
                .returning(User::as_returning())
                .get_result(conn)?;

            let roles_changed = match &payload.role_ids {
                Some(role_ids) => replace_roles(conn, user_id, role_ids)?,
                None => None,
            };

            apply_profile(conn, user_id, profile_changes)?;
            Ok((updated, roles_changed))
        })
        .map_err(|e| match e {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                ApiError::bad_request("A user with that username already exists", "USERNAME_TAKEN")
            }
            other => ApiError::from_db(other),
        })?;

    if let Some((before, after)) = &roles_changed {
        changes.push(format!(
            "Roles updated from {} to {}",
            format_names(before),
            format_names(after)
        ));
    }

    if roles_changed.is_some() || position_changed || account.is_active.is_some() {
        permissions::invalidate_user(&state, user_id).await;
    }

    if account.password_hash.is_some() {
        state.lockout.release_after_reset(&updated.username).await;
    }

    if !changes.is_empty() {
        AuditService::record(
            &mut conn,
            AuditEntry::new(
                AuditEventType::UserModified,
                format!("Modified user {}", updated.username),
            )
            .actor(actor.id)
            .ip(ip)
            .details(changes.join(", ")),
        );
    }

    info!(user_id = %user_id, changes = changes.len(), "User updated");

    let response = load_user_response(&mut conn, updated).map_err(ApiError::from_db)?;
    Ok(Json(response))
}

#[utoipa::path(
    delete,
    path = "/api/management/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 400, description = "Cannot delete own account", body = crate::handlers::auth::ErrorResponse),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "User not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ClientIp(ip): ClientIp,
    Path(user_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let actor = permissions::require(&state, &claims, Permission::ManageUsers).await?;
    if actor.id == user_id {
        return Err(ApiError::bad_request(
            "You cannot delete your own account",
            "CANNOT_DELETE_SELF",
        ));
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    let user = find_user(&mut conn, user_id)?;
    guard_superuser(&actor, &user)?;

    let image: Option<String> = member_profiles::table
        .filter(member_profiles::user_id.eq(user_id))
        .select(member_profiles::image)
        .first::<Option<String>>(&mut conn)
        .optional()
        .map_err(ApiError::from_db)?
        .flatten();

    AuditService::record(
        &mut conn,
        AuditEntry::new(
            AuditEventType::UserDeleted,
            format!("Deleted user {}", user.username),
        )
        .actor(actor.id)
        .ip(ip),
    );

    diesel::delete(users::table.find(user_id))
        .execute(&mut conn)
        .map_err(ApiError::from_db)?;
    drop(conn);

    permissions::invalidate_user(&state, user_id).await;
    let _ = state
        .cache
        .token_revocation
        .revoke_all_user_tokens(user_id, state.jwt_config.access_token_expiry as u64)
        .await;
    if let Some(image) = image {
        state.media.remove(&image).await;
    }

    info!(user_id = %user_id, deleted_by = %actor.id, "User deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/management/{id}/image",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body(content_type = "multipart/form-data", description = "`image` file part"),
    responses(
        (status = 200, description = "Profile image replaced", body = UserResponse),
        (status = 400, description = "Missing or unsupported file", body = crate::handlers::auth::ErrorResponse),
        (status = 413, description = "File too large", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn upload_user_image(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
    multipart: Multipart,
) -> ApiResult<Json<UserResponse>> {
    permissions::require(&state, &claims, Permission::ManageUsers).await?;
    Ok(Json(replace_profile_image(&state, user_id, multipart).await?))
}

#[utoipa::path(
    get,
    path = "/api/management/export_csv",
    tag = "Users",
    responses(
        (status = 200, description = "users.csv attachment", content_type = "text/csv"),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn export_users_csv(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Response> {
    permissions::require(&state, &claims, Permission::ManageUsers).await?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let rows: Vec<(User, Option<MemberProfile>)> = users::table
        .left_join(member_profiles::table)
        .order(users::username.asc())
        .select((User::as_select(), Option::<MemberProfile>::as_select()))
        .load(&mut conn)
        .map_err(ApiError::from_db)?;

    let headers: Vec<String> = [
        "Username",
        "Email",
        "Full Name",
        "Role",
        "Team Position",
        "SIG",
        "Status",
    ]
    .iter()
    .map(|h| h.to_string())
    .collect();

    let records = rows.into_iter().map(|(user, profile)| {
        let (full_name, position, sig) = profile
            .map(|p| (p.full_name, p.position, p.sig))
            .unwrap_or_default();
        vec![
            user.username,
            user.email,
            full_name,
            user.role,
            position,
            sig,
            if user.is_active { "Active" } else { "Inactive" }.to_string(),
        ]
    });

    csv_attachment("users.csv", &headers, records)
}

#[utoipa::path(
    post,
    path = "/api/management/reorder-team",
    tag = "Users",
    request_body = ReorderRequest,
    responses(
        (status = 200, description = "Roster order saved", body = StatusResponse),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn reorder_team(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ReorderRequest>,
) -> ApiResult<Json<StatusResponse>> {
    let actor = Actor::load(&state, &claims).await?;
    if !actor.can(Permission::ManageTeam) {
        actor.require(Permission::ManageUsers)?;
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    conn.transaction::<_, DieselError, _>(|conn| {
        for item in &payload.items {
            diesel::update(member_profiles::table.filter(member_profiles::user_id.eq(item.id)))
                .set(member_profiles::display_order.eq(item.order))
                .execute(conn)?;
        }
        Ok(())
    })
    .map_err(ApiError::from_db)?;

    info!(count = payload.items.len(), "Team order updated");
    Ok(Json(StatusResponse::new("updated")))
}

// ============================================================================
// Public roster
// ============================================================================

#[utoipa::path(
    get,
    path = "/api/team/public",
    tag = "Team",
    params(TeamQuery),
    responses(
        (status = 200, description = "Active members with public profiles", body = Vec<TeamMemberResponse>)
    )
)]
pub async fn public_team(
    State(state): State<AppState>,
    Query(query): Query<TeamQuery>,
) -> ApiResult<Json<Vec<TeamMemberResponse>>> {
    let alumni = query.member_type.as_deref() == Some("alumni");
    let mut conn = get_db_conn(&state.db_pool)?;

    let rows: Vec<(User, MemberProfile)> = users::table
        .inner_join(member_profiles::table)
        .filter(users::is_active.eq(true))
        .filter(member_profiles::is_public.eq(true))
        .filter(member_profiles::is_alumni.eq(alumni))
        .order((
            member_profiles::display_order.asc(),
            member_profiles::full_name.asc(),
        ))
        .select((User::as_select(), MemberProfile::as_select()))
        .load(&mut conn)
        .map_err(ApiError::from_db)?;

    let ids: Vec<Uuid> = rows.iter().map(|(u, _)| u.id).collect();
    let mut names: HashMap<Uuid, Vec<String>> = HashMap::new();
    let pairs: Vec<(Uuid, String)> = user_roles::table
        .inner_join(roles::table)
        .filter(user_roles::user_id.eq_any(&ids))
        .order(roles::name.asc())
        .select((user_roles::user_id, roles::name))
        .load(&mut conn)
        .map_err(ApiError::from_db)?;
    for (user_id, name) in pairs {
        names.entry(user_id).or_default().push(name);
    }

    Ok(Json(
        rows.into_iter()
            .map(|(user, profile)| TeamMemberResponse {
                id: user.id,
                roles: names.remove(&user.id).unwrap_or_default(),
                username: user.username,
                profile,
            })
            .collect(),
    ))
}
