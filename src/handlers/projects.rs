//! Project workspaces: CRUD, membership, status updates and the sync probe.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::{
        jwt::Claims,
        permissions::{self, Actor, Permission},
    },
    client::sync::SyncState,
    error::{get_db_conn, ApiError, ApiResult},
    handlers::threads::{load_threads_with_messages, ThreadWithMessages},
    helpers::{double_option, required_text},
    models::{
        JoinRequest, MemberProfile, NewJoinRequest, NewProject, NewProjectMember,
        NewProjectUpdate, Project, ProjectChangeset, ProjectUpdate, Task, User,
    },
    schema::{
        join_requests, member_profiles, project_members, project_updates, projects, tasks,
        thread_messages, threads, users,
    },
    telemetry::record_sync_poll,
    types::{JoinRequestStatus, ProjectStatus, ProjectUpdateKind},
    uploads::{MediaKind, MultipartForm},
    AppState,
};

/// Holders of this role may resolve join requests on any project.
pub const WEB_LEAD_ROLE: &str = "WEB_LEAD";

const RECENT_UPDATES: i64 = 10;

// ============================================================================
// Access
// ============================================================================

/// A project together with the caller's relationship to it.
#[derive(Debug, Clone)]
pub struct ProjectAccess {
    pub project: Project,
    pub is_lead: bool,
    pub is_member: bool,
}

impl ProjectAccess {
    pub fn load(conn: &mut PgConnection, project_id: Uuid, user_id: Uuid) -> ApiResult<Self> {
        let project = find_project(conn, project_id)?;
        let is_member = is_member(conn, project_id, user_id).map_err(ApiError::from_db)?;
        Ok(Self {
            is_lead: project.lead_id == Some(user_id),
            is_member,
            project,
        })
    }

    pub fn participant(&self) -> bool {
        self.is_lead || self.is_member
    }

    /// Lead, superuser or a Manage Projects holder.
    pub fn can_manage(&self, actor: &Actor) -> bool {
        self.is_lead || actor.is_superuser() || actor.can(Permission::ManageProjects)
    }

    pub fn can_resolve_requests(&self, actor: &Actor) -> bool {
        self.can_manage(actor) || actor.perms.has_role(WEB_LEAD_ROLE)
    }

    /// Threads and messages are limited to the people working on the project.
    pub fn can_view_workspace(&self, actor: &Actor) -> bool {
        self.participant() || actor.is_superuser()
    }

    /// Tasks and the sync probe also admit project managers.
    pub fn can_collaborate(&self, actor: &Actor) -> bool {
        self.participant() || self.can_manage(actor)
    }
}

pub fn find_project(conn: &mut PgConnection, project_id: Uuid) -> ApiResult<Project> {
    projects::table
        .find(project_id)
        .select(Project::as_select())
        .first(conn)
        .optional()
        .map_err(ApiError::from_db)?
        .ok_or_else(|| ApiError::not_found("Project not found", "PROJECT_NOT_FOUND"))
}

pub fn is_member(conn: &mut PgConnection, project_id: Uuid, user_id: Uuid) -> QueryResult<bool> {
    diesel::select(diesel::dsl::exists(
        project_members::table
            .filter(project_members::project_id.eq(project_id))
            .filter(project_members::user_id.eq(user_id)),
    ))
    .get_result(conn)
}

/// Adds a member, ignoring an existing membership.
pub fn add_member(conn: &mut PgConnection, project_id: Uuid, user_id: Uuid) -> QueryResult<()> {
    diesel::insert_into(project_members::table)
        .values(&NewProjectMember {
            project_id,
            user_id,
        })
        .on_conflict_do_nothing()
        .execute(conn)?;
    Ok(())
}

/// Replaces the member set with the known users in `ids`, keeping the lead.
fn replace_members(
    conn: &mut PgConnection,
    project_id: Uuid,
    lead_id: Option<Uuid>,
    ids: &[Uuid],
) -> QueryResult<()> {
    let mut wanted: Vec<Uuid> = ids.to_vec();
    wanted.extend(lead_id);

    let known: Vec<Uuid> = users::table
        .filter(users::id.eq_any(&wanted))
        .select(users::id)
        .load(conn)?;

    diesel::delete(project_members::table.filter(project_members::project_id.eq(project_id)))
        .execute(conn)?;

    let rows: Vec<NewProjectMember> = known
        .into_iter()
        .map(|user_id| NewProjectMember {
            project_id,
            user_id,
        })
        .collect();
    if !rows.is_empty() {
        diesel::insert_into(project_members::table)
            .values(&rows)
            .on_conflict_do_nothing()
            .execute(conn)?;
    }
    Ok(())
}

// ============================================================================
// Representations
// ============================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectResponse {
    #[serde(flatten)]
    pub project: Project,
    pub members: Vec<Uuid>,
}

/// Who is on a project, with the last login the workspace shows as presence.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MemberSummary {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub image: Option<String>,
    pub last_login: Option<NaiveDateTime>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: Project,
    pub members: Vec<Uuid>,
    pub lead_details: Option<MemberSummary>,
    pub members_details: Vec<MemberSummary>,
    pub tasks: Vec<Task>,
    /// Empty unless the caller may resolve requests.
    pub join_requests: Vec<JoinRequest>,
    pub updates: Vec<ProjectUpdate>,
    /// Empty unless the caller works on the project.
    pub threads: Vec<ThreadWithMessages>,
}

fn members_by_project(
    conn: &mut PgConnection,
    project_ids: &[Uuid],
) -> QueryResult<HashMap<Uuid, Vec<Uuid>>> {
    let pairs: Vec<(Uuid, Uuid)> = project_members::table
        .filter(project_members::project_id.eq_any(project_ids))
        .order(project_members::joined_at.asc())
        .select((project_members::project_id, project_members::user_id))
        .load(conn)?;

    let mut grouped: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (project_id, user_id) in pairs {
        grouped.entry(project_id).or_default().push(user_id);
    }
    Ok(grouped)
}

fn with_members(
    conn: &mut PgConnection,
    list: Vec<Project>,
) -> QueryResult<Vec<ProjectResponse>> {
    let ids: Vec<Uuid> = list.iter().map(|p| p.id).collect();
    let mut members = members_by_project(conn, &ids)?;
    Ok(list
        .into_iter()
        .map(|project| ProjectResponse {
            members: members.remove(&project.id).unwrap_or_default(),
            project,
        })
        .collect())
}

fn member_summaries(
    conn: &mut PgConnection,
    ids: &[Uuid],
) -> QueryResult<HashMap<Uuid, MemberSummary>> {
    let accounts: Vec<User> = users::table
        .filter(users::id.eq_any(ids))
        .select(User::as_select())
        .load(conn)?;
    let mut profiles: HashMap<Uuid, MemberProfile> = member_profiles::table
        .filter(member_profiles::user_id.eq_any(ids))
        .select(MemberProfile::as_select())
        .load(conn)?
        .into_iter()
        .map(|p| (p.user_id, p))
        .collect();

    Ok(accounts
        .into_iter()
        .map(|user| {
            let profile = profiles.remove(&user.id);
            let summary = MemberSummary {
                id: user.id,
                username: user.username,
                full_name: profile
                    .as_ref()
                    .map(|p| p.full_name.clone())
                    .unwrap_or_default(),
                image: profile.and_then(|p| p.image),
                last_login: user.last_login,
            };
            (summary.id, summary)
        })
        .collect())
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProjectRequest {
    #[schema(example = "Line follower")]
    pub title: Option<String>,
    pub description: Option<String>,
    #[schema(example = "PROPOSED")]
    pub status: Option<String>,
    pub lead_id: Option<Uuid>,
    pub deadline: Option<NaiveDate>,
    pub is_public: Option<bool>,
    pub github_url: Option<String>,
    pub member_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateProjectRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<Uuid>)]
    pub lead_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<NaiveDate>)]
    pub deadline: Option<Option<NaiveDate>>,
    pub is_public: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub github_url: Option<Option<String>>,
    /// Replaces the member set; the lead always stays a member.
    pub member_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StatusUpdateRequest {
    #[schema(example = "Chassis assembled, motor driver next")]
    pub update_text: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct JoinProjectRequest {
    #[serde(default)]
    pub message: Option<String>,
}

fn parse_status(value: &str) -> ApiResult<ProjectStatus> {
    ProjectStatus::parse(value.trim()).ok_or_else(|| {
        ApiError::bad_request(
            format!("Unknown project status '{}'", value),
            "INVALID_STATUS",
        )
    })
}

impl UpdateProjectRequest {
    fn changeset(&self) -> ApiResult<ProjectChangeset> {
        Ok(ProjectChangeset {
            title: self
                .title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            description: self.description.clone(),
            status: self
                .status
                .as_deref()
                .map(parse_status)
                .transpose()?
                .map(|s| s.as_str().to_string()),
            lead_id: self.lead_id,
            deadline: self.deadline,
            is_public: self.is_public,
            github_url: self.github_url.clone(),
            cover_image: None,
            updated_at: Some(Utc::now().naive_utc()),
        })
    }
}

// ============================================================================
// Handlers
// ============================================================================

#[utoipa::path(
    get,
    path = "/api/projects",
    tag = "Projects",
    responses(
        (status = 200, description = "Projects the caller leads or belongs to; all for superusers", body = Vec<ProjectResponse>),
        (status = 401, description = "Unauthorized", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_projects(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<ProjectResponse>>> {
    let actor = Actor::load(&state, &claims).await?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let mut query = projects::table.into_boxed();
    if !actor.is_superuser() {
        let joined = project_members::table
            .filter(project_members::user_id.eq(actor.id))
            .select(project_members::project_id);
        query = query.filter(
            projects::lead_id
                .eq(actor.id)
                .or(projects::id.eq_any(joined)),
        );
    }

    let list: Vec<Project> = query
        .order(projects::created_at.desc())
        .select(Project::as_select())
        .load(&mut conn)
        .map_err(ApiError::from_db)?;

    Ok(Json(with_members(&mut conn, list).map_err(ApiError::from_db)?))
}

#[utoipa::path(
    get,
    path = "/api/projects/public",
    tag = "Projects",
    responses((status = 200, description = "Public projects, newest first", body = Vec<ProjectResponse>))
)]
pub async fn public_projects(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<ProjectResponse>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let list: Vec<Project> = projects::table
        .filter(projects::is_public.eq(true))
        .order(projects::created_at.desc())
        .select(Project::as_select())
        .load(&mut conn)
        .map_err(ApiError::from_db)?;

    Ok(Json(with_members(&mut conn, list).map_err(ApiError::from_db)?))
}

#[utoipa::path(
    post,
    path = "/api/projects",
    tag = "Projects",
    request_body = CreateProjectRequest,
    responses(
        (status = 201, description = "Project created", body = ProjectResponse),
        (status = 400, description = "Title missing or invalid status", body = crate::handlers::auth::ErrorResponse),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_project(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateProjectRequest>,
) -> ApiResult<(StatusCode, Json<ProjectResponse>)> {
    let actor = permissions::require(&state, &claims, Permission::ManageProjects).await?;

    let title = required_text(payload.title.as_deref(), "Title is required", "TITLE_REQUIRED")?;
    let status = payload
        .status
        .as_deref()
        .map(parse_status)
        .transpose()?
        .unwrap_or_default();
    let lead_id = payload.lead_id.unwrap_or(actor.id);

    let mut conn = get_db_conn(&state.db_pool)?;
    let project = conn
        .transaction::<_, DieselError, _>(|conn| {
            let project: Project = diesel::insert_into(projects::table)
                .values(&NewProject {
                    title,
                    description: payload.description.unwrap_or_default(),
                    status: status.as_str().to_string(),
                    lead_id: Some(lead_id),
                    deadline: payload.deadline,
                    is_public: payload.is_public.unwrap_or(true),
                    github_url: payload.github_url.filter(|u| !u.trim().is_empty()),
                    created_by: Some(actor.id),
                })
                .returning(Project::as_returning())
                .get_result(conn)?;

            // The creator joins even when someone else leads.
            let mut member_ids = payload.member_ids.unwrap_or_default();
            member_ids.push(actor.id);
            replace_members(conn, project.id, project.lead_id, &member_ids)?;
            Ok(project)
        })
        .map_err(ApiError::from_db)?;

    let response = with_members(&mut conn, vec![project])
        .map_err(ApiError::from_db)?
        .pop()
        .ok_or_else(ApiError::db_error)?;

    info!(project_id = %response.project.id, lead_id = %lead_id, user_id = %actor.id, "Project created");
    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    get,
    path = "/api/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Project workspace", body = ProjectDetail),
        (status = 404, description = "Project not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_project(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<ProjectDetail>> {
    let actor = Actor::load(&state, &claims).await?;
    let mut conn = get_db_conn(&state.db_pool)?;
    let access = ProjectAccess::load(&mut conn, project_id, actor.id)?;

    let members = members_by_project(&mut conn, &[project_id])
        .map_err(ApiError::from_db)?
        .remove(&project_id)
        .unwrap_or_default();

    let mut wanted = members.clone();
    wanted.extend(access.project.lead_id);
    let mut summaries = member_summaries(&mut conn, &wanted).map_err(ApiError::from_db)?;

    let lead_details = access
        .project
        .lead_id
        .and_then(|id| summaries.get(&id))
        .cloned();
    let members_details = members
        .iter()
        .filter_map(|id| summaries.remove(id))
        .collect();

    let task_list: Vec<Task> = tasks::table
        .filter(tasks::project_id.eq(project_id))
        .order(tasks::created_at.asc())
        .select(Task::as_select())
        .load(&mut conn)
        .map_err(ApiError::from_db)?;

    let requests = if access.can_resolve_requests(&actor) {
        join_requests::table
            .filter(join_requests::project_id.eq(project_id))
            .order(join_requests::created_at.desc())
            .select(JoinRequest::as_select())
            .load(&mut conn)
            .map_err(ApiError::from_db)?
    } else {
        Vec::new()
    };

    let updates: Vec<ProjectUpdate> = project_updates::table
        .filter(project_updates::project_id.eq(project_id))
        .order(project_updates::created_at.desc())
        .limit(RECENT_UPDATES)
        .select(ProjectUpdate::as_select())
        .load(&mut conn)
        .map_err(ApiError::from_db)?;

    let workspace = if access.can_view_workspace(&actor) {
        load_threads_with_messages(&mut conn, project_id).map_err(ApiError::from_db)?
    } else {
        Vec::new()
    };

    Ok(Json(ProjectDetail {
        project: access.project,
        members,
        lead_details,
        members_details,
        tasks: task_list,
        join_requests: requests,
        updates,
        threads: workspace,
    }))
}

#[utoipa::path(
    patch,
    path = "/api/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project ID")),
    request_body = UpdateProjectRequest,
    responses(
        (status = 200, description = "Project updated", body = ProjectResponse),
        (status = 403, description = "Not the lead or a project manager", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Project not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_project(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<UpdateProjectRequest>,
) -> ApiResult<Json<ProjectResponse>> {
    let actor = Actor::load(&state, &claims).await?;
    let mut conn = get_db_conn(&state.db_pool)?;
    let access = ProjectAccess::load(&mut conn, project_id, actor.id)?;
    if !access.can_manage(&actor) {
        return Err(ApiError::permission_denied());
    }

    let changes = payload.changeset()?;
    let project = conn
        .transaction::<_, DieselError, _>(|conn| {
            let project: Project = diesel::update(projects::table.find(project_id))
                .set(&changes)
                .returning(Project::as_returning())
                .get_result(conn)?;

            match payload.member_ids.as_deref() {
                Some(ids) => replace_members(conn, project_id, project.lead_id, ids)?,
                None => {
                    if let Some(lead) = project.lead_id {
                        add_member(conn, project_id, lead)?;
                    }
                }
            }
            Ok(project)
        })
        .map_err(ApiError::from_db)?;

    let response = with_members(&mut conn, vec![project])
        .map_err(ApiError::from_db)?
        .pop()
        .ok_or_else(ApiError::db_error)?;

    info!(project_id = %project_id, user_id = %actor.id, "Project updated");
    Ok(Json(response))
}

#[utoipa::path(
    delete,
    path = "/api/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project ID")),
    responses(
        (status = 204, description = "Project deleted"),
        (status = 403, description = "Not the lead or a project manager", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Project not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_project(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let actor = Actor::load(&state, &claims).await?;
    let cover = {
        let mut conn = get_db_conn(&state.db_pool)?;
        let access = ProjectAccess::load(&mut conn, project_id, actor.id)?;
        if !access.can_manage(&actor) {
            return Err(ApiError::permission_denied());
        }

        diesel::delete(projects::table.find(project_id))
            .execute(&mut conn)
            .map_err(ApiError::from_db)?;
        access.project.cover_image
    };

    if let Some(cover) = cover {
        state.media.remove(&cover).await;
    }

    info!(project_id = %project_id, user_id = %actor.id, "Project deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/projects/{id}/cover",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project ID")),
    request_body(content_type = "multipart/form-data", description = "`image` part, at most 800KB"),
    responses(
        (status = 200, description = "Cover stored", body = ProjectResponse),
        (status = 400, description = "Unsupported file type", body = crate::handlers::auth::ErrorResponse),
        (status = 403, description = "Not the lead or a project manager", body = crate::handlers::auth::ErrorResponse),
        (status = 413, description = "File too large", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn upload_cover(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(project_id): Path<Uuid>,
    multipart: Multipart,
) -> ApiResult<Json<ProjectResponse>> {
    let actor = Actor::load(&state, &claims).await?;
    {
        let mut conn = get_db_conn(&state.db_pool)?;
        let access = ProjectAccess::load(&mut conn, project_id, actor.id)?;
        if !access.can_manage(&actor) {
            return Err(ApiError::permission_denied());
        }
    }

    let form = MultipartForm::read(multipart).await?;
    let stored = state
        .media
        .save(MediaKind::ProjectCover, form.require_file("image")?)
        .await?;

    let (previous, response) = {
        let mut conn = get_db_conn(&state.db_pool)?;
        let previous = find_project(&mut conn, project_id)?.cover_image;
        let project: Project = diesel::update(projects::table.find(project_id))
            .set((
                projects::cover_image.eq(Some(&stored)),
                projects::updated_at.eq(Utc::now().naive_utc()),
            ))
            .returning(Project::as_returning())
            .get_result(&mut conn)
            .map_err(ApiError::from_db)?;
        let response = with_members(&mut conn, vec![project])
            .map_err(ApiError::from_db)?
            .pop()
            .ok_or_else(ApiError::db_error)?;
        (previous, response)
    };

    if let Some(old) = previous.filter(|old| *old != stored) {
        state.media.remove(&old).await;
    }

    info!(project_id = %project_id, path = %stored, "Project cover updated");
    Ok(Json(response))
}

fn record_update(
    conn: &mut PgConnection,
    project_id: Uuid,
    author_id: Uuid,
    kind: ProjectUpdateKind,
    body: String,
) -> ApiResult<ProjectUpdate> {
    diesel::insert_into(project_updates::table)
        .values(&NewProjectUpdate {
            project_id,
            author_id: Some(author_id),
            kind: kind.as_str().to_string(),
            body,
        })
        .returning(ProjectUpdate::as_returning())
        .get_result(conn)
        .map_err(ApiError::from_db)
}

#[utoipa::path(
    post,
    path = "/api/projects/{id}/request_status",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project ID")),
    request_body = StatusUpdateRequest,
    responses(
        (status = 201, description = "Status requested", body = ProjectUpdate),
        (status = 400, description = "update_text missing", body = crate::handlers::auth::ErrorResponse),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn request_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<StatusUpdateRequest>,
) -> ApiResult<(StatusCode, Json<ProjectUpdate>)> {
    let actor = permissions::require(&state, &claims, Permission::ManageProjects).await?;
    let body = required_text(
        payload.update_text.as_deref(),
        "update_text is required",
        "UPDATE_TEXT_REQUIRED",
    )?;

    let mut conn = get_db_conn(&state.db_pool)?;
    find_project(&mut conn, project_id)?;
    let update = record_update(
        &mut conn,
        project_id,
        actor.id,
        ProjectUpdateKind::Request,
        body,
    )?;

    info!(project_id = %project_id, user_id = %actor.id, "Status update requested");
    Ok((StatusCode::CREATED, Json(update)))
}

#[utoipa::path(
    post,
    path = "/api/projects/{id}/submit_status",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project ID")),
    request_body = StatusUpdateRequest,
    responses(
        (status = 201, description = "Status submitted", body = ProjectUpdate),
        (status = 400, description = "update_text missing", body = crate::handlers::auth::ErrorResponse),
        (status = 403, description = "Not on the project", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn submit_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<StatusUpdateRequest>,
) -> ApiResult<(StatusCode, Json<ProjectUpdate>)> {
    let actor = Actor::load(&state, &claims).await?;
    let mut conn = get_db_conn(&state.db_pool)?;
    let access = ProjectAccess::load(&mut conn, project_id, actor.id)?;
    if !access.can_collaborate(&actor) {
        return Err(ApiError::permission_denied());
    }

    let body = required_text(
        payload.update_text.as_deref(),
        "update_text is required",
        "UPDATE_TEXT_REQUIRED",
    )?;
    let update = record_update(
        &mut conn,
        project_id,
        actor.id,
        ProjectUpdateKind::Submission,
        body,
    )?;

    info!(project_id = %project_id, user_id = %actor.id, "Status submitted");
    Ok((StatusCode::CREATED, Json(update)))
}

#[utoipa::path(
    post,
    path = "/api/projects/{id}/request_join",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project ID")),
    request_body = JoinProjectRequest,
    responses(
        (status = 201, description = "Join request created", body = JoinRequest),
        (status = 400, description = "Already a member or a request is pending", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Project not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn request_join(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(project_id): Path<Uuid>,
    payload: Option<Json<JoinProjectRequest>>,
) -> ApiResult<(StatusCode, Json<JoinRequest>)> {
    let actor = Actor::load(&state, &claims).await?;
    let message = payload
        .and_then(|Json(p)| p.message)
        .unwrap_or_default();

    let mut conn = get_db_conn(&state.db_pool)?;
    let access = ProjectAccess::load(&mut conn, project_id, actor.id)?;
    if access.participant() {
        return Err(ApiError::bad_request(
            "You are already a member of this project",
            "ALREADY_MEMBER",
        ));
    }

    let pending: bool = diesel::select(diesel::dsl::exists(
        join_requests::table
            .filter(join_requests::project_id.eq(project_id))
            .filter(join_requests::user_id.eq(actor.id))
            .filter(join_requests::status.eq(JoinRequestStatus::Pending.as_str())),
    ))
    .get_result(&mut conn)
    .map_err(ApiError::from_db)?;
    if pending {
        return Err(ApiError::bad_request(
            "You already have a pending request for this project",
            "REQUEST_PENDING",
        ));
    }

    let request: JoinRequest = diesel::insert_into(join_requests::table)
        .values(&NewJoinRequest {
            project_id,
            user_id: actor.id,
            message: message.trim().to_string(),
        })
        .returning(JoinRequest::as_returning())
        .get_result(&mut conn)
        .map_err(ApiError::from_db)?;

    info!(project_id = %project_id, user_id = %actor.id, request_id = %request.id, "Join requested");
    Ok((StatusCode::CREATED, Json(request)))
}

#[utoipa::path(
    get,
    path = "/api/projects/{id}/sync_state",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Member presence and last message id per thread", body = SyncState),
        (status = 403, description = "Not on the project", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Project not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn sync_state(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<SyncState>> {
    let actor = Actor::load(&state, &claims).await?;
    let mut conn = get_db_conn(&state.db_pool)?;
    let access = ProjectAccess::load(&mut conn, project_id, actor.id)?;

    let granted = access.can_collaborate(&actor);
    record_sync_poll(granted);
    if !granted {
        warn!(project_id = %project_id, user_id = %actor.id, "Sync poll denied");
        return Err(ApiError::permission_denied());
    }

    let mut people = members_by_project(&mut conn, &[project_id])
        .map_err(ApiError::from_db)?
        .remove(&project_id)
        .unwrap_or_default();
    people.extend(access.project.lead_id);

    let members_status: BTreeMap<Uuid, Option<NaiveDateTime>> = users::table
        .filter(users::id.eq_any(&people))
        .select((users::id, users::last_login))
        .load::<(Uuid, Option<NaiveDateTime>)>(&mut conn)
        .map_err(ApiError::from_db)?
        .into_iter()
        .collect();

    let thread_ids: Vec<Uuid> = threads::table
        .filter(threads::project_id.eq(project_id))
        .select(threads::id)
        .load(&mut conn)
        .map_err(ApiError::from_db)?;

    let latest: HashMap<Uuid, Option<i64>> = thread_messages::table
        .filter(thread_messages::thread_id.eq_any(&thread_ids))
        .group_by(thread_messages::thread_id)
        .select((
            thread_messages::thread_id,
            diesel::dsl::max(thread_messages::id),
        ))
        .load::<(Uuid, Option<i64>)>(&mut conn)
        .map_err(ApiError::from_db)?
        .into_iter()
        .collect();

    let threads_state = thread_ids
        .into_iter()
        .map(|id| (id, latest.get(&id).copied().flatten().unwrap_or(0)))
        .collect();

    Ok(Json(SyncState {
        members_status,
        threads_state,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::permissions::EffectivePermissions;

    fn project(lead: Option<Uuid>) -> Project {
        let now = Utc::now().naive_utc();
        Project {
            id: Uuid::new_v4(),
            title: "Line follower".to_string(),
            description: String::new(),
            status: "PROPOSED".to_string(),
            lead_id: lead,
            deadline: None,
            is_public: false,
            github_url: None,
            cover_image: None,
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn actor(id: Uuid, perms: EffectivePermissions) -> Actor {
        Actor {
            id,
            username: "someone".to_string(),
            perms,
            cached: false,
        }
    }

    fn plain() -> EffectivePermissions {
        EffectivePermissions {
            is_active: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_lead_manages_and_views_workspace() {
        let lead = Uuid::new_v4();
        let access = ProjectAccess {
            project: project(Some(lead)),
            is_lead: true,
            is_member: false,
        };
        let who = actor(lead, plain());
        assert!(access.can_manage(&who));
        assert!(access.can_view_workspace(&who));
        assert!(access.can_resolve_requests(&who));
    }

    #[test]
    fn test_outsider_sees_nothing_private() {
        let access = ProjectAccess {
            project: project(Some(Uuid::new_v4())),
            is_lead: false,
            is_member: false,
        };
        let who = actor(Uuid::new_v4(), plain());
        assert!(!access.can_manage(&who));
        assert!(!access.can_view_workspace(&who));
        assert!(!access.can_collaborate(&who));
    }

    #[test]
    fn test_project_manager_collaborates_without_workspace() {
        let mut perms = plain();
        perms.flags.insert(Permission::ManageProjects);
        let access = ProjectAccess {
            project: project(None),
            is_lead: false,
            is_member: false,
        };
        let who = actor(Uuid::new_v4(), perms);
        assert!(access.can_collaborate(&who));
        assert!(!access.can_view_workspace(&who));
    }

    #[test]
    fn test_web_lead_role_resolves_requests() {
        let mut perms = plain();
        perms.role_names.push("web_lead".to_string());
        let access = ProjectAccess {
            project: project(None),
            is_lead: false,
            is_member: false,
        };
        let who = actor(Uuid::new_v4(), perms);
        assert!(access.can_resolve_requests(&who));
        assert!(!access.can_manage(&who));
    }

    #[test]
    fn test_patch_distinguishes_cleared_lead() {
        let payload: UpdateProjectRequest =
            serde_json::from_value(serde_json::json!({"lead_id": null, "status": "COMPLETED"}))
                .unwrap();
        let changes = payload.changeset().unwrap();
        assert_eq!(changes.lead_id, Some(None));
        assert_eq!(changes.status.as_deref(), Some("COMPLETED"));
        assert!(changes.deadline.is_none());
    }

    #[test]
    fn test_patch_rejects_unknown_status() {
        let payload: UpdateProjectRequest =
            serde_json::from_value(serde_json::json!({"status": "DONE"})).unwrap();
        assert!(payload.changeset().is_err());
    }
}
