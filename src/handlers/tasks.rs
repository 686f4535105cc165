//! Project tasks and their comments.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    auth::{
        jwt::Claims,
        permissions::{Actor, Permission},
    },
    error::{get_db_conn, ApiError, ApiResult},
    handlers::projects::ProjectAccess,
    helpers::{double_option, required_text},
    models::{NewTask, NewTaskComment, Task, TaskChangeset, TaskComment},
    schema::{project_members, projects, task_comments, tasks},
    types::TaskStatus,
    AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TaskQuery {
    pub project: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTaskRequest {
    pub project: Uuid,
    #[schema(example = "Tune PID gains")]
    pub title: Option<String>,
    pub description: Option<String>,
    #[schema(example = "TODO")]
    pub status: Option<String>,
    pub assignee_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub requirements: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<Uuid>)]
    pub assignee_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<NaiveDate>)]
    pub due_date: Option<Option<NaiveDate>>,
    pub requirements: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CommentRequest {
    pub content: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: Task,
    pub comments: Vec<TaskComment>,
}

fn parse_status(value: &str) -> ApiResult<TaskStatus> {
    TaskStatus::parse(value.trim()).ok_or_else(|| {
        ApiError::bad_request(format!("Unknown task status '{}'", value), "INVALID_STATUS")
    })
}

impl UpdateTaskRequest {
    fn changeset(&self) -> ApiResult<TaskChangeset> {
        Ok(TaskChangeset {
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
            assignee_id: self.assignee_id,
            due_date: self.due_date,
            requirements: self.requirements.clone(),
            updated_at: Some(Utc::now().naive_utc()),
        })
    }
}

/// Loads the project and fails with 403 unless the caller may work on its tasks.
fn collaborator(conn: &mut PgConnection, project_id: Uuid, actor: &Actor) -> ApiResult<ProjectAccess> {
    let access = ProjectAccess::load(conn, project_id, actor.id)?;
    if !access.can_collaborate(actor) {
        warn!(project_id = %project_id, user_id = %actor.id, "Task access denied");
        return Err(ApiError::permission_denied());
    }
    Ok(access)
}

fn find_task(conn: &mut PgConnection, task_id: Uuid) -> ApiResult<Task> {
    tasks::table
        .find(task_id)
        .select(Task::as_select())
        .first(conn)
        .optional()
        .map_err(ApiError::from_db)?
        .ok_or_else(|| ApiError::not_found("Task not found", "TASK_NOT_FOUND"))
}

#[utoipa::path(
    get,
    path = "/api/tasks",
    tag = "Tasks",
    params(TaskQuery),
    responses(
        (status = 200, description = "Tasks, oldest first", body = Vec<Task>),
        (status = 403, description = "Not on the project", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<TaskQuery>,
) -> ApiResult<Json<Vec<Task>>> {
    let actor = Actor::load(&state, &claims).await?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let mut listing = tasks::table.into_boxed();
    match query.project {
        Some(project_id) => {
            collaborator(&mut conn, project_id, &actor)?;
            listing = listing.filter(tasks::project_id.eq(project_id));
        }
        None if actor.is_superuser() || actor.can(Permission::ManageProjects) => {}
        None => {
            let joined = project_members::table
                .filter(project_members::user_id.eq(actor.id))
                .select(project_members::project_id);
            let led = projects::table
                .filter(projects::lead_id.eq(actor.id))
                .select(projects::id);
            listing = listing.filter(
                tasks::project_id
                    .eq_any(joined)
                    .or(tasks::project_id.eq_any(led)),
            );
        }
    }

    let list = listing
        .order(tasks::created_at.asc())
        .select(Task::as_select())
        .load(&mut conn)
        .map_err(ApiError::from_db)?;
    Ok(Json(list))
}

#[utoipa::path(
    post,
    path = "/api/tasks",
    tag = "Tasks",
    request_body = CreateTaskRequest,
    responses(
        (status = 201, description = "Task created", body = Task),
        (status = 400, description = "Title missing or invalid status", body = crate::handlers::auth::ErrorResponse),
        (status = 403, description = "Not on the project", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_task(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let actor = Actor::load(&state, &claims).await?;
    let title = required_text(payload.title.as_deref(), "Title is required", "TITLE_REQUIRED")?;
    let status = payload
        .status
        .as_deref()
        .map(parse_status)
        .transpose()?
        .unwrap_or_default();

    let mut conn = get_db_conn(&state.db_pool)?;
    collaborator(&mut conn, payload.project, &actor)?;

    let task: Task = diesel::insert_into(tasks::table)
        .values(&NewTask {
            project_id: payload.project,
            title,
            description: payload.description.unwrap_or_default(),
            status: status.as_str().to_string(),
            assignee_id: payload.assignee_id,
            due_date: payload.due_date,
            requirements: payload.requirements.unwrap_or_default(),
        })
        .returning(Task::as_returning())
        .get_result(&mut conn)
        .map_err(ApiError::from_db)?;

    info!(task_id = %task.id, project_id = %task.project_id, user_id = %actor.id, "Task created");
    Ok((StatusCode::CREATED, Json(task)))
}

#[utoipa::path(
    get,
    path = "/api/tasks/{id}",
    tag = "Tasks",
    params(("id" = Uuid, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task with comments", body = TaskDetail),
        (status = 403, description = "Not on the project", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Task not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_task(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<TaskDetail>> {
    let actor = Actor::load(&state, &claims).await?;
    let mut conn = get_db_conn(&state.db_pool)?;
    let task = find_task(&mut conn, task_id)?;
    collaborator(&mut conn, task.project_id, &actor)?;

    let comments = task_comments::table
        .filter(task_comments::task_id.eq(task_id))
        .order(task_comments::created_at.asc())
        .select(TaskComment::as_select())
        .load(&mut conn)
        .map_err(ApiError::from_db)?;

    Ok(Json(TaskDetail { task, comments }))
}

#[utoipa::path(
    patch,
    path = "/api/tasks/{id}",
    tag = "Tasks",
    params(("id" = Uuid, Path, description = "Task ID")),
    request_body = UpdateTaskRequest,
    responses(
        (status = 200, description = "Task updated", body = Task),
        (status = 400, description = "Invalid status", body = crate::handlers::auth::ErrorResponse),
        (status = 403, description = "Not on the project", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Task not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_task(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(task_id): Path<Uuid>,
    Json(payload): Json<UpdateTaskRequest>,
) -> ApiResult<Json<Task>> {
    let actor = Actor::load(&state, &claims).await?;
    let changes = payload.changeset()?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let task = find_task(&mut conn, task_id)?;
    collaborator(&mut conn, task.project_id, &actor)?;

    let task: Task = diesel::update(tasks::table.find(task_id))
        .set(&changes)
        .returning(Task::as_returning())
        .get_result(&mut conn)
        .map_err(ApiError::from_db)?;

    info!(task_id = %task_id, status = %task.status, user_id = %actor.id, "Task updated");
    Ok(Json(task))
}

#[utoipa::path(
    delete,
    path = "/api/tasks/{id}",
    tag = "Tasks",
    params(("id" = Uuid, Path, description = "Task ID")),
    responses(
        (status = 204, description = "Task deleted"),
        (status = 403, description = "Not on the project", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Task not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_task(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let actor = Actor::load(&state, &claims).await?;
    let mut conn = get_db_conn(&state.db_pool)?;
    let task = find_task(&mut conn, task_id)?;
    collaborator(&mut conn, task.project_id, &actor)?;

    diesel::delete(tasks::table.find(task_id))
        .execute(&mut conn)
        .map_err(ApiError::from_db)?;

    info!(task_id = %task_id, user_id = %actor.id, "Task deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/tasks/{id}/comment",
    tag = "Tasks",
    params(("id" = Uuid, Path, description = "Task ID")),
    request_body = CommentRequest,
    responses(
        (status = 201, description = "Comment added", body = TaskComment),
        (status = 400, description = "Content missing", body = crate::handlers::auth::ErrorResponse),
        (status = 403, description = "Not on the project", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Task not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn add_comment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(task_id): Path<Uuid>,
    Json(payload): Json<CommentRequest>,
) -> ApiResult<(StatusCode, Json<TaskComment>)> {
    let actor = Actor::load(&state, &claims).await?;
    let content = required_text(
        payload.content.as_deref(),
        "Content is required",
        "CONTENT_REQUIRED",
    )?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let task = find_task(&mut conn, task_id)?;
    collaborator(&mut conn, task.project_id, &actor)?;

    let comment: TaskComment = diesel::insert_into(task_comments::table)
        .values(&NewTaskComment {
            task_id,
            author_id: Some(actor.id),
            content,
        })
        .returning(TaskComment::as_returning())
        .get_result(&mut conn)
        .map_err(ApiError::from_db)?;

    Ok((StatusCode::CREATED, Json(comment)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        assert_eq!(parse_status("DONE").unwrap(), TaskStatus::Done);
        assert_eq!(parse_status(" IN_PROGRESS ").unwrap(), TaskStatus::InProgress);
        assert!(parse_status("BLOCKED").is_err());
    }

    #[test]
    fn test_patch_can_unassign() {
        let payload: UpdateTaskRequest =
            serde_json::from_value(serde_json::json!({"assignee_id": null, "title": "  "}))
                .unwrap();
        let changes = payload.changeset().unwrap();
        assert_eq!(changes.assignee_id, Some(None));
        assert!(changes.title.is_none());
        assert!(changes.due_date.is_none());
    }

    #[test]
    fn test_create_defaults_to_todo() {
        let payload: CreateTaskRequest = serde_json::from_value(serde_json::json!({
            "project": Uuid::new_v4(),
            "title": "Solder headers"
        }))
        .unwrap();
        let status = payload
            .status
            .as_deref()
            .map(parse_status)
            .transpose()
            .unwrap()
            .unwrap_or_default();
        assert_eq!(status, TaskStatus::Todo);
    }
}
