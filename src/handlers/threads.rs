//! Project discussion threads, their messages and typing indicators.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{Duration, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    auth::{jwt::Claims, permissions::Actor},
    cache::typing::Typer,
    error::{get_db_conn, ApiError, ApiResult},
    handlers::{projects::ProjectAccess, StatusResponse},
    helpers::required_text,
    models::{NewThread, NewThreadMessage, Thread, ThreadMessage},
    schema::{project_members, thread_messages, threads, users},
    AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: ThreadMessage,
    pub author_username: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ThreadWithMessages {
    #[serde(flatten)]
    pub thread: Thread,
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ThreadQuery {
    pub project: Option<Uuid>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MessageQuery {
    pub thread: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateThreadRequest {
    pub project: Uuid,
    #[schema(example = "Motor selection")]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateMessageRequest {
    pub thread: Uuid,
    pub content: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EphemeralResponse {
    pub is_ephemeral: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PurgeResponse {
    #[schema(example = "purged")]
    pub status: String,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TypingStatusResponse {
    pub typers: Vec<Typer>,
}

// ============================================================================
// Loading
// ============================================================================

fn with_authors(
    conn: &mut PgConnection,
    messages: Vec<ThreadMessage>,
) -> QueryResult<Vec<MessageView>> {
    let ids: Vec<Uuid> = messages.iter().filter_map(|m| m.author_id).collect();
    let names: HashMap<Uuid, String> = users::table
        .filter(users::id.eq_any(&ids))
        .select((users::id, users::username))
        .load::<(Uuid, String)>(conn)?
        .into_iter()
        .collect();

    Ok(messages
        .into_iter()
        .map(|message| MessageView {
            author_username: message.author_id.and_then(|id| names.get(&id).cloned()),
            message,
        })
        .collect())
}

/// Every thread of a project with its messages, oldest first.
pub fn load_threads_with_messages(
    conn: &mut PgConnection,
    project_id: Uuid,
) -> QueryResult<Vec<ThreadWithMessages>> {
    let list: Vec<Thread> = threads::table
        .filter(threads::project_id.eq(project_id))
        .order(threads::created_at.asc())
        .select(Thread::as_select())
        .load(conn)?;

    let ids: Vec<Uuid> = list.iter().map(|t| t.id).collect();
    let messages: Vec<ThreadMessage> = thread_messages::table
        .filter(thread_messages::thread_id.eq_any(&ids))
        .order(thread_messages::id.asc())
        .select(ThreadMessage::as_select())
        .load(conn)?;

    let mut grouped: HashMap<Uuid, Vec<MessageView>> = HashMap::new();
    for view in with_authors(conn, messages)? {
        grouped.entry(view.message.thread_id).or_default().push(view);
    }

    Ok(list
        .into_iter()
        .map(|thread| ThreadWithMessages {
            messages: grouped.remove(&thread.id).unwrap_or_default(),
            thread,
        })
        .collect())
}

fn find_thread(conn: &mut PgConnection, thread_id: Uuid) -> ApiResult<Thread> {
    threads::table
        .find(thread_id)
        .select(Thread::as_select())
        .first(conn)
        .optional()
        .map_err(ApiError::from_db)?
        .ok_or_else(|| ApiError::not_found("Thread not found", "THREAD_NOT_FOUND"))
}

/// The thread and the caller's standing on its project.
fn thread_access(
    conn: &mut PgConnection,
    thread_id: Uuid,
    actor: &Actor,
) -> ApiResult<(Thread, ProjectAccess)> {
    let thread = find_thread(conn, thread_id)?;
    let access = ProjectAccess::load(conn, thread.project_id, actor.id)?;
    Ok((thread, access))
}

fn require_participant(access: &ProjectAccess) -> ApiResult<()> {
    if access.participant() {
        Ok(())
    } else {
        Err(ApiError::forbidden(
            "Must be a project member.",
            "NOT_PROJECT_MEMBER",
        ))
    }
}

fn require_workspace(access: &ProjectAccess, actor: &Actor) -> ApiResult<()> {
    if access.can_view_workspace(actor) {
        Ok(())
    } else {
        Err(ApiError::forbidden(
            "Must be a project member.",
            "NOT_PROJECT_MEMBER",
        ))
    }
}

fn require_lead(access: &ProjectAccess, actor: &Actor) -> ApiResult<()> {
    if access.is_lead || actor.is_superuser() {
        Ok(())
    } else {
        Err(ApiError::forbidden(
            "Only the Project Lead can manage this thread.",
            "NOT_PROJECT_LEAD",
        ))
    }
}

/// Current members of the thread's project plus its lead.
fn participant_ids(conn: &mut PgConnection, access: &ProjectAccess) -> QueryResult<HashSet<Uuid>> {
    let mut ids: HashSet<Uuid> = project_members::table
        .filter(project_members::project_id.eq(access.project.id))
        .select(project_members::user_id)
        .load::<Uuid>(conn)?
        .into_iter()
        .collect();
    ids.extend(access.project.lead_id);
    Ok(ids)
}

/// Deletes messages older than `ttl_secs` from an ephemeral thread.
fn expire_messages(conn: &mut PgConnection, thread_id: Uuid, ttl_secs: i64) -> QueryResult<usize> {
    let cutoff = Utc::now().naive_utc() - Duration::seconds(ttl_secs.max(0));
    diesel::delete(
        thread_messages::table
            .filter(thread_messages::thread_id.eq(thread_id))
            .filter(thread_messages::created_at.lt(cutoff)),
    )
    .execute(conn)
}

// ============================================================================
// Threads
// ============================================================================

#[utoipa::path(
    get,
    path = "/api/threads",
    tag = "Threads",
    params(ThreadQuery),
    responses(
        (status = 200, description = "Threads of a project", body = Vec<Thread>),
        (status = 403, description = "Not on the project", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_threads(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ThreadQuery>,
) -> ApiResult<Json<Vec<Thread>>> {
    let actor = Actor::load(&state, &claims).await?;
    let project_id = query
        .project
        .ok_or_else(|| ApiError::bad_request("project is required", "PROJECT_REQUIRED"))?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let access = ProjectAccess::load(&mut conn, project_id, actor.id)?;
    require_workspace(&access, &actor)?;

    let list = threads::table
        .filter(threads::project_id.eq(project_id))
        .order(threads::created_at.asc())
        .select(Thread::as_select())
        .load(&mut conn)
        .map_err(ApiError::from_db)?;
    Ok(Json(list))
}

#[utoipa::path(
    post,
    path = "/api/threads",
    tag = "Threads",
    request_body = CreateThreadRequest,
    responses(
        (status = 201, description = "Thread created", body = Thread),
        (status = 400, description = "Title missing", body = crate::handlers::auth::ErrorResponse),
        (status = 403, description = "Must be a project member.", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_thread(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateThreadRequest>,
) -> ApiResult<(StatusCode, Json<Thread>)> {
    let actor = Actor::load(&state, &claims).await?;
    let mut conn = get_db_conn(&state.db_pool)?;
    let access = ProjectAccess::load(&mut conn, payload.project, actor.id)?;
    require_participant(&access)?;

    let title = required_text(payload.title.as_deref(), "Title is required", "TITLE_REQUIRED")?;
    let thread: Thread = diesel::insert_into(threads::table)
        .values(&NewThread {
            project_id: payload.project,
            title,
            created_by: Some(actor.id),
        })
        .returning(Thread::as_returning())
        .get_result(&mut conn)
        .map_err(ApiError::from_db)?;

    info!(thread_id = %thread.id, project_id = %thread.project_id, user_id = %actor.id, "Thread created");
    Ok((StatusCode::CREATED, Json(thread)))
}

#[utoipa::path(
    delete,
    path = "/api/threads/{id}",
    tag = "Threads",
    params(("id" = Uuid, Path, description = "Thread ID")),
    responses(
        (status = 204, description = "Thread and its messages deleted"),
        (status = 403, description = "Not the project lead", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Thread not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_thread(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(thread_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let actor = Actor::load(&state, &claims).await?;
    let mut conn = get_db_conn(&state.db_pool)?;
    let (_, access) = thread_access(&mut conn, thread_id, &actor)?;
    require_lead(&access, &actor)?;

    diesel::delete(threads::table.find(thread_id))
        .execute(&mut conn)
        .map_err(ApiError::from_db)?;

    info!(thread_id = %thread_id, user_id = %actor.id, "Thread deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/threads/{id}/toggle_ephemeral",
    tag = "Threads",
    params(("id" = Uuid, Path, description = "Thread ID")),
    responses(
        (status = 200, description = "New ephemeral flag", body = EphemeralResponse),
        (status = 403, description = "Not the project lead", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Thread not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn toggle_ephemeral(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(thread_id): Path<Uuid>,
) -> ApiResult<Json<EphemeralResponse>> {
    let actor = Actor::load(&state, &claims).await?;
    let mut conn = get_db_conn(&state.db_pool)?;
    let (thread, access) = thread_access(&mut conn, thread_id, &actor)?;
    require_lead(&access, &actor)?;

    let is_ephemeral: bool = diesel::update(threads::table.find(thread_id))
        .set(threads::is_ephemeral.eq(!thread.is_ephemeral))
        .returning(threads::is_ephemeral)
        .get_result(&mut conn)
        .map_err(ApiError::from_db)?;

    info!(thread_id = %thread_id, is_ephemeral, "Thread ephemeral flag toggled");
    Ok(Json(EphemeralResponse { is_ephemeral }))
}

#[utoipa::path(
    post,
    path = "/api/threads/{id}/purge_messages",
    tag = "Threads",
    params(("id" = Uuid, Path, description = "Thread ID")),
    responses(
        (status = 200, description = "Messages wiped", body = PurgeResponse),
        (status = 403, description = "Only the Project Lead can wipe history.", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Thread not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn purge_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(thread_id): Path<Uuid>,
) -> ApiResult<Json<PurgeResponse>> {
    let actor = Actor::load(&state, &claims).await?;
    let mut conn = get_db_conn(&state.db_pool)?;
    let (_, access) = thread_access(&mut conn, thread_id, &actor)?;
    if !(access.is_lead || actor.is_superuser()) {
        warn!(thread_id = %thread_id, user_id = %actor.id, "Thread purge denied");
        return Err(ApiError::forbidden(
            "Only the Project Lead can wipe history.",
            "NOT_PROJECT_LEAD",
        ));
    }

    let count = diesel::delete(
        thread_messages::table.filter(thread_messages::thread_id.eq(thread_id)),
    )
    .execute(&mut conn)
    .map_err(ApiError::from_db)?;

    info!(thread_id = %thread_id, count, user_id = %actor.id, "Thread history purged");
    Ok(Json(PurgeResponse {
        status: "purged".to_string(),
        count,
    }))
}

#[utoipa::path(
    post,
    path = "/api/threads/{id}/signal_typing",
    tag = "Threads",
    params(("id" = Uuid, Path, description = "Thread ID")),
    responses(
        (status = 200, description = "Typing marker set", body = StatusResponse),
        (status = 403, description = "Not on the project", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn signal_typing(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(thread_id): Path<Uuid>,
) -> ApiResult<Json<StatusResponse>> {
    let actor = Actor::load(&state, &claims).await?;
    {
        let mut conn = get_db_conn(&state.db_pool)?;
        let (_, access) = thread_access(&mut conn, thread_id, &actor)?;
        require_workspace(&access, &actor)?;
    }

    state
        .cache
        .typing
        .signal(thread_id, actor.id, &actor.username)
        .await;
    Ok(Json(StatusResponse::new("typing")))
}

#[utoipa::path(
    get,
    path = "/api/threads/{id}/typing_status",
    tag = "Threads",
    params(("id" = Uuid, Path, description = "Thread ID")),
    responses(
        (status = 200, description = "Other users typing right now", body = TypingStatusResponse),
        (status = 403, description = "Not on the project", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn typing_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(thread_id): Path<Uuid>,
) -> ApiResult<Json<TypingStatusResponse>> {
    let actor = Actor::load(&state, &claims).await?;
    let participants = {
        let mut conn = get_db_conn(&state.db_pool)?;
        let (_, access) = thread_access(&mut conn, thread_id, &actor)?;
        require_workspace(&access, &actor)?;
        participant_ids(&mut conn, &access).map_err(ApiError::from_db)?
    };

    let typers = state
        .cache
        .typing
        .typers(thread_id, actor.id, &participants)
        .await;
    Ok(Json(TypingStatusResponse { typers }))
}

// ============================================================================
// Messages
// ============================================================================

#[utoipa::path(
    get,
    path = "/api/messages",
    tag = "Threads",
    params(MessageQuery),
    responses(
        (status = 200, description = "Messages, oldest first", body = Vec<MessageView>),
        (status = 403, description = "Not on the project", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Thread not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<MessageQuery>,
) -> ApiResult<Json<Vec<MessageView>>> {
    let actor = Actor::load(&state, &claims).await?;
    let mut conn = get_db_conn(&state.db_pool)?;
    let (_, access) = thread_access(&mut conn, query.thread, &actor)?;
    require_workspace(&access, &actor)?;

    let messages: Vec<ThreadMessage> = thread_messages::table
        .filter(thread_messages::thread_id.eq(query.thread))
        .order(thread_messages::id.asc())
        .select(ThreadMessage::as_select())
        .load(&mut conn)
        .map_err(ApiError::from_db)?;

    Ok(Json(with_authors(&mut conn, messages).map_err(ApiError::from_db)?))
}

#[utoipa::path(
    post,
    path = "/api/messages",
    tag = "Threads",
    request_body = CreateMessageRequest,
    responses(
        (status = 201, description = "Message posted", body = MessageView),
        (status = 400, description = "Content missing", body = crate::handlers::auth::ErrorResponse),
        (status = 403, description = "Must be a project member.", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Thread not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateMessageRequest>,
) -> ApiResult<(StatusCode, Json<MessageView>)> {
    let actor = Actor::load(&state, &claims).await?;
    let content = required_text(
        payload.content.as_deref(),
        "Content is required",
        "CONTENT_REQUIRED",
    )?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let (thread, access) = thread_access(&mut conn, payload.thread, &actor)?;
    require_participant(&access)?;

    if thread.is_ephemeral {
        let expired = expire_messages(
            &mut conn,
            thread.id,
            state.portal.ephemeral_message_ttl_secs,
        )
        .map_err(ApiError::from_db)?;
        if expired > 0 {
            debug!(thread_id = %thread.id, expired, "Expired ephemeral messages");
        }
    }

    let message: ThreadMessage = diesel::insert_into(thread_messages::table)
        .values(&NewThreadMessage {
            thread_id: thread.id,
            author_id: Some(actor.id),
            content,
        })
        .returning(ThreadMessage::as_returning())
        .get_result(&mut conn)
        .map_err(ApiError::from_db)?;

    Ok((
        StatusCode::CREATED,
        Json(MessageView {
            message,
            author_username: Some(actor.username),
        }),
    ))
}

#[utoipa::path(
    delete,
    path = "/api/messages/{id}",
    tag = "Threads",
    params(("id" = i64, Path, description = "Message ID")),
    responses(
        (status = 204, description = "Message deleted"),
        (status = 403, description = "Not the author or project lead", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Message not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(message_id): Path<i64>,
) -> ApiResult<StatusCode> {
    let actor = Actor::load(&state, &claims).await?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let message: ThreadMessage = thread_messages::table
        .find(message_id)
        .select(ThreadMessage::as_select())
        .first(&mut conn)
        .optional()
        .map_err(ApiError::from_db)?
        .ok_or_else(|| ApiError::not_found("Message not found", "MESSAGE_NOT_FOUND"))?;

    let is_author = message.author_id == Some(actor.id);
    if !is_author {
        let (_, access) = thread_access(&mut conn, message.thread_id, &actor)?;
        if !(access.is_lead || actor.is_superuser()) {
            return Err(ApiError::forbidden(
                "Only the author or the Project Lead can delete this message.",
                "NOT_MESSAGE_AUTHOR",
            ));
        }
    }

    diesel::delete(thread_messages::table.find(message_id))
        .execute(&mut conn)
        .map_err(ApiError::from_db)?;

    Ok(StatusCode::NO_CONTENT)
}
