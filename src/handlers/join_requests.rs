//! Resolving requests to join a project.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::Utc;
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    auth::{
        jwt::Claims,
        permissions::{Actor, Permission},
    },
    error::{get_db_conn, ApiError, ApiResult},
    handlers::projects::{add_member, ProjectAccess, WEB_LEAD_ROLE},
    models::JoinRequest,
    schema::{join_requests, projects, users},
    types::JoinRequestStatus,
    AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct JoinRequestQuery {
    pub project: Option<Uuid>,
    /// PENDING, APPROVED or REJECTED.
    pub status: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct JoinRequestView {
    #[serde(flatten)]
    pub request: JoinRequest,
    pub username: String,
    pub project_title: String,
}

/// What resolving a request in `current` towards `target` should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Apply,
    AlreadyDone,
}

fn resolve(
    current: JoinRequestStatus,
    target: JoinRequestStatus,
) -> Result<Resolution, (axum::http::StatusCode, Json<ApiError>)> {
    match current {
        JoinRequestStatus::Pending => Ok(Resolution::Apply),
        done if done == target => Ok(Resolution::AlreadyDone),
        done => Err(ApiError::conflict(
            format!("Request was already {}", done.as_str().to_lowercase()),
            "REQUEST_ALREADY_RESOLVED",
        )),
    }
}

fn find_request(conn: &mut PgConnection, request_id: Uuid) -> ApiResult<JoinRequest> {
    join_requests::table
        .find(request_id)
        .select(JoinRequest::as_select())
        .first(conn)
        .optional()
        .map_err(ApiError::from_db)?
        .ok_or_else(|| ApiError::not_found("Join request not found", "REQUEST_NOT_FOUND"))
}

fn current_status(request: &JoinRequest) -> ApiResult<JoinRequestStatus> {
    JoinRequestStatus::parse(&request.status).ok_or_else(|| {
        ApiError::internal(
            format!("Unknown request status '{}'", request.status),
            "INVALID_STATUS",
        )
    })
}

#[utoipa::path(
    get,
    path = "/api/join-requests",
    tag = "Projects",
    params(JoinRequestQuery),
    responses(
        (status = 200, description = "Requests the caller may resolve, newest first", body = Vec<JoinRequestView>),
        (status = 401, description = "Unauthorized", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_join_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<JoinRequestQuery>,
) -> ApiResult<Json<Vec<JoinRequestView>>> {
    let actor = Actor::load(&state, &claims).await?;
    let sees_all = actor.is_superuser()
        || actor.can(Permission::ManageProjects)
        || actor.perms.has_role(WEB_LEAD_ROLE);

    let mut conn = get_db_conn(&state.db_pool)?;

    let mut listing = join_requests::table.into_boxed();
    if !sees_all {
        let led = projects::table
            .filter(projects::lead_id.eq(actor.id))
            .select(projects::id);
        listing = listing.filter(join_requests::project_id.eq_any(led));
    }
    if let Some(project_id) = query.project {
        listing = listing.filter(join_requests::project_id.eq(project_id));
    }
    if let Some(status) = query.status.as_deref() {
        let status = JoinRequestStatus::parse(status.trim()).ok_or_else(|| {
            ApiError::bad_request(format!("Unknown status '{}'", status), "INVALID_STATUS")
        })?;
        listing = listing.filter(join_requests::status.eq(status.as_str()));
    }

    let requests: Vec<JoinRequest> = listing
        .order(join_requests::created_at.desc())
        .select(JoinRequest::as_select())
        .load(&mut conn)
        .map_err(ApiError::from_db)?;

    let user_ids: Vec<Uuid> = requests.iter().map(|r| r.user_id).collect();
    let project_ids: Vec<Uuid> = requests.iter().map(|r| r.project_id).collect();

    let names: HashMap<Uuid, String> = users::table
        .filter(users::id.eq_any(&user_ids))
        .select((users::id, users::username))
        .load::<(Uuid, String)>(&mut conn)
        .map_err(ApiError::from_db)?
        .into_iter()
        .collect();
    let titles: HashMap<Uuid, String> = projects::table
        .filter(projects::id.eq_any(&project_ids))
        .select((projects::id, projects::title))
        .load::<(Uuid, String)>(&mut conn)
        .map_err(ApiError::from_db)?
        .into_iter()
        .collect();

    Ok(Json(
        requests
            .into_iter()
            .map(|request| JoinRequestView {
                username: names.get(&request.user_id).cloned().unwrap_or_default(),
                project_title: titles.get(&request.project_id).cloned().unwrap_or_default(),
                request,
            })
            .collect(),
    ))
}

async fn settle(
    state: &AppState,
    claims: &Claims,
    request_id: Uuid,
    target: JoinRequestStatus,
) -> ApiResult<JoinRequest> {
    let actor = Actor::load(state, claims).await?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let request = find_request(&mut conn, request_id)?;
    let access = ProjectAccess::load(&mut conn, request.project_id, actor.id)?;
    if !access.can_resolve_requests(&actor) {
        warn!(request_id = %request_id, user_id = %actor.id, "Join request resolution denied");
        return Err(ApiError::permission_denied());
    }

    if resolve(current_status(&request)?, target)? == Resolution::AlreadyDone {
        return Ok(request);
    }

    let updated = conn
        .transaction::<_, DieselError, _>(|conn| {
            // Re-read under a row lock.
            let locked: JoinRequest = join_requests::table
                .find(request_id)
                .for_update()
                .select(JoinRequest::as_select())
                .first(conn)?;
            if locked.status != JoinRequestStatus::Pending.as_str() {
                return Ok(locked);
            }

            if target == JoinRequestStatus::Approved {
                add_member(conn, locked.project_id, locked.user_id)?;
            }

            diesel::update(join_requests::table.find(request_id))
                .set((
                    join_requests::status.eq(target.as_str()),
                    join_requests::resolved_by.eq(Some(actor.id)),
                    join_requests::resolved_at.eq(Some(Utc::now().naive_utc())),
                ))
                .returning(JoinRequest::as_returning())
                .get_result(conn)
        })
        .map_err(ApiError::from_db)?;

    // A concurrent resolution may have won.
    resolve(current_status(&updated)?, target)?;

    info!(
        request_id = %request_id,
        project_id = %updated.project_id,
        user_id = %actor.id,
        status = %updated.status,
        "Join request resolved"
    );
    Ok(updated)
}

#[utoipa::path(
    post,
    path = "/api/join-requests/{id}/approve",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Join request ID")),
    responses(
        (status = 200, description = "Approved; the requester is now a member", body = JoinRequest),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Request not found", body = crate::handlers::auth::ErrorResponse),
        (status = 409, description = "Request was already rejected", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn approve_join_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<Uuid>,
) -> ApiResult<Json<JoinRequest>> {
    settle(&state, &claims, request_id, JoinRequestStatus::Approved)
        .await
        .map(Json)
}

#[utoipa::path(
    post,
    path = "/api/join-requests/{id}/reject",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Join request ID")),
    responses(
        (status = 200, description = "Rejected", body = JoinRequest),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Request not found", body = crate::handlers::auth::ErrorResponse),
        (status = 409, description = "Request was already approved", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn reject_join_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<Uuid>,
) -> ApiResult<Json<JoinRequest>> {
    settle(&state, &claims, request_id, JoinRequestStatus::Rejected)
        .await
        .map(Json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_pending_requests_apply() {
        assert_eq!(
            resolve(JoinRequestStatus::Pending, JoinRequestStatus::Approved).unwrap(),
            Resolution::Apply
        );
        assert_eq!(
            resolve(JoinRequestStatus::Pending, JoinRequestStatus::Rejected).unwrap(),
            Resolution::Apply
        );
    }

    #[test]
    fn test_repeating_a_resolution_is_a_no_op() {
        assert_eq!(
            resolve(JoinRequestStatus::Approved, JoinRequestStatus::Approved).unwrap(),
            Resolution::AlreadyDone
        );
        assert_eq!(
            resolve(JoinRequestStatus::Rejected, JoinRequestStatus::Rejected).unwrap(),
            Resolution::AlreadyDone
        );
    }

    #[test]
    fn test_crossing_terminal_states_conflicts() {
        let (status, Json(body)) =
            resolve(JoinRequestStatus::Rejected, JoinRequestStatus::Approved).unwrap_err();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.code, "REQUEST_ALREADY_RESOLVED");

        let (status, _) =
            resolve(JoinRequestStatus::Approved, JoinRequestStatus::Rejected).unwrap_err();
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
