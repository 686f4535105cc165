//! Audit trail browsing, export and retention.

use axum::{
    extract::{Query, State},
    response::Response,
    Extension, Json,
};
use chrono::NaiveDateTime;
use diesel::pg::Pg;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    audit::{AuditEntry, AuditEventType, AuditService},
    auth::{
        jwt::Claims,
        permissions::{self, Permission},
    },
    error::{get_db_conn, ApiError, ApiResult},
    helpers::{csv_attachment, format_timestamp, ClientIp},
    models::AuditLog,
    pagination::{Page, PaginationParams},
    schema::{audit_logs, users},
    AppState,
};

const SYSTEM_ACTOR: &str = "System/Proton";

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuditLogFilter {
    /// Exact event type, e.g. `LOGIN_FAILED`.
    pub event_type: Option<String>,
    pub success: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuditLogEntry {
    pub id: Uuid,
    #[schema(example = "USER_LOGIN")]
    pub event_type: String,
    pub actor: Option<Uuid>,
    pub actor_username: Option<String>,
    pub target: String,
    pub ip_address: Option<String>,
    pub details: String,
    pub success: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteOldLogsRequest {
    #[serde(default)]
    #[schema(value_type = Option<i64>, example = 90)]
    pub days: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteOldLogsResponse {
    #[schema(example = "success")]
    pub status: String,
    pub deleted_count: usize,
}

fn filtered(filter: &AuditLogFilter) -> audit_logs::BoxedQuery<'static, Pg> {
    let mut query = audit_logs::table.into_boxed();
    if let Some(event_type) = filter
        .event_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        query = query.filter(audit_logs::event_type.eq(event_type.to_string()));
    }
    if let Some(success) = filter.success {
        query = query.filter(audit_logs::success.eq(success));
    }
    query
}

fn usernames(conn: &mut PgConnection, logs: &[AuditLog]) -> QueryResult<HashMap<Uuid, String>> {
    let ids: Vec<Uuid> = logs.iter().filter_map(|l| l.actor_id).collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(Uuid, String)> = users::table
        .filter(users::id.eq_any(ids))
        .select((users::id, users::username))
        .load(conn)?;
    Ok(rows.into_iter().collect())
}

fn to_entry(log: AuditLog, names: &HashMap<Uuid, String>) -> AuditLogEntry {
    AuditLogEntry {
        actor_username: log.actor_id.and_then(|id| names.get(&id).cloned()),
        id: log.id,
        event_type: log.event_type,
        actor: log.actor_id,
        target: log.target,
        ip_address: log.ip_address,
        details: log.details,
        success: log.success,
        created_at: log.created_at,
    }
}

/// Accepts a non-negative integer or its decimal string form.
fn parse_days(value: Option<&Value>) -> ApiResult<i64> {
    let value = match value {
        None | Some(Value::Null) => {
            return Err(ApiError::bad_request(
                "Days parameter is required",
                "DAYS_REQUIRED",
            ))
        }
        Some(v) => v,
    };

    let days = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    days.filter(|d| *d >= 0)
        .ok_or_else(|| ApiError::bad_request("Invalid days parameter", "INVALID_DAYS"))
}

#[utoipa::path(
    get,
    path = "/api/admin/audit-logs",
    tag = "Audit",
    params(PaginationParams, AuditLogFilter),
    responses(
        (status = 200, description = "Audit entries, newest first", body = Page<AuditLogEntry>),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_audit_logs(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<PaginationParams>,
    Query(filter): Query<AuditLogFilter>,
) -> ApiResult<Json<Page<AuditLogEntry>>> {
    permissions::require(&state, &claims, Permission::ManageSecurity).await?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let total: i64 = filtered(&filter)
        .count()
        .get_result(&mut conn)
        .map_err(ApiError::from_db)?;

    let (limit, offset) = params.limit_offset();
    let logs: Vec<AuditLog> = filtered(&filter)
        .order(audit_logs::created_at.desc())
        .limit(limit)
        .offset(offset)
        .select(AuditLog::as_select())
        .load(&mut conn)
        .map_err(ApiError::from_db)?;

    let names = usernames(&mut conn, &logs).map_err(ApiError::from_db)?;
    let data = logs.into_iter().map(|l| to_entry(l, &names)).collect();

    Ok(Json(Page::new(data, params, total)))
}

#[utoipa::path(
    get,
    path = "/api/admin/audit-logs/export_csv",
    tag = "Audit",
    params(AuditLogFilter),
    responses(
        (status = 200, description = "audit_logs.csv", content_type = "text/csv", body = String),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn export_audit_logs_csv(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(filter): Query<AuditLogFilter>,
) -> ApiResult<Response> {
    permissions::require(&state, &claims, Permission::ManageSecurity).await?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let logs: Vec<AuditLog> = filtered(&filter)
        .order(audit_logs::created_at.desc())
        .limit(state.portal.audit_export_limit)
        .select(AuditLog::as_select())
        .load(&mut conn)
        .map_err(ApiError::from_db)?;
    let names = usernames(&mut conn, &logs).map_err(ApiError::from_db)?;
    drop(conn);

    let headers: Vec<String> = [
        "Event Type",
        "Actor",
        "Target",
        "IP Address",
        "Details",
        "Created At",
    ]
    .iter()
    .map(|h| h.to_string())
    .collect();

    let rows = logs.into_iter().map(|log| {
        let actor = log
            .actor_id
            .and_then(|id| names.get(&id).cloned())
            .unwrap_or_else(|| SYSTEM_ACTOR.to_string());
        vec![
            log.event_type,
            actor,
            log.target,
            log.ip_address.unwrap_or_default(),
            log.details,
            format_timestamp(log.created_at),
        ]
    });

    csv_attachment("audit_logs.csv", &headers, rows)
}

#[utoipa::path(
    post,
    path = "/api/admin/audit-logs/delete_old_logs",
    tag = "Audit",
    request_body = DeleteOldLogsRequest,
    responses(
        (status = 200, description = "Old entries purged", body = DeleteOldLogsResponse),
        (status = 400, description = "Missing or invalid days", body = crate::handlers::auth::ErrorResponse),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_old_logs(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ClientIp(ip): ClientIp,
    Json(payload): Json<DeleteOldLogsRequest>,
) -> ApiResult<Json<DeleteOldLogsResponse>> {
    let actor = permissions::require(&state, &claims, Permission::ManageSecurity).await?;
    let days = parse_days(payload.days.as_ref())?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let deleted_count =
        AuditService::purge_older_than(&mut conn, days).map_err(ApiError::from_db)?;

    AuditService::record(
        &mut conn,
        AuditEntry::new(
            AuditEventType::LogsCleaned,
            format!("Deleted {} logs older than {} days", deleted_count, days),
        )
        .actor(actor.id)
        .ip(ip),
    );

    info!(days, deleted_count, user_id = %actor.id, "Audit log cleanup");

    Ok(Json(DeleteOldLogsResponse {
        status: "success".to_string(),
        deleted_count,
    }))
}
