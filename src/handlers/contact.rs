use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use diesel::prelude::*;
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{
        jwt::Claims,
        permissions::{self, Permission},
    },
    error::{get_db_conn, ApiError, ApiResult},
    models::{ContactMessage, NewContactMessage},
    schema::contact_messages,
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ContactRequest {
    #[validate(length(min = 1, message = "Name is required"))]
    #[schema(example = "Jordan")]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "jordan@example.com")]
    pub email: String,
    #[serde(default)]
    pub subject: String,
    #[validate(length(min = 1, message = "Message is required"))]
    pub message: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MarkReadRequest {
    pub is_read: bool,
}

#[utoipa::path(
    post,
    path = "/api/contact-messages",
    tag = "Contact",
    request_body = ContactRequest,
    responses(
        (status = 201, description = "Message received", body = ContactMessage),
        (status = 400, description = "Validation error", body = crate::handlers::auth::ErrorResponse)
    )
)]
pub async fn create_contact_message(
    State(state): State<AppState>,
    Json(payload): Json<ContactRequest>,
) -> ApiResult<(StatusCode, Json<ContactMessage>)> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::bad_request(
            format!("Validation error: {}", e),
            "VALIDATION_ERROR",
        ));
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    let message: ContactMessage = diesel::insert_into(contact_messages::table)
        .values(&NewContactMessage {
            name: payload.name.trim().to_string(),
            email: payload.email.trim().to_string(),
            subject: payload.subject,
            message: payload.message,
        })
        .returning(ContactMessage::as_returning())
        .get_result(&mut conn)
        .map_err(ApiError::from_db)?;

    info!(message_id = %message.id, "Contact message received");
    Ok((StatusCode::CREATED, Json(message)))
}

#[utoipa::path(
    get,
    path = "/api/contact-messages",
    tag = "Contact",
    responses(
        (status = 200, description = "Inbox, newest first", body = Vec<ContactMessage>),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_contact_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<ContactMessage>>> {
    permissions::require(&state, &claims, Permission::ManageMessages).await?;
    let mut conn = get_db_conn(&state.db_pool)?;
    let list = contact_messages::table
        .order(contact_messages::created_at.desc())
        .select(ContactMessage::as_select())
        .load(&mut conn)
        .map_err(ApiError::from_db)?;
    Ok(Json(list))
}

#[utoipa::path(
    patch,
    path = "/api/contact-messages/{id}",
    tag = "Contact",
    params(("id" = Uuid, Path, description = "Message ID")),
    request_body = MarkReadRequest,
    responses(
        (status = 200, description = "Read flag updated", body = ContactMessage),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Message not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn mark_contact_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<MarkReadRequest>,
) -> ApiResult<Json<ContactMessage>> {
    permissions::require(&state, &claims, Permission::ManageMessages).await?;
    let mut conn = get_db_conn(&state.db_pool)?;

    diesel::update(contact_messages::table.find(id))
        .set(contact_messages::is_read.eq(payload.is_read))
        .returning(ContactMessage::as_returning())
        .get_result(&mut conn)
        .optional()
        .map_err(ApiError::from_db)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Message not found", "MESSAGE_NOT_FOUND"))
}

#[utoipa::path(
    delete,
    path = "/api/contact-messages/{id}",
    tag = "Contact",
    params(("id" = Uuid, Path, description = "Message ID")),
    responses(
        (status = 204, description = "Message deleted"),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Message not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_contact_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let actor = permissions::require(&state, &claims, Permission::ManageMessages).await?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let deleted = diesel::delete(contact_messages::table.find(id))
        .execute(&mut conn)
        .map_err(ApiError::from_db)?;
    if deleted == 0 {
        return Err(ApiError::not_found("Message not found", "MESSAGE_NOT_FOUND"));
    }

    info!(message_id = %id, user_id = %actor.id, "Contact message deleted");
    Ok(StatusCode::NO_CONTENT)
}
