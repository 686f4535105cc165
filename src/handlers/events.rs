//! Club events: visibility-filtered listing, management and banners.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{NaiveDateTime, Utc};
use diesel::pg::Pg;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::{
        jwt::Claims,
        permissions::{self, Actor, Permission},
    },
    error::{get_db_conn, ApiError, ApiResult},
    helpers::{double_option, required_text},
    models::{Event, EventChangeset, NewEvent},
    schema::{events, member_profiles},
    types::{EventScope, EventVisibility},
    uploads::{MediaKind, MultipartForm},
    AppState,
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExternalLink {
    #[schema(example = "Rulebook")]
    pub label: String,
    #[schema(example = "https://example.org/rules.pdf")]
    pub url: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateEventRequest {
    #[schema(example = "Robo Wars 2026")]
    pub title: Option<String>,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub full_description: String,
    #[serde(default)]
    pub venue: String,
    pub visibility: Option<EventVisibility>,
    pub display_order: Option<i32>,
    #[serde(default)]
    pub registration_enabled: bool,
    pub registration_start: Option<NaiveDateTime>,
    pub registration_end: Option<NaiveDateTime>,
    pub external_registration_link: Option<String>,
    #[serde(default)]
    pub external_links: Vec<ExternalLink>,
    pub event_date: Option<NaiveDateTime>,
    pub due_date: Option<NaiveDateTime>,
    pub scope: Option<EventScope>,
    pub sig: Option<String>,
    #[serde(default)]
    pub is_full_event: bool,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateEventRequest {
    pub title: Option<String>,
    pub short_description: Option<String>,
    pub full_description: Option<String>,
    pub venue: Option<String>,
    pub visibility: Option<EventVisibility>,
    pub display_order: Option<i32>,
    pub registration_enabled: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<NaiveDateTime>)]
    pub registration_start: Option<Option<NaiveDateTime>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<NaiveDateTime>)]
    pub registration_end: Option<Option<NaiveDateTime>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub external_registration_link: Option<Option<String>>,
    pub external_links: Option<Vec<ExternalLink>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<NaiveDateTime>)]
    pub event_date: Option<Option<NaiveDateTime>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<NaiveDateTime>)]
    pub due_date: Option<Option<NaiveDateTime>>,
    pub scope: Option<EventScope>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub sig: Option<Option<String>>,
    pub is_full_event: Option<bool>,
}

/// Who is looking at the event list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Viewer {
    Anonymous,
    Member { id: Uuid, sig: Option<String> },
    Manager,
}

impl Viewer {
    async fn resolve(state: &AppState, claims: Option<&Claims>) -> ApiResult<Self> {
        let Some(actor) = Actor::optional(state, claims).await? else {
            return Ok(Viewer::Anonymous);
        };
        if actor.can(Permission::ManageEvents) {
            return Ok(Viewer::Manager);
        }

        let mut conn = get_db_conn(&state.db_pool)?;
        let sig: Option<String> = member_profiles::table
            .filter(member_profiles::user_id.eq(actor.id))
            .select(member_profiles::sig)
            .first(&mut conn)
            .optional()
            .map_err(ApiError::from_db)?;

        Ok(Viewer::Member {
            id: actor.id,
            sig: sig.filter(|s| !s.trim().is_empty()),
        })
    }

    pub fn can_see(&self, event: &Event) -> bool {
        let sig = match self {
            Viewer::Manager => return true,
            Viewer::Anonymous => None,
            Viewer::Member { sig, .. } => sig.as_deref(),
        };
        if event.visibility != EventVisibility::Published.as_str() {
            return false;
        }

        match EventScope::parse(&event.scope) {
            Some(EventScope::Global) => true,
            Some(EventScope::Sig) => sig.is_some() && event.sig.as_deref() == sig,
            Some(EventScope::Personal) => {
                matches!(self, Viewer::Member { id, .. } if event.owner_id == Some(*id))
            }
            None => false,
        }
    }

    fn filter(&self) -> events::BoxedQuery<'static, Pg> {
        let query = events::table.into_boxed();
        let published = events::visibility.eq(EventVisibility::Published.as_str());
        let global = events::scope.eq(EventScope::Global.as_str());

        match self {
            Viewer::Manager => query,
            Viewer::Anonymous => query.filter(published).filter(global),
            Viewer::Member { id, sig } => {
                let personal = events::scope
                    .eq(EventScope::Personal.as_str())
                    .and(events::owner_id.eq(*id));
                let visible = match sig {
                    Some(sig) => {
                        let in_sig = events::scope
                            .eq(EventScope::Sig.as_str())
                            .and(events::sig.eq(sig.clone()));
                        query.filter(global.or(in_sig).or(personal))
                    }
                    None => query.filter(global.or(personal)),
                };
                visible.filter(published)
            }
        }
    }
}

fn check_window(start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> ApiResult<()> {
    match (start, end) {
        (Some(start), Some(end)) if start > end => Err(ApiError::bad_request(
            "Registration start must not be after registration end",
            "INVALID_REGISTRATION_WINDOW",
        )),
        _ => Ok(()),
    }
}

fn links_json(links: &[ExternalLink]) -> ApiResult<serde_json::Value> {
    serde_json::to_value(links)
        .map_err(|_| ApiError::bad_request("Invalid external links", "INVALID_LINKS"))
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn find_event(conn: &mut PgConnection, event_id: Uuid) -> ApiResult<Event> {
    events::table
        .find(event_id)
        .select(Event::as_select())
        .first(conn)
        .optional()
        .map_err(ApiError::from_db)?
        .ok_or_else(|| ApiError::not_found("Event not found", "EVENT_NOT_FOUND"))
}

impl UpdateEventRequest {
    fn changeset(self) -> ApiResult<EventChangeset> {
        Ok(EventChangeset {
            title: blank_to_none(self.title),
            short_description: self.short_description,
            full_description: self.full_description,
            venue: self.venue,
            visibility: self.visibility.map(|v| v.as_str().to_string()),
            display_order: self.display_order,
            registration_enabled: self.registration_enabled,
            registration_start: self.registration_start,
            registration_end: self.registration_end,
            external_registration_link: self.external_registration_link.map(blank_to_none),
            external_links: self.external_links.as_deref().map(links_json).transpose()?,
            event_date: self.event_date,
            due_date: self.due_date,
            scope: self.scope.map(|s| s.as_str().to_string()),
            sig: self.sig.map(blank_to_none),
            is_full_event: self.is_full_event,
            banner: None,
            updated_at: Some(Utc::now().naive_utc()),
        })
    }
}

#[utoipa::path(
    get,
    path = "/api/events",
    tag = "Events",
    responses((status = 200, description = "Events visible to the caller, by display order then date", body = Vec<Event>))
)]
pub async fn list_events(
    State(state): State<AppState>,
    claims: Option<Extension<Claims>>,
) -> ApiResult<Json<Vec<Event>>> {
    let viewer = Viewer::resolve(&state, claims.as_ref().map(|c| &c.0)).await?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let list = viewer
        .filter()
        .order((events::display_order.asc(), events::event_date.desc()))
        .select(Event::as_select())
        .load(&mut conn)
        .map_err(ApiError::from_db)?;

    Ok(Json(list))
}

#[utoipa::path(
    get,
    path = "/api/events/{id}",
    tag = "Events",
    params(("id" = Uuid, Path, description = "Event ID")),
    responses(
        (status = 200, description = "Event", body = Event),
        (status = 404, description = "Event not found or not visible", body = crate::handlers::auth::ErrorResponse)
    )
)]
pub async fn get_event(
    State(state): State<AppState>,
    claims: Option<Extension<Claims>>,
    Path(event_id): Path<Uuid>,
) -> ApiResult<Json<Event>> {
    let viewer = Viewer::resolve(&state, claims.as_ref().map(|c| &c.0)).await?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let event = find_event(&mut conn, event_id)?;
    if !viewer.can_see(&event) {
        return Err(ApiError::not_found("Event not found", "EVENT_NOT_FOUND"));
    }
    Ok(Json(event))
}

#[utoipa::path(
    post,
    path = "/api/events",
    tag = "Events",
    request_body = CreateEventRequest,
    responses(
        (status = 201, description = "Event created", body = Event),
        (status = 400, description = "Missing title or invalid registration window", body = crate::handlers::auth::ErrorResponse),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_event(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateEventRequest>,
) -> ApiResult<(StatusCode, Json<Event>)> {
    let actor = permissions::require(&state, &claims, Permission::ManageEvents).await?;
    let title = required_text(payload.title.as_deref(), "Title is required", "TITLE_REQUIRED")?;
    check_window(payload.registration_start, payload.registration_end)?;

    let new_event = NewEvent {
        title,
        short_description: payload.short_description,
        full_description: payload.full_description,
        venue: payload.venue,
        visibility: payload.visibility.unwrap_or_default().as_str().to_string(),
        display_order: payload.display_order.unwrap_or(0),
        registration_enabled: payload.registration_enabled,
        registration_start: payload.registration_start,
        registration_end: payload.registration_end,
        external_registration_link: blank_to_none(payload.external_registration_link),
        external_links: links_json(&payload.external_links)?,
        event_date: payload.event_date,
        due_date: payload.due_date,
        scope: payload.scope.unwrap_or_default().as_str().to_string(),
        sig: blank_to_none(payload.sig),
        owner_id: Some(actor.id),
        is_full_event: payload.is_full_event,
    };

    let mut conn = get_db_conn(&state.db_pool)?;
    let event: Event = diesel::insert_into(events::table)
        .values(&new_event)
        .returning(Event::as_returning())
        .get_result(&mut conn)
        .map_err(ApiError::from_db)?;

    info!(event_id = %event.id, user_id = %actor.id, "Event created");
    Ok((StatusCode::CREATED, Json(event)))
}

#[utoipa::path(
    patch,
    path = "/api/events/{id}",
    tag = "Events",
    params(("id" = Uuid, Path, description = "Event ID")),
    request_body = UpdateEventRequest,
    responses(
        (status = 200, description = "Event updated", body = Event),
        (status = 400, description = "Invalid registration window", body = crate::handlers::auth::ErrorResponse),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Event not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_event(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(event_id): Path<Uuid>,
    Json(payload): Json<UpdateEventRequest>,
) -> ApiResult<Json<Event>> {
    let actor = permissions::require(&state, &claims, Permission::ManageEvents).await?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let current = find_event(&mut conn, event_id)?;
    check_window(
        payload.registration_start.unwrap_or(current.registration_start),
        payload.registration_end.unwrap_or(current.registration_end),
    )?;

    let event: Event = diesel::update(events::table.find(event_id))
        .set(&payload.changeset()?)
        .returning(Event::as_returning())
        .get_result(&mut conn)
        .map_err(ApiError::from_db)?;

    info!(event_id = %event_id, user_id = %actor.id, "Event updated");
    Ok(Json(event))
}

#[utoipa::path(
    delete,
    path = "/api/events/{id}",
    tag = "Events",
    params(("id" = Uuid, Path, description = "Event ID")),
    responses(
        (status = 204, description = "Event deleted"),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Event not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_event(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(event_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let actor = permissions::require(&state, &claims, Permission::ManageEvents).await?;
    let banner = {
        let mut conn = get_db_conn(&state.db_pool)?;
        let event = find_event(&mut conn, event_id)?;
        diesel::delete(events::table.find(event_id))
            .execute(&mut conn)
            .map_err(ApiError::from_db)?;
        event.banner
    };

    if let Some(path) = banner {
        state.media.remove(&path).await;
    }

    info!(event_id = %event_id, user_id = %actor.id, "Event deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/events/{id}/banner",
    tag = "Events",
    params(("id" = Uuid, Path, description = "Event ID")),
    request_body(content_type = "multipart/form-data", description = "`banner` image, up to 2MB"),
    responses(
        (status = 200, description = "Banner stored", body = Event),
        (status = 400, description = "Missing file or unsupported type", body = crate::handlers::auth::ErrorResponse),
        (status = 413, description = "File too large", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn upload_banner(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(event_id): Path<Uuid>,
    multipart: Multipart,
) -> ApiResult<Json<Event>> {
    permissions::require(&state, &claims, Permission::ManageEvents).await?;
    {
        let mut conn = get_db_conn(&state.db_pool)?;
        find_event(&mut conn, event_id)?;
    }

    let form = MultipartForm::read(multipart).await?;
    let stored = state
        .media
        .save(MediaKind::EventBanner, form.require_file("banner")?)
        .await?;

    let (previous, event) = {
        let mut conn = get_db_conn(&state.db_pool)?;
        let previous = find_event(&mut conn, event_id)?.banner;
        let event: Event = diesel::update(events::table.find(event_id))
            .set((
                events::banner.eq(Some(&stored)),
                events::updated_at.eq(Utc::now().naive_utc()),
            ))
            .returning(Event::as_returning())
            .get_result(&mut conn)
            .map_err(ApiError::from_db)?;
        (previous, event)
    };

    if let Some(old) = previous.filter(|old| *old != stored) {
        state.media.remove(&old).await;
    }

    info!(event_id = %event_id, path = %stored, "Event banner updated");
    Ok(Json(event))
}
