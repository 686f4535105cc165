//! Sponsorship inquiries and the featured sponsor wall.

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
        permissions::{self, Actor, Permission},
    },
    error::{get_db_conn, ApiError, ApiResult},
    helpers::{double_option, unchanged_or},
    models::{NewSponsorship, Sponsorship, SponsorshipChangeset},
    schema::sponsorships,
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SponsorshipInquiry {
    #[validate(length(min = 1, message = "Company name is required"))]
    #[schema(example = "Acme Motors")]
    pub company_name: String,
    #[serde(default)]
    pub contact_name: String,
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "partnerships@acme.example")]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    #[schema(example = "GOLD")]
    pub tier: String,
    pub website: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateSponsorshipRequest {
    pub company_name: Option<String>,
    pub contact_name: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub tier: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub website: Option<Option<String>>,
    pub message: Option<String>,
    pub is_featured: Option<bool>,
}

fn validation_error(e: validator::ValidationErrors) -> (StatusCode, Json<ApiError>) {
    ApiError::bad_request(format!("Validation error: {}", e), "VALIDATION_ERROR")
}

#[utoipa::path(
    get,
    path = "/api/sponsorships",
    tag = "Sponsorships",
    responses((status = 200, description = "Featured sponsors; every inquiry for sponsorship managers", body = Vec<Sponsorship>))
)]
pub async fn list_sponsorships(
    State(state): State<AppState>,
    claims: Option<Extension<Claims>>,
) -> ApiResult<Json<Vec<Sponsorship>>> {
    let manager = Actor::optional(&state, claims.as_ref().map(|c| &c.0))
        .await?
        .is_some_and(|actor| actor.can(Permission::ManageSponsorship));

    let mut conn = get_db_conn(&state.db_pool)?;
    let mut listing = sponsorships::table.into_boxed();
    if !manager {
        listing = listing.filter(sponsorships::is_featured.eq(true));
    }

    let list = listing
        .order(sponsorships::created_at.desc())
        .select(Sponsorship::as_select())
        .load(&mut conn)
        .map_err(ApiError::from_db)?;
    Ok(Json(list))
}

#[utoipa::path(
    post,
    path = "/api/sponsorships",
    tag = "Sponsorships",
    request_body = SponsorshipInquiry,
    responses(
        (status = 201, description = "Inquiry received", body = Sponsorship),
        (status = 400, description = "Validation error", body = crate::handlers::auth::ErrorResponse)
    )
)]
pub async fn create_sponsorship(
    State(state): State<AppState>,
    Json(payload): Json<SponsorshipInquiry>,
) -> ApiResult<(StatusCode, Json<Sponsorship>)> {
    payload.validate().map_err(validation_error)?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let sponsorship: Sponsorship = diesel::insert_into(sponsorships::table)
        .values(&NewSponsorship {
            company_name: payload.company_name.trim().to_string(),
            contact_name: payload.contact_name,
            email: payload.email.trim().to_string(),
            phone: payload.phone,
            tier: payload.tier,
            website: payload.website.filter(|w| !w.trim().is_empty()),
            message: payload.message,
        })
        .returning(Sponsorship::as_returning())
        .get_result(&mut conn)
        .map_err(ApiError::from_db)?;

    info!(sponsorship_id = %sponsorship.id, "Sponsorship inquiry received");
    Ok((StatusCode::CREATED, Json(sponsorship)))
}

#[utoipa::path(
    patch,
    path = "/api/sponsorships/{id}",
    tag = "Sponsorships",
    params(("id" = Uuid, Path, description = "Sponsorship ID")),
    request_body = UpdateSponsorshipRequest,
    responses(
        (status = 200, description = "Sponsorship updated", body = Sponsorship),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Sponsorship not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_sponsorship(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateSponsorshipRequest>,
) -> ApiResult<Json<Sponsorship>> {
    let actor = permissions::require(&state, &claims, Permission::ManageSponsorship).await?;
    payload.validate().map_err(validation_error)?;

    let changes = SponsorshipChangeset {
        company_name: payload.company_name,
        contact_name: payload.contact_name,
        email: payload.email,
        phone: payload.phone,
        tier: payload.tier,
        website: payload.website,
        message: payload.message,
        is_featured: payload.is_featured,
    };

    let mut conn = get_db_conn(&state.db_pool)?;
    let sponsorship = unchanged_or(
        diesel::update(sponsorships::table.find(id))
            .set(&changes)
            .returning(Sponsorship::as_returning())
            .get_result(&mut conn),
        || {
            sponsorships::table
                .find(id)
                .select(Sponsorship::as_select())
                .first(&mut conn)
        },
    )
    .optional()
    .map_err(ApiError::from_db)?
    .ok_or_else(|| ApiError::not_found("Sponsorship not found", "SPONSORSHIP_NOT_FOUND"))?;

    info!(sponsorship_id = %id, user_id = %actor.id, "Sponsorship updated");
    Ok(Json(sponsorship))
}

#[utoipa::path(
    delete,
    path = "/api/sponsorships/{id}",
    tag = "Sponsorships",
    params(("id" = Uuid, Path, description = "Sponsorship ID")),
    responses(
        (status = 204, description = "Sponsorship deleted"),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Sponsorship not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_sponsorship(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let actor = permissions::require(&state, &claims, Permission::ManageSponsorship).await?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let deleted = diesel::delete(sponsorships::table.find(id))
        .execute(&mut conn)
        .map_err(ApiError::from_db)?;
    if deleted == 0 {
        return Err(ApiError::not_found(
            "Sponsorship not found",
            "SPONSORSHIP_NOT_FOUND",
        ));
    }

    info!(sponsorship_id = %id, user_id = %actor.id, "Sponsorship deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inquiry_requires_company_and_valid_email() {
        let ok: SponsorshipInquiry = serde_json::from_value(serde_json::json!({
            "company_name": "Acme",
            "email": "hello@acme.example"
        }))
        .unwrap();
        assert!(ok.validate().is_ok());

        let bad: SponsorshipInquiry = serde_json::from_value(serde_json::json!({
            "company_name": "",
            "email": "not-an-email"
        }))
        .unwrap();
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("company_name"));
        assert!(fields.contains_key("email"));
    }

    #[test]
    fn test_update_distinguishes_null_website() {
        let clear: UpdateSponsorshipRequest =
            serde_json::from_value(serde_json::json!({"website": null})).unwrap();
        assert_eq!(clear.website, Some(None));

        let untouched: UpdateSponsorshipRequest =
            serde_json::from_value(serde_json::json!({"is_featured": true})).unwrap();
        assert_eq!(untouched.website, None);
        assert_eq!(untouched.is_featured, Some(true));
    }
}
