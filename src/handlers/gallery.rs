use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use diesel::dsl::exists;
use diesel::prelude::*;
use serde::Deserialize;
use tracing::{debug, info};
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    auth::{
        jwt::Claims,
        permissions::{self, Permission},
    },
    error::{get_db_conn, ApiError, ApiResult},
    models::{GalleryImage, NewGalleryImage},
    schema::{events, gallery_images},
    uploads::{MediaKind, MultipartForm},
    AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GalleryQuery {
    /// Only images attached to this event.
    pub event: Option<Uuid>,
}

/// Parses the optional `event_id` field, dropping ids that match no event.
fn known_event(conn: &mut PgConnection, raw: Option<&str>) -> ApiResult<Option<Uuid>> {
    let Some(id) = raw.and_then(|r| Uuid::parse_str(r).ok()) else {
        return Ok(None);
    };
    let found: bool = diesel::select(exists(events::table.find(id)))
        .get_result(conn)
        .map_err(ApiError::from_db)?;
    if !found {
        debug!(event_id = %id, "Gallery upload references unknown event");
    }
    Ok(found.then_some(id))
}

#[utoipa::path(
    get,
    path = "/api/gallery",
    tag = "Gallery",
    params(GalleryQuery),
    responses((status = 200, description = "Gallery images, newest first", body = Vec<GalleryImage>))
)]
pub async fn list_gallery(
    State(state): State<AppState>,
    Query(query): Query<GalleryQuery>,
) -> ApiResult<Json<Vec<GalleryImage>>> {
    let mut conn = get_db_conn(&state.db_pool)?;

    let mut listing = gallery_images::table.into_boxed();
    if let Some(event_id) = query.event {
        listing = listing.filter(gallery_images::event_id.eq(event_id));
    }

    let images = listing
        .order(gallery_images::uploaded_at.desc())
        .select(GalleryImage::as_select())
        .load(&mut conn)
        .map_err(ApiError::from_db)?;
    Ok(Json(images))
}

#[utoipa::path(
    post,
    path = "/api/gallery/upload",
    tag = "Gallery",
    request_body(content_type = "multipart/form-data", description = "One or more `images` parts, a `title` and an optional `event_id`"),
    responses(
        (status = 201, description = "Images stored", body = Vec<GalleryImage>),
        (status = 400, description = "No images or unsupported type", body = crate::handlers::auth::ErrorResponse),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 413, description = "An image is too large", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn upload_images(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Vec<GalleryImage>>)> {
    let actor = permissions::require(&state, &claims, Permission::ManageGallery).await?;
    let form = MultipartForm::read(multipart).await?;

    let files: Vec<_> = form.files_named("images").collect();
    if files.is_empty() {
        return Err(ApiError::bad_request(
            "No file provided in 'images'",
            "NO_FILE",
        ));
    }
    for file in &files {
        MediaKind::GalleryImage
            .rule()
            .check(&file.filename, &file.content_type, file.bytes.len())
            .map_err(|r| r.into_api_error())?;
    }

    let title = form.text("title").unwrap_or_default().to_string();
    let event_id = {
        let mut conn = get_db_conn(&state.db_pool)?;
        known_event(&mut conn, form.text("event_id"))?
    };

    let mut stored = Vec::with_capacity(files.len());
    for file in files {
        stored.push(state.media.save(MediaKind::GalleryImage, file).await?);
    }

    let rows: Vec<NewGalleryImage> = stored
        .iter()
        .map(|path| NewGalleryImage {
            title: title.clone(),
            image: path.clone(),
            event_id,
            uploaded_by: Some(actor.id),
        })
        .collect();

    let mut conn = get_db_conn(&state.db_pool)?;
    let images: Vec<GalleryImage> = diesel::insert_into(gallery_images::table)
        .values(&rows)
        .returning(GalleryImage::as_returning())
        .get_results(&mut conn)
        .map_err(ApiError::from_db)?;

    info!(count = images.len(), user_id = %actor.id, "Gallery images uploaded");
    Ok((StatusCode::CREATED, Json(images)))
}

#[utoipa::path(
    delete,
    path = "/api/gallery/{id}",
    tag = "Gallery",
    params(("id" = Uuid, Path, description = "Gallery image ID")),
    responses(
        (status = 204, description = "Image deleted"),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Image not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_image(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(image_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let actor = permissions::require(&state, &claims, Permission::ManageGallery).await?;
    let path: String = {
        let mut conn = get_db_conn(&state.db_pool)?;
        diesel::delete(gallery_images::table.find(image_id))
            .returning(gallery_images::image)
            .get_result(&mut conn)
            .optional()
            .map_err(ApiError::from_db)?
            .ok_or_else(|| ApiError::not_found("Image not found", "IMAGE_NOT_FOUND"))?
    };

    state.media.remove(&path).await;

    info!(image_id = %image_id, user_id = %actor.id, "Gallery image deleted");
    Ok(StatusCode::NO_CONTENT)
}
