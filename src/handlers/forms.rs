//! Form builder: forms, sections, fields, public submissions and exports.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    Extension, Json,
};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::{
        jwt::Claims,
        permissions::{self, Actor, Permission},
    },
    error::{get_db_conn, ApiError, ApiResult},
    helpers::{csv_attachment, double_option, format_timestamp, required_text, unchanged_or},
    models::{
        Form, FormChangeset, FormField, FormFieldChangeset, FormResponse, FormSection,
        FormSectionChangeset, NewForm, NewFormField, NewFormResponse, NewFormSection,
    },
    schema::{form_fields, form_responses, form_sections, forms, users},
    types::{FormFieldType, FormTheme},
    AppState,
};

// ============================================================================
// Request / response types
// ============================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct FormDetail {
    #[serde(flatten)]
    pub form: Form,
    pub sections: Vec<FormSection>,
    pub fields: Vec<FormField>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateFormRequest {
    #[schema(example = "Recruitment 2026")]
    pub title: Option<String>,
    #[serde(default)]
    pub description: String,
    pub theme: Option<FormTheme>,
    pub is_active: Option<bool>,
    pub closes_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub success_message: String,
    pub success_link: Option<String>,
    pub success_link_label: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateFormRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub theme: Option<FormTheme>,
    pub is_active: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<NaiveDateTime>)]
    pub closes_at: Option<Option<NaiveDateTime>>,
    pub success_message: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub success_link: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub success_link_label: Option<Option<String>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SectionRequest {
    pub form: Option<Uuid>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub order: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct FieldRequest {
    pub form: Option<Uuid>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<Uuid>)]
    pub section: Option<Option<Uuid>>,
    #[schema(example = "Roll number")]
    pub label: Option<String>,
    pub field_type: Option<FormFieldType>,
    pub required: Option<bool>,
    pub options: Option<Vec<String>>,
    pub order: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitResponseRequest {
    pub form: Option<Value>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub data: Value,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FormResponseView {
    #[serde(flatten)]
    pub response: FormResponse,
    pub username: Option<String>,
}

// ============================================================================
// Helpers
// ============================================================================

fn find_form(conn: &mut PgConnection, form_id: Uuid) -> ApiResult<Form> {
    forms::table
        .find(form_id)
        .select(Form::as_select())
        .first(conn)
        .optional()
        .map_err(ApiError::from_db)?
        .ok_or_else(|| ApiError::not_found("Form not found", "FORM_NOT_FOUND"))
}

fn ordered_fields(conn: &mut PgConnection, form_id: Uuid) -> QueryResult<Vec<FormField>> {
    form_fields::table
        .filter(form_fields::form_id.eq(form_id))
        .order((form_fields::display_order.asc(), form_fields::label.asc()))
        .select(FormField::as_select())
        .load(conn)
}

fn with_structure(conn: &mut PgConnection, list: Vec<Form>) -> QueryResult<Vec<FormDetail>> {
    let ids: Vec<Uuid> = list.iter().map(|f| f.id).collect();

    let mut sections: HashMap<Uuid, Vec<FormSection>> = HashMap::new();
    for section in form_sections::table
        .filter(form_sections::form_id.eq_any(&ids))
        .order((form_sections::display_order.asc(), form_sections::title.asc()))
        .select(FormSection::as_select())
        .load::<FormSection>(conn)?
    {
        sections.entry(section.form_id).or_default().push(section);
    }

    let mut fields: HashMap<Uuid, Vec<FormField>> = HashMap::new();
    for field in form_fields::table
        .filter(form_fields::form_id.eq_any(&ids))
        .order((form_fields::display_order.asc(), form_fields::label.asc()))
        .select(FormField::as_select())
        .load::<FormField>(conn)?
    {
        fields.entry(field.form_id).or_default().push(field);
    }

    Ok(list
        .into_iter()
        .map(|form| FormDetail {
            sections: sections.remove(&form.id).unwrap_or_default(),
            fields: fields.remove(&form.id).unwrap_or_default(),
            form,
        })
        .collect())
}

fn detail(conn: &mut PgConnection, form: Form) -> ApiResult<FormDetail> {
    with_structure(conn, vec![form])
        .map_err(ApiError::from_db)?
        .pop()
        .ok_or_else(ApiError::db_error)
}

/// A section may only be attached to a field of the same form.
fn check_section(conn: &mut PgConnection, form_id: Uuid, section: Option<Uuid>) -> ApiResult<()> {
    let Some(section_id) = section else {
        return Ok(());
    };
    let owner: Option<Uuid> = form_sections::table
        .find(section_id)
        .select(form_sections::form_id)
        .first(conn)
        .optional()
        .map_err(ApiError::from_db)?;
    match owner {
        Some(owner) if owner == form_id => Ok(()),
        Some(_) => Err(ApiError::bad_request(
            "Section belongs to another form",
            "SECTION_MISMATCH",
        )),
        None => Err(ApiError::bad_request("Section not found", "SECTION_NOT_FOUND")),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Why a submission was turned away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Offline,
    Closed,
    Missing(String),
}

impl Rejection {
    fn into_api_error(self) -> (StatusCode, Json<ApiError>) {
        match self {
            Rejection::Offline => {
                ApiError::bad_request("This form is currently offline", "FORM_OFFLINE")
            }
            Rejection::Closed => ApiError::bad_request(
                "This form has automatically closed (deadline passed)",
                "FORM_CLOSED",
            ),
            Rejection::Missing(label) => ApiError::bad_request(
                format!("Field '{}' is compulsory.", label),
                "FIELD_REQUIRED",
            ),
        }
    }
}

/// `false` counts as an answer; a numeric zero does not.
fn is_blank(answer: Option<&Value>) -> bool {
    match answer {
        None | Some(Value::Null) => true,
        Some(Value::Number(n)) => n.as_f64() == Some(0.0),
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}

/// Checks the form is open, then every required field in display order,
/// and keeps only answers keyed by a field label.
pub fn accept_submission(
    form: &Form,
    fields: &[FormField],
    submitted: &Value,
    now: NaiveDateTime,
) -> Result<Map<String, Value>, Rejection> {
    if !form.is_active {
        return Err(Rejection::Offline);
    }
    if form.closes_at.is_some_and(|closes| closes < now) {
        return Err(Rejection::Closed);
    }

    let answers = submitted.as_object();
    let mut kept = Map::new();
    for field in fields {
        let answer = answers.and_then(|a| a.get(&field.label));
        if field.required && is_blank(answer) {
            return Err(Rejection::Missing(field.label.clone()));
        }
        if let Some(answer) = answer {
            kept.insert(field.label.clone(), answer.clone());
        }
    }
    Ok(kept)
}

fn csv_cell(answer: Option<&Value>) -> String {
    fn scalar(value: &Value) -> String {
        match value {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    match answer {
        None => String::new(),
        Some(Value::Array(items)) => items.iter().map(scalar).collect::<Vec<_>>().join(", "),
        Some(value) => scalar(value),
    }
}

fn export_filename(title: &str) -> String {
    format!("{}_responses.csv", title.replace(' ', "_"))
}

// ============================================================================
// Forms
// ============================================================================

#[utoipa::path(
    get,
    path = "/api/forms",
    tag = "Forms",
    responses((status = 200, description = "Forms with ordered sections and fields, newest first", body = Vec<FormDetail>))
)]
pub async fn list_forms(State(state): State<AppState>) -> ApiResult<Json<Vec<FormDetail>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let list: Vec<Form> = forms::table
        .order(forms::created_at.desc())
        .select(Form::as_select())
        .load(&mut conn)
        .map_err(ApiError::from_db)?;
    Ok(Json(with_structure(&mut conn, list).map_err(ApiError::from_db)?))
}

#[utoipa::path(
    get,
    path = "/api/forms/{id}",
    tag = "Forms",
    params(("id" = Uuid, Path, description = "Form ID")),
    responses(
        (status = 200, description = "Form with ordered sections and fields", body = FormDetail),
        (status = 404, description = "Form not found", body = crate::handlers::auth::ErrorResponse)
    )
)]
pub async fn get_form(
    State(state): State<AppState>,
    Path(form_id): Path<Uuid>,
) -> ApiResult<Json<FormDetail>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let form = find_form(&mut conn, form_id)?;
    Ok(Json(detail(&mut conn, form)?))
}

#[utoipa::path(
    post,
    path = "/api/forms",
    tag = "Forms",
    request_body = CreateFormRequest,
    responses(
        (status = 201, description = "Form created", body = FormDetail),
        (status = 400, description = "Title missing", body = crate::handlers::auth::ErrorResponse),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_form(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateFormRequest>,
) -> ApiResult<(StatusCode, Json<FormDetail>)> {
    let actor = permissions::require(&state, &claims, Permission::ManageForms).await?;
    let title = required_text(payload.title.as_deref(), "Title is required", "TITLE_REQUIRED")?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let form: Form = diesel::insert_into(forms::table)
        .values(&NewForm {
            title,
            description: payload.description,
            theme: payload.theme.unwrap_or_default().as_str().to_string(),
            is_active: payload.is_active.unwrap_or(true),
            closes_at: payload.closes_at,
            success_message: payload.success_message,
            success_link: non_blank(payload.success_link),
            success_link_label: non_blank(payload.success_link_label),
            created_by: Some(actor.id),
        })
        .returning(Form::as_returning())
        .get_result(&mut conn)
        .map_err(ApiError::from_db)?;

    info!(form_id = %form.id, user_id = %actor.id, "Form created");
    Ok((StatusCode::CREATED, Json(detail(&mut conn, form)?)))
}

#[utoipa::path(
    patch,
    path = "/api/forms/{id}",
    tag = "Forms",
    params(("id" = Uuid, Path, description = "Form ID")),
    request_body = UpdateFormRequest,
    responses(
        (status = 200, description = "Form updated", body = FormDetail),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Form not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_form(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(form_id): Path<Uuid>,
    Json(payload): Json<UpdateFormRequest>,
) -> ApiResult<Json<FormDetail>> {
    permissions::require(&state, &claims, Permission::ManageForms).await?;
    let mut conn = get_db_conn(&state.db_pool)?;
    find_form(&mut conn, form_id)?;

    let changes = FormChangeset {
        title: non_blank(payload.title),
        description: payload.description,
        theme: payload.theme.map(|t| t.as_str().to_string()),
        is_active: payload.is_active,
        closes_at: payload.closes_at,
        success_message: payload.success_message,
        success_link: payload.success_link.map(non_blank),
        success_link_label: payload.success_link_label.map(non_blank),
    };

    let form = unchanged_or(
        diesel::update(forms::table.find(form_id))
            .set(&changes)
            .returning(Form::as_returning())
            .get_result(&mut conn),
        || forms::table.find(form_id).select(Form::as_select()).first(&mut conn),
    )
    .map_err(ApiError::from_db)?;

    Ok(Json(detail(&mut conn, form)?))
}

#[utoipa::path(
    delete,
    path = "/api/forms/{id}",
    tag = "Forms",
    params(("id" = Uuid, Path, description = "Form ID")),
    responses(
        (status = 204, description = "Form, its structure and responses deleted"),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Form not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_form(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(form_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let actor = permissions::require(&state, &claims, Permission::ManageForms).await?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let deleted = diesel::delete(forms::table.find(form_id))
        .execute(&mut conn)
        .map_err(ApiError::from_db)?;
    if deleted == 0 {
        return Err(ApiError::not_found("Form not found", "FORM_NOT_FOUND"));
    }

    info!(form_id = %form_id, user_id = %actor.id, "Form deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Sections
// ============================================================================

#[utoipa::path(
    post,
    path = "/api/form-sections",
    tag = "Forms",
    request_body = SectionRequest,
    responses(
        (status = 201, description = "Section created", body = FormSection),
        (status = 400, description = "Form or title missing", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Form not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_section(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<SectionRequest>,
) -> ApiResult<(StatusCode, Json<FormSection>)> {
    permissions::require(&state, &claims, Permission::ManageForms).await?;
    let form_id = payload
        .form
        .ok_or_else(|| ApiError::bad_request("form is required", "FORM_REQUIRED"))?;
    let title = required_text(payload.title.as_deref(), "Title is required", "TITLE_REQUIRED")?;

    let mut conn = get_db_conn(&state.db_pool)?;
    find_form(&mut conn, form_id)?;

    let section = diesel::insert_into(form_sections::table)
        .values(&NewFormSection {
            form_id,
            title,
            description: payload.description.unwrap_or_default(),
            display_order: payload.order.unwrap_or(0),
        })
        .returning(FormSection::as_returning())
        .get_result(&mut conn)
        .map_err(ApiError::from_db)?;

    Ok((StatusCode::CREATED, Json(section)))
}

#[utoipa::path(
    patch,
    path = "/api/form-sections/{id}",
    tag = "Forms",
    params(("id" = Uuid, Path, description = "Section ID")),
    request_body = SectionRequest,
    responses(
        (status = 200, description = "Section updated", body = FormSection),
        (status = 404, description = "Section not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_section(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(section_id): Path<Uuid>,
    Json(payload): Json<SectionRequest>,
) -> ApiResult<Json<FormSection>> {
    permissions::require(&state, &claims, Permission::ManageForms).await?;

    let changes = FormSectionChangeset {
        title: non_blank(payload.title),
        description: payload.description,
        display_order: payload.order,
    };

    let mut conn = get_db_conn(&state.db_pool)?;
    unchanged_or(
        diesel::update(form_sections::table.find(section_id))
            .set(&changes)
            .returning(FormSection::as_returning())
            .get_result(&mut conn),
        || {
            form_sections::table
                .find(section_id)
                .select(FormSection::as_select())
                .first(&mut conn)
        },
    )
    .optional()
    .map_err(ApiError::from_db)?
    .map(Json)
    .ok_or_else(|| ApiError::not_found("Section not found", "SECTION_NOT_FOUND"))
}

#[utoipa::path(
    delete,
    path = "/api/form-sections/{id}",
    tag = "Forms",
    params(("id" = Uuid, Path, description = "Section ID")),
    responses(
        (status = 204, description = "Section deleted; its fields become unsectioned"),
        (status = 404, description = "Section not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_section(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(section_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    permissions::require(&state, &claims, Permission::ManageForms).await?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let deleted = diesel::delete(form_sections::table.find(section_id))
        .execute(&mut conn)
        .map_err(ApiError::from_db)?;
    if deleted == 0 {
        return Err(ApiError::not_found("Section not found", "SECTION_NOT_FOUND"));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Fields
// ============================================================================

#[utoipa::path(
    post,
    path = "/api/form-fields",
    tag = "Forms",
    request_body = FieldRequest,
    responses(
        (status = 201, description = "Field created", body = FormField),
        (status = 400, description = "Form or label missing, or foreign section", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Form not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_field(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<FieldRequest>,
) -> ApiResult<(StatusCode, Json<FormField>)> {
    permissions::require(&state, &claims, Permission::ManageForms).await?;
    let form_id = payload
        .form
        .ok_or_else(|| ApiError::bad_request("form is required", "FORM_REQUIRED"))?;
    let label = required_text(payload.label.as_deref(), "Label is required", "LABEL_REQUIRED")?;
    let section_id = payload.section.flatten();

    let mut conn = get_db_conn(&state.db_pool)?;
    find_form(&mut conn, form_id)?;
    check_section(&mut conn, form_id, section_id)?;

    let field = diesel::insert_into(form_fields::table)
        .values(&NewFormField {
            form_id,
            section_id,
            label,
            field_type: payload
                .field_type
                .unwrap_or(FormFieldType::Text)
                .as_str()
                .to_string(),
            required: payload.required.unwrap_or(false),
            options: Value::from(payload.options.unwrap_or_default()),
            display_order: payload.order.unwrap_or(0),
        })
        .returning(FormField::as_returning())
        .get_result(&mut conn)
        .map_err(ApiError::from_db)?;

    Ok((StatusCode::CREATED, Json(field)))
}

#[utoipa::path(
    patch,
    path = "/api/form-fields/{id}",
    tag = "Forms",
    params(("id" = Uuid, Path, description = "Field ID")),
    request_body = FieldRequest,
    responses(
        (status = 200, description = "Field updated", body = FormField),
        (status = 400, description = "Foreign section", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Field not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_field(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(field_id): Path<Uuid>,
    Json(payload): Json<FieldRequest>,
) -> ApiResult<Json<FormField>> {
    permissions::require(&state, &claims, Permission::ManageForms).await?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let current: FormField = form_fields::table
        .find(field_id)
        .select(FormField::as_select())
        .first(&mut conn)
        .optional()
        .map_err(ApiError::from_db)?
        .ok_or_else(|| ApiError::not_found("Field not found", "FIELD_NOT_FOUND"))?;
    if let Some(section) = payload.section {
        check_section(&mut conn, current.form_id, section)?;
    }

    let changes = FormFieldChangeset {
        section_id: payload.section,
        label: non_blank(payload.label),
        field_type: payload.field_type.map(|t| t.as_str().to_string()),
        required: payload.required,
        options: payload.options.map(Value::from),
        display_order: payload.order,
    };

    let field = unchanged_or(
        diesel::update(form_fields::table.find(field_id))
            .set(&changes)
            .returning(FormField::as_returning())
            .get_result(&mut conn),
        || Ok(current),
    )
    .map_err(ApiError::from_db)?;
    Ok(Json(field))
}

#[utoipa::path(
    delete,
    path = "/api/form-fields/{id}",
    tag = "Forms",
    params(("id" = Uuid, Path, description = "Field ID")),
    responses(
        (status = 204, description = "Field deleted"),
        (status = 404, description = "Field not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_field(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(field_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    permissions::require(&state, &claims, Permission::ManageForms).await?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let deleted = diesel::delete(form_fields::table.find(field_id))
        .execute(&mut conn)
        .map_err(ApiError::from_db)?;
    if deleted == 0 {
        return Err(ApiError::not_found("Field not found", "FIELD_NOT_FOUND"));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Responses
// ============================================================================

#[utoipa::path(
    post,
    path = "/api/form-responses",
    tag = "Forms",
    request_body = SubmitResponseRequest,
    responses(
        (status = 201, description = "Response recorded", body = FormResponse),
        (status = 400, description = "Form offline, closed, or a compulsory field is missing", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Form not found", body = crate::handlers::auth::ErrorResponse)
    )
)]
pub async fn submit_response(
    State(state): State<AppState>,
    claims: Option<Extension<Claims>>,
    Json(payload): Json<SubmitResponseRequest>,
) -> ApiResult<(StatusCode, Json<FormResponse>)> {
    let submitter = Actor::optional(&state, claims.as_ref().map(|c| &c.0))
        .await?
        .map(|actor| actor.id);

    let form_id = payload
        .form
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
        .ok_or_else(|| ApiError::not_found("Form not found", "FORM_NOT_FOUND"))?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let form = find_form(&mut conn, form_id)?;
    let fields = ordered_fields(&mut conn, form_id).map_err(ApiError::from_db)?;

    let data = accept_submission(&form, &fields, &payload.data, Utc::now().naive_utc())
        .map_err(|rejection| {
            warn!(form_id = %form_id, reason = ?rejection, "Form submission rejected");
            rejection.into_api_error()
        })?;

    let response = diesel::insert_into(form_responses::table)
        .values(&NewFormResponse {
            form_id,
            user_id: submitter,
            data: Value::Object(data),
        })
        .returning(FormResponse::as_returning())
        .get_result(&mut conn)
        .map_err(ApiError::from_db)?;

    info!(form_id = %form_id, response_id = %response.id, "Form response recorded");
    Ok((StatusCode::CREATED, Json(response)))
}

fn load_responses(
    conn: &mut PgConnection,
    form_id: Uuid,
) -> QueryResult<(Vec<FormResponse>, HashMap<Uuid, String>)> {
    let responses: Vec<FormResponse> = form_responses::table
        .filter(form_responses::form_id.eq(form_id))
        .order(form_responses::submitted_at.desc())
        .select(FormResponse::as_select())
        .load(conn)?;

    let ids: Vec<Uuid> = responses.iter().filter_map(|r| r.user_id).collect();
    let names = users::table
        .filter(users::id.eq_any(&ids))
        .select((users::id, users::username))
        .load::<(Uuid, String)>(conn)?
        .into_iter()
        .collect();
    Ok((responses, names))
}

#[utoipa::path(
    get,
    path = "/api/forms/{id}/responses",
    tag = "Forms",
    params(("id" = Uuid, Path, description = "Form ID")),
    responses(
        (status = 200, description = "Responses, newest first", body = Vec<FormResponseView>),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Form not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_responses(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(form_id): Path<Uuid>,
) -> ApiResult<Json<Vec<FormResponseView>>> {
    permissions::require(&state, &claims, Permission::ManageForms).await?;
    let mut conn = get_db_conn(&state.db_pool)?;
    find_form(&mut conn, form_id)?;

    let (responses, names) = load_responses(&mut conn, form_id).map_err(ApiError::from_db)?;
    Ok(Json(
        responses
            .into_iter()
            .map(|response| FormResponseView {
                username: response.user_id.and_then(|id| names.get(&id).cloned()),
                response,
            })
            .collect(),
    ))
}

#[utoipa::path(
    get,
    path = "/api/forms/{id}/export_responses_csv",
    tag = "Forms",
    params(("id" = Uuid, Path, description = "Form ID")),
    responses(
        (status = 200, description = "<title>_responses.csv", content_type = "text/csv", body = String),
        (status = 403, description = "Permission denied", body = crate::handlers::auth::ErrorResponse),
        (status = 404, description = "Form not found", body = crate::handlers::auth::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn export_responses_csv(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(form_id): Path<Uuid>,
) -> ApiResult<Response> {
    permissions::require(&state, &claims, Permission::ManageForms).await?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let form = find_form(&mut conn, form_id)?;
    let fields = ordered_fields(&mut conn, form_id).map_err(ApiError::from_db)?;
    let (responses, names) = load_responses(&mut conn, form_id).map_err(ApiError::from_db)?;
    drop(conn);

    let headers: Vec<String> = ["Response ID", "User", "Submitted At"]
        .iter()
        .map(|h| h.to_string())
        .chain(fields.iter().map(|f| f.label.clone()))
        .collect();

    let rows = responses.into_iter().map(|response| {
        let user = response
            .user_id
            .and_then(|id| names.get(&id).cloned())
            .unwrap_or_else(|| "Anonymous".to_string());
        let mut row = vec![
            response.id.to_string(),
            user,
            format_timestamp(response.submitted_at),
        ];
        row.extend(
            fields
                .iter()
                .map(|f| csv_cell(response.data.get(&f.label))),
        );
        row
    });

    csv_attachment(&export_filename(&form.title), &headers, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn form(is_active: bool, closes_at: Option<NaiveDateTime>) -> Form {
        Form {
            id: Uuid::new_v4(),
            title: "Recruitment Drive".to_string(),
            description: String::new(),
            theme: "minimal".to_string(),
            is_active,
            closes_at,
            success_message: String::new(),
            success_link: None,
            success_link_label: None,
            created_by: None,
            created_at: Utc::now().naive_utc(),
        }
    }

    fn field(label: &str, required: bool, order: i32) -> FormField {
        FormField {
            id: Uuid::new_v4(),
            form_id: Uuid::new_v4(),
            section_id: None,
            label: label.to_string(),
            field_type: "text".to_string(),
            required,
            options: json!([]),
            display_order: order,
        }
    }

    #[test]
    fn test_inactive_form_is_offline() {
        let now = Utc::now().naive_utc();
        let result = accept_submission(&form(false, None), &[], &json!({}), now);
        assert_eq!(result.unwrap_err(), Rejection::Offline);
    }

    #[test]
    fn test_past_deadline_closes_form() {
        let now = Utc::now().naive_utc();
        let closed = form(true, Some(now - chrono::Duration::minutes(1)));
        assert_eq!(
            accept_submission(&closed, &[], &json!({}), now).unwrap_err(),
            Rejection::Closed
        );

        let open = form(true, Some(now + chrono::Duration::minutes(1)));
        assert!(accept_submission(&open, &[], &json!({}), now).is_ok());
    }

    #[test]
    fn test_blank_required_answers_are_rejected() {
        let now = Utc::now().naive_utc();
        let fields = [field("Name", true, 0)];
        for blank in [
            json!({}),
            json!({"Name": null}),
            json!({"Name": ""}),
            json!({"Name": []}),
            json!({"Name": 0}),
            json!({"Name": 0.0}),
        ] {
            let err = accept_submission(&form(true, None), &fields, &blank, now).unwrap_err();
            assert_eq!(err, Rejection::Missing("Name".to_string()));
        }

        let (status, Json(body)) = Rejection::Missing("Name".to_string()).into_api_error();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "Field 'Name' is compulsory.");
    }

    #[test]
    fn test_false_counts_as_an_answer() {
        let now = Utc::now().naive_utc();
        let fields = [field("Agree", true, 0)];
        let kept = accept_submission(&form(true, None), &fields, &json!({"Agree": false}), now)
            .unwrap();
        assert_eq!(kept.get("Agree"), Some(&json!(false)));
    }

    #[test]
    fn test_non_zero_numbers_count_as_answers() {
        let now = Utc::now().naive_utc();
        let fields = [field("Year", true, 0)];
        let kept =
            accept_submission(&form(true, None), &fields, &json!({"Year": 2}), now).unwrap();
        assert_eq!(kept.get("Year"), Some(&json!(2)));
    }

    #[test]
    fn test_unknown_keys_are_dropped() {
        let now = Utc::now().naive_utc();
        let fields = [field("Name", true, 0), field("Year", false, 1)];
        let kept = accept_submission(
            &form(true, None),
            &fields,
            &json!({"Name": "Sam", "is_admin": true}),
            now,
        )
        .unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.get("Name"), Some(&json!("Sam")));
    }

    #[test]
    fn test_first_missing_field_in_order_is_reported() {
        let now = Utc::now().naive_utc();
        let fields = [field("Name", true, 0), field("Email", true, 1)];
        let err = accept_submission(&form(true, None), &fields, &json!({}), now).unwrap_err();
        assert_eq!(err, Rejection::Missing("Name".to_string()));
    }

    #[test]
    fn test_csv_cells() {
        assert_eq!(csv_cell(None), "");
        assert_eq!(csv_cell(Some(&json!("plain"))), "plain");
        assert_eq!(csv_cell(Some(&json!(["A", "B", 3]))), "A, B, 3");
        assert_eq!(csv_cell(Some(&json!(42))), "42");
        assert_eq!(csv_cell(Some(&json!(null))), "");
    }

    #[test]
    fn test_export_filename_replaces_spaces() {
        assert_eq!(
            export_filename("Recruitment Drive 2026"),
            "Recruitment_Drive_2026_responses.csv"
        );
    }
}
