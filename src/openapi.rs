//! OpenAPI documentation configuration.
//!
//! The document is generated with `utoipa` from the handler annotations and
//! served through Swagger UI at `/swagger-ui`.

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::{
    announcements, audit_logs, auth, contact, events, forms, gallery, health, join_requests,
    projects, roles, sponsorships, tasks, taxonomy, threads, users,
};
use crate::pagination::PaginationMeta;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Robotech API",
        version = "1.0.0",
        description = "Club portal backend.\n\n\
        ## Features\n\
        - JWT access and refresh tokens with revocation\n\
        - Roles carrying eleven management permission flags\n\
        - Team roster, SIGs, positions and custom profile fields\n\
        - Projects with join requests, tasks and discussion threads\n\
        - Events, announcements, gallery, sponsorships and contact inbox\n\
        - Form builder with public submissions and CSV export\n\
        - Audit log of security-relevant actions\n\n\
        ## Authentication\n\
        1. `POST /api/token` with username and password\n\
        2. Send `Authorization: Bearer <access_token>` on later requests\n\
        3. Exchange the refresh token at `POST /api/token/refresh` when the access token expires\n\n\
        Public listings accept an optional token; a valid one widens what is returned.",
        contact(name = "Robotech Web Team"),
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers((url = "/", description = "Current server")),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Authentication", description = "Tokens and the caller's own profile"),
        (name = "Users", description = "Account management"),
        (name = "Team", description = "Public team roster"),
        (name = "Roles", description = "Roles and their permission flags"),
        (name = "Taxonomy", description = "SIGs, team positions and profile field definitions"),
        (name = "Audit", description = "Audit log browsing, export and retention"),
        (name = "Projects", description = "Projects, status updates, membership and join requests"),
        (name = "Tasks", description = "Project tasks and comments"),
        (name = "Threads", description = "Project threads, messages and typing indicators"),
        (name = "Events", description = "Club events and registration windows"),
        (name = "Announcements", description = "Drafted and published announcements"),
        (name = "Gallery", description = "Event photo gallery"),
        (name = "Sponsorships", description = "Sponsor inquiries and featured sponsors"),
        (name = "Contact", description = "Contact form inbox"),
        (name = "Forms", description = "Form builder, submissions and export")
    ),
    paths(
        health::health_check_simple,
        health::health_check,
        health::ready_check,
        health::live_check,

        auth::login,
        auth::refresh_token,
        auth::logout,
        auth::logout_all,
        auth::get_me,
        auth::update_me,
        auth::upload_my_image,

        users::list_users,
        users::create_user,
        users::get_user,
        users::update_user,
        users::delete_user,
        users::upload_user_image,
        users::export_users_csv,
        users::reorder_team,
        users::public_team,

        roles::list_roles,
        roles::create_role,
        roles::get_role,
        roles::update_role,
        roles::delete_role,

        taxonomy::list_sigs,
        taxonomy::create_sig,
        taxonomy::update_sig,
        taxonomy::delete_sig,
        taxonomy::reorder_sigs,
        taxonomy::list_positions,
        taxonomy::create_position,
        taxonomy::update_position,
        taxonomy::delete_position,
        taxonomy::list_profile_fields,
        taxonomy::create_profile_field,
        taxonomy::update_profile_field,
        taxonomy::delete_profile_field,
        taxonomy::reorder_profile_fields,

        audit_logs::list_audit_logs,
        audit_logs::export_audit_logs_csv,
        audit_logs::delete_old_logs,

        projects::list_projects,
        projects::public_projects,
        projects::create_project,
        projects::get_project,
        projects::update_project,
        projects::delete_project,
        projects::upload_cover,
        projects::request_status,
        projects::submit_status,
        projects::request_join,
        projects::sync_state,

        join_requests::list_join_requests,
        join_requests::approve_join_request,
        join_requests::reject_join_request,

        tasks::list_tasks,
        tasks::create_task,
        tasks::get_task,
        tasks::update_task,
        tasks::delete_task,
        tasks::add_comment,

        threads::list_threads,
        threads::create_thread,
        threads::delete_thread,
        threads::toggle_ephemeral,
        threads::purge_messages,
        threads::signal_typing,
        threads::typing_status,
        threads::list_messages,
        threads::create_message,
        threads::delete_message,

        events::list_events,
        events::get_event,
        events::create_event,
        events::update_event,
        events::delete_event,
        events::upload_banner,

        announcements::public_announcements,
        announcements::list_announcements,
        announcements::get_announcement,
        announcements::create_announcement,
        announcements::update_announcement,
        announcements::delete_announcement,
        announcements::publish_announcement,

        gallery::list_gallery,
        gallery::upload_images,
        gallery::delete_image,

        sponsorships::list_sponsorships,
        sponsorships::create_sponsorship,
        sponsorships::update_sponsorship,
        sponsorships::delete_sponsorship,

        contact::create_contact_message,
        contact::list_contact_messages,
        contact::mark_contact_message,
        contact::delete_contact_message,

        forms::list_forms,
        forms::get_form,
        forms::create_form,
        forms::update_form,
        forms::delete_form,
        forms::create_section,
        forms::update_section,
        forms::delete_section,
        forms::create_field,
        forms::update_field,
        forms::delete_field,
        forms::submit_response,
        forms::list_responses,
        forms::export_responses_csv,
    ),
    components(
        schemas(
            auth::ErrorResponse,
            auth::LoginRequest,
            auth::RefreshRequest,
            auth::AuthResponse,
            auth::RefreshResponse,
            auth::UpdateMeRequest,

            crate::handlers::OrderItem,
            crate::handlers::ReorderRequest,
            crate::handlers::StatusResponse,
            PaginationMeta,

            health::HealthResponse,
            health::ReadinessResponse,
            health::ReadinessChecks,
            health::ComponentStatus,

            crate::models::User,
            crate::models::MemberProfile,
            users::RoleSummary,
            users::UserResponse,
            users::TeamMemberResponse,
            users::ProfileInput,
            users::CreateUserRequest,
            users::UpdateUserRequest,
            crate::types::UserCategory,

            crate::models::Role,
            roles::RoleFlags,
            roles::CreateRoleRequest,
            roles::UpdateRoleRequest,

            crate::models::Sig,
            crate::models::TeamPosition,
            crate::models::ProfileFieldDefinition,
            taxonomy::SigRequest,
            taxonomy::PositionRequest,
            taxonomy::ProfileFieldRequest,
            crate::types::ProfileFieldType,

            crate::models::AuditLog,
            audit_logs::AuditLogEntry,
            audit_logs::DeleteOldLogsRequest,
            audit_logs::DeleteOldLogsResponse,

            crate::models::Project,
            crate::models::ProjectUpdate,
            projects::ProjectResponse,
            projects::MemberSummary,
            projects::ProjectDetail,
            projects::CreateProjectRequest,
            projects::UpdateProjectRequest,
            projects::StatusUpdateRequest,
            projects::JoinProjectRequest,
            crate::types::ProjectStatus,
            crate::types::ProjectUpdateKind,
            crate::client::SyncState,

            crate::models::JoinRequest,
            join_requests::JoinRequestView,
            crate::types::JoinRequestStatus,

            crate::models::Task,
            crate::models::TaskComment,
            tasks::CreateTaskRequest,
            tasks::UpdateTaskRequest,
            tasks::CommentRequest,
            tasks::TaskDetail,
            crate::types::TaskStatus,

            crate::models::Thread,
            crate::models::ThreadMessage,
            threads::MessageView,
            threads::ThreadWithMessages,
            threads::CreateThreadRequest,
            threads::CreateMessageRequest,
            threads::EphemeralResponse,
            threads::PurgeResponse,
            threads::TypingStatusResponse,
            crate::cache::typing::Typer,

            crate::models::Event,
            events::ExternalLink,
            events::CreateEventRequest,
            events::UpdateEventRequest,
            crate::types::EventVisibility,
            crate::types::EventScope,

            crate::models::Announcement,
            announcements::AnnouncementRequest,

            crate::models::GalleryImage,

            crate::models::Sponsorship,
            sponsorships::SponsorshipInquiry,
            sponsorships::UpdateSponsorshipRequest,

            crate::models::ContactMessage,
            contact::ContactRequest,
            contact::MarkReadRequest,

            crate::models::Form,
            crate::models::FormSection,
            crate::models::FormField,
            crate::models::FormResponse,
            forms::FormDetail,
            forms::CreateFormRequest,
            forms::UpdateFormRequest,
            forms::SectionRequest,
            forms::FieldRequest,
            forms::SubmitResponseRequest,
            forms::FormResponseView,
            crate::types::FormTheme,
            crate::types::FormFieldType,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "JWT access token obtained from /api/token.\n\
                            Include in requests as: `Authorization: Bearer <token>`",
                        ))
                        .build(),
                ),
            );
        }

        openapi.security = Some(vec![]);
    }
}

pub fn swagger_router() -> Router {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generation() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "Robotech API");
        assert_eq!(spec.info.version, "1.0.0");
    }

    #[test]
    fn test_openapi_has_security_scheme() {
        let spec = ApiDoc::openapi();
        let components = spec.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }

    #[test]
    fn test_openapi_documents_portal_paths() {
        let spec = ApiDoc::openapi();
        for path in [
            "/api/token",
            "/api/management/{id}",
            "/api/projects/{id}/sync_state",
            "/api/threads/{id}/typing_status",
            "/api/forms/{id}/export_responses_csv",
            "/api/admin/audit-logs/delete_old_logs",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing {}", path);
        }
    }

    #[test]
    fn test_openapi_has_tags() {
        let spec = ApiDoc::openapi();
        let tags = spec.tags.expect("tags");
        assert!(tags.iter().any(|t| t.name == "Authentication"));
        assert!(tags.iter().any(|t| t.name == "Forms"));
        assert!(tags.iter().any(|t| t.name == "Health"));
    }
}
