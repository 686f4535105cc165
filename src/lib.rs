//! Robotech - club portal backend: team, projects, events, forms and audit
//! logging behind a role-gated REST API, plus a typed client for it.

pub mod audit;
pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod helpers;
pub mod middleware;
pub mod models;
pub mod openapi;
pub mod pagination;
pub mod schema;
pub mod telemetry;
pub mod types;
pub mod uploads;

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post},
    Json, Router,
};

use diesel::r2d2::{self, ConnectionManager};
use diesel::PgConnection;
use std::sync::Arc;
use std::time::Duration;

use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use auth::jwt::JwtConfig;
use auth::lockout::LockoutManager;
use auth::password::PasswordPolicy;
use cache::{create_redis_pool, CacheServices};
use config::PortalConfig;
use handlers::{
    announcements, audit_logs, contact, events, forms, gallery, health, join_requests, projects,
    roles, sponsorships, tasks, taxonomy, threads, users,
};
use middleware::{
    auth::{auth_middleware, optional_auth_middleware},
    metrics::metrics_middleware,
    rate_limit::{auth_rate_limit_middleware, rate_limit_middleware, RateLimitState},
    request_id::request_id_middleware,
};
use telemetry::MetricsState;
use uploads::MediaStore;

pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub rate_limit: RateLimitState,
    pub jwt_config: Arc<JwtConfig>,
    pub cache: CacheServices,
    pub lockout: Arc<LockoutManager>,
    pub password_policy: PasswordPolicy,
    pub password_hash_cost: u32,
    pub rotate_refresh_tokens: bool,
    pub metrics: MetricsState,
    pub media: MediaStore,
    pub portal: PortalConfig,
}

impl AppState {
    pub fn new(db_pool: DbPool, redis_pool: Option<deadpool_redis::Pool>, config: &Config) -> Self {
        let rate_limit = RateLimitState::from_config(&config.security);

        let jwt_config = JwtConfig::from_env_with_expiry(
            config.jwt.access_token_expiry_secs,
            config.jwt.refresh_token_expiry_secs,
            config.jwt.issuer.clone(),
            config.jwt.audience.clone(),
        );

        let redis_pool = redis_pool.or_else(|| create_redis_pool(&config.redis));
        let cache = CacheServices::new(
            redis_pool.clone(),
            config.portal.typing_indicator_ttl_secs,
        );
        let lockout = LockoutManager::new(
            redis_pool,
            config.security.max_failed_login_attempts,
            config.security.lockout_duration_mins,
        );

        Self {
            db_pool,
            rate_limit,
            jwt_config: Arc::new(jwt_config),
            cache,
            lockout: Arc::new(lockout),
            password_policy: PasswordPolicy::from_config(&config.security),
            password_hash_cost: config.security.password_hash_cost,
            rotate_refresh_tokens: config.security.rotate_refresh_tokens,
            metrics: MetricsState::new(config.telemetry.metrics_enabled),
            media: MediaStore::new(config.media.root.clone()),
            portal: config.portal.clone(),
        }
    }
}

/// Routes readable without a token. A valid token, when present, widens what
/// the handlers return.
fn public_routes(state: &AppState) -> Router {
    Router::new()
        .route("/api/events", get(events::list_events))
        .route("/api/events/{id}", get(events::get_event))
        .route("/api/announcements/public", get(announcements::public_announcements))
        .route("/api/gallery", get(gallery::list_gallery))
        .route("/api/sponsorships", get(sponsorships::list_sponsorships))
        .route("/api/sponsorships", post(sponsorships::create_sponsorship))
        .route("/api/contact-messages", post(contact::create_contact_message))
        .route("/api/forms", get(forms::list_forms))
        .route("/api/forms/{id}", get(forms::get_form))
        .route("/api/form-responses", post(forms::submit_response))
        .route("/api/projects/public", get(projects::public_projects))
        .route("/api/team/public", get(users::public_team))
        .route("/api/sigs", get(taxonomy::list_sigs))
        .route("/api/positions", get(taxonomy::list_positions))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            optional_auth_middleware,
        ))
        .with_state(state.clone())
}

fn token_routes(state: &AppState) -> Router {
    Router::new()
        .route("/api/token", post(handlers::auth::login))
        .route("/api/token/refresh", post(handlers::auth::refresh_token))
        .layer(axum_middleware::from_fn(auth_rate_limit_middleware))
        .with_state(state.clone())
}

fn protected_routes(state: &AppState) -> Router {
    Router::new()
        // Session
        .route("/api/logout", post(handlers::auth::logout))
        .route("/api/logout-all", post(handlers::auth::logout_all))
        .route("/api/me", get(handlers::auth::get_me).patch(handlers::auth::update_me))
        .route("/api/me/image", post(handlers::auth::upload_my_image))
        // Team management
        .route("/api/management", get(users::list_users).post(users::create_user))
        .route("/api/management/export_csv", get(users::export_users_csv))
        .route("/api/management/reorder-team", post(users::reorder_team))
        .route(
            "/api/management/{id}",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        .route("/api/management/{id}/image", post(users::upload_user_image))
        .route("/api/roles", get(roles::list_roles).post(roles::create_role))
        .route(
            "/api/roles/{id}",
            get(roles::get_role)
                .patch(roles::update_role)
                .delete(roles::delete_role),
        )
        // Taxonomy
        .route("/api/sigs", post(taxonomy::create_sig))
        .route("/api/sigs/reorder-sigs", post(taxonomy::reorder_sigs))
        .route(
            "/api/sigs/{id}",
            patch(taxonomy::update_sig).delete(taxonomy::delete_sig),
        )
        .route("/api/positions", post(taxonomy::create_position))
        .route(
            "/api/positions/{id}",
            patch(taxonomy::update_position).delete(taxonomy::delete_position),
        )
        .route(
            "/api/profile-fields",
            get(taxonomy::list_profile_fields).post(taxonomy::create_profile_field),
        )
        .route(
            "/api/profile-fields/reorder-fields",
            post(taxonomy::reorder_profile_fields),
        )
        .route(
            "/api/profile-fields/{id}",
            patch(taxonomy::update_profile_field).delete(taxonomy::delete_profile_field),
        )
        // Audit
        .route("/api/admin/audit-logs", get(audit_logs::list_audit_logs))
        .route(
            "/api/admin/audit-logs/export_csv",
            get(audit_logs::export_audit_logs_csv),
        )
        .route(
            "/api/admin/audit-logs/delete_old_logs",
            post(audit_logs::delete_old_logs),
        )
        // Projects
        .route("/api/projects", get(projects::list_projects).post(projects::create_project))
        .route(
            "/api/projects/{id}",
            get(projects::get_project)
                .patch(projects::update_project)
                .delete(projects::delete_project),
        )
        .route("/api/projects/{id}/cover", post(projects::upload_cover))
        .route("/api/projects/{id}/request_status", post(projects::request_status))
        .route("/api/projects/{id}/submit_status", post(projects::submit_status))
        .route("/api/projects/{id}/request_join", post(projects::request_join))
        .route("/api/projects/{id}/sync_state", get(projects::sync_state))
        .route("/api/join-requests", get(join_requests::list_join_requests))
        .route(
            "/api/join-requests/{id}/approve",
            post(join_requests::approve_join_request),
        )
        .route(
            "/api/join-requests/{id}/reject",
            post(join_requests::reject_join_request),
        )
        .route("/api/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route(
            "/api/tasks/{id}",
            get(tasks::get_task)
                .patch(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route("/api/tasks/{id}/comment", post(tasks::add_comment))
        // Discussions
        .route("/api/threads", get(threads::list_threads).post(threads::create_thread))
        .route("/api/threads/{id}", delete(threads::delete_thread))
        .route(
            "/api/threads/{id}/toggle_ephemeral",
            post(threads::toggle_ephemeral),
        )
        .route("/api/threads/{id}/purge_messages", post(threads::purge_messages))
        .route("/api/threads/{id}/signal_typing", post(threads::signal_typing))
        .route("/api/threads/{id}/typing_status", get(threads::typing_status))
        .route("/api/messages", get(threads::list_messages).post(threads::create_message))
        .route("/api/messages/{id}", delete(threads::delete_message))
        // Content
        .route("/api/events", post(events::create_event))
        .route(
            "/api/events/{id}",
            patch(events::update_event).delete(events::delete_event),
        )
        .route("/api/events/{id}/banner", post(events::upload_banner))
        .route(
            "/api/announcements",
            get(announcements::list_announcements).post(announcements::create_announcement),
        )
        .route(
            "/api/announcements/{id}",
            get(announcements::get_announcement)
                .patch(announcements::update_announcement)
                .delete(announcements::delete_announcement),
        )
        .route(
            "/api/announcements/{id}/publish",
            post(announcements::publish_announcement),
        )
        .route("/api/gallery/upload", post(gallery::upload_images))
        .route("/api/gallery/{id}", delete(gallery::delete_image))
        .route(
            "/api/sponsorships/{id}",
            patch(sponsorships::update_sponsorship).delete(sponsorships::delete_sponsorship),
        )
        .route("/api/contact-messages", get(contact::list_contact_messages))
        .route(
            "/api/contact-messages/{id}",
            patch(contact::mark_contact_message).delete(contact::delete_contact_message),
        )
        // Forms
        .route("/api/forms", post(forms::create_form))
        .route(
            "/api/forms/{id}",
            patch(forms::update_form).delete(forms::delete_form),
        )
        .route("/api/forms/{id}/responses", get(forms::list_responses))
        .route(
            "/api/forms/{id}/export_responses_csv",
            get(forms::export_responses_csv),
        )
        .route("/api/form-sections", post(forms::create_section))
        .route(
            "/api/form-sections/{id}",
            patch(forms::update_section).delete(forms::delete_section),
        )
        .route("/api/form-fields", post(forms::create_field))
        .route(
            "/api/form-fields/{id}",
            patch(forms::update_field).delete(forms::delete_field),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state.clone())
}

pub fn create_router(state: AppState, config: &config::Config) -> Router {
    let cors = build_cors_layer(config);
    let body_limit = RequestBodyLimitLayer::new(config.server.max_body_size);

    #[allow(deprecated)]
    let timeout = TimeoutLayer::new(Duration::from_secs(config.server.request_timeout_secs));

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let rate_limit_state = state.rate_limit.clone();
    let metrics_state = state.metrics.clone();

    let health_routes = Router::new()
        .route("/health", get(health::health_check_simple))
        .route("/health/status", get(health::health_check))
        .route("/health/ready", get(health::ready_check))
        .route("/health/live", get(health::live_check))
        .route(
            "/metrics",
            get(telemetry::metrics::metrics_handler).with_state(metrics_state),
        )
        .with_state(state.clone());

    let media = Router::new().nest_service(
        &config.media.url_prefix,
        ServeDir::new(config.media.root.clone()),
    );

    Router::new()
        .merge(openapi::swagger_router())
        .merge(health_routes)
        .merge(media)
        .merge(token_routes(&state))
        .merge(public_routes(&state))
        .merge(protected_routes(&state))
        .fallback(fallback_handler)
        .layer(DefaultBodyLimit::max(config.server.max_body_size))
        .layer(axum_middleware::from_fn(metrics_middleware))
        .layer(axum_middleware::from_fn(rate_limit_middleware))
        .layer(axum::Extension(rate_limit_state))
        .layer(axum_middleware::from_fn(request_id_middleware))
        .layer(trace_layer)
        .layer(timeout)
        .layer(body_limit)
        .layer(cors)
}

async fn fallback_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": "Not found", "code": "NOT_FOUND"})),
    )
}

fn build_cors_layer(config: &config::Config) -> CorsLayer {
    use axum::http::header::HeaderName;
    use axum::http::Method;

    let is_wildcard_origin = config.cors.allowed_origins.contains(&"*".to_string())
        || config.cors.allowed_origins.is_empty();

    let methods: Vec<Method> = config
        .cors
        .allowed_methods
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect();

    let headers: Vec<HeaderName> = config
        .cors
        .allowed_headers
        .iter()
        .filter_map(|h| h.parse().ok())
        .collect();

    let max_age = Duration::from_secs(config.cors.max_age_secs);

    if config.cors.allow_credentials && is_wildcard_origin {
        CorsLayer::new()
            .allow_origin(tower_http::cors::AllowOrigin::mirror_request())
            .allow_methods(methods)
            .allow_headers(headers)
            .allow_credentials(true)
            .max_age(max_age)
    } else if is_wildcard_origin {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(headers)
            .max_age(max_age)
    } else {
        let origins: Vec<_> = config
            .cors
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(headers)
            .allow_credentials(config.cors.allow_credentials)
            .max_age(max_age)
    }
}

pub fn create_db_pool(config: &config::Config) -> DbPool {
    let manager = ConnectionManager::<PgConnection>::new(&config.database.url);
    r2d2::Pool::builder()
        .max_size(config.database.max_connections)
        .min_idle(Some(config.database.min_connections))
        .connection_timeout(Duration::from_secs(config.database.connection_timeout_secs))
        .idle_timeout(Some(Duration::from_secs(config.database.idle_timeout_secs)))
        .build(manager)
        .expect("Failed to create database pool")
}

pub fn create_db_pool_with_url(database_url: &str) -> DbPool {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    r2d2::Pool::builder()
        .max_size(10)
        .min_idle(Some(2))
        .connection_timeout(Duration::from_secs(30))
        .idle_timeout(Some(Duration::from_secs(600)))
        .build(manager)
        .expect("Failed to create database pool")
}

pub fn init_tracing(config: &config::Config) {
    telemetry::init_telemetry(config);
}

pub use telemetry::tracing::shutdown_telemetry;

pub use config::Config;
