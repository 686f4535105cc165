//! Creates the first administrator, or resets an existing one.
//!
//! Reads `SUPERUSER_USERNAME`, `SUPERUSER_EMAIL` and `SUPERUSER_PASSWORD`
//! (plus `DATABASE_URL`) from the environment or `.env`.

use chrono::Utc;
use diesel::prelude::*;
use robotech::{
    audit::{AuditEntry, AuditEventType, AuditService},
    auth::password::PasswordService,
    create_db_pool, init_tracing, shutdown_telemetry,
    models::{NewMemberProfile, NewUser, User},
    schema::{member_profiles, users},
    types::UserCategory,
    Config,
};
use std::process::ExitCode;
use tracing::{error, info};

fn required_var(key: &str) -> Result<String, String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| format!("{} must be set", key))
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::from_env();
    init_tracing(&config);

    let code = match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "create_superuser failed");
            ExitCode::FAILURE
        }
    };

    shutdown_telemetry();
    code
}

fn run(config: &Config) -> Result<(), String> {
    let username = required_var("SUPERUSER_USERNAME")?;
    let email = required_var("SUPERUSER_EMAIL")?;
    let password = required_var("SUPERUSER_PASSWORD")?;

    let password_hash =
        PasswordService::hash_password_with_cost(&password, config.security.password_hash_cost)
            .map_err(|e| format!("Failed to hash password: {}", e))?;

    let pool = create_db_pool(config);
    let mut conn = pool
        .get()
        .map_err(|e| format!("Failed to get database connection: {}", e))?;

    let (user, created) = conn
        .transaction::<_, diesel::result::Error, _>(|conn| {
            let existing: Option<User> = users::table
                .filter(users::username.eq(&username))
                .select(User::as_select())
                .for_update()
                .first(conn)
                .optional()?;

            let (user, created) = match existing {
                Some(existing) => {
                    let user = diesel::update(users::table.find(existing.id))
                        .set((
                            users::email.eq(&email),
                            users::password_hash.eq(&password_hash),
                            users::role.eq(UserCategory::Admin.as_str()),
                            users::is_superuser.eq(true),
                            users::is_active.eq(true),
                            users::updated_at.eq(Utc::now().naive_utc()),
                        ))
                        .returning(User::as_returning())
                        .get_result(conn)?;
                    (user, false)
                }
                None => {
                    let user = diesel::insert_into(users::table)
                        .values(&NewUser {
                            username: username.clone(),
                            email: email.clone(),
                            password_hash: password_hash.clone(),
                            role: UserCategory::Admin.as_str().to_string(),
                            is_superuser: true,
                        })
                        .returning(User::as_returning())
                        .get_result(conn)?;
                    (user, true)
                }
            };

            diesel::insert_into(member_profiles::table)
                .values(&NewMemberProfile { user_id: user.id })
                .on_conflict(member_profiles::user_id)
                .do_nothing()
                .execute(conn)?;

            Ok((user, created))
        })
        .map_err(|e| format!("Database error: {}", e))?;

    let event = if created {
        AuditEventType::UserCreated
    } else {
        AuditEventType::UserModified
    };
    AuditService::record(
        &mut conn,
        AuditEntry::new(event, user.username.clone())
            .details("Superuser provisioned from the command line"),
    );

    if created {
        info!(user_id = %user.id, username = %user.username, "Superuser created");
    } else {
        info!(user_id = %user.id, username = %user.username, "Existing account promoted to superuser");
    }
    Ok(())
}
