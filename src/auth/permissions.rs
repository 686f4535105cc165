//! Effective permission resolution.
//!
//! A user's flags are the union of their assigned roles and the role linked to
//! the team position named on their profile. Superusers and holders of
//! `can_manage_security` pass every check, and `can_manage_content` stands in
//! for the content-related flags.

use axum::{http::StatusCode, Json};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{debug, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::jwt::Claims,
    error::{get_db_conn, ApiError, ApiResult},
    models::{Role, TeamPosition, User},
    schema::{member_profiles, roles, team_positions, user_roles, users},
    telemetry::record_permission_check,
    AppState,
};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
pub enum Permission {
    #[serde(rename = "can_manage_users")]
    ManageUsers,
    #[serde(rename = "can_manage_projects")]
    ManageProjects,
    #[serde(rename = "can_manage_events")]
    ManageEvents,
    #[serde(rename = "can_manage_team")]
    ManageTeam,
    #[serde(rename = "can_manage_gallery")]
    ManageGallery,
    #[serde(rename = "can_manage_announcements")]
    ManageAnnouncements,
    #[serde(rename = "can_manage_security")]
    ManageSecurity,
    #[serde(rename = "can_manage_sponsorship")]
    ManageSponsorship,
    #[serde(rename = "can_manage_messages")]
    ManageMessages,
    #[serde(rename = "can_manage_forms")]
    ManageForms,
    #[serde(rename = "can_manage_content")]
    ManageContent,
}

impl Permission {
    pub const ALL: [Permission; 11] = [
        Permission::ManageUsers,
        Permission::ManageProjects,
        Permission::ManageEvents,
        Permission::ManageTeam,
        Permission::ManageGallery,
        Permission::ManageAnnouncements,
        Permission::ManageSecurity,
        Permission::ManageSponsorship,
        Permission::ManageMessages,
        Permission::ManageForms,
        Permission::ManageContent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ManageUsers => "can_manage_users",
            Permission::ManageProjects => "can_manage_projects",
            Permission::ManageEvents => "can_manage_events",
            Permission::ManageTeam => "can_manage_team",
            Permission::ManageGallery => "can_manage_gallery",
            Permission::ManageAnnouncements => "can_manage_announcements",
            Permission::ManageSecurity => "can_manage_security",
            Permission::ManageSponsorship => "can_manage_sponsorship",
            Permission::ManageMessages => "can_manage_messages",
            Permission::ManageForms => "can_manage_forms",
            Permission::ManageContent => "can_manage_content",
        }
    }

    /// Flags that `can_manage_content` also grants.
    pub fn is_content(&self) -> bool {
        matches!(
            self,
            Permission::ManageEvents
                | Permission::ManageAnnouncements
                | Permission::ManageGallery
                | Permission::ManageSponsorship
                | Permission::ManageMessages
                | Permission::ManageForms
        )
    }

    pub fn granted_by(&self, role: &Role) -> bool {
        match self {
            Permission::ManageUsers => role.can_manage_users,
            Permission::ManageProjects => role.can_manage_projects,
            Permission::ManageEvents => role.can_manage_events,
            Permission::ManageTeam => role.can_manage_team,
            Permission::ManageGallery => role.can_manage_gallery,
            Permission::ManageAnnouncements => role.can_manage_announcements,
            Permission::ManageSecurity => role.can_manage_security,
            Permission::ManageSponsorship => role.can_manage_sponsorship,
            Permission::ManageMessages => role.can_manage_messages,
            Permission::ManageForms => role.can_manage_forms,
            Permission::ManageContent => role.can_manage_content,
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resolved permission state for one user; this is what the cache stores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectivePermissions {
    pub is_superuser: bool,
    pub is_active: bool,
    pub flags: BTreeSet<Permission>,
    pub role_names: Vec<String>,
}

impl EffectivePermissions {
    pub fn from_roles<'a>(
        is_superuser: bool,
        is_active: bool,
        roles: impl IntoIterator<Item = &'a Role>,
    ) -> Self {
        let mut perms = Self {
            is_superuser,
            is_active,
            ..Default::default()
        };
        for role in roles {
            perms.add_role(role);
        }
        perms
    }

    fn add_role(&mut self, role: &Role) {
        self.flags
            .extend(Permission::ALL.iter().filter(|p| p.granted_by(role)));
        if !self.role_names.contains(&role.name) {
            self.role_names.push(role.name.clone());
        }
    }

    pub fn allows(&self, permission: Permission) -> bool {
        self.is_superuser
            || self.flags.contains(&Permission::ManageSecurity)
            || self.flags.contains(&permission)
            || (permission.is_content() && self.flags.contains(&Permission::ManageContent))
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.role_names.iter().any(|r| r.eq_ignore_ascii_case(name))
    }

    /// Every flag `allows` would grant, for display in `/api/me`.
    pub fn effective_list(&self) -> Vec<Permission> {
        Permission::ALL
            .iter()
            .copied()
            .filter(|p| self.allows(*p))
            .collect()
    }
}

/// Loads roles and the position-linked role for `user` from the database.
pub fn resolve(conn: &mut PgConnection, user: &User) -> QueryResult<EffectivePermissions> {
    let mut assigned: Vec<Role> = user_roles::table
        .inner_join(roles::table)
        .filter(user_roles::user_id.eq(user.id))
        .select(Role::as_select())
        .load(conn)?;

    let position: Option<String> = member_profiles::table
        .filter(member_profiles::user_id.eq(user.id))
        .select(member_profiles::position)
        .first(conn)
        .optional()?;

    if let Some(position) = position.filter(|p| !p.trim().is_empty()) {
        let wanted = position.trim().to_lowercase();
        let linked: Vec<TeamPosition> = team_positions::table
            .filter(team_positions::role_link_id.is_not_null())
            .select(TeamPosition::as_select())
            .load(conn)?;

        let role_id = linked
            .into_iter()
            .find(|p| p.name.to_lowercase() == wanted)
            .and_then(|p| p.role_link_id);

        if let Some(role_id) = role_id {
            if let Some(role) = roles::table
                .find(role_id)
                .select(Role::as_select())
                .first(conn)
                .optional()?
            {
                assigned.push(role);
            }
        }
    }

    Ok(EffectivePermissions::from_roles(
        user.is_superuser,
        user.is_active,
        &assigned,
    ))
}

/// The authenticated caller with resolved permissions.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: Uuid,
    pub username: String,
    pub perms: EffectivePermissions,
    pub cached: bool,
}

impl Actor {
    /// Resolves the caller, consulting the Redis cache first.
    pub async fn load(state: &AppState, claims: &Claims) -> ApiResult<Self> {
        let id = claims
            .user_id()
            .ok_or_else(|| ApiError::unauthorized("Invalid user ID in token", "INVALID_TOKEN"))?;

        if let Some(perms) = state.cache.permission_cache.get(id).await {
            debug!(user_id = %id, "Permission cache hit");
            return Self::active(id, claims.username.clone(), perms, true);
        }

        let mut conn = get_db_conn(&state.db_pool)?;
        let user: User = users::table
            .find(id)
            .select(User::as_select())
            .first(&mut conn)
            .optional()
            .map_err(ApiError::from_db)?
            .ok_or_else(|| ApiError::unauthorized("User no longer exists", "USER_NOT_FOUND"))?;

        let perms = resolve(&mut conn, &user).map_err(ApiError::from_db)?;

        if let Err(e) = state.cache.permission_cache.set(id, &perms).await {
            debug!(error = %e, "Permission cache not updated");
        }

        Self::active(id, user.username, perms, false)
    }

    /// Resolves the caller on routes that also serve anonymous requests.
    /// Claims for a deleted or inactive account are treated as anonymous.
    pub async fn optional(state: &AppState, claims: Option<&Claims>) -> ApiResult<Option<Self>> {
        let Some(claims) = claims else {
            return Ok(None);
        };
        match Self::load(state, claims).await {
            Ok(actor) => Ok(Some(actor)),
            Err((status, _)) if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN => {
                debug!(subject = %claims.sub, "Serving public route anonymously");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn active(
        id: Uuid,
        username: String,
        perms: EffectivePermissions,
        cached: bool,
    ) -> ApiResult<Self> {
        if !perms.is_active {
            return Err(ApiError::forbidden("Account is inactive", "ACCOUNT_INACTIVE"));
        }
        Ok(Self {
            id,
            username,
            perms,
            cached,
        })
    }

    pub fn can(&self, permission: Permission) -> bool {
        self.perms.allows(permission)
    }

    pub fn is_superuser(&self) -> bool {
        self.perms.is_superuser
    }

    /// Fails with 403 `PERMISSION_DENIED` unless `permission` is allowed.
    pub fn require(&self, permission: Permission) -> Result<(), (StatusCode, Json<ApiError>)> {
        let started = Instant::now();
        let granted = self.can(permission);
        record_permission_check(permission.as_str(), self.cached, granted, started.elapsed());

        if granted {
            Ok(())
        } else {
            warn!(user_id = %self.id, permission = %permission, "Permission denied");
            Err(ApiError::permission_denied())
        }
    }
}

/// Loads the caller and checks one flag in a single step.
pub async fn require(
    state: &AppState,
    claims: &Claims,
    permission: Permission,
) -> ApiResult<Actor> {
    let actor = Actor::load(state, claims).await?;
    actor.require(permission)?;
    Ok(actor)
}

/// Invalidation hooks called after writes that change who holds what.
pub async fn invalidate_user(state: &AppState, user_id: Uuid) {
    if let Err(e) = state.cache.permission_cache.invalidate(user_id).await {
        debug!(error = %e, user_id = %user_id, "Permission cache invalidation skipped");
    }
}

pub async fn invalidate_everyone(state: &AppState) {
    if let Err(e) = state.cache.permission_cache.invalidate_all().await {
        debug!(error = %e, "Permission cache flush skipped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn role(name: &str, set: impl Fn(&mut Role)) -> Role {
        let now = Utc::now().naive_utc();
        let mut role = Role {
            id: Uuid::new_v4(),
            name: name.to_string(),
            can_manage_users: false,
            can_manage_projects: false,
            can_manage_events: false,
            can_manage_team: false,
            can_manage_gallery: false,
            can_manage_announcements: false,
            can_manage_security: false,
            can_manage_sponsorship: false,
            can_manage_messages: false,
            can_manage_forms: false,
            can_manage_content: false,
            created_at: now,
            updated_at: now,
        };
        set(&mut role);
        role
    }

    #[test]
    fn test_flags_are_unioned_across_roles() {
        let events = role("EVENTS", |r| r.can_manage_events = true);
        let projects = role("PROJECTS", |r| r.can_manage_projects = true);

        let perms = EffectivePermissions::from_roles(false, true, [&events, &projects]);

        assert!(perms.allows(Permission::ManageEvents));
        assert!(perms.allows(Permission::ManageProjects));
        assert!(!perms.allows(Permission::ManageUsers));
        assert_eq!(perms.role_names, vec!["EVENTS", "PROJECTS"]);
    }

    #[test]
    fn test_no_roles_allows_nothing() {
        let perms = EffectivePermissions::from_roles(false, true, []);
        for p in Permission::ALL {
            assert!(!perms.allows(p), "{} should be denied", p);
        }
        assert!(perms.effective_list().is_empty());
    }

    #[test]
    fn test_superuser_allows_everything() {
        let perms = EffectivePermissions::from_roles(true, true, []);
        assert_eq!(perms.effective_list().len(), Permission::ALL.len());
    }

    #[test]
    fn test_security_flag_allows_everything() {
        let security = role("SECURITY", |r| r.can_manage_security = true);
        let perms = EffectivePermissions::from_roles(false, true, [&security]);

        assert!(perms.allows(Permission::ManageUsers));
        assert!(perms.allows(Permission::ManageProjects));
        assert!(perms.allows(Permission::ManageForms));
    }

    #[test]
    fn test_content_flag_covers_content_permissions_only() {
        let content = role("CONTENT", |r| r.can_manage_content = true);
        let perms = EffectivePermissions::from_roles(false, true, [&content]);

        for p in [
            Permission::ManageEvents,
            Permission::ManageAnnouncements,
            Permission::ManageGallery,
            Permission::ManageSponsorship,
            Permission::ManageMessages,
            Permission::ManageForms,
        ] {
            assert!(perms.allows(p), "{} should be granted by content", p);
        }
        assert!(!perms.allows(Permission::ManageUsers));
        assert!(!perms.allows(Permission::ManageProjects));
        assert!(!perms.allows(Permission::ManageTeam));
        assert!(!perms.allows(Permission::ManageSecurity));
    }

    #[test]
    fn test_role_names_match_case_insensitively() {
        let web_lead = role("WEB_LEAD", |_| {});
        let perms = EffectivePermissions::from_roles(false, true, [&web_lead]);
        assert!(perms.has_role("web_lead"));
        assert!(!perms.has_role("EVENT_LEAD"));
    }

    #[test]
    fn test_permission_wire_names() {
        let json = serde_json::to_string(&Permission::ManageSponsorship).unwrap();
        assert_eq!(json, "\"can_manage_sponsorship\"");
        for p in Permission::ALL {
            assert_eq!(serde_json::to_value(p).unwrap(), p.as_str());
        }
    }

    #[test]
    fn test_cached_form_round_trips() {
        let forms = role("FORMS", |r| r.can_manage_forms = true);
        let perms = EffectivePermissions::from_roles(false, true, [&forms]);

        let restored: EffectivePermissions =
            serde_json::from_str(&serde_json::to_string(&perms).unwrap()).unwrap();
        assert_eq!(restored, perms);
    }

    #[test]
    fn test_inactive_actor_is_rejected() {
        let perms = EffectivePermissions::from_roles(true, false, []);
        let result = Actor::active(Uuid::new_v4(), "ghost".to_string(), perms, false);
        assert_eq!(result.unwrap_err().0, StatusCode::FORBIDDEN);
    }
}
