use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

// ============================================================================
// Accounts
// ============================================================================

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::users)]
pub struct User {
    pub id: Uuid,
    #[schema(example = "jdoe")]
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[schema(example = "MEMBER")]
    pub role: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub last_login: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub is_superuser: bool,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = crate::schema::users)]
pub struct UserChangeset {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::member_profiles)]
pub struct MemberProfile {
    #[serde(skip_serializing)]
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub user_id: Uuid,
    pub full_name: String,
    pub roll_number: String,
    pub department: String,
    pub year_of_joining: Option<i32>,
    pub sig: String,
    pub position: String,
    pub team_name: String,
    pub is_public: bool,
    pub is_alumni: bool,
    #[serde(rename = "order")]
    pub display_order: i32,
    pub image: Option<String>,
    pub description: String,
    pub linkedin_url: String,
    pub github_url: String,
    pub instagram_url: String,
    pub email: String,
    pub year: String,
    pub branch: String,
    #[schema(value_type = Object)]
    pub custom_fields: serde_json::Value,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::member_profiles)]
pub struct NewMemberProfile {
    pub user_id: Uuid,
}

#[derive(Debug, Default, Clone, AsChangeset)]
#[diesel(table_name = crate::schema::member_profiles)]
pub struct MemberProfileChangeset {
    pub full_name: Option<String>,
    pub roll_number: Option<String>,
    pub department: Option<String>,
    pub year_of_joining: Option<Option<i32>>,
    pub sig: Option<String>,
    pub position: Option<String>,
    pub team_name: Option<String>,
    pub is_public: Option<bool>,
    pub is_alumni: Option<bool>,
    pub display_order: Option<i32>,
    pub image: Option<Option<String>>,
    pub description: Option<String>,
    pub linkedin_url: Option<String>,
    pub github_url: Option<String>,
    pub instagram_url: Option<String>,
    pub email: Option<String>,
    pub year: Option<String>,
    pub branch: Option<String>,
    pub custom_fields: Option<serde_json::Value>,
    pub updated_at: Option<NaiveDateTime>,
}

// ============================================================================
// Roles and taxonomy
// ============================================================================

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::roles)]
pub struct Role {
    pub id: Uuid,
    #[schema(example = "WEB_LEAD")]
    pub name: String,
    pub can_manage_users: bool,
    pub can_manage_projects: bool,
    pub can_manage_events: bool,
    pub can_manage_team: bool,
    pub can_manage_gallery: bool,
    pub can_manage_announcements: bool,
    pub can_manage_security: bool,
    pub can_manage_sponsorship: bool,
    pub can_manage_messages: bool,
    pub can_manage_forms: bool,
    pub can_manage_content: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Default, Insertable)]
#[diesel(table_name = crate::schema::roles)]
pub struct NewRole {
    pub name: String,
    pub can_manage_users: bool,
    pub can_manage_projects: bool,
    pub can_manage_events: bool,
    pub can_manage_team: bool,
    pub can_manage_gallery: bool,
    pub can_manage_announcements: bool,
    pub can_manage_security: bool,
    pub can_manage_sponsorship: bool,
    pub can_manage_messages: bool,
    pub can_manage_forms: bool,
    pub can_manage_content: bool,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = crate::schema::roles)]
pub struct RoleChangeset {
    pub name: Option<String>,
    pub can_manage_users: Option<bool>,
    pub can_manage_projects: Option<bool>,
    pub can_manage_events: Option<bool>,
    pub can_manage_team: Option<bool>,
    pub can_manage_gallery: Option<bool>,
    pub can_manage_announcements: Option<bool>,
    pub can_manage_security: Option<bool>,
    pub can_manage_sponsorship: Option<bool>,
    pub can_manage_messages: Option<bool>,
    pub can_manage_forms: Option<bool>,
    pub can_manage_content: Option<bool>,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::user_roles)]
pub struct NewUserRole {
    pub user_id: Uuid,
    pub role_id: Uuid,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::sigs)]
pub struct Sig {
    pub id: Uuid,
    #[schema(example = "Robotics")]
    pub name: String,
    pub description: String,
    #[serde(rename = "order")]
    pub display_order: i32,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::sigs)]
pub struct NewSig {
    pub name: String,
    pub description: String,
    pub display_order: i32,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = crate::schema::sigs)]
pub struct SigChangeset {
    pub name: Option<String>,
    pub description: Option<String>,
    pub display_order: Option<i32>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::team_positions)]
pub struct TeamPosition {
    pub id: Uuid,
    #[schema(example = "President")]
    pub name: String,
    pub rank: i32,
    pub role_link_id: Option<Uuid>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::team_positions)]
pub struct NewTeamPosition {
    pub name: String,
    pub rank: i32,
    pub role_link_id: Option<Uuid>,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = crate::schema::team_positions)]
pub struct TeamPositionChangeset {
    pub name: Option<String>,
    pub rank: Option<i32>,
    pub role_link_id: Option<Option<Uuid>>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::profile_field_definitions)]
pub struct ProfileFieldDefinition {
    pub id: Uuid,
    pub label: String,
    #[schema(example = "tshirt_size")]
    pub key: String,
    pub field_type: String,
    pub is_required: bool,
    #[serde(rename = "order")]
    pub display_order: i32,
    #[serde(rename = "limit_to_sig")]
    pub limit_to_sig_id: Option<Uuid>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::profile_field_definitions)]
pub struct NewProfileFieldDefinition {
    pub label: String,
    pub key: String,
    pub field_type: String,
    pub is_required: bool,
    pub display_order: i32,
    pub limit_to_sig_id: Option<Uuid>,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = crate::schema::profile_field_definitions)]
pub struct ProfileFieldChangeset {
    pub label: Option<String>,
    pub key: Option<String>,
    pub field_type: Option<String>,
    pub is_required: Option<bool>,
    pub display_order: Option<i32>,
    pub limit_to_sig_id: Option<Option<Uuid>>,
}

// ============================================================================
// Audit
// ============================================================================

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::audit_logs)]
pub struct AuditLog {
    pub id: Uuid,
    #[schema(example = "USER_LOGIN")]
    pub event_type: String,
    pub actor_id: Option<Uuid>,
    pub target: String,
    pub ip_address: Option<String>,
    pub details: String,
    pub success: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::audit_logs)]
pub struct NewAuditLog {
    pub event_type: String,
    pub actor_id: Option<Uuid>,
    pub target: String,
    pub ip_address: Option<String>,
    pub details: String,
    pub success: bool,
}

// ============================================================================
// Projects
// ============================================================================

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::projects)]
pub struct Project {
    pub id: Uuid,
    #[schema(example = "Line follower")]
    pub title: String,
    pub description: String,
    #[schema(example = "PROPOSED")]
    pub status: String,
    pub lead_id: Option<Uuid>,
    pub deadline: Option<NaiveDate>,
    pub is_public: bool,
    pub github_url: Option<String>,
    pub cover_image: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::projects)]
pub struct NewProject {
    pub title: String,
    pub description: String,
    pub status: String,
    pub lead_id: Option<Uuid>,
    pub deadline: Option<NaiveDate>,
    pub is_public: bool,
    pub github_url: Option<String>,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = crate::schema::projects)]
pub struct ProjectChangeset {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub lead_id: Option<Option<Uuid>>,
    pub deadline: Option<Option<NaiveDate>>,
    pub is_public: Option<bool>,
    pub github_url: Option<Option<String>>,
    pub cover_image: Option<Option<String>>,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::project_members)]
pub struct NewProjectMember {
    pub project_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::join_requests)]
pub struct JoinRequest {
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub message: String,
    #[schema(example = "PENDING")]
    pub status: String,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::join_requests)]
pub struct NewJoinRequest {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub message: String,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::project_updates)]
pub struct ProjectUpdate {
    pub id: Uuid,
    pub project_id: Uuid,
    pub author_id: Option<Uuid>,
    #[schema(example = "SUBMISSION")]
    pub kind: String,
    pub body: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::project_updates)]
pub struct NewProjectUpdate {
    pub project_id: Uuid,
    pub author_id: Option<Uuid>,
    pub kind: String,
    pub body: String,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::tasks)]
pub struct Task {
    pub id: Uuid,
    #[serde(rename = "project")]
    pub project_id: Uuid,
    pub title: String,
    pub description: String,
    #[schema(example = "TODO")]
    pub status: String,
    pub assignee_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub requirements: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::tasks)]
pub struct NewTask {
    pub project_id: Uuid,
    pub title: String,
    pub description: String,
    pub status: String,
    pub assignee_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub requirements: String,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = crate::schema::tasks)]
pub struct TaskChangeset {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub assignee_id: Option<Option<Uuid>>,
    pub due_date: Option<Option<NaiveDate>>,
    pub requirements: Option<String>,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::task_comments)]
pub struct TaskComment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub author_id: Option<Uuid>,
    pub content: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::task_comments)]
pub struct NewTaskComment {
    pub task_id: Uuid,
    pub author_id: Option<Uuid>,
    pub content: String,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::threads)]
pub struct Thread {
    pub id: Uuid,
    #[serde(rename = "project")]
    pub project_id: Uuid,
    pub title: String,
    pub is_ephemeral: bool,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::threads)]
pub struct NewThread {
    pub project_id: Uuid,
    pub title: String,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::thread_messages)]
pub struct ThreadMessage {
    pub id: i64,
    #[serde(rename = "thread")]
    pub thread_id: Uuid,
    pub author_id: Option<Uuid>,
    pub content: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::thread_messages)]
pub struct NewThreadMessage {
    pub thread_id: Uuid,
    pub author_id: Option<Uuid>,
    pub content: String,
}

// ============================================================================
// Public content
// ============================================================================

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::events)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub short_description: String,
    pub full_description: String,
    pub venue: String,
    #[schema(example = "PUBLISHED")]
    pub visibility: String,
    pub display_order: i32,
    pub registration_enabled: bool,
    pub registration_start: Option<NaiveDateTime>,
    pub registration_end: Option<NaiveDateTime>,
    pub external_registration_link: Option<String>,
    #[schema(value_type = Vec<Object>)]
    pub external_links: serde_json::Value,
    pub event_date: Option<NaiveDateTime>,
    pub due_date: Option<NaiveDateTime>,
    #[schema(example = "GLOBAL")]
    pub scope: String,
    pub sig: Option<String>,
    #[serde(rename = "owner")]
    pub owner_id: Option<Uuid>,
    pub is_full_event: bool,
    pub banner: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::events)]
pub struct NewEvent {
    pub title: String,
    pub short_description: String,
    pub full_description: String,
    pub venue: String,
    pub visibility: String,
    pub display_order: i32,
    pub registration_enabled: bool,
    pub registration_start: Option<NaiveDateTime>,
    pub registration_end: Option<NaiveDateTime>,
    pub external_registration_link: Option<String>,
    pub external_links: serde_json::Value,
    pub event_date: Option<NaiveDateTime>,
    pub due_date: Option<NaiveDateTime>,
    pub scope: String,
    pub sig: Option<String>,
    pub owner_id: Option<Uuid>,
    pub is_full_event: bool,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = crate::schema::events)]
pub struct EventChangeset {
    pub title: Option<String>,
    pub short_description: Option<String>,
    pub full_description: Option<String>,
    pub venue: Option<String>,
    pub visibility: Option<String>,
    pub display_order: Option<i32>,
    pub registration_enabled: Option<bool>,
    pub registration_start: Option<Option<NaiveDateTime>>,
    pub registration_end: Option<Option<NaiveDateTime>>,
    pub external_registration_link: Option<Option<String>>,
    pub external_links: Option<serde_json::Value>,
    pub event_date: Option<Option<NaiveDateTime>>,
    pub due_date: Option<Option<NaiveDateTime>>,
    pub scope: Option<String>,
    pub sig: Option<Option<String>>,
    pub is_full_event: Option<bool>,
    pub banner: Option<Option<String>>,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::announcements)]
pub struct Announcement {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author_id: Option<Uuid>,
    pub published_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::announcements)]
pub struct NewAnnouncement {
    pub title: String,
    pub content: String,
    pub author_id: Option<Uuid>,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = crate::schema::announcements)]
pub struct AnnouncementChangeset {
    pub title: Option<String>,
    pub content: Option<String>,
    pub published_at: Option<Option<NaiveDateTime>>,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::gallery_images)]
pub struct GalleryImage {
    pub id: Uuid,
    pub title: String,
    pub image: String,
    #[serde(rename = "event")]
    pub event_id: Option<Uuid>,
    pub uploaded_by: Option<Uuid>,
    pub uploaded_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::gallery_images)]
pub struct NewGalleryImage {
    pub title: String,
    pub image: String,
    pub event_id: Option<Uuid>,
    pub uploaded_by: Option<Uuid>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::sponsorships)]
pub struct Sponsorship {
    pub id: Uuid,
    pub company_name: String,
    pub contact_name: String,
    pub email: String,
    pub phone: String,
    pub tier: String,
    pub website: Option<String>,
    pub message: String,
    pub is_featured: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::sponsorships)]
pub struct NewSponsorship {
    pub company_name: String,
    pub contact_name: String,
    pub email: String,
    pub phone: String,
    pub tier: String,
    pub website: Option<String>,
    pub message: String,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = crate::schema::sponsorships)]
pub struct SponsorshipChangeset {
    pub company_name: Option<String>,
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub tier: Option<String>,
    pub website: Option<Option<String>>,
    pub message: Option<String>,
    pub is_featured: Option<bool>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::contact_messages)]
pub struct ContactMessage {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::contact_messages)]
pub struct NewContactMessage {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

// ============================================================================
// Forms
// ============================================================================

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::forms)]
pub struct Form {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    #[schema(example = "minimal")]
    pub theme: String,
    pub is_active: bool,
    pub closes_at: Option<NaiveDateTime>,
    pub success_message: String,
    pub success_link: Option<String>,
    pub success_link_label: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::forms)]
pub struct NewForm {
    pub title: String,
    pub description: String,
    pub theme: String,
    pub is_active: bool,
    pub closes_at: Option<NaiveDateTime>,
    pub success_message: String,
    pub success_link: Option<String>,
    pub success_link_label: Option<String>,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = crate::schema::forms)]
pub struct FormChangeset {
    pub title: Option<String>,
    pub description: Option<String>,
    pub theme: Option<String>,
    pub is_active: Option<bool>,
    pub closes_at: Option<Option<NaiveDateTime>>,
    pub success_message: Option<String>,
    pub success_link: Option<Option<String>>,
    pub success_link_label: Option<Option<String>>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::form_sections)]
pub struct FormSection {
    pub id: Uuid,
    #[serde(rename = "form")]
    pub form_id: Uuid,
    pub title: String,
    pub description: String,
    #[serde(rename = "order")]
    pub display_order: i32,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::form_sections)]
pub struct NewFormSection {
    pub form_id: Uuid,
    pub title: String,
    pub description: String,
    pub display_order: i32,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = crate::schema::form_sections)]
pub struct FormSectionChangeset {
    pub title: Option<String>,
    pub description: Option<String>,
    pub display_order: Option<i32>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::form_fields)]
pub struct FormField {
    pub id: Uuid,
    #[serde(rename = "form")]
    pub form_id: Uuid,
    #[serde(rename = "section")]
    pub section_id: Option<Uuid>,
    pub label: String,
    #[schema(example = "text")]
    pub field_type: String,
    pub required: bool,
    #[schema(value_type = Vec<String>)]
    pub options: serde_json::Value,
    #[serde(rename = "order")]
    pub display_order: i32,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::form_fields)]
pub struct NewFormField {
    pub form_id: Uuid,
    pub section_id: Option<Uuid>,
    pub label: String,
    pub field_type: String,
    pub required: bool,
    pub options: serde_json::Value,
    pub display_order: i32,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = crate::schema::form_fields)]
pub struct FormFieldChangeset {
    pub section_id: Option<Option<Uuid>>,
    pub label: Option<String>,
    pub field_type: Option<String>,
    pub required: Option<bool>,
    pub options: Option<serde_json::Value>,
    pub display_order: Option<i32>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::form_responses)]
pub struct FormResponse {
    pub id: Uuid,
    #[serde(rename = "form")]
    pub form_id: Uuid,
    #[serde(rename = "user")]
    pub user_id: Option<Uuid>,
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
    pub submitted_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::form_responses)]
pub struct NewFormResponse {
    pub form_id: Uuid,
    pub user_id: Option<Uuid>,
    pub data: serde_json::Value,
}
