//! Administration integration tests: accounts, roles, taxonomy and the audit log.

mod common;

use common::*;
use diesel::prelude::*;
use robotech::auth::permissions::Permission;
use robotech::schema::member_profiles;
use serde_json::{json, Value};
use serial_test::serial;

#[tokio::test]
#[serial]
async fn create_user_requires_manage_users() {
    // Arrange
    let app = TestApp::spawn().await;
    let user = app.user_with(&[Permission::ManageEvents]).await;

    // Act
    let response = app
        .post(
            "/api/management",
            &user.access_token,
            json!({ "username": TestApp::unique_username(), "password": "password123" }),
        )
        .await;

    // Assert
    assert_status!(response, 403);
}

#[tokio::test]
#[serial]
async fn manager_creates_user_who_can_log_in() {
    // Arrange
    let app = TestApp::spawn().await;
    let manager = app.user_with(&[Permission::ManageUsers]).await;
    let username = TestApp::unique_username();

    // Act
    let response = app
        .post(
            "/api/management",
            &manager.access_token,
            json!({
                "username": username,
                "password": "freshpass99",
                "email": format!("{}@club.example", username),
                "full_name": "New Member",
            }),
        )
        .await;

    // Assert
    assert_status!(response, 201);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["username"], username);
    assert_eq!(body["role"], "MEMBER");
    assert_eq!(body["is_superuser"], false);

    let login = app.login(&username, "freshpass99").await;
    assert_status!(login, 200);
}

#[tokio::test]
#[serial]
async fn create_user_without_password_is_rejected() {
    // Arrange
    let app = TestApp::spawn().await;
    let manager = app.user_with(&[Permission::ManageUsers]).await;

    // Act
    let response = app
        .post(
            "/api/management",
            &manager.access_token,
            json!({ "username": TestApp::unique_username() }),
        )
        .await;

    // Assert
    assert_status!(response, 400);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["code"], "MISSING_CREDENTIALS");
}

#[tokio::test]
#[serial]
async fn duplicate_username_is_rejected() {
    // Arrange
    let app = TestApp::spawn().await;
    let manager = app.user_with(&[Permission::ManageUsers]).await;
    let existing = app.user_with(&[]).await;

    // Act
    let response = app
        .post(
            "/api/management",
            &manager.access_token,
            json!({ "username": existing.username, "password": "password123" }),
        )
        .await;

    // Assert
    assert_status!(response, 400);
}

#[tokio::test]
#[serial]
async fn security_manager_implies_user_management() {
    // Arrange
    let app = TestApp::spawn().await;
    let admin = app.user_with(&[Permission::ManageSecurity]).await;

    // Act
    let response = app.get("/api/management", &admin.access_token).await;

    // Assert
    assert_status!(response, 200);
}

#[tokio::test]
#[serial]
async fn superuser_can_read_any_account() {
    // Arrange
    let app = TestApp::spawn().await;
    let root = app.superuser().await;
    let member = app.user_with(&[]).await;

    // Act
    let response = app
        .get(&format!("/api/management/{}", member.id), &root.access_token)
        .await;

    // Assert
    assert_status!(response, 200);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["id"], member.id.to_string());
}

// ============================================================================
// Roles
// ============================================================================

#[tokio::test]
#[serial]
async fn role_flag_changes_apply_to_later_requests() {
    // Arrange
    let app = TestApp::spawn().await;
    let admin = app.user_with(&[Permission::ManageSecurity]).await;
    let organiser = app.user_with(&[]).await;
    let role_id = app.grant(organiser.id, &[]);
    let role_path = format!("/api/roles/{}", role_id);

    let before = app
        .post("/api/events", &organiser.access_token, json!({ "title": "Line race" }))
        .await;
    assert_status!(before, 403);

    // Act
    let granted = app
        .patch(&role_path, &admin.access_token, json!({ "can_manage_events": true }))
        .await;
    let allowed = app
        .post("/api/events", &organiser.access_token, json!({ "title": "Line race" }))
        .await;
    let revoked = app
        .patch(&role_path, &admin.access_token, json!({ "can_manage_events": false }))
        .await;
    let denied = app
        .post("/api/events", &organiser.access_token, json!({ "title": "Line race" }))
        .await;

    // Assert
    assert_status!(granted, 200);
    let role: Value = granted.json().await.expect("Failed to parse JSON");
    assert_eq!(role["can_manage_events"], true);
    assert_status!(allowed, 201);
    assert_status!(revoked, 200);
    assert_status!(denied, 403);
}

#[tokio::test]
#[serial]
async fn role_writes_require_security() {
    // Arrange
    let app = TestApp::spawn().await;
    let manager = app.user_with(&[Permission::ManageUsers]).await;

    // Act
    let response = app
        .post(
            "/api/roles",
            &manager.access_token,
            json!({ "name": "SHADOW_ADMIN", "can_manage_security": true }),
        )
        .await;

    // Assert
    assert_status!(response, 403);
}

// ============================================================================
// Taxonomy
// ============================================================================

#[tokio::test]
#[serial]
async fn renaming_sig_moves_member_profiles() {
    // Arrange
    let app = TestApp::spawn().await;
    let admin = app.user_with(&[Permission::ManageSecurity]).await;
    let suffix = TestApp::unique_username();
    let old_name = format!("Embedded {}", suffix);
    let new_name = format!("Embedded Systems {}", suffix);

    let created = app
        .post("/api/sigs", &admin.access_token, json!({ "name": old_name }))
        .await;
    assert_status!(created, 201);
    let sig: Value = created.json().await.expect("Failed to parse JSON");

    let member = app.user_with(&[]).await;
    diesel::update(member_profiles::table.filter(member_profiles::user_id.eq(member.id)))
        .set(member_profiles::sig.eq(&old_name))
        .execute(&mut app.conn())
        .expect("Failed to place member in SIG");

    // Act
    let response = app
        .patch(
            &format!("/api/sigs/{}", sig["id"].as_str().expect("id")),
            &admin.access_token,
            json!({ "name": new_name }),
        )
        .await;

    // Assert
    assert_status!(response, 200);
    let renamed: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(renamed["name"], json!(new_name));

    let stored: String = member_profiles::table
        .filter(member_profiles::user_id.eq(member.id))
        .select(member_profiles::sig)
        .first(&mut app.conn())
        .expect("Failed to load profile");
    assert_eq!(stored, new_name);
}

// ============================================================================
// Audit log
// ============================================================================

#[tokio::test]
#[serial]
async fn audit_log_lists_logins_for_security() {
    // Arrange
    let app = TestApp::spawn().await;
    let someone = app.user_with(&[]).await;
    let auditor = app.user_with(&[Permission::ManageSecurity]).await;

    // Act
    let response = app
        .get(
            "/api/admin/audit-logs?event_type=USER_LOGIN&per_page=100",
            &auditor.access_token,
        )
        .await;
    let denied = app
        .get("/api/admin/audit-logs", &someone.access_token)
        .await;

    // Assert
    assert_status!(response, 200);
    assert_status!(denied, 403);
    let page: Value = response.json().await.expect("Failed to parse JSON");
    let entries = page["data"].as_array().expect("data");
    assert!(entries.iter().all(|e| e["event_type"] == "USER_LOGIN"));
    let expected = format!("User {} logged in", someone.username);
    assert!(entries.iter().any(|e| e["target"] == json!(expected)));
}

#[tokio::test]
#[serial]
async fn purging_old_audit_logs_accepts_any_non_negative_day_count() {
    // Arrange
    let app = TestApp::spawn().await;
    let auditor = app.user_with(&[Permission::ManageSecurity]).await;
    let path = "/api/admin/audit-logs/delete_old_logs";

    // Act
    let decade = app.post(path, &auditor.access_token, json!({ "days": 3650 })).await;
    let textual = app
        .post(path, &auditor.access_token, json!({ "days": "5000000" }))
        .await;
    let enormous = app
        .post(path, &auditor.access_token, json!({ "days": 1_000_000_000_000_000_i64 }))
        .await;

    // Assert
    assert_status!(decade, 200);
    let body: Value = decade.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "success");

    for response in [textual, enormous] {
        assert_status!(response, 200);
        let body: Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "success");
        assert_eq!(body["deleted_count"], 0);
    }
}

#[tokio::test]
#[serial]
async fn purging_with_invalid_days_is_rejected() {
    // Arrange
    let app = TestApp::spawn().await;
    let auditor = app.user_with(&[Permission::ManageSecurity]).await;
    let path = "/api/admin/audit-logs/delete_old_logs";

    // Act
    let negative = app.post(path, &auditor.access_token, json!({ "days": -1 })).await;
    let missing = app.post(path, &auditor.access_token, json!({})).await;

    // Assert
    assert_status!(negative, 400);
    let body: Value = negative.json().await.expect("Failed to parse JSON");
    assert_eq!(body["code"], "INVALID_DAYS");
    assert_status!(missing, 400);
    let body: Value = missing.json().await.expect("Failed to parse JSON");
    assert_eq!(body["code"], "DAYS_REQUIRED");
}
