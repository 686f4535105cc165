//! Authentication integration tests: token issue, refresh and `/api/me`.

mod common;

use common::*;
use robotech::auth::permissions::Permission;
use serde_json::{json, Value};
use serial_test::serial;

// ============================================================================
// Login
// ============================================================================

#[tokio::test]
#[serial]
async fn login_returns_token_pair_and_user() {
    // Arrange
    let app = TestApp::spawn().await;
    let username = TestApp::unique_username();
    let id = app.seed_user(&username, false);

    // Act
    let response = app.login(&username, TEST_PASSWORD).await;

    // Assert
    assert_status!(response, 200);
    let body: LoginResponse = response.json().await.expect("Failed to parse JSON");
    assert!(!body.access_token.is_empty());
    assert!(!body.refresh_token.is_empty());
    assert_eq!(body.user["id"], id.to_string());
    assert_eq!(body.user["username"], username);
    assert!(body.user["last_login"].is_string());
}

#[tokio::test]
#[serial]
async fn login_with_wrong_password_is_unauthorized() {
    // Arrange
    let app = TestApp::spawn().await;
    let username = TestApp::unique_username();
    app.seed_user(&username, false);

    // Act
    let response = app.login(&username, "not-the-password").await;

    // Assert
    assert_status!(response, 401);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
#[serial]
async fn login_with_unknown_username_is_unauthorized() {
    // Arrange
    let app = TestApp::spawn().await;

    // Act
    let response = app.login(&TestApp::unique_username(), TEST_PASSWORD).await;

    // Assert
    assert_status!(response, 401);
}

#[tokio::test]
#[serial]
async fn login_to_inactive_account_is_forbidden() {
    // Arrange
    let app = TestApp::spawn().await;
    let username = TestApp::unique_username();
    let id = app.seed_user(&username, false);
    app.deactivate(id);

    // Act
    let response = app.login(&username, TEST_PASSWORD).await;

    // Assert
    assert_status!(response, 403);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["code"], "ACCOUNT_INACTIVE");
}

// ============================================================================
// Refresh
// ============================================================================

#[tokio::test]
#[serial]
async fn refresh_rotates_tokens() {
    // Arrange
    let app = TestApp::spawn().await;
    let user = app.user_with(&[]).await;

    // Act
    let response = app
        .post_public(
            "/api/token/refresh",
            json!({ "refresh_token": user.refresh_token }),
        )
        .await;

    // Assert
    assert_status!(response, 200);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    let refreshed = body["refresh_token"].as_str().expect("refresh_token");
    assert!(body["access_token"].is_string());
    assert_ne!(refreshed, user.refresh_token);
}

#[tokio::test]
#[serial]
async fn rotated_refresh_token_cannot_be_reused() {
    // Arrange
    let app = TestApp::spawn().await;
    let user = app.user_with(&[]).await;
    let body = json!({ "refresh_token": user.refresh_token });
    let first = app.post_public("/api/token/refresh", body.clone()).await;
    assert_status!(first, 200);

    // Act
    let replay = app.post_public("/api/token/refresh", body).await;

    // Assert
    assert_status!(replay, 401);
}

#[tokio::test]
#[serial]
async fn access_token_is_not_accepted_as_refresh_token() {
    // Arrange
    let app = TestApp::spawn().await;
    let user = app.user_with(&[]).await;

    // Act
    let response = app
        .post_public(
            "/api/token/refresh",
            json!({ "refresh_token": user.access_token }),
        )
        .await;

    // Assert
    assert_status!(response, 401);
}

// ============================================================================
// Logout
// ============================================================================

#[tokio::test]
#[serial]
async fn logout_revokes_own_refresh_token() {
    // Arrange
    let app = TestApp::spawn().await;
    let user = app.user_with(&[]).await;

    // Act
    let response = app
        .post(
            "/api/logout",
            &user.access_token,
            json!({ "refresh_token": user.refresh_token }),
        )
        .await;

    // Assert
    assert_status!(response, 204);
    let replay = app
        .post_public(
            "/api/token/refresh",
            json!({ "refresh_token": user.refresh_token }),
        )
        .await;
    assert_status!(replay, 401);
}

#[tokio::test]
#[serial]
async fn logout_leaves_other_users_refresh_tokens_alone() {
    // Arrange
    let app = TestApp::spawn().await;
    let mallory = app.user_with(&[]).await;
    let victim = app.user_with(&[]).await;

    // Act
    let response = app
        .post(
            "/api/logout",
            &mallory.access_token,
            json!({ "refresh_token": victim.refresh_token }),
        )
        .await;

    // Assert
    assert_status!(response, 204);
    let refreshed = app
        .post_public(
            "/api/token/refresh",
            json!({ "refresh_token": victim.refresh_token }),
        )
        .await;
    assert_status!(refreshed, 200);
}

// ============================================================================
// Current user
// ============================================================================

#[tokio::test]
#[serial]
async fn me_requires_token() {
    // Arrange
    let app = TestApp::spawn().await;

    // Act
    let response = app.get_public("/api/me").await;

    // Assert
    assert_status!(response, 401);
}

#[tokio::test]
#[serial]
async fn me_lists_role_permissions() {
    // Arrange
    let app = TestApp::spawn().await;
    let user = app
        .user_with(&[Permission::ManageEvents, Permission::ManageForms])
        .await;

    // Act
    let response = app.get("/api/me", &user.access_token).await;

    // Assert
    assert_status!(response, 200);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    let permissions: Vec<&str> = body["permissions"]
        .as_array()
        .expect("permissions array")
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(permissions.contains(&"can_manage_events"));
    assert!(permissions.contains(&"can_manage_forms"));
    assert!(!permissions.contains(&"can_manage_users"));
    assert_eq!(body["roles"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
#[serial]
async fn invalid_bearer_token_is_rejected() {
    // Arrange
    let app = TestApp::spawn().await;

    // Act
    let response = app.get("/api/me", "not-a-jwt").await;

    // Assert
    assert_status!(response, 401);
}
