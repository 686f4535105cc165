//! Project workspace integration tests: creation, join requests and sync state.

mod common;

use common::*;
use robotech::auth::permissions::Permission;
use serde_json::{json, Value};
use serial_test::serial;

async fn create_project(app: &TestApp, token: &str, title: &str) -> Value {
    let response = app
        .post("/api/projects", token, json!({ "title": title }))
        .await;
    assert_status!(response, 201);
    response.json().await.expect("Failed to parse JSON")
}

// ============================================================================
// Creation
// ============================================================================

#[tokio::test]
#[serial]
async fn creator_becomes_lead_and_member() {
    // Arrange
    let app = TestApp::spawn().await;
    let lead = app.user_with(&[Permission::ManageProjects]).await;

    // Act
    let project = create_project(&app, &lead.access_token, "Line follower").await;

    // Assert
    assert_eq!(project["title"], "Line follower");
    assert_eq!(project["lead_id"], lead.id.to_string());
    let members = project["members"].as_array().expect("members");
    assert!(members.iter().any(|m| m == &json!(lead.id.to_string())));
}

#[tokio::test]
#[serial]
async fn creator_stays_member_when_someone_else_leads() {
    // Arrange
    let app = TestApp::spawn().await;
    let manager = app.user_with(&[Permission::ManageProjects]).await;
    let lead = app.user_with(&[]).await;

    // Act
    let response = app
        .post(
            "/api/projects",
            &manager.access_token,
            json!({ "title": "Hexapod", "lead_id": lead.id }),
        )
        .await;

    // Assert
    assert_status!(response, 201);
    let project: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(project["lead_id"], lead.id.to_string());
    assert_eq!(project["is_public"], true);
    let members = project["members"].as_array().expect("members");
    assert!(members.contains(&json!(lead.id.to_string())));
    assert!(members.contains(&json!(manager.id.to_string())));
}

#[tokio::test]
#[serial]
async fn create_project_requires_permission() {
    // Arrange
    let app = TestApp::spawn().await;
    let member = app.user_with(&[]).await;

    // Act
    let response = app
        .post("/api/projects", &member.access_token, json!({ "title": "Rover" }))
        .await;

    // Assert
    assert_status!(response, 403);
}

#[tokio::test]
#[serial]
async fn create_project_without_title_is_rejected() {
    // Arrange
    let app = TestApp::spawn().await;
    let lead = app.user_with(&[Permission::ManageProjects]).await;

    // Act
    let response = app
        .post("/api/projects", &lead.access_token, json!({ "title": "  " }))
        .await;

    // Assert
    assert_status!(response, 400);
}

// ============================================================================
// Join requests
// ============================================================================

#[tokio::test]
#[serial]
async fn approved_join_request_adds_member() {
    // Arrange
    let app = TestApp::spawn().await;
    let lead = app.user_with(&[Permission::ManageProjects]).await;
    let applicant = app.user_with(&[]).await;
    let project = create_project(&app, &lead.access_token, "Drone swarm").await;
    let project_id = project["id"].as_str().expect("id");

    let response = app
        .post(
            &format!("/api/projects/{}/request_join", project_id),
            &applicant.access_token,
            json!({ "message": "I can solder" }),
        )
        .await;
    assert_status!(response, 201);
    let request: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(request["status"], "PENDING");

    // Act
    let response = app
        .post(
            &format!("/api/join-requests/{}/approve", request["id"].as_str().unwrap()),
            &lead.access_token,
            json!({}),
        )
        .await;

    // Assert
    assert_status!(response, 200);
    let settled: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(settled["status"], "APPROVED");

    let detail: Value = app
        .get(&format!("/api/projects/{}", project_id), &applicant.access_token)
        .await
        .json()
        .await
        .expect("Failed to parse JSON");
    let members = detail["members"].as_array().expect("members");
    assert!(members.iter().any(|m| m == &json!(applicant.id.to_string())));
}

#[tokio::test]
#[serial]
async fn second_pending_request_is_rejected() {
    // Arrange
    let app = TestApp::spawn().await;
    let lead = app.user_with(&[Permission::ManageProjects]).await;
    let applicant = app.user_with(&[]).await;
    let project = create_project(&app, &lead.access_token, "Arm").await;
    let path = format!("/api/projects/{}/request_join", project["id"].as_str().unwrap());
    let first = app.post(&path, &applicant.access_token, json!({})).await;
    assert_status!(first, 201);

    // Act
    let second = app.post(&path, &applicant.access_token, json!({})).await;

    // Assert
    assert_status!(second, 400);
    let body: Value = second.json().await.expect("Failed to parse JSON");
    assert_eq!(body["code"], "REQUEST_PENDING");
}

#[tokio::test]
#[serial]
async fn lead_cannot_request_to_join_own_project() {
    // Arrange
    let app = TestApp::spawn().await;
    let lead = app.user_with(&[Permission::ManageProjects]).await;
    let project = create_project(&app, &lead.access_token, "Sumo bot").await;

    // Act
    let response = app
        .post(
            &format!("/api/projects/{}/request_join", project["id"].as_str().unwrap()),
            &lead.access_token,
            json!({}),
        )
        .await;

    // Assert
    assert_status!(response, 400);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["code"], "ALREADY_MEMBER");
}

async fn open_request(app: &TestApp, lead: &TestUser, applicant: &TestUser, title: &str) -> String {
    let project = create_project(app, &lead.access_token, title).await;
    let response = app
        .post(
            &format!("/api/projects/{}/request_join", project["id"].as_str().unwrap()),
            &applicant.access_token,
            json!({}),
        )
        .await;
    assert_status!(response, 201);
    let request: Value = response.json().await.expect("Failed to parse JSON");
    request["id"].as_str().expect("id").to_string()
}

#[tokio::test]
#[serial]
async fn approving_twice_is_idempotent() {
    // Arrange
    let app = TestApp::spawn().await;
    let lead = app.user_with(&[Permission::ManageProjects]).await;
    let applicant = app.user_with(&[]).await;
    let request_id = open_request(&app, &lead, &applicant, "Gripper").await;
    let path = format!("/api/join-requests/{}/approve", request_id);
    let first = app.post(&path, &lead.access_token, json!({})).await;
    assert_status!(first, 200);

    // Act
    let second = app.post(&path, &lead.access_token, json!({})).await;

    // Assert
    assert_status!(second, 200);
    let body: Value = second.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "APPROVED");
}

#[tokio::test]
#[serial]
async fn rejecting_an_approved_request_conflicts() {
    // Arrange
    let app = TestApp::spawn().await;
    let lead = app.user_with(&[Permission::ManageProjects]).await;
    let applicant = app.user_with(&[]).await;
    let request_id = open_request(&app, &lead, &applicant, "Conveyor").await;
    let approved = app
        .post(
            &format!("/api/join-requests/{}/approve", request_id),
            &lead.access_token,
            json!({}),
        )
        .await;
    assert_status!(approved, 200);

    // Act
    let response = app
        .post(
            &format!("/api/join-requests/{}/reject", request_id),
            &lead.access_token,
            json!({}),
        )
        .await;

    // Assert
    assert_status!(response, 409);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["code"], "REQUEST_ALREADY_RESOLVED");
}

#[tokio::test]
#[serial]
async fn outsider_cannot_approve_requests() {
    // Arrange
    let app = TestApp::spawn().await;
    let lead = app.user_with(&[Permission::ManageProjects]).await;
    let applicant = app.user_with(&[]).await;
    let outsider = app.user_with(&[]).await;
    let project = create_project(&app, &lead.access_token, "Quadruped").await;
    let request: Value = app
        .post(
            &format!("/api/projects/{}/request_join", project["id"].as_str().unwrap()),
            &applicant.access_token,
            json!({}),
        )
        .await
        .json()
        .await
        .expect("Failed to parse JSON");

    // Act
    let response = app
        .post(
            &format!("/api/join-requests/{}/approve", request["id"].as_str().unwrap()),
            &outsider.access_token,
            json!({}),
        )
        .await;

    // Assert
    assert_status!(response, 403);
}

// ============================================================================
// Sync state
// ============================================================================

#[tokio::test]
#[serial]
async fn sync_state_reports_members_for_collaborators() {
    // Arrange
    let app = TestApp::spawn().await;
    let lead = app.user_with(&[Permission::ManageProjects]).await;
    let project = create_project(&app, &lead.access_token, "Telemetry").await;

    // Act
    let response = app
        .get(
            &format!("/api/projects/{}/sync_state", project["id"].as_str().unwrap()),
            &lead.access_token,
        )
        .await;

    // Assert
    assert_status!(response, 200);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert!(body["members_status"]
        .as_object()
        .expect("members_status")
        .contains_key(&lead.id.to_string()));
    assert!(body["threads_state"].is_object());
}

#[tokio::test]
#[serial]
async fn sync_state_is_forbidden_for_outsiders() {
    // Arrange
    let app = TestApp::spawn().await;
    let lead = app.user_with(&[Permission::ManageProjects]).await;
    let outsider = app.user_with(&[]).await;
    let project = create_project(&app, &lead.access_token, "Balancer").await;

    // Act
    let response = app
        .get(
            &format!("/api/projects/{}/sync_state", project["id"].as_str().unwrap()),
            &outsider.access_token,
        )
        .await;

    // Assert
    assert_status!(response, 403);
}

// ============================================================================
// Tasks
// ============================================================================

#[tokio::test]
#[serial]
async fn task_lifecycle_with_comments() {
    // Arrange
    let app = TestApp::spawn().await;
    let lead = app.user_with(&[Permission::ManageProjects]).await;
    let project = create_project(&app, &lead.access_token, "Pick and place").await;

    // Act
    let created = app
        .post(
            "/api/tasks",
            &lead.access_token,
            json!({ "project": project["id"], "title": "Calibrate camera" }),
        )
        .await;
    assert_status!(created, 201);
    let task: Value = created.json().await.expect("Failed to parse JSON");
    let task_path = format!("/api/tasks/{}", task["id"].as_str().expect("id"));

    let updated = app
        .patch(&task_path, &lead.access_token, json!({ "status": "IN_PROGRESS" }))
        .await;
    let commented = app
        .post(
            &format!("{}/comment", task_path),
            &lead.access_token,
            json!({ "content": "Checkerboard printed" }),
        )
        .await;
    let detail: Value = app
        .get(&task_path, &lead.access_token)
        .await
        .json()
        .await
        .expect("Failed to parse JSON");
    let deleted = app.delete(&task_path, &lead.access_token).await;
    let missing = app.get(&task_path, &lead.access_token).await;

    // Assert
    assert_eq!(task["status"], "TODO");
    assert_status!(updated, 200);
    assert_status!(commented, 201);
    assert_eq!(detail["status"], "IN_PROGRESS");
    assert_eq!(detail["comments"][0]["content"], "Checkerboard printed");
    assert_status!(deleted, 204);
    assert_status!(missing, 404);
}

#[tokio::test]
#[serial]
async fn outsider_cannot_create_tasks() {
    // Arrange
    let app = TestApp::spawn().await;
    let lead = app.user_with(&[Permission::ManageProjects]).await;
    let outsider = app.user_with(&[]).await;
    let project = create_project(&app, &lead.access_token, "Smart bin").await;

    // Act
    let response = app
        .post(
            "/api/tasks",
            &outsider.access_token,
            json!({ "project": project["id"], "title": "Sneaky" }),
        )
        .await;

    // Assert
    assert_status!(response, 403);
}

#[tokio::test]
#[serial]
async fn blank_comment_is_rejected() {
    // Arrange
    let app = TestApp::spawn().await;
    let lead = app.user_with(&[Permission::ManageProjects]).await;
    let project = create_project(&app, &lead.access_token, "Weather station").await;
    let task: Value = app
        .post(
            "/api/tasks",
            &lead.access_token,
            json!({ "project": project["id"], "title": "Solder sensors" }),
        )
        .await
        .json()
        .await
        .expect("Failed to parse JSON");

    // Act
    let response = app
        .post(
            &format!("/api/tasks/{}/comment", task["id"].as_str().expect("id")),
            &lead.access_token,
            json!({ "content": "   " }),
        )
        .await;

    // Assert
    assert_status!(response, 400);
}
