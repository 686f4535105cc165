//! Form builder integration tests: definitions, public submissions and export.

mod common;

use common::*;
use robotech::auth::permissions::Permission;
use serde_json::{json, Value};
use serial_test::serial;

/// Creates a form with one compulsory text field and one optional number field.
async fn recruitment_form(app: &TestApp, token: &str) -> String {
    let response = app
        .post("/api/forms", token, json!({ "title": "Recruitment drive" }))
        .await;
    assert_status!(response, 201);
    let form: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(form["is_active"], true);
    let form_id = form["id"].as_str().expect("id").to_string();

    for (label, field_type, required, order) in [
        ("Roll number", "text", true, 1),
        ("Year", "number", false, 2),
    ] {
        let response = app
            .post(
                "/api/form-fields",
                token,
                json!({
                    "form": form_id,
                    "label": label,
                    "field_type": field_type,
                    "required": required,
                    "order": order,
                }),
            )
            .await;
        assert_status!(response, 201);
    }
    form_id
}

#[tokio::test]
#[serial]
async fn create_form_requires_manage_forms() {
    // Arrange
    let app = TestApp::spawn().await;
    let member = app.user_with(&[]).await;

    // Act
    let response = app
        .post("/api/forms", &member.access_token, json!({ "title": "Survey" }))
        .await;

    // Assert
    assert_status!(response, 403);
}

#[tokio::test]
#[serial]
async fn content_manager_can_build_forms() {
    // Arrange
    let app = TestApp::spawn().await;
    let editor = app.user_with(&[Permission::ManageContent]).await;

    // Act
    let form_id = recruitment_form(&app, &editor.access_token).await;

    // Assert
    let response = app.get_public(&format!("/api/forms/{}", form_id)).await;
    assert_status!(response, 200);
    let form: Value = response.json().await.expect("Failed to parse JSON");
    let labels: Vec<&str> = form["fields"]
        .as_array()
        .expect("fields")
        .iter()
        .filter_map(|f| f["label"].as_str())
        .collect();
    assert_eq!(labels, vec!["Roll number", "Year"]);
}

#[tokio::test]
#[serial]
async fn anonymous_submission_is_recorded() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = app.user_with(&[Permission::ManageForms]).await;
    let form_id = recruitment_form(&app, &owner.access_token).await;

    // Act
    let response = app
        .post_public(
            "/api/form-responses",
            json!({ "form": form_id, "data": { "Roll number": "21CS042", "Year": 2 } }),
        )
        .await;

    // Assert
    assert_status!(response, 201);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["data"]["Roll number"], "21CS042");
    assert!(body["user"].is_null());
}

#[tokio::test]
#[serial]
async fn missing_compulsory_field_is_rejected() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = app.user_with(&[Permission::ManageForms]).await;
    let form_id = recruitment_form(&app, &owner.access_token).await;

    // Act
    let response = app
        .post_public(
            "/api/form-responses",
            json!({ "form": form_id, "data": { "Roll number": "", "Year": 3 } }),
        )
        .await;

    // Assert
    assert_status!(response, 400);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["code"], "FIELD_REQUIRED");
    assert_eq!(body["error"], "Field 'Roll number' is compulsory.");
}

#[tokio::test]
#[serial]
async fn submission_to_unknown_form_is_not_found() {
    // Arrange
    let app = TestApp::spawn().await;

    // Act
    let response = app
        .post_public(
            "/api/form-responses",
            json!({ "form": uuid::Uuid::new_v4().to_string(), "data": {} }),
        )
        .await;

    // Assert
    assert_status!(response, 404);
}

#[tokio::test]
#[serial]
async fn export_lists_field_labels_as_columns() {
    // Arrange
    let app = TestApp::spawn().await;
    let owner = app.user_with(&[Permission::ManageForms]).await;
    let form_id = recruitment_form(&app, &owner.access_token).await;
    let submitted = app
        .post(
            "/api/form-responses",
            &owner.access_token,
            json!({ "form": form_id, "data": { "Roll number": "22EE007" } }),
        )
        .await;
    assert_status!(submitted, 201);

    // Act
    let response = app
        .get(
            &format!("/api/forms/{}/export_responses_csv", form_id),
            &owner.access_token,
        )
        .await;

    // Assert
    assert_status!(response, 200);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("text/csv")
    );
    let body = response.text().await.expect("Failed to read body");
    let mut lines = body.lines();
    assert_eq!(
        lines.next(),
        Some("Response ID,User,Submitted At,Roll number,Year")
    );
    let row = lines.next().expect("one response row");
    assert!(row.contains(&owner.username));
    assert!(row.contains("22EE007"));
}
