//! Public content integration tests: events, sponsorship inquiries and contact.

mod common;

use common::*;
use robotech::auth::permissions::Permission;
use serde_json::{json, Value};
use serial_test::serial;

async fn create_event(app: &TestApp, token: &str, body: Value) -> Value {
    let response = app.post("/api/events", token, body).await;
    assert_status!(response, 201);
    response.json().await.expect("Failed to parse JSON")
}

fn titles(list: &Value) -> Vec<String> {
    list.as_array()
        .expect("array")
        .iter()
        .filter_map(|e| e["title"].as_str().map(str::to_string))
        .collect()
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
#[serial]
async fn draft_event_is_hidden_from_anonymous_visitors() {
    // Arrange
    let app = TestApp::spawn().await;
    let organiser = app.user_with(&[Permission::ManageEvents]).await;
    let title = format!("Draft {}", TestApp::unique_username());
    let event = create_event(&app, &organiser.access_token, json!({ "title": title })).await;
    assert_eq!(event["visibility"], "DRAFT");

    // Act
    let list: Value = app
        .get_public("/api/events")
        .await
        .json()
        .await
        .expect("Failed to parse JSON");
    let single = app
        .get_public(&format!("/api/events/{}", event["id"].as_str().unwrap()))
        .await;

    // Assert
    assert!(!titles(&list).contains(&title));
    assert_status!(single, 404);
}

#[tokio::test]
#[serial]
async fn published_global_event_is_public() {
    // Arrange
    let app = TestApp::spawn().await;
    let organiser = app.user_with(&[Permission::ManageEvents]).await;
    let title = format!("Robo Wars {}", TestApp::unique_username());
    create_event(
        &app,
        &organiser.access_token,
        json!({ "title": title, "visibility": "PUBLISHED", "scope": "GLOBAL" }),
    )
    .await;

    // Act
    let response = app.get_public("/api/events").await;

    // Assert
    assert_status!(response, 200);
    let list: Value = response.json().await.expect("Failed to parse JSON");
    assert!(titles(&list).contains(&title));
}

#[tokio::test]
#[serial]
async fn manager_sees_drafts() {
    // Arrange
    let app = TestApp::spawn().await;
    let organiser = app.user_with(&[Permission::ManageEvents]).await;
    let title = format!("Draft {}", TestApp::unique_username());
    create_event(&app, &organiser.access_token, json!({ "title": title })).await;

    // Act
    let list: Value = app
        .get("/api/events", &organiser.access_token)
        .await
        .json()
        .await
        .expect("Failed to parse JSON");

    // Assert
    assert!(titles(&list).contains(&title));
}

#[tokio::test]
#[serial]
async fn inverted_registration_window_is_rejected() {
    // Arrange
    let app = TestApp::spawn().await;
    let organiser = app.user_with(&[Permission::ManageEvents]).await;

    // Act
    let response = app
        .post(
            "/api/events",
            &organiser.access_token,
            json!({
                "title": "Hackathon",
                "registration_start": "2026-03-10T10:00:00",
                "registration_end": "2026-03-01T10:00:00",
            }),
        )
        .await;

    // Assert
    assert_status!(response, 400);
}

#[tokio::test]
#[serial]
async fn invalid_token_on_public_listing_degrades_to_anonymous() {
    // Arrange
    let app = TestApp::spawn().await;

    // Act
    let response = app.get("/api/events", "garbage-token").await;

    // Assert
    assert_status!(response, 200);
}

// ============================================================================
// Sponsorships and contact
// ============================================================================

#[tokio::test]
#[serial]
async fn sponsorship_inquiry_is_accepted_but_not_featured() {
    // Arrange
    let app = TestApp::spawn().await;
    let company = format!("Acme {}", TestApp::unique_username());

    // Act
    let response = app
        .post_public(
            "/api/sponsorships",
            json!({ "company_name": company, "email": "partners@acme.example", "tier": "GOLD" }),
        )
        .await;

    // Assert
    assert_status!(response, 201);
    let public: Value = app
        .get_public("/api/sponsorships")
        .await
        .json()
        .await
        .expect("Failed to parse JSON");
    let listed = public
        .as_array()
        .expect("array")
        .iter()
        .any(|s| s["company_name"] == json!(company));
    assert!(!listed);
}

#[tokio::test]
#[serial]
async fn contact_message_with_bad_email_is_rejected() {
    // Arrange
    let app = TestApp::spawn().await;

    // Act
    let response = app
        .post_public(
            "/api/contact-messages",
            json!({ "name": "Jordan", "email": "not-an-email", "message": "Hello" }),
        )
        .await;

    // Assert
    assert_status!(response, 400);
}

#[tokio::test]
#[serial]
async fn contact_inbox_requires_manage_messages() {
    // Arrange
    let app = TestApp::spawn().await;
    let member = app.user_with(&[]).await;
    let moderator = app.user_with(&[Permission::ManageMessages]).await;
    let sent = app
        .post_public(
            "/api/contact-messages",
            json!({ "name": "Jordan", "email": "jordan@example.com", "message": "Workshop?" }),
        )
        .await;
    assert_status!(sent, 201);

    // Act
    let denied = app.get("/api/contact-messages", &member.access_token).await;
    let allowed = app.get("/api/contact-messages", &moderator.access_token).await;

    // Assert
    assert_status!(denied, 403);
    assert_status!(allowed, 200);
}

// ============================================================================
// Announcements
// ============================================================================

fn listed(list: &Value, id: &Value) -> bool {
    list.as_array()
        .expect("array")
        .iter()
        .any(|item| &item["id"] == id)
}

#[tokio::test]
#[serial]
async fn announcement_is_public_only_after_publishing() {
    // Arrange
    let app = TestApp::spawn().await;
    let editor = app.user_with(&[Permission::ManageAnnouncements]).await;
    let created = app
        .post(
            "/api/announcements",
            &editor.access_token,
            json!({ "title": "Induction week", "content": "Labs open at 5pm" }),
        )
        .await;
    assert_status!(created, 201);
    let announcement: Value = created.json().await.expect("Failed to parse JSON");
    let id = announcement["id"].clone();
    assert!(announcement["published_at"].is_null());

    let before: Value = app
        .get_public("/api/announcements/public")
        .await
        .json()
        .await
        .expect("Failed to parse JSON");

    // Act
    let published = app
        .post(
            &format!("/api/announcements/{}/publish", id.as_str().unwrap()),
            &editor.access_token,
            json!({}),
        )
        .await;

    // Assert
    assert!(!listed(&before, &id));
    assert_status!(published, 200);
    let after: Value = app
        .get_public("/api/announcements/public")
        .await
        .json()
        .await
        .expect("Failed to parse JSON");
    assert!(listed(&after, &id));
}

#[tokio::test]
#[serial]
async fn announcement_edit_and_delete() {
    // Arrange
    let app = TestApp::spawn().await;
    let editor = app.user_with(&[Permission::ManageAnnouncements]).await;
    let member = app.user_with(&[]).await;
    let announcement: Value = app
        .post(
            "/api/announcements",
            &editor.access_token,
            json!({ "title": "Workshop", "content": "Bring laptops" }),
        )
        .await
        .json()
        .await
        .expect("Failed to parse JSON");
    let path = format!("/api/announcements/{}", announcement["id"].as_str().unwrap());

    // Act
    let forbidden = app
        .patch(&path, &member.access_token, json!({ "title": "Hijacked" }))
        .await;
    let updated = app
        .patch(&path, &editor.access_token, json!({ "title": "Arduino workshop" }))
        .await;
    let deleted = app.delete(&path, &editor.access_token).await;
    let missing = app.get(&path, &editor.access_token).await;

    // Assert
    assert_status!(forbidden, 403);
    assert_status!(updated, 200);
    let body: Value = updated.json().await.expect("Failed to parse JSON");
    assert_eq!(body["title"], "Arduino workshop");
    assert_eq!(body["content"], "Bring laptops");
    assert_status!(deleted, 204);
    assert_status!(missing, 404);
}

// ============================================================================
// Gallery
// ============================================================================

fn image_part(filename: &str, mime: &str) -> reqwest::multipart::Part {
    reqwest::multipart::Part::bytes(vec![0x89, b'P', b'N', b'G', 0, 1, 2, 3])
        .file_name(filename.to_string())
        .mime_str(mime)
        .expect("valid mime")
}

#[tokio::test]
#[serial]
async fn gallery_upload_list_and_delete() {
    // Arrange
    let app = TestApp::spawn().await;
    let curator = app.user_with(&[Permission::ManageGallery]).await;
    let form = reqwest::multipart::Form::new()
        .text("title", "Robo Wars finals")
        .part("images", image_part("arena.png", "image/png"))
        .part("images", image_part("podium.jpg", "image/jpeg"));

    // Act
    let response = app
        .post_multipart("/api/gallery/upload", &curator.access_token, form)
        .await;

    // Assert
    assert_status!(response, 201);
    let images: Value = response.json().await.expect("Failed to parse JSON");
    let images = images.as_array().expect("array").clone();
    assert_eq!(images.len(), 2);
    assert!(images[0]["image"]
        .as_str()
        .expect("image")
        .starts_with("gallery/"));

    let public: Value = app
        .get_public("/api/gallery")
        .await
        .json()
        .await
        .expect("Failed to parse JSON");
    assert!(listed(&public, &images[0]["id"]));

    let path = format!("/api/gallery/{}", images[0]["id"].as_str().unwrap());
    let deleted = app.delete(&path, &curator.access_token).await;
    assert_status!(deleted, 204);
    let again = app.delete(&path, &curator.access_token).await;
    assert_status!(again, 404);
}

#[tokio::test]
#[serial]
async fn gallery_rejects_unsupported_images() {
    // Arrange
    let app = TestApp::spawn().await;
    let curator = app.user_with(&[Permission::ManageGallery]).await;
    let form = reqwest::multipart::Form::new()
        .part("images", image_part("ok.png", "image/png"))
        .part("images", image_part("spinner.gif", "image/gif"));

    // Act
    let response = app
        .post_multipart("/api/gallery/upload", &curator.access_token, form)
        .await;

    // Assert
    assert_status!(response, 400);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["code"], "UNSUPPORTED_FILE_TYPE");
}
