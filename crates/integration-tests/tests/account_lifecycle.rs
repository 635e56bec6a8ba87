//! End-to-end account lifecycle over HTTP against a file-backed server.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use reqwest::StatusCode;
use serde_json::{Value, json};
use studydesk_core::Username;
use studydesk_integration_tests::TestServer;

fn register_body(username: &str, password: &str) -> Value {
    json!({"username": username, "password": password, "confirm": password})
}

fn login_body(username: &str, password: &str) -> Value {
    json!({"username": username, "password": password})
}

#[tokio::test]
async fn test_alice_scenario() {
    let server = TestServer::start().await.unwrap();
    let client = server.client().unwrap();

    let resp = server
        .post(&client, "/auth/register", &register_body("alice", "pw123456"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = server
        .post(&client, "/auth/login", &login_body("alice", "pw123456"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["username"], "alice");
    assert_eq!(body["admin_mode"], false);

    let resp = server
        .post(
            &client,
            "/account/password",
            &json!({"current": "pw123456", "new": "newpw789", "confirm": "newpw789"}),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    server.post(&client, "/auth/logout", &json!({})).await.unwrap();
    assert_eq!(server.session(&client).await.unwrap()["logged_in"], false);

    let resp = server
        .post(&client, "/auth/login", &login_body("alice", "pw123456"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = server
        .post(&client, "/auth/login", &login_body("alice", "newpw789"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = server
        .post(&client, "/account/delete", &json!({"confirm": "DELETE"}))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(server.session(&client).await.unwrap()["logged_in"], false);

    let resp = server
        .post(&client, "/auth/login", &login_body("alice", "newpw789"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // Username is free again
    let resp = server
        .post(&client, "/auth/register", &register_body("alice", "another1"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_sessions_are_per_client() {
    let server = TestServer::start().await.unwrap();
    let alice = server.client().unwrap();
    let other = server.client().unwrap();

    server
        .post(&alice, "/auth/register", &register_body("alice", "pw123456"))
        .await
        .unwrap();
    server
        .post(&alice, "/auth/login", &login_body("alice", "pw123456"))
        .await
        .unwrap();

    assert_eq!(server.session(&alice).await.unwrap()["logged_in"], true);
    assert_eq!(server.session(&other).await.unwrap()["logged_in"], false);
}

#[tokio::test]
async fn test_unknown_user_and_wrong_password_look_alike() {
    let server = TestServer::start().await.unwrap();
    let client = server.client().unwrap();
    server
        .post(&client, "/auth/register", &register_body("alice", "pw123456"))
        .await
        .unwrap();

    let wrong = server
        .post(&client, "/auth/login", &login_body("alice", "wrongpass"))
        .await
        .unwrap();
    let wrong_status = wrong.status();
    let wrong_body: Value = wrong.json().await.unwrap();

    let unknown = server
        .post(&client, "/auth/login", &login_body("mallory", "wrongpass"))
        .await
        .unwrap();
    let unknown_status = unknown.status();
    let unknown_body: Value = unknown.json().await.unwrap();

    assert_eq!(wrong_status, unknown_status);
    assert_eq!(wrong_body, unknown_body);
    assert_eq!(wrong_body["error"], "Invalid username or password");
}

#[tokio::test]
async fn test_file_never_holds_clear_text() {
    let server = TestServer::start().await.unwrap();
    let client = server.client().unwrap();
    server
        .post(&client, "/auth/register", &register_body("alice", "pw123456"))
        .await
        .unwrap();

    let contents = server.users_file().unwrap();
    assert!(contents.contains("\"alice\""));
    assert!(contents.contains("$argon2id$"));
    assert!(!contents.contains("pw123456"));

    let alice = Username::parse("alice").unwrap();
    assert!(server.store.authenticate(&alice, "pw123456").await.unwrap());
}
