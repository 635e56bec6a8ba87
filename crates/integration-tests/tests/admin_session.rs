//! Admin mode and session invalidation over HTTP.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use reqwest::StatusCode;
use serde_json::{Value, json};
use studydesk_core::{Role, Username};
use studydesk_integration_tests::TestServer;

async fn server_with_admin() -> TestServer {
    let server = TestServer::start().await.unwrap();
    let root = Username::parse("root").unwrap();
    server
        .store
        .register_with_role(&root, "rootpass1", Role::Admin)
        .await
        .unwrap();
    let alice = Username::parse("alice").unwrap();
    server.store.register(&alice, "pw123456").await.unwrap();
    server
}

#[tokio::test]
async fn test_admin_resets_password() {
    let server = server_with_admin().await;
    let admin = server.client().unwrap();

    let resp = server
        .post(
            &admin,
            "/auth/login",
            &json!({"username": "root", "password": "rootpass1"}),
        )
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["admin_mode"], true);

    let resp = server
        .post(
            &admin,
            "/admin/reset-password",
            &json!({"target": "alice", "new_password": "resetpw1"}),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let user = server.client().unwrap();
    let resp = server
        .post(
            &user,
            "/auth/login",
            &json!({"username": "alice", "password": "resetpw1"}),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_admin_session_dropped_when_demoted() {
    let server = server_with_admin().await;
    let admin = server.client().unwrap();
    server
        .post(
            &admin,
            "/auth/login",
            &json!({"username": "root", "password": "rootpass1"}),
        )
        .await
        .unwrap();

    // Out-of-band demotion: the record now carries the user role
    let root = Username::parse("root").unwrap();
    assert!(server.store.delete(&root).await.unwrap());
    server.store.register(&root, "rootpass1").await.unwrap();

    let resp = server
        .post(
            &admin,
            "/admin/reset-password",
            &json!({"target": "alice", "new_password": "resetpw1"}),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(server.session(&admin).await.unwrap()["logged_in"], false);

    let alice = Username::parse("alice").unwrap();
    assert!(server.store.authenticate(&alice, "pw123456").await.unwrap());
}

#[tokio::test]
async fn test_exit_admin_logs_out() {
    let server = server_with_admin().await;
    let admin = server.client().unwrap();
    server
        .post(
            &admin,
            "/auth/login",
            &json!({"username": "root", "password": "rootpass1"}),
        )
        .await
        .unwrap();

    let resp = server.post(&admin, "/admin/exit", &json!({})).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = server
        .post(
            &admin,
            "/admin/reset-password",
            &json!({"target": "alice", "new_password": "resetpw1"}),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sentinel_username_has_no_special_meaning() {
    let server = TestServer::start().await.unwrap();
    let client = server.client().unwrap();

    let resp = server
        .post(
            &client,
            "/auth/login",
            &json!({"username": "admin_sentinel", "password": "anything1"}),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(server.session(&client).await.unwrap()["admin_mode"], false);
}
