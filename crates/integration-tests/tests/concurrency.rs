//! Concurrent registrations must all persist.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::json;
use studydesk_core::Username;
use studydesk_integration_tests::TestServer;
use studydesk_server::store::{CredentialStore, LocalFileStore, file_format};

const WRITERS: usize = 24;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_http_registrations_all_persist() {
    let server = Arc::new(TestServer::start().await.unwrap());

    let mut handles = Vec::with_capacity(WRITERS);
    for i in 0..WRITERS {
        let server = Arc::clone(&server);
        handles.push(tokio::spawn(async move {
            let client = server.client().unwrap();
            let username = format!("student{i}");
            server
                .post(
                    &client,
                    "/auth/register",
                    &json!({"username": username, "password": "pw123456", "confirm": "pw123456"}),
                )
                .await
                .unwrap()
                .status()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::CREATED);
    }

    let users = file_format::decode(&server.users_file().unwrap()).unwrap();
    assert_eq!(users.len(), WRITERS);
    for i in 0..WRITERS {
        assert!(users.contains_key(format!("student{i}").as_str()));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_store_writers_share_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = CredentialStore::new(LocalFileStore::new(dir.path().join("users.json")));

    let mut handles = Vec::with_capacity(WRITERS);
    for i in 0..WRITERS {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let username = Username::parse(&format!("writer{i}")).unwrap();
            store.register(&username, "pw123456").await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for i in 0..WRITERS {
        let username = Username::parse(&format!("writer{i}")).unwrap();
        assert!(store.authenticate(&username, "pw123456").await.unwrap());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_registration_race_has_one_winner() {
    let server = Arc::new(TestServer::start().await.unwrap());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let server = Arc::clone(&server);
        handles.push(tokio::spawn(async move {
            let client = server.client().unwrap();
            server
                .post(
                    &client,
                    "/auth/register",
                    &json!({"username": "alice", "password": "pw123456", "confirm": "pw123456"}),
                )
                .await
                .unwrap()
                .status()
        }));
    }

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StatusCode::CREATED => created += 1,
            status => assert_eq!(status, StatusCode::CONFLICT),
        }
    }
    assert_eq!(created, 1);
}
