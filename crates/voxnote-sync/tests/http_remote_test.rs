//! HTTP-level tests for the remote API client.

use chrono::Utc;
use uuid::Uuid;

use voxnote_core::{Category, CreateCategoryRequest, Entry, Error, IngestRequest, RemoteApi};
use voxnote_sync::{HttpRemoteApi, HttpRemoteConfig};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> HttpRemoteApi {
    HttpRemoteApi::new(HttpRemoteConfig::new(server.uri()))
}

fn entry(user_id: Uuid) -> Entry {
    let now = Utc::now();
    Entry {
        id: Uuid::new_v4(),
        user_id,
        transcript: "book flights to Rome".into(),
        title: "Rome flights".into(),
        category_id: Some(Uuid::new_v4()),
        embedding_vector: None,
        locale: "en".into(),
        audio_ref: None,
        created_at: now,
        updated_at: now,
        is_pending: true,
        seen_at: None,
    }
}

#[tokio::test]
async fn test_list_categories_sends_user_header() {
    let server = MockServer::start().await;
    let user = Uuid::new_v4();
    let category = Category::new(Uuid::new_v4(), user, "Travel");

    Mock::given(method("GET"))
        .and(path("/api/v1/categories"))
        .and(header("X-User-Id", user.to_string().as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![category.clone()]))
        .expect(1)
        .mount(&server)
        .await;

    let list = client_for(&server).list_categories(user).await.unwrap();
    assert_eq!(list, vec![category]);
}

#[tokio::test]
async fn test_ingest_posts_request_and_parses_entry() {
    let server = MockServer::start().await;
    let user = Uuid::new_v4();
    let client_id = Uuid::new_v4();
    let created = entry(user);

    Mock::given(method("POST"))
        .and(path("/api/v1/entries"))
        .and(body_partial_json(serde_json::json!({
            "transcript": "book flights to Rome",
            "client_id": client_id,
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(&created))
        .expect(1)
        .mount(&server)
        .await;

    let got = client_for(&server)
        .ingest_entry(IngestRequest {
            user_id: user,
            transcript: "book flights to Rome".into(),
            locale: "en".into(),
            audio_ref: None,
            category_id: None,
            client_id: Some(client_id),
        })
        .await
        .unwrap();
    assert_eq!(got.id, created.id);
    assert!(got.is_pending);
}

#[tokio::test]
async fn test_conflict_is_duplicate() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/api/v1/categories"))
        .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
            "error": format!("Conflict: category {} already exists", id)
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .create_category(CreateCategoryRequest {
            id,
            user_id: Uuid::new_v4(),
            name: "Work".into(),
            note_body: String::new(),
            embedding_centroid: None,
        })
        .await
        .unwrap_err();
    assert!(err.is_duplicate(), "got {:?}", err);
}

#[tokio::test]
async fn test_missing_entry_maps_to_entry_not_found() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("DELETE"))
        .and(path(format!("/api/v1/entries/{}", id)))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": format!("Entry not found: {}", id)
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .delete_entry(Uuid::new_v4(), id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::EntryNotFound(x) if x == id), "got {:?}", err);
}

#[tokio::test]
async fn test_delete_accepts_no_content() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("DELETE"))
        .and(path(format!("/api/v1/categories/{}", id)))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server)
        .delete_category(Uuid::new_v4(), id)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_server_error_is_request_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/entries"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .list_entries(Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Request(ref m) if m.contains("503")), "got {:?}", err);
}

#[tokio::test]
async fn test_malformed_body_is_serialization_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/entries"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .list_entries(Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Serialization(_)), "got {:?}", err);
}
