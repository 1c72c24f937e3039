//! HTTP tests for the API router over the in-memory store.
//!
//! Each test binds the router to an ephemeral port and talks to it over
//! real HTTP, including a full client sync through `voxnote-sync`.

use std::net::SocketAddr;
use std::sync::Arc;

use uuid::Uuid;

use voxnote_api::{app, AppState};
use voxnote_core::{Category, Entry, SyncStatus};
use voxnote_db::{FilesystemAudioStore, MemoryStore};
use voxnote_inference::mock::{MockClassifier, MockEmbedder};
use voxnote_ingest::{IngestService, IngestionPipeline};
use voxnote_sync::{HttpRemoteApi, HttpRemoteConfig, LocalStore, SyncEngine, SyncOutcome};

struct Server {
    addr: SocketAddr,
    client: reqwest::Client,
    user: Uuid,
}

impl Server {
    async fn start(classifier: MockClassifier, audio: Option<FilesystemAudioStore>) -> Self {
        let store = MemoryStore::new();
        let pipeline = IngestionPipeline::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(classifier),
            Arc::new(MockEmbedder::new()),
        );
        let service = IngestService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(pipeline),
        );
        let mut state = AppState::new(service, Arc::new(store));
        if let Some(audio) = audio {
            state = state.with_audio(audio);
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app(state)).await.unwrap();
        });

        Self {
            addr,
            client: reqwest::Client::new(),
            user: Uuid::new_v4(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(self.url(path))
            .header("X-User-Id", self.user.to_string())
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(self.url(path))
            .header("X-User-Id", self.user.to_string())
    }
}

#[tokio::test]
async fn test_health() {
    let server = Server::start(MockClassifier::new(), None).await;
    let resp = server.client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_missing_user_header_is_bad_request() {
    let server = Server::start(MockClassifier::new(), None).await;
    let resp = server
        .client
        .get(server.url("/api/v1/categories"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("X-User-Id"));
}

#[tokio::test]
async fn test_ingest_classifies_and_lists() {
    let server = Server::start(MockClassifier::new().with_category("Travel"), None).await;

    let resp = server
        .post("/api/v1/entries")
        .json(&serde_json::json!({
            "user_id": Uuid::nil(),
            "transcript": "book flights to Rome",
            "locale": "en"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let entry: Entry = resp.json().await.unwrap();
    assert_eq!(entry.user_id, server.user, "header wins over body");
    assert!(entry.is_pending);

    let categories: Vec<Category> = server
        .get("/api/v1/categories")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(categories.len(), 1);
    assert_eq!(categories[0].name, "Travel");
    assert_eq!(entry.category_id, Some(categories[0].id));
}

#[tokio::test]
async fn test_ingest_error_statuses() {
    let server = Server::start(MockClassifier::new(), None).await;

    let resp = server
        .post("/api/v1/entries")
        .json(&serde_json::json!({
            "user_id": server.user,
            "transcript": "   ",
            "locale": "en"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let missing = Uuid::new_v4();
    let resp = server
        .post("/api/v1/entries")
        .json(&serde_json::json!({
            "user_id": server.user,
            "transcript": "water the plants",
            "locale": "en",
            "category_id": missing
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], format!("Category not found: {}", missing));
}

#[tokio::test]
async fn test_duplicate_category_is_conflict() {
    let server = Server::start(MockClassifier::new(), None).await;
    let body = serde_json::json!({
        "id": Uuid::new_v4(),
        "user_id": server.user,
        "name": "Work"
    });

    let first = server.post("/api/v1/categories").json(&body).send().await.unwrap();
    assert_eq!(first.status(), 201);
    let second = server.post("/api/v1/categories").json(&body).send().await.unwrap();
    assert_eq!(second.status(), 409);
}

#[tokio::test]
async fn test_audio_upload_requires_storage() {
    let server = Server::start(MockClassifier::new(), None).await;
    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(vec![1, 2, 3]).file_name("a.wav"),
    );
    let resp = server.post("/api/v1/audio").multipart(form).send().await.unwrap();
    assert_eq!(resp.status(), 503);
}

#[tokio::test]
async fn test_audio_upload_returns_reference() {
    let dir = tempfile::tempdir().unwrap();
    let server = Server::start(
        MockClassifier::new(),
        Some(FilesystemAudioStore::new(dir.path())),
    )
    .await;
    let part = reqwest::multipart::Part::bytes(vec![0u8; 32])
        .file_name("note.ogg")
        .mime_str("audio/ogg")
        .unwrap();
    let form = reqwest::multipart::Form::new().part("file", part);

    let resp = server.post("/api/v1/audio").multipart(form).send().await.unwrap();
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = resp.json().await.unwrap();
    let reference = body["audio_ref"].as_str().unwrap();
    assert!(reference.ends_with(".ogg"));
    assert!(dir.path().join(reference).exists());
}

#[tokio::test]
async fn test_client_sync_over_http() {
    let server = Server::start(MockClassifier::new().with_category("Ideas"), None).await;
    let config = HttpRemoteConfig::new(format!("http://{}", server.addr)).with_user_id(server.user);
    let local = Arc::new(LocalStore::new(config.require_user_id().unwrap()));
    let remote = HttpRemoteApi::new(config);
    let engine = Arc::new(SyncEngine::new(local.clone(), Arc::new(remote)));

    let home = local.create_category("Home").unwrap();
    local.add_entry("fix the tap", "en", Some(home.id), None).unwrap();
    local.add_entry("an app for plant care", "en", None, None).unwrap();

    let report = engine.request_sync().wait().await.unwrap();
    assert_eq!(report.outcome, SyncOutcome::Completed);
    assert!(report.item_errors.is_empty(), "{:?}", report.item_errors);
    assert_eq!(local.pending_count(), 0);
    assert_eq!(local.entries().len(), 2);
    assert_eq!(local.categories().len(), 2);

    // A second client for the same user sees the same state.
    let other = Arc::new(LocalStore::new(server.user));
    let other_engine = Arc::new(SyncEngine::new(
        other.clone(),
        Arc::new(HttpRemoteApi::new(HttpRemoteConfig::new(format!(
            "http://{}",
            server.addr
        )))),
    ));
    other_engine.request_sync().wait().await.unwrap();
    assert_eq!(other.entries().len(), 2);
    assert_eq!(other.category_status(home.id), Some(SyncStatus::Synced));
}
