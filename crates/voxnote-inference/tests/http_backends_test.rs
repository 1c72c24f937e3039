//! HTTP-level tests for the OpenAI, classifier, and Whisper backends.

use std::sync::Arc;

use voxnote_core::{
    CategoryHint, ClassifierBackend, ClassifyRequest, EmbeddingBackend, Error,
};
use voxnote_inference::openai::{OpenAIBackend, OpenAIConfig};
use voxnote_inference::{LlmClassifier, TranscriptionBackend, WhisperBackend, WhisperConfig};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend_for(server: &MockServer) -> OpenAIBackend {
    let config = OpenAIConfig {
        base_url: server.uri(),
        api_key: Some("test-key".to_string()),
        embed_model: "test-embed".to_string(),
        gen_model: "test-gen".to_string(),
        embed_dimension: 3,
        timeout_seconds: 5,
        skip_tls_verify: false,
    };
    OpenAIBackend::new(config).expect("Failed to create backend")
}

fn chat_reply(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-1",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
}

#[tokio::test]
async fn test_embeddings_are_returned_in_index_order() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(header("Authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                {"embedding": [0.0, 1.0, 0.0], "index": 1},
                {"embedding": [1.0, 0.0, 0.0], "index": 0}
            ],
            "model": "test-embed"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend_for(&server);
    let vectors = backend
        .embed_texts(&["a".to_string(), "b".to_string()])
        .await
        .unwrap();

    assert_eq!(vectors[0], vec![1.0, 0.0, 0.0]);
    assert_eq!(vectors[1], vec![0.0, 1.0, 0.0]);
}

#[tokio::test]
async fn test_embedding_auth_failure_is_config_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": {"message": "bad key", "type": "invalid_request_error", "code": null}
        })))
        .mount(&server)
        .await;

    let err = backend_for(&server).embed_one("x").await.unwrap_err();
    assert!(matches!(err, Error::Config(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_embedding_server_error_is_embedding_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let err = backend_for(&server).embed_one("x").await.unwrap_err();
    assert!(matches!(err, Error::Embedding(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_classifier_parses_json_mode_reply() {
    let server = MockServer::start().await;

    let content = r#"{"cleaned_transcript": "Book the hotel in Porto",
        "title": "Porto hotel", "category_name": "Travel",
        "is_explicit_placement": true, "confidence": 0.91,
        "suggested_new_category": null}"#;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(serde_json::json!({
            "model": "test-gen",
            "response_format": {"type": "json_object"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(content)))
        .expect(1)
        .mount(&server)
        .await;

    let classifier = LlmClassifier::new(Arc::new(backend_for(&server)));
    let req = ClassifyRequest {
        transcript: "uh put this in travel, book the hotel in Porto".to_string(),
        categories: vec![CategoryHint {
            name: "Travel".to_string(),
            recent_item: Some("Lisbon flights".to_string()),
        }],
        locale: "en".to_string(),
    };

    let result = classifier.classify(&req).await.unwrap();
    assert_eq!(result.category_name, "Travel");
    assert!(result.is_explicit_placement);
    assert_eq!(result.cleaned_transcript, "Book the hotel in Porto");
}

#[tokio::test]
async fn test_classifier_rejects_malformed_reply() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(chat_reply(r#"{"category": "Travel"}"#)),
        )
        .mount(&server)
        .await;

    let classifier = LlmClassifier::new(Arc::new(backend_for(&server)));
    let req = ClassifyRequest {
        transcript: "book the hotel".to_string(),
        categories: vec![],
        locale: "en".to_string(),
    };

    let err = classifier.classify(&req).await.unwrap_err();
    assert!(matches!(err, Error::Classification(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_generate_title_uses_plain_chat() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("\"Call the plumber\"")))
        .mount(&server)
        .await;

    let classifier = LlmClassifier::new(Arc::new(backend_for(&server)));
    let title = classifier
        .generate_title("remember to call the plumber", "en")
        .await
        .unwrap();
    assert_eq!(title, "Call the plumber");
}

#[tokio::test]
async fn test_whisper_transcription() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/audio/transcriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "text": " Pick up the kids at five. ",
            "language": "en",
            "duration": 2.4
        })))
        .expect(1)
        .mount(&server)
        .await;

    let whisper = WhisperBackend::new(WhisperConfig::new(server.uri()));
    let result = whisper
        .transcribe(b"RIFF0000WAVE", "audio/wav", Some("en-GB"))
        .await
        .unwrap();

    assert_eq!(result.text, "Pick up the kids at five.");
    assert_eq!(result.language.as_deref(), Some("en-GB"));
}

#[tokio::test]
async fn test_whisper_error_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/audio/transcriptions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("decoder crashed"))
        .mount(&server)
        .await;

    let whisper = WhisperBackend::new(WhisperConfig::new(server.uri()));
    let err = whisper
        .transcribe(b"RIFF", "audio/wav", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transcription(_)));
    assert!(err.to_string().contains("decoder crashed"));
}

#[tokio::test]
async fn test_whisper_gateway_timeout_is_typed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/audio/transcriptions"))
        .respond_with(ResponseTemplate::new(504))
        .mount(&server)
        .await;

    let whisper = WhisperBackend::new(WhisperConfig::new(server.uri()));
    let err = whisper
        .transcribe(b"RIFF", "audio/ogg", Some("fr-FR"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
}
