// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ollama backends against a mock server.

use base64::Engine;
use edgerag_config::EdgeRagConfig;
use edgerag_core::traits::{BackendFactory, PluginAdapter};
use edgerag_core::types::{RawImage, StreamingIncrement};
use edgerag_ollama::OllamaBackendFactory;
use futures::StreamExt;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MODEL: &str = "gemma3n:e4b";

fn ndjson(lines: &[serde_json::Value]) -> ResponseTemplate {
    let body: String = lines.iter().map(|l| format!("{l}\n")).collect();
    ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson")
}

fn factory(server: &MockServer) -> OllamaBackendFactory {
    let mut config = EdgeRagConfig::default();
    config.backend.base_url = server.uri();
    config.backend.model = MODEL.to_string();
    OllamaBackendFactory::from_config(&config).unwrap()
}

async fn mount_tags(server: &MockServer, models: &[&str]) {
    let models: Vec<_> = models.iter().map(|m| json!({"name": m})).collect();
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": models})))
        .mount(server)
        .await;
}

async fn mount_unload(server: &MockServer, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({"keep_alive": 0})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"done": true})))
        .expect(expected)
        .mount(server)
        .await;
}

async fn mount_load(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({"stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"done": true})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn text_backend_streams_deltas() {
    let server = MockServer::start().await;
    mount_tags(&server, &[MODEL]).await;
    mount_load(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({
            "stream": true,
            "prompt": "Where is the fire extinguisher?",
            "options": {"num_predict": 1024, "top_k": 64}
        })))
        .respond_with(ndjson(&[
            json!({"response": "Under ", "done": false}),
            json!({"response": "the sink.", "done": false}),
            json!({"response": "", "done": true, "done_reason": "stop", "eval_count": 4}),
        ]))
        .mount(&server)
        .await;

    let backend = factory(&server).load_text_backend().await.unwrap();
    let increments: Vec<_> = backend
        .generate("Where is the fire extinguisher?")
        .await
        .unwrap()
        .map(|r| r.unwrap())
        .collect()
        .await;

    assert_eq!(
        increments,
        vec![
            StreamingIncrement::Delta("Under ".into()),
            StreamingIncrement::Delta("the sink.".into()),
        ]
    );
}

#[tokio::test]
async fn missing_model_fails_initialization() {
    let server = MockServer::start().await;
    mount_tags(&server, &["llava:7b"]).await;

    let err = factory(&server).load_text_backend().await.err().unwrap();
    let message = err.to_string();
    assert!(message.contains("failed to initialize"), "got: {message}");
    assert!(message.contains("ollama pull gemma3n:e4b"), "got: {message}");
}

#[tokio::test]
async fn mid_stream_error_is_surfaced() {
    let server = MockServer::start().await;
    mount_tags(&server, &[MODEL]).await;
    mount_load(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(ndjson(&[
            json!({"response": "Partial", "done": false}),
            json!({"error": "llama runner process has terminated"}),
        ]))
        .mount(&server)
        .await;

    let backend = factory(&server).load_text_backend().await.unwrap();
    let mut stream = backend.generate("q").await.unwrap();
    assert!(stream.next().await.unwrap().is_ok());
    let err = stream.next().await.unwrap().unwrap_err();
    assert!(err.to_string().contains("runner process"), "got: {err}");
}

#[tokio::test]
async fn shutdown_unloads_once() {
    let server = MockServer::start().await;
    mount_tags(&server, &[MODEL]).await;
    mount_unload(&server, 1).await;
    mount_load(&server).await;

    let backend = factory(&server).load_text_backend().await.unwrap();
    backend.shutdown().await.unwrap();
    backend.shutdown().await.unwrap();
    assert!(backend.generate("q").await.is_err());
}

#[tokio::test]
async fn vision_session_sends_image_and_reports_cumulative_text() {
    let server = MockServer::start().await;
    let image = RawImage::new(vec![0x89, b'P', b'N', b'G'], "image/png");
    let encoded = base64::engine::general_purpose::STANDARD.encode(&image.bytes);

    mount_unload(&server, 1).await;
    mount_load(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({
            "stream": true,
            "images": [encoded],
            "prompt": "What is this?",
            "options": {"num_predict": 512, "top_k": 32}
        })))
        .respond_with(ndjson(&[
            json!({"response": "A red ", "done": false}),
            json!({"response": "extinguisher.", "done": false}),
            json!({"response": "", "done": true}),
        ]))
        .expect(1)
        .mount(&server)
        .await;

    let factory = factory(&server);
    let options = factory.build_multimodal_options().unwrap();
    let backend = factory.create_multimodal_backend(&options).await.unwrap();
    let session_options = factory.build_session_options(&options).unwrap();
    assert!(session_options.enable_vision);
    let mut session = backend.create_session(&session_options).await.unwrap();

    session.add_image(&image).await.unwrap();
    session.add_query_chunk("What is this?").await.unwrap();
    let increments: Vec<_> = session
        .generate()
        .await
        .unwrap()
        .map(|r| r.unwrap())
        .collect()
        .await;
    session.close().await.unwrap();
    backend.close().await.unwrap();

    assert_eq!(
        increments,
        vec![
            StreamingIncrement::Cumulative("A red ".into()),
            StreamingIncrement::Cumulative("A red extinguisher.".into()),
        ]
    );
}

#[tokio::test]
async fn session_enforces_image_first_and_limit() {
    let server = MockServer::start().await;
    mount_load(&server).await;

    let factory = factory(&server);
    let options = factory.build_multimodal_options().unwrap();
    let backend = factory.create_multimodal_backend(&options).await.unwrap();
    let session_options = factory.build_session_options(&options).unwrap();
    let image = RawImage::new(vec![1, 2, 3], "image/jpeg");

    let mut session = backend.create_session(&session_options).await.unwrap();
    session.add_image(&image).await.unwrap();
    assert!(session.add_image(&image).await.is_err());

    let mut session = backend.create_session(&session_options).await.unwrap();
    session.add_query_chunk("text first").await.unwrap();
    assert!(session.add_image(&image).await.is_err());
}

#[tokio::test]
async fn vision_model_out_of_memory_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": "model requires more system memory (9.1 GiB) than is available (3.8 GiB)"
        })))
        .mount(&server)
        .await;

    let factory = factory(&server);
    let options = factory.build_multimodal_options().unwrap();
    let err = factory.create_multimodal_backend(&options).await.err().unwrap();
    assert!(err.is_out_of_memory(), "got: {err}");
}
