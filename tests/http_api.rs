use std::sync::Arc;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use docchat::config::Settings;
use docchat::embed::HashingEmbedder;
use docchat::generate::{PlaceholderGenerator, PLACEHOLDER_ANSWER};
use docchat::server::{router, AppState};

async fn spawn_app() -> String {
    spawn_app_with(Settings {
        embedding_provider: "hashing".to_string(),
        ..Settings::default()
    })
    .await
}

async fn spawn_app_with(settings: Settings) -> String {
    let state = AppState::new(
        settings,
        Arc::new(HashingEmbedder::new(384)),
        Arc::new(PlaceholderGenerator),
    )
    .unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    format!("http://{addr}")
}

fn file_part(name: &str, body: &[u8]) -> Part {
    Part::bytes(body.to_vec()).file_name(name.to_string())
}

async fn upload(client: &Client, base: &str, form: Form) -> (StatusCode, Value) {
    let resp = client
        .post(format!("{base}/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    let status = resp.status();
    (status, resp.json().await.unwrap())
}

async fn chat(client: &Client, base: &str, body: Value) -> (StatusCode, Value) {
    let resp = client
        .post(format!("{base}/chat"))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status();
    (status, resp.json().await.unwrap())
}

async fn entries(client: &Client, base: &str) -> u64 {
    let stats: Value = client
        .get(format!("{base}/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    stats["entries"].as_u64().unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let base = spawn_app().await;
    let body: Value = reqwest::get(format!("{base}/health")).await.unwrap().json().await.unwrap();
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn upload_then_chat_round_trip() {
    let base = spawn_app().await;
    let client = Client::new();

    let form = Form::new().part("files", file_part("sky.txt", b"The sky is blue."));
    let (status, uploaded) = upload(&client, &base, form).await;
    assert_eq!(status, StatusCode::OK, "{uploaded}");
    assert_eq!(uploaded["indexed"], 1);
    assert_eq!(uploaded["documents"][0]["file_name"], "sky.txt");
    let document_id = uploaded["documents"][0]["document_id"].as_str().unwrap().to_string();
    let session_id = uploaded["session_id"].as_str().unwrap().to_string();

    let (status, answer) = chat(
        &client,
        &base,
        json!({ "session_id": session_id, "message": "What color is the sky?" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{answer}");
    assert_eq!(answer["session_id"], session_id.as_str());
    assert_eq!(answer["answer"], PLACEHOLDER_ANSWER);
    assert_eq!(answer["chunk_ids"][0], format!("{document_id}:0"));
    assert_eq!(answer["sources"][0]["file_name"], "sky.txt");

    let sessions: Value = reqwest::get(format!("{base}/sessions")).await.unwrap().json().await.unwrap();
    assert_eq!(sessions["sessions"], json!([session_id]));
}

#[tokio::test]
async fn unsupported_upload_is_415_and_leaves_index_unchanged() {
    let base = spawn_app().await;
    let client = Client::new();

    let form = Form::new().part("files", file_part("sky.txt", b"The sky is blue."));
    let (status, _) = upload(&client, &base, form).await;
    assert_eq!(status, StatusCode::OK);
    let before = entries(&client, &base).await;

    let form = Form::new().part("files", file_part("report.docx", b"PK\x03\x04"));
    let (status, body) = upload(&client, &base, form).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body["error"], "unsupported_format");
    assert_eq!(body["document"], "report.docx");
    assert_eq!(entries(&client, &base).await, before);
}

#[tokio::test]
async fn multi_file_upload_stops_at_first_failure() {
    let base = spawn_app().await;
    let client = Client::new();

    let form = Form::new()
        .part("files", file_part("sky.txt", b"The sky is blue."))
        .part("files", file_part("slides.pptx", b"not supported"))
        .part("files", file_part("grass.txt", b"Grass is green."));
    let (status, body) = upload(&client, &base, form).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body["document"], "slides.pptx");
    assert_eq!(body["ingested"].as_array().unwrap().len(), 1);
    assert_eq!(body["ingested"][0]["file_name"], "sky.txt");
    assert_eq!(entries(&client, &base).await, 1);
}

#[tokio::test]
async fn chat_on_empty_index_is_409() {
    let base = spawn_app().await;
    let client = Client::new();
    let (status, body) = chat(&client, &base, json!({ "message": "Anything there?" })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "index_error");
}

#[tokio::test]
async fn unknown_session_is_404() {
    let base = spawn_app().await;
    let client = Client::new();
    let form = Form::new().part("files", file_part("sky.txt", b"The sky is blue."));
    upload(&client, &base, form).await;

    let (status, body) = chat(
        &client,
        &base,
        json!({ "session_id": "00000000-0000-4000-8000-000000000000", "message": "Hi?" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "session_not_found");
}

#[tokio::test]
async fn blank_message_is_400() {
    let base = spawn_app().await;
    let client = Client::new();
    let (status, body) = chat(&client, &base, json!({ "message": "   " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");
}

#[tokio::test]
async fn upload_with_unknown_session_starts_a_new_one() {
    let base = spawn_app().await;
    let client = Client::new();
    let stale = "00000000-0000-4000-8000-000000000000";

    let form = Form::new()
        .text("session_id", stale)
        .part("files", file_part("sky.txt", b"The sky is blue."));
    let (status, body) = upload(&client, &base, form).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["indexed"], 1);
    let fresh = body["session_id"].as_str().unwrap();
    assert_ne!(fresh, stale);

    let (status, _) = chat(&client, &base, json!({ "session_id": fresh, "message": "Sky?" })).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn oversized_upload_is_413() {
    let base = spawn_app_with(Settings {
        embedding_provider: "hashing".to_string(),
        max_upload_bytes: 1024,
        ..Settings::default()
    })
    .await;
    let client = Client::new();

    let big = "The sky is blue. ".repeat(512);
    let form = Form::new().part("files", file_part("big.txt", big.as_bytes()));
    let (status, body) = upload(&client, &base, form).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE, "{body}");
    assert_eq!(body["error"], "payload_too_large");
    assert_eq!(entries(&client, &base).await, 0);
}
