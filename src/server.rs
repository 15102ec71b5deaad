//! HTTP surface: upload, chat, and a small chat page.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::chunk::FixedSizeChunker;
use crate::config::Settings;
use crate::embed::{self, Embedder};
use crate::error::{Error, Result};
use crate::generate::{self, Generator};
use crate::index::{SharedIndex, VectorIndex};
use crate::ingest::{IngestReport, IngestionPipeline};
use crate::rag::{RagOptions, RagOrchestrator, Source};
use crate::session::SessionStore;
use crate::snapshot::Snapshot;

const INDEX_HTML: &str = include_str!("../static/index.html");
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Everything a request handler needs, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub pipeline: Arc<IngestionPipeline>,
    pub orchestrator: Arc<RagOrchestrator>,
    pub index: SharedIndex,
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    /// Wires the components around the given providers and reloads the
    /// snapshot when one is configured.
    pub fn new(
        settings: Settings,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        let index = VectorIndex::from_settings(&settings).shared();
        let snapshot = match &settings.snapshot_dir {
            Some(dir) => Some(Arc::new(Snapshot::open(dir)?)),
            None => None,
        };
        let sessions = Arc::new(SessionStore::new(settings.session_ttl(), settings.max_sessions));

        let pipeline = Arc::new(IngestionPipeline::new(
            FixedSizeChunker::new(settings.chunk_size, settings.chunk_overlap),
            embedder.clone(),
            index.clone(),
            snapshot,
        ));
        pipeline.restore()?;

        let orchestrator = Arc::new(RagOrchestrator::new(
            embedder,
            index.clone(),
            generator,
            sessions.clone(),
            RagOptions::from_settings(&settings),
        ));

        Ok(Self {
            settings: Arc::new(settings),
            pipeline,
            orchestrator,
            index,
            sessions,
        })
    }

    pub fn from_settings(settings: Settings) -> Result<Self> {
        let embedder = embed::from_settings(&settings)?;
        let generator = generate::from_settings(&settings)?;
        tracing::info!(
            embedder = embedder.model_name(),
            dimension = embedder.dimension(),
            generator = generator.name(),
            "providers ready"
        );
        Self::new(settings, embedder, generator)
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingested: Option<Vec<IngestReport>>,
}

type ApiError = (StatusCode, Json<ErrorBody>);
type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        Error::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::Embedding(_) | Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        Error::Generation(_) => StatusCode::BAD_GATEWAY,
        Error::GenerationTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        Error::Index(_) => StatusCode::CONFLICT,
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        Error::SessionNotFound(_) => StatusCode::NOT_FOUND,
    }
}

fn error_response(err: Error) -> ApiError {
    upload_error(err, None, Vec::new())
}

fn upload_error(err: Error, document: Option<String>, ingested: Vec<IngestReport>) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::error!(kind = err.kind(), document = ?document, "{err}");
    } else {
        tracing::warn!(kind = err.kind(), document = ?document, "{err}");
    }
    let ingested = if document.is_some() { Some(ingested) } else { None };
    (
        status,
        Json(ErrorBody {
            error: err.kind(),
            message: err.to_string(),
            document,
            ingested,
        }),
    )
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.settings.max_upload_bytes;
    Router::new()
        .route("/", get(index_page))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/sessions", get(list_sessions))
        .route("/upload", post(upload))
        .route("/chat", post(chat))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn index_page() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    entries: usize,
    dimensions: Option<usize>,
    sessions: usize,
    search_method: String,
}

async fn stats(State(state): State<AppState>) -> ApiResult<StatsResponse> {
    let index = state
        .index
        .read()
        .map_err(|_| error_response(Error::Index("index lock poisoned".to_string())))?;
    Ok(Json(StatsResponse {
        entries: index.len(),
        dimensions: index.dimensions(),
        sessions: state.sessions.len(),
        search_method: index.search_method().to_string(),
    }))
}

async fn list_sessions(State(state): State<AppState>) -> Json<Value> {
    let sessions: Vec<String> = state.sessions.list().iter().map(Uuid::to_string).collect();
    Json(json!({ "sessions": sessions }))
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    session_id: Uuid,
    indexed: usize,
    message: String,
    documents: Vec<IngestReport>,
}

struct UploadedFile {
    file_name: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

async fn read_upload(mut multipart: Multipart) -> Result<(Vec<UploadedFile>, Option<String>)> {
    let mut files = Vec::new();
    let mut session_id = None;
    let bad_multipart = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Error::PayloadTooLarge(format!("upload exceeds the size limit: {e}"))
        } else {
            Error::InvalidInput(format!("malformed multipart body: {e}"))
        }
    };

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("files") | Some("file") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(bad_multipart)?;
                files.push(UploadedFile {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            Some("session_id") => {
                session_id = Some(field.text().await.map_err(bad_multipart)?);
            }
            other => tracing::debug!(field = ?other, "ignoring unknown multipart field"),
        }
    }
    Ok((files, session_id))
}

async fn upload(State(state): State<AppState>, multipart: Multipart) -> ApiResult<UploadResponse> {
    let (files, session_id) = read_upload(multipart).await.map_err(error_response)?;
    if files.is_empty() {
        return Err(error_response(Error::InvalidInput(
            "no files in upload; send them as `files` fields".to_string(),
        )));
    }
    // an unknown or expired id starts a new session
    let session_id = match state.sessions.resolve(session_id.as_deref()) {
        Err(Error::SessionNotFound(stale)) => {
            tracing::info!(session_id = %stale, "upload with an unknown session; starting a new one");
            state.sessions.create()
        }
        resolved => resolved.map_err(error_response)?,
    };

    let mut documents: Vec<IngestReport> = Vec::with_capacity(files.len());
    for file in files {
        let pipeline = state.pipeline.clone();
        let file_name = file.file_name.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            pipeline.ingest_bytes(&file.file_name, file.content_type.as_deref(), file.bytes)
        })
        .await
        .map_err(|e| Error::Embedding(format!("ingestion task failed: {e}")))
        .and_then(|result| result);

        match outcome {
            Ok(report) => documents.push(report),
            Err(err) => return Err(upload_error(err, Some(file_name), documents)),
        }
    }

    let indexed = documents.iter().map(|d| d.chunks).sum();
    let message = format!("Indexed {indexed} chunks from {} document(s).", documents.len());
    Ok(Json(UploadResponse {
        session_id,
        indexed,
        message,
        documents,
    }))
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    session_id: Option<String>,
    message: String,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    session_id: Uuid,
    answer: String,
    chunk_ids: Vec<String>,
    sources: Vec<Source>,
}

async fn chat(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<ChatResponse> {
    let Json(request) = payload
        .map_err(|e| error_response(Error::InvalidInput(format!("invalid chat request: {e}"))))?;
    let answer = state
        .orchestrator
        .ask(&request.message, request.session_id.as_deref())
        .await
        .map_err(error_response)?;
    Ok(Json(ChatResponse {
        session_id: answer.session_id,
        answer: answer.answer,
        chunk_ids: answer.chunk_ids,
        sources: answer.sources,
    }))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {err}");
    }
    tracing::info!("shutting down");
}

/// Builds the application from `settings` and serves it until Ctrl-C.
pub async fn serve(settings: Settings) -> anyhow::Result<()> {
    let addr: SocketAddr = settings
        .bind_address()
        .parse()
        .with_context(|| format!("invalid bind address {}", settings.bind_address()))?;

    let state = tokio::task::spawn_blocking(move || AppState::from_settings(settings))
        .await
        .context("startup task failed")?
        .context("failed to initialise docchat")?;

    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            sessions.purge_expired();
        }
    });

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("docchat listening on http://{addr}");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown")?;
    Ok(())
}
