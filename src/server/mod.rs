//! HTTP API over the project store and chat service

use crate::attachments::Upload;
use crate::config::Config;
use crate::conversation::{ChatError, ChatService};
use crate::llm::{Orchestrator, ProviderKind};
use crate::preview::{compose_preview, PREVIEW_SANDBOX};
use crate::project::AiSettings;
use crate::store::{spawn_external_sync, JsonFileBackend, ProjectStore, StoreError};
use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

/// Shared application state
pub struct AppState {
    chat: ChatService,
    default_provider: ProviderKind,
}

impl AppState {
    pub fn new(chat: ChatService, default_provider: ProviderKind) -> Self {
        Self {
            chat,
            default_provider,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    default_provider: ProviderKind,
}

#[derive(Debug, Deserialize)]
struct CreateProjectRequest {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct RenameRequest {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ArchiveRequest {
    archived: bool,
}

#[derive(Debug, Deserialize, Default)]
struct DeleteQuery {
    #[serde(default)]
    confirm: bool,
}

#[derive(Debug, Deserialize, Default)]
struct PreviewQuery {
    /// Wrap the document in a sandboxed iframe host page
    #[serde(default)]
    embed: bool,
}

#[derive(Debug, Deserialize, Default)]
struct ListQuery {
    /// Include archived projects
    #[serde(default)]
    archived: bool,
}

/// Attachment carried inline in a chat request
#[derive(Debug, Deserialize)]
struct AttachmentPayload {
    name: String,
    #[serde(default)]
    mime_type: Option<String>,
    data_base64: String,
}

/// Request for one chat turn
#[derive(Debug, Deserialize)]
struct MessageRequest {
    prompt: String,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    attachments: Vec<AttachmentPayload>,
}

#[derive(Debug, Deserialize)]
struct SelectRequest {
    id: String,
}

/// Project summary for listings
#[derive(Debug, Serialize)]
struct ProjectSummary {
    id: String,
    name: String,
    file_count: usize,
    message_count: usize,
    updated_at: chrono::DateTime<chrono::Utc>,
    archived: bool,
}

/// Build the API router over existing state
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/projects", get(list_projects).post(create_project))
        .route("/projects/:id", get(get_project).delete(delete_project))
        .route("/projects/:id/rename", post(rename_project))
        .route("/projects/:id/archive", post(archive_project))
        .route("/projects/:id/messages", post(send_message))
        .route("/projects/:id/preview", get(preview_project))
        .route("/settings", get(get_settings).put(put_settings))
        .route(
            "/active",
            get(get_active).put(set_active).delete(clear_active),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Start the HTTP server with the file-backed store
pub async fn run_http_server(host: &str, port: u16, config: Config) -> Result<()> {
    let data_dir = config.data_dir();
    tracing::info!("Data directory: {}", data_dir.display());

    let backend = JsonFileBackend::new(&data_dir)?;
    let store = ProjectStore::load(Box::new(backend)).context("Failed to load projects")?;
    let subscription = store.subscribe()?;
    let orchestrator = Orchestrator::new(&config)?;
    let default_provider: ProviderKind = config.llm.default_provider.parse()?;

    let store = Arc::new(Mutex::new(store));
    match subscription {
        Some(subscription) => {
            spawn_external_sync(store.clone(), subscription);
        }
        None => tracing::warn!("Storage backend cannot report outside changes"),
    }

    let chat = ChatService::new(store, Arc::new(orchestrator));
    let app = router(Arc::new(AppState::new(chat, default_provider)));

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;
    tracing::info!("HTTP server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn error_response(status: StatusCode, message: impl ToString) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.to_string() })),
    )
        .into_response()
}

fn store_error_response(e: StoreError) -> Response {
    let status = match &e {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Ambiguous { .. } => StatusCode::BAD_REQUEST,
        StoreError::Corrupt { .. } | StoreError::Backend(_) => {
            tracing::error!("Storage failure: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(status, e)
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        default_provider: state.default_provider,
    })
}

async fn list_projects(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<ProjectSummary>> {
    let store = state.chat.store().lock().await;
    let mut projects: Vec<ProjectSummary> = store
        .projects()
        .iter()
        .filter(|p| query.archived || !p.archived)
        .map(|p| ProjectSummary {
            id: p.id.clone(),
            name: p.name.clone(),
            file_count: p.files.len(),
            message_count: p.messages.len(),
            updated_at: p.updated_at,
            archived: p.archived,
        })
        .collect();
    projects.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    Json(projects)
}

async fn create_project(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProjectRequest>,
) -> Response {
    let mut store = state.chat.store().lock().await;
    match store.create(&req.name) {
        Ok(project) => (StatusCode::CREATED, Json(project)).into_response(),
        Err(e) => store_error_response(e),
    }
}

async fn get_project(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let store = state.chat.store().lock().await;
    match store.resolve(&id) {
        Ok(project) => Json(project.clone()).into_response(),
        Err(e) => store_error_response(e),
    }
}

async fn rename_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<RenameRequest>,
) -> Response {
    let mut store = state.chat.store().lock().await;
    let id = match store.resolve(&id) {
        Ok(project) => project.id.clone(),
        Err(e) => return store_error_response(e),
    };
    match store.rename(&id, &req.name) {
        Ok(true) => Json(store.get(&id).cloned()).into_response(),
        Ok(false) => error_response(StatusCode::BAD_REQUEST, "Project name must not be blank"),
        Err(e) => store_error_response(e),
    }
}

async fn archive_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ArchiveRequest>,
) -> Response {
    let mut store = state.chat.store().lock().await;
    let id = match store.resolve(&id) {
        Ok(project) => project.id.clone(),
        Err(e) => return store_error_response(e),
    };
    match store.set_archived(&id, req.archived) {
        Ok(()) => Json(store.get(&id).cloned()).into_response(),
        Err(e) => store_error_response(e),
    }
}

async fn delete_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Response {
    let mut store = state.chat.store().lock().await;
    let id = match store.resolve(&id) {
        Ok(project) => project.id.clone(),
        Err(e) => return store_error_response(e),
    };
    match store.delete(&id, |_| query.confirm) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => error_response(
            StatusCode::BAD_REQUEST,
            "Deletion cannot be undone; repeat the request with ?confirm=true",
        ),
        Err(e) => store_error_response(e),
    }
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<MessageRequest>,
) -> Response {
    let provider = match req.provider.as_deref() {
        Some(p) => match p.parse::<ProviderKind>() {
            Ok(kind) => kind,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
        },
        None => state.default_provider,
    };

    let mut uploads = Vec::with_capacity(req.attachments.len());
    for attachment in req.attachments {
        let bytes = match STANDARD.decode(attachment.data_base64.trim()) {
            Ok(bytes) => bytes,
            Err(e) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("Attachment '{}' is not valid base64: {}", attachment.name, e),
                )
            }
        };
        uploads.push(Upload::new(
            attachment.name,
            attachment.mime_type.as_deref(),
            bytes,
        ));
    }

    match state.chat.send(&id, &req.prompt, provider, uploads).await {
        Ok(project) => Json(project).into_response(),
        Err(e @ ChatError::EmptyPrompt) => error_response(StatusCode::BAD_REQUEST, e),
        Err(ChatError::Generation(e)) => error_response(StatusCode::BAD_GATEWAY, e),
        Err(ChatError::Store(e)) => store_error_response(e),
    }
}

async fn preview_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<PreviewQuery>,
) -> Response {
    let store = state.chat.store().lock().await;
    let project = match store.resolve(&id) {
        Ok(project) => project,
        Err(e) => return store_error_response(e),
    };
    let doc = compose_preview(&project.files);

    if query.embed {
        let page = format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n<title>Preview</title>\n\
<style>html,body,iframe{{margin:0;width:100%;height:100%;border:0}}</style>\n</head>\n\
<body>\n{}\n</body>\n</html>\n",
            doc.iframe()
        );
        return (
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            page,
        )
            .into_response();
    }

    (
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
            (
                header::CONTENT_SECURITY_POLICY,
                format!("sandbox {}", PREVIEW_SANDBOX),
            ),
        ],
        doc.html,
    )
        .into_response()
}

async fn get_settings(State(state): State<Arc<AppState>>) -> Json<AiSettings> {
    let store = state.chat.store().lock().await;
    Json(store.settings().clone())
}

async fn put_settings(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<AiSettings>,
) -> Response {
    let mut store = state.chat.store().lock().await;
    match store.update_settings(settings) {
        Ok(()) => Json(store.settings().clone()).into_response(),
        Err(e) => store_error_response(e),
    }
}

async fn get_active(State(state): State<Arc<AppState>>) -> Response {
    let store = state.chat.store().lock().await;
    Json(serde_json::json!({
        "active": store.active(),
        "error": store.error(),
    }))
    .into_response()
}

async fn set_active(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SelectRequest>,
) -> Response {
    let mut store = state.chat.store().lock().await;
    let id = match store.resolve(&req.id) {
        Ok(project) => project.id.clone(),
        Err(e) => return store_error_response(e),
    };
    match store.select(&id) {
        Ok(()) => Json(serde_json::json!({ "active": store.active() })).into_response(),
        Err(e) => store_error_response(e),
    }
}

async fn clear_active(State(state): State<Arc<AppState>>) -> StatusCode {
    state.chat.store().lock().await.deselect();
    StatusCode::NO_CONTENT
}
