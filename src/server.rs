//! HTTP chat server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/schools` | Configured schools and whether their index is ready |
//! | `POST` | `/chat` | One dialogue turn |
//!
//! # Error Contract
//!
//! Every error response has the same shape:
//!
//! ```json
//! { "error": { "code": "unknown_school", "message": "unknown school: 'sophism'" } }
//! ```
//!
//! | Status | When | Message |
//! |--------|------|---------|
//! | 400 | empty question, bad mode | what is wrong |
//! | 404 | unknown school | the error |
//! | 503 | index not ready, model mismatch, service failure | generic apology |
//! | 504 | generator timeout | generic apology |
//!
//! A refusal is not an error: out-of-scope questions return 200 with
//! `refused: true` and the school's refusal text, so a client can always
//! tell "outside this school" apart from "system unavailable".
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use philosophy_rag_core::engine::{DialogueEngine, TurnError};
use philosophy_rag_core::error::{ErrorCategory, RagError};
use philosophy_rag_core::models::{Citation, Query, ResponseMode};

use crate::app;
use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DialogueEngine>,
}

/// Build the router over an already-bootstrapped engine.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/schools", get(handle_schools))
        .route("/chat", post(handle_chat))
        .layer(cors)
        .with_state(state)
}

/// Bootstrap the engine and serve on `[server].bind` until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let app = app::bootstrap(config.clone()).await?;
    let not_ready: Vec<&str> = app
        .registry
        .ids()
        .filter(|id| !app.catalog.is_ready(id))
        .collect();
    if !not_ready.is_empty() {
        tracing::warn!(schools = ?not_ready, "some schools have no index; run `philo build`");
    }

    let state = AppState {
        engine: Arc::clone(&app.engine),
    };
    let bind_addr = config.server.bind.clone();
    println!("Philosophy server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<TurnError> for AppError {
    fn from(err: TurnError) -> Self {
        let status = match (&err.source, err.category()) {
            (_, ErrorCategory::CallerError) => StatusCode::NOT_FOUND,
            (RagError::GeneratorTimeout { .. }, _) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::SERVICE_UNAVAILABLE,
        };
        let message = match err.category() {
            ErrorCategory::CallerError => err.source.to_string(),
            _ => err.user_message().to_string(),
        };
        tracing::warn!(stage = %err.stage, code = err.code(), error = %err.source, "chat turn failed");
        AppError {
            status,
            code: err.code().to_string(),
            message,
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /schools ============

#[derive(Serialize)]
struct SchoolInfo {
    id: String,
    name: String,
    description: String,
    ready: bool,
}

#[derive(Serialize)]
struct SchoolListResponse {
    schools: Vec<SchoolInfo>,
}

async fn handle_schools(State(state): State<AppState>) -> Json<SchoolListResponse> {
    let catalog = state.engine.retriever().catalog();
    let schools = state
        .engine
        .schools()
        .iter()
        .map(|s| SchoolInfo {
            id: s.id.clone(),
            name: s.name.clone(),
            description: s.description.clone(),
            ready: catalog.is_ready(&s.id),
        })
        .collect();
    Json(SchoolListResponse { schools })
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    question: String,
    #[serde(alias = "school_id")]
    school: String,
    #[serde(default)]
    mode: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    query_id: String,
    school_id: String,
    text: String,
    citations: Vec<Citation>,
    socratic: bool,
    refused: bool,
    confidence: f32,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }
    let mode = match req.mode.as_deref() {
        None => ResponseMode::default(),
        Some(m) => m.parse::<ResponseMode>().map_err(bad_request)?,
    };

    let query = Query::new(req.question, req.school, mode);
    let response = state.engine.respond_to(&query).await?;

    Ok(Json(ChatResponse {
        query_id: query.id,
        school_id: response.school_id,
        text: response.text,
        citations: response.citations,
        socratic: response.socratic,
        refused: response.refused,
        confidence: response.confidence,
    }))
}
