//! Charta HTTP REST API
//!
//! Axum-based HTTP server exposing chart table extraction and chart Q&A.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to a pure
//! inner function. The inner functions are directly testable without axum
//! dispatch machinery.
//!
//! Endpoints:
//! - GET  /health   — liveness check
//! - GET  /version  — server version info
//! - GET  /status   — backend + Ollama status (cached, 30 s TTL)
//! - GET  /models   — installed Ollama models
//! - POST /extract  — chart image upload → normalized table
//! - POST /question — answer a question about an extracted table
//! - POST /generate — session-scoped conversational generation

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use charta_core::status::check_status;
use charta_core::vision::{ChartVision, VisionError};
use charta_core::{
    extract_table, ChartaConfig, ConversationStore, OllamaClient, OllamaError, StatusCache,
};

use crate::upload;

/// Shared state for all HTTP handlers.
pub struct AppState {
    pub config: ChartaConfig,
    pub vision: Arc<dyn ChartVision>,
    pub ollama: OllamaClient,
    pub status_cache: StatusCache,
    pub conversations: ConversationStore,
}

impl AppState {
    pub fn new(config: ChartaConfig, vision: Arc<dyn ChartVision>) -> Result<Self, OllamaError> {
        let ollama = OllamaClient::new(config.ollama.clone())?;
        let status_cache = StatusCache::new(Duration::from_secs(config.ollama.status_ttl_secs));
        Ok(Self {
            config,
            vision,
            ollama,
            status_cache,
            conversations: ConversationStore::new(),
        })
    }
}

/// Build the Axum router with all endpoints.
pub fn build_router(state: Arc<AppState>) -> Router {
    let max_bytes = state.config.upload.max_bytes;
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/status", get(status_handler))
        .route("/models", get(models_handler))
        .route("/extract", post(extract_handler))
        .route("/question", post(question_handler))
        .route("/generate", post(generate_handler))
        .layer(DefaultBodyLimit::max(max_bytes))
        .layer(cors_layer(&state.config))
        .layer(SetResponseHeaderLayer::if_not_present(
            axum::http::header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            axum::http::header::X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ))
        .with_state(state)
}

/// CORS policy: restricted to configured origins, wildcard for development
/// when none are configured.
fn cors_layer(config: &ChartaConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .http
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    if origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_headers(Any)
            .allow_methods(Any)
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_headers(Any)
            .allow_methods(Any)
    }
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);
    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Charta HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct QuestionRequest {
    pub question: Option<String>,
    pub table_data: Option<String>,
    pub title: Option<String>,
    pub model: Option<String>,
    #[serde(default)]
    pub include_debug: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct GenerateRequest {
    pub input: Option<String>,
    pub session_id: Option<String>,
    pub model: Option<String>,
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner health check — pure liveness, no upstream calls.
pub fn health_inner() -> serde_json::Value {
    serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    })
}

/// Inner version — returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "charta/1",
    })
}

/// Inner status — Ollama availability through the TTL cache.
pub async fn status_inner(state: &AppState) -> (StatusCode, serde_json::Value) {
    let status = state.status_cache.get_or_refresh(&state.ollama).await;
    (
        StatusCode::OK,
        serde_json::json!({
            "status": "Backend is running",
            "ollama_available": status.available,
            "available_models": status.models,
        }),
    )
}

/// Inner models — fresh poll of the model listing.
pub async fn models_inner(state: &AppState) -> (StatusCode, serde_json::Value) {
    let status = check_status(&state.ollama).await;
    if status.available {
        (StatusCode::OK, serde_json::json!({"models": status.models}))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({"error": "Ollama service not running"}),
        )
    }
}

/// Inner extract — validates the upload, runs the vision model, and parses the
/// raw output into a normalized table. The temp copy of the upload is removed
/// on every exit path.
pub async fn extract_inner(
    state: &AppState,
    filename: &str,
    bytes: &[u8],
) -> (StatusCode, serde_json::Value) {
    if filename.is_empty() {
        return error_body(StatusCode::BAD_REQUEST, "No selected file");
    }
    if !upload::allowed_extension(filename, &state.config.upload) {
        tracing::error!(filename, "invalid file type");
        return error_body(StatusCode::BAD_REQUEST, "File type not allowed");
    }

    let temp = match upload::save_temp(bytes) {
        Ok(t) => t,
        Err(e) => return error_body(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    };

    let image = match tokio::fs::read(temp.path()).await {
        Ok(b) => b,
        Err(e) => return error_body(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    };

    tracing::info!(filename, size_bytes = image.len(), "processing chart image");

    let raw = match state.vision.generate(&image).await {
        Ok(raw) => raw,
        Err(VisionError::InvalidImage(msg)) => {
            return error_body(StatusCode::BAD_REQUEST, &format!("Invalid image: {msg}"));
        }
        Err(e) => {
            tracing::error!(error = %e, "chart-to-text inference failed");
            return error_body(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
        }
    };

    let extracted = extract_table(&raw);
    let table = &extracted.table;
    tracing::info!(
        title = %table.title,
        rows = table.rows.len(),
        "extraction complete"
    );

    let data: Vec<serde_json::Value> = table
        .rows
        .iter()
        .map(|row| {
            let map: serde_json::Map<String, serde_json::Value> = table
                .headers
                .iter()
                .zip(row)
                .map(|(h, v)| (h.clone(), serde_json::Value::String(v.clone())))
                .collect();
            serde_json::Value::Object(map)
        })
        .collect();

    (
        StatusCode::OK,
        serde_json::json!({
            "title": table.title,
            "headers": table.headers,
            "data": data,
            "formatted_table": extracted.formatted_table,
            "raw_text": extracted.raw_text,
        }),
    )
}

/// Inner question — validates the payload, resolves the model, and relays the
/// answer. LLM transport failures surface as `"Error: ..."` answer strings in a
/// 200 envelope so the front-end always has something to display.
pub async fn question_inner(
    state: &AppState,
    req: QuestionRequest,
) -> (StatusCode, serde_json::Value) {
    let (Some(question), Some(table_data), Some(title)) = (req.question, req.table_data, req.title)
    else {
        return error_body(StatusCode::BAD_REQUEST, "Missing required fields");
    };

    if table_data.trim().is_empty() {
        return error_body(
            StatusCode::BAD_REQUEST,
            "Invalid table data. Please extract chart data first.",
        );
    }

    let status = check_status(&state.ollama).await;
    if !status.available {
        return error_body(
            StatusCode::SERVICE_UNAVAILABLE,
            "Ollama is not running. Please start Ollama service.",
        );
    }

    let model = match resolve_model(req.model.as_deref(), state, &status.models) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    tracing::info!(model = %model, question = %question, "processing question");

    let answer = state.ollama.ask(&question, &table_data, &title, &model).await;

    let mut body = serde_json::json!({"answer": answer});
    if req.include_debug {
        body["debug_info"] = serde_json::json!({
            "model_used": model,
            "table_data_length": table_data.len(),
        });
    }
    (StatusCode::OK, body)
}

/// Inner generate — session-scoped conversational endpoint. Unlike `/question`,
/// generation failures here map to HTTP 500.
pub async fn generate_inner(
    state: &AppState,
    req: GenerateRequest,
) -> (StatusCode, serde_json::Value) {
    let input = match req.input {
        Some(i) if !i.trim().is_empty() => i,
        _ => return error_body(StatusCode::BAD_REQUEST, "Missing input data"),
    };
    let session_id = req.session_id.unwrap_or_else(|| "default".to_string());

    let status = check_status(&state.ollama).await;
    if !status.available {
        return error_body(StatusCode::SERVICE_UNAVAILABLE, "Ollama service is not available");
    }

    let model = match resolve_model(req.model.as_deref(), state, &status.models) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let context = state.conversations.recent(&session_id);
    let prompt = charta_core::prompt::build_chat_prompt(&context, &input);

    match state.ollama.generate(&model, &prompt).await {
        Ok(reply) => {
            state.conversations.append_exchange(&session_id, &input, &reply);
            (StatusCode::OK, serde_json::json!({"result": reply}))
        }
        Err(e) => {
            tracing::error!(error = %e, session_id = %session_id, "generation failed");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(health_inner()))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = status_inner(&state).await;
    (status, Json(body))
}

pub async fn models_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = models_inner(&state).await;
    (status, Json(body))
}

pub async fn extract_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("image") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = match field.bytes().await {
            Ok(b) => b,
            Err(e) => {
                let (status, body) =
                    error_body(StatusCode::BAD_REQUEST, &format!("Failed to read upload: {e}"));
                return (status, Json(body));
            }
        };
        let (status, body) = extract_inner(&state, &filename, &bytes).await;
        return (status, Json(body));
    }
    let (status, body) = error_body(StatusCode::BAD_REQUEST, "No image file provided");
    (status, Json(body))
}

pub async fn question_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QuestionRequest>,
) -> impl IntoResponse {
    let (status, body) = question_inner(&state, req).await;
    (status, Json(body))
}

pub async fn generate_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateRequest>,
) -> impl IntoResponse {
    let (status, body) = generate_inner(&state, req).await;
    (status, Json(body))
}

// ============================================================================
// Helpers
// ============================================================================

fn error_body(status: StatusCode, message: &str) -> (StatusCode, serde_json::Value) {
    (status, serde_json::json!({"error": message}))
}

/// Pick the model for a generation request. A model that is not installed is an
/// explicit client error naming the alternatives; silently substituting another
/// model would change answer provenance.
fn resolve_model(
    requested: Option<&str>,
    state: &AppState,
    available: &[String],
) -> Result<String, (StatusCode, serde_json::Value)> {
    if available.is_empty() {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "error": "Ollama has no models installed. Pull one with 'ollama pull llama3'."
            }),
        ));
    }

    let model = requested.unwrap_or(&state.config.ollama.default_model);
    if available.iter().any(|m| m == model) {
        Ok(model.to_string())
    } else {
        Err((
            StatusCode::BAD_REQUEST,
            serde_json::json!({
                "error": format!("Model '{model}' is not installed"),
                "available_models": available,
            }),
        ))
    }
}

// ============================================================================
// Unit Tests — call inner functions directly
// ============================================================================
