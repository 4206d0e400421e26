//! REST API server for the analyst gateway
//!
//! Exposes the orchestrator via HTTP endpoints for the chat UI.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::capabilities::WatchlistRegistrar;
use crate::models::ChatRequest;
use crate::orchestrator::Orchestrator;

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub watchlist: Option<Arc<WatchlistRegistrar>>,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "sessions": state.orchestrator.sessions().len().await,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Chat Endpoint
/// =============================

async fn chat_handler(State(state): State<ApiState>, Json(req): Json<ChatRequest>) -> Response {
    match state.orchestrator.process_message(req).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) if e.is_contract_violation() => {
            (StatusCode::BAD_REQUEST, Json(ApiResponse::error(e.to_string()))).into_response()
        }
        Err(e) => {
            error!("Chat request failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("Internal error".into())),
            )
                .into_response()
        }
    }
}

/// =============================
/// Session Endpoints
/// =============================

async fn session_info(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    let info = state.orchestrator.get_session_info(&session_id).await;
    (StatusCode::OK, Json(ApiResponse::success(info)))
}

async fn clear_session(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    state.orchestrator.clear_session(&session_id).await;
    (
        StatusCode::OK,
        Json(ApiResponse::success(serde_json::json!({ "cleared": session_id }))),
    )
}

async fn session_transcript(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    let entries = state.orchestrator.transcript(&session_id).await;
    (StatusCode::OK, Json(ApiResponse::success(entries)))
}

/// =============================
/// Watchlist Endpoint
/// =============================

async fn list_watchlist(State(state): State<ApiState>) -> (StatusCode, Json<ApiResponse>) {
    let Some(registrar) = state.watchlist else {
        return (StatusCode::OK, Json(ApiResponse::success(Vec::<()>::new())));
    };

    match registrar.list().await {
        Ok(entries) => (StatusCode::OK, Json(ApiResponse::success(entries))),
        Err(e) => {
            error!("Watchlist listing failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::error("Watchlist unavailable".into())),
            )
        }
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(
    orchestrator: Arc<Orchestrator>,
    watchlist: Option<Arc<WatchlistRegistrar>>,
) -> Router {
    let state = ApiState {
        orchestrator,
        watchlist,
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat_handler))
        .route("/api/sessions/:id", get(session_info).delete(clear_session))
        .route("/api/sessions/:id/transcript", get(session_transcript))
        .route("/api/watchlist", get(list_watchlist))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    orchestrator: Arc<Orchestrator>,
    watchlist: Option<Arc<WatchlistRegistrar>>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator, watchlist);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
