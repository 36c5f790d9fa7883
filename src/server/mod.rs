use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::llm::provider::LlmProvider;
use crate::pipeline::ChatPipeline;
use crate::python::{CodeExecutor, STATIC_URL_PREFIX};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub text: String,
    pub images: Vec<String>,
}

pub fn router<P, E>(pipeline: Arc<ChatPipeline<P, E>>, static_dir: &Path) -> Router
where
    P: LlmProvider + Send + Sync + 'static,
    E: CodeExecutor + Send + Sync + 'static,
{
    Router::new()
        .route("/chat", post(chat::<P, E>))
        .route("/health", get(health))
        .nest_service(STATIC_URL_PREFIX, ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .with_state(pipeline)
}

/// Binds `bind_addr` and serves until ctrl-c.
pub async fn serve(bind_addr: &str, app: Router) -> Result<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {bind_addr}"))?;
    let local_addr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, "tablechat backend listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server terminated unexpectedly")?;

    tracing::info!("tablechat backend stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
}

async fn chat<P, E>(
    State(pipeline): State<Arc<ChatPipeline<P, E>>>,
    Json(request): Json<ChatRequest>,
) -> Response
where
    P: LlmProvider + Send + Sync + 'static,
    E: CodeExecutor + Send + Sync + 'static,
{
    if request.query.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "query must not be empty");
    }

    match pipeline.answer(&request.query).await {
        Ok(answer) => {
            tracing::info!(
                route = answer.route.as_str(),
                images = answer.images.len(),
                "answered chat request"
            );
            Json(ChatResponse {
                text: answer.text,
                images: answer.images,
            })
            .into_response()
        }
        Err(err) => {
            tracing::error!("chat request failed: {err:#}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &format!("{err:#}"))
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

fn error_response(status: StatusCode, detail: &str) -> Response {
    (status, Json(json!({ "detail": detail }))).into_response()
}
