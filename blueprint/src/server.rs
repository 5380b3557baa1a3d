//! HTTP surface
//!
//! - `POST /v1/workflow` `{plan, query}`: compile a plan
//! - `POST /v1/call` `{query}`: compile a single call from the request text
//! - `GET /health`

use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;

use crate::compiler::Compiler;
use crate::output::CompileOutput;

struct ServerState {
    compiler: Arc<Compiler>,
}

#[derive(Debug, Deserialize)]
struct WorkflowRequest {
    #[serde(default)]
    plan: Value,
    #[serde(default)]
    query: String,
}

#[derive(Debug, Deserialize)]
struct CallRequest {
    #[serde(default)]
    query: String,
}

/// Build the router over a shared compiler.
pub fn router(compiler: Arc<Compiler>) -> Router {
    let state = Arc::new(ServerState { compiler });
    Router::new()
        .route("/v1/workflow", post(handle_workflow))
        .route("/v1/call", post(handle_call))
        .route("/health", get(handle_health))
        .with_state(state)
}

/// Serve until Ctrl+C.
pub async fn run_server(compiler: Arc<Compiler>, addr: SocketAddr) -> anyhow::Result<()> {
    let app = router(compiler);

    log::info!("Starting blueprint server on http://{}", addr);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    log::info!("Blueprint server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        log::error!("Failed to install Ctrl+C handler: {}", err);
        return;
    }
    log::info!("Ctrl+C received, shutting down...");
}

async fn handle_health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "server": "blueprint" }))
}

fn empty_query() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "query must not be empty" })),
    )
        .into_response()
}

async fn handle_workflow(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<WorkflowRequest>,
) -> Response {
    if request.query.trim().is_empty() {
        return empty_query();
    }

    let output = state.compiler.compile(&request.plan, &request.query).await;
    let status = match output {
        CompileOutput::Rejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        CompileOutput::Workflow { .. } => StatusCode::OK,
    };
    (status, Json(output)).into_response()
}

async fn handle_call(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<CallRequest>,
) -> Response {
    if request.query.trim().is_empty() {
        return empty_query();
    }

    let outcome = state.compiler.compile_call(&request.query).await;
    (StatusCode::OK, Json(outcome)).into_response()
}
