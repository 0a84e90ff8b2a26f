//! Status dashboard: a small JSON API plus the static web assets.

use crate::agent::monitor::{StatusBoard, StatusSnapshot};
use crate::dispatch::{Dashboard, DashboardTarget};
use crate::state::{Collaborator, SharedState};
use anyhow::{Context, Result};
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use std::sync::OnceLock;
use tower_http::services::ServeDir;

#[derive(Clone)]
struct ApiState {
    board: StatusBoard,
    instance_id: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct HealthResponse {
    pub instance_id: String,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub instance_id: String,
    #[serde(flatten)]
    pub status: StatusSnapshot,
}

/// Build the dashboard router for `target`.
pub fn router(target: &DashboardTarget, board: StatusBoard) -> Router {
    let state = ApiState {
        board,
        instance_id: target.instance_id.clone(),
    };
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .with_state(state)
        .fallback_service(ServeDir::new(&target.assets))
}

async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        instance_id: state.instance_id,
        status: "ok",
    })
}

async fn status(State(state): State<ApiState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        instance_id: state.instance_id,
        status: state.board.snapshot(),
    })
}

/// HTTP server for the dashboard, run on its own tokio runtime.
pub struct WebServer {
    board: StatusBoard,
    state: OnceLock<SharedState>,
}

impl WebServer {
    pub fn new(board: StatusBoard) -> Self {
        Self {
            board,
            state: OnceLock::new(),
        }
    }

    async fn run(&self, target: &DashboardTarget) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&target.listen)
            .await
            .with_context(|| format!("Failed to bind dashboard to {}", target.listen))?;
        tracing::info!(
            "Dashboard {} for {} listening on {} (assets {})",
            target.http.name,
            target.instance_id,
            target.listen,
            target.assets.display()
        );
        axum::serve(listener, router(target, self.board.clone()))
            .await
            .context("Dashboard server failed")
    }
}

impl Collaborator for WebServer {
    fn name(&self) -> &'static str {
        "webui"
    }

    fn attach(&self, state: &SharedState) {
        if self.state.set(state.clone()).is_err() {
            tracing::debug!("Web UI already attached, keeping the first state");
        }
    }
}

impl Dashboard for WebServer {
    fn serve(&self, target: &DashboardTarget) -> Result<()> {
        if self.state.get().is_none() {
            anyhow::bail!("web UI used before shared state was attached");
        }
        if !target.assets.is_dir() {
            tracing::warn!("Dashboard assets {} not found", target.assets.display());
        }
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("webui")
            .build()
            .context("Failed to start dashboard runtime")?;
        runtime.block_on(self.run(target))
    }
}
