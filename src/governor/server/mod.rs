// SPDX-License-Identifier: MIT

//! HTTP run control surface

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::error::GovernorError;
use super::state::RunState;
use super::workflow::{GovernanceService, RunRequest};
use crate::flow::{Checkpoint, EngineError, RunSnapshot};

static API_INDEX: Lazy<Value> = Lazy::new(|| {
    json!({
        "service": "ruleguard",
        "routes": [
            "GET /api/health",
            "GET /api/runs",
            "POST /api/runs",
            "GET /api/runs/{id}",
            "GET /api/runs/{id}/checkpoints",
            "POST /api/runs/{id}/approval",
            "POST /api/runs/stream"
        ]
    })
});

pub fn router(service: GovernanceService) -> Router {
    Router::new()
        .route("/api", get(index))
        .route("/api/health", get(health_check))
        .route("/api/runs", get(list_runs).post(create_run))
        .route("/api/runs/stream", post(stream_run))
        .route("/api/runs/{id}", get(get_run))
        .route("/api/runs/{id}/checkpoints", get(get_checkpoints))
        .route("/api/runs/{id}/approval", post(submit_approval))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(service)
}

pub async fn serve(
    service: GovernanceService,
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = router(service);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Maps governor errors onto HTTP statuses
struct ApiError(GovernorError);

impl From<GovernorError> for ApiError {
    fn from(e: GovernorError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            GovernorError::Flow(flow) => match flow.as_engine() {
                Some(EngineError::NotSuspended { .. }) => StatusCode::CONFLICT,
                Some(EngineError::MissingCheckpoint(_)) => StatusCode::NOT_FOUND,
                Some(EngineError::UnknownNode(_)) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            GovernorError::Input(_) | GovernorError::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("Request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn index() -> Json<Value> {
    Json(API_INDEX.clone())
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_runs(State(service): State<GovernanceService>) -> Result<Json<Value>, ApiError> {
    let runs = service.runs().await?;
    Ok(Json(json!({ "runs": runs })))
}

#[derive(Deserialize)]
struct StartRequest {
    #[serde(flatten)]
    run: RunRequest,
    /// Return the run id immediately instead of waiting for suspension
    #[serde(default)]
    detached: bool,
}

async fn create_run(
    State(service): State<GovernanceService>,
    Json(payload): Json<StartRequest>,
) -> Result<Response, ApiError> {
    if payload.detached {
        let run_id = service.start_detached(payload.run).await?;
        return Ok((StatusCode::ACCEPTED, Json(json!({ "run_id": run_id }))).into_response());
    }
    let snapshot = service.start(payload.run).await?;
    Ok((StatusCode::CREATED, Json(snapshot)).into_response())
}

async fn get_run(
    State(service): State<GovernanceService>,
    Path(id): Path<String>,
) -> Result<Json<RunSnapshot<RunState>>, ApiError> {
    Ok(Json(service.status(&id).await?))
}

async fn get_checkpoints(
    State(service): State<GovernanceService>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Checkpoint>>, ApiError> {
    Ok(Json(service.checkpoints(&id).await?))
}

#[derive(Deserialize)]
struct ApprovalRequest {
    approved: bool,
    #[serde(default)]
    reviewer: Option<String>,
}

async fn submit_approval(
    State(service): State<GovernanceService>,
    Path(id): Path<String>,
    Json(payload): Json<ApprovalRequest>,
) -> Result<Json<RunSnapshot<RunState>>, ApiError> {
    log::info!("Approval for run {}: {}", id, payload.approved);
    let snapshot = service
        .submit_approval(&id, payload.approved, payload.reviewer.as_deref())
        .await?;
    Ok(Json(snapshot))
}

async fn stream_run(
    State(service): State<GovernanceService>,
    Json(payload): Json<RunRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel(100);

    tokio::spawn(async move {
        log::info!("Starting streaming run for {}", payload.table_name);
        if let Err(e) = service.start_streaming(payload, tx).await {
            log::error!("Streaming run could not start: {}", e);
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        Ok(Event::default()
            .json_data(&event)
            .unwrap_or_else(|e| Event::default().event("error").data(e.to_string())))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(1)))
}
