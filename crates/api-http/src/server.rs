//! Router and handlers.

use crate::error::{error_response, json_error};
use crate::types::{EnqueueBody, JobView};
use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use taskbelt_core::application::{EnqueueRequest, QueueManager};
use taskbelt_core::domain::timestamp::parse_utc;
use taskbelt_core::domain::JobState;
use taskbelt_core::Result;
use tracing::info;

const DEFAULT_RECENT_EVENTS: i64 = 100;

pub fn build_router(manager: Arc<QueueManager>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/stats", get(stats))
        .route("/api/jobs", get(jobs))
        .route("/api/metrics", get(metrics))
        .route("/api/enqueue", post(enqueue))
        .route("/api/retry/:id", post(retry))
        .layer(Extension(manager))
}

/// Serve the dashboard until the task is dropped.
pub async fn serve(addr: SocketAddr, manager: Arc<QueueManager>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "dashboard listening");
    axum::serve(listener, build_router(manager)).await?;
    Ok(())
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn stats(Extension(manager): Extension<Arc<QueueManager>>) -> axum::response::Response {
    match manager.stats().await {
        Ok(counts) => Json(counts).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct JobsQuery {
    state: Option<String>,
}

async fn jobs(
    Extension(manager): Extension<Arc<QueueManager>>,
    Query(query): Query<JobsQuery>,
) -> axum::response::Response {
    let state = match query.state.as_deref().map(str::parse::<JobState>).transpose() {
        Ok(state) => state,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, "validation_error", e),
    };

    match manager.list(state).await {
        Ok(jobs) => {
            let views: Vec<JobView> = jobs.into_iter().map(JobView::from).collect();
            Json(views).into_response()
        }
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct MetricsQuery {
    recent: Option<i64>,
}

async fn metrics(
    Extension(manager): Extension<Arc<QueueManager>>,
    Query(query): Query<MetricsQuery>,
) -> axum::response::Response {
    let recent = query.recent.unwrap_or(DEFAULT_RECENT_EVENTS).max(0);
    match manager.metrics(recent).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => error_response(e),
    }
}

async fn enqueue(
    Extension(manager): Extension<Arc<QueueManager>>,
    Json(body): Json<EnqueueBody>,
) -> axum::response::Response {
    let run_at = match body.run_at.as_deref().map(parse_utc).transpose() {
        Ok(run_at) => run_at,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, "validation_error", e),
    };

    let request = EnqueueRequest {
        id: body.id,
        command: body.command,
        priority: body.priority,
        max_retries: body.max_retries,
        run_at,
    };

    match manager.enqueue(request).await {
        Ok(job) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "job_id": job.id,
                "state": job.state.to_string(),
                "priority": job.priority,
            })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn retry(
    Extension(manager): Extension<Arc<QueueManager>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match manager.retry_dead(&id).await {
        Ok(()) => Json(serde_json::json!({
            "job_id": id,
            "state": "pending",
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}
