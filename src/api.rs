//! HTTP surface: the client API and the internal workload callback listener.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::JobError;
use crate::service::{
    InitJobResponse, JobAuth, JobLogsResponse, JobResultResponse, JobService, JobsStatusResponse,
    VersionResponse,
};
use crate::spec_builder::JobConfig;
use crate::state_machine::RepliconTableType;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitJobRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    replicon_table_type: RepliconTableType,
}

#[derive(Debug, Deserialize)]
struct StartJobRequest {
    job: JobAuth,
    #[serde(default)]
    config: JobConfig,
}

#[derive(Debug, Deserialize)]
struct JobsStatusRequest {
    #[serde(default)]
    jobs: Vec<JobAuth>,
}

#[derive(Debug, Deserialize)]
struct WorkloadUpdate {
    #[serde(rename = "jobID")]
    job_id: String,
    status: Option<String>,
    error: Option<String>,
}

impl IntoResponse for JobError {
    fn into_response(self) -> Response {
        let status = match &self {
            JobError::Validation(_) | JobError::AlreadyStarted(_) => StatusCode::BAD_REQUEST,
            JobError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            JobError::NotFound(_) => StatusCode::NOT_FOUND,
            JobError::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
            JobError::Orchestrator(_) | JobError::Store(_) | JobError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
            "internal error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<T, JobError>;

/// Client-facing routes under `/api/v1`.
pub fn router(service: Arc<JobService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/job/init", post(init_job))
        .route("/api/v1/job/start", post(start_job))
        .route("/api/v1/job/list", post(jobs_status))
        .route("/api/v1/job/result", post(job_result))
        .route("/api/v1/job/logs", post(job_logs))
        .route("/api/v1/job/update", post(request_update))
        .route("/api/v1/job", delete(delete_job))
        .route("/api/v1/version", get(version))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Status callbacks from workloads. Served on its own listener, reachable
/// only from inside the cluster.
pub fn update_router(service: Arc<JobService>) -> Router {
    Router::new()
        .route("/internal/v1/update", post(workload_update))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Serve `app` on `addr` until `shutdown` fires.
pub async fn serve(
    addr: SocketAddr,
    app: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn init_job(
    State(service): State<Arc<JobService>>,
    Json(req): Json<InitJobRequest>,
) -> ApiResult<Json<InitJobResponse>> {
    Ok(Json(service.init_job(&req.name, req.replicon_table_type).await?))
}

async fn start_job(
    State(service): State<Arc<JobService>>,
    Json(req): Json<StartJobRequest>,
) -> ApiResult<Json<Value>> {
    service.start_job(&req.job, &req.config).await?;
    Ok(Json(json!({})))
}

async fn jobs_status(
    State(service): State<Arc<JobService>>,
    Json(req): Json<JobsStatusRequest>,
) -> ApiResult<Json<JobsStatusResponse>> {
    Ok(Json(service.get_jobs_status(&req.jobs).await?))
}

async fn job_result(
    State(service): State<Arc<JobService>>,
    Json(auth): Json<JobAuth>,
) -> ApiResult<Json<JobResultResponse>> {
    Ok(Json(service.get_job_result(&auth).await?))
}

async fn job_logs(
    State(service): State<Arc<JobService>>,
    Json(auth): Json<JobAuth>,
) -> ApiResult<Json<JobLogsResponse>> {
    Ok(Json(service.get_job_logs(&auth).await?))
}

async fn request_update(
    State(service): State<Arc<JobService>>,
    Json(auth): Json<JobAuth>,
) -> ApiResult<StatusCode> {
    service.request_update(&auth).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn delete_job(
    State(service): State<Arc<JobService>>,
    Json(auth): Json<JobAuth>,
) -> ApiResult<Json<Value>> {
    service.delete_job(&auth).await?;
    Ok(Json(json!({})))
}

async fn version(State(service): State<Arc<JobService>>) -> Json<VersionResponse> {
    Json(service.version())
}

async fn workload_update(
    State(service): State<Arc<JobService>>,
    Json(update): Json<WorkloadUpdate>,
) -> ApiResult<StatusCode> {
    service
        .workload_update(&update.job_id, update.status.as_deref(), update.error)
        .await?;
    Ok(StatusCode::ACCEPTED)
}
