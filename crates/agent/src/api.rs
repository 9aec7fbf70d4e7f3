//! HTTP API: capacity, job control, health checks and Prometheus metrics

use agent_lib::{
    error::AgentError,
    facade::GridAgent,
    health::ComponentStatus,
    models::{
        GpuLoadReport, GpuLoadSource, Job, JobStatus, LoadReport, ReclaimFailure, ReclaimStage,
        RunRequest, RunResponse,
    },
};
use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};
use utoipa::{IntoParams, OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub agent: GridAgent,
}

impl AppState {
    pub fn new(agent: GridAgent) -> Self {
        Self { agent }
    }
}

/// Error body; every failure carries at least `error`
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, example = "runtime_unreachable")]
    pub kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failures: Option<Vec<ReclaimFailure>>,
}

/// Failures surfaced by the HTTP layer
#[derive(Debug)]
pub enum ApiError {
    /// 400 - request failed validation before reaching the agent
    BadRequest(String),
    /// 500 - failure outside the agent taxonomy
    Internal(String),
    Agent(AgentError),
}

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        Self::Agent(err)
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Agent(err) => match err {
                AgentError::TelemetryUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
                AgentError::RuntimeUnreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
                AgentError::RuntimeCommand { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                AgentError::ContainerNotFound(_) => StatusCode::NOT_FOUND,
                AgentError::JobOutputMalformed { .. } => StatusCode::BAD_GATEWAY,
                AgentError::PartialReclamation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self {
            ApiError::BadRequest(msg) => ErrorResponse {
                error: msg,
                kind: Some("bad_request"),
                failures: None,
            },
            ApiError::Internal(msg) => ErrorResponse {
                error: msg,
                kind: Some("internal_error"),
                failures: None,
            },
            ApiError::Agent(err) => {
                let kind = Some(err.kind());
                let error = err.to_string();
                let failures = match err {
                    AgentError::PartialReclamation(report) => Some(report.failures),
                    _ => None,
                };
                ErrorResponse {
                    error,
                    kind,
                    failures,
                }
            }
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Query of `PUT /server/load`
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LoadQuery {
    /// Target CPU load, 0 to 100
    pub percent: u32,
    /// How long to hold the load, in seconds
    pub timestamp: u64,
}

/// Current and theoretical host capacity
#[utoipa::path(
    get,
    path = "/server/load",
    tag = "capacity",
    responses(
        (status = 200, description = "Capacity snapshot", body = LoadReport),
        (status = 500, description = "Telemetry unavailable", body = ErrorResponse)
    )
)]
async fn get_load(State(state): State<Arc<AppState>>) -> ApiResult<Json<LoadReport>> {
    let snapshot = state.agent.read_capacity().await?;
    Ok(Json(LoadReport::from(&snapshot)))
}

/// Start the load generator; answers with its job id as a JSON string
#[utoipa::path(
    put,
    path = "/server/load",
    tag = "capacity",
    params(LoadQuery),
    responses(
        (status = 200, description = "Load generator job id", body = String),
        (status = 400, description = "Invalid percent or duration", body = ErrorResponse),
        (status = 503, description = "Container runtime unreachable", body = ErrorResponse)
    )
)]
async fn put_load(
    State(state): State<Arc<AppState>>,
    query: Result<Query<LoadQuery>, QueryRejection>,
) -> ApiResult<Json<String>> {
    let Query(query) = query?;
    if query.percent > 100 {
        return Err(ApiError::BadRequest(format!(
            "percent must be between 0 and 100, got {}",
            query.percent
        )));
    }
    debug!(
        percent = query.percent,
        timestamp = query.timestamp,
        "Synthetic load requested"
    );

    let id = state
        .agent
        .impose_synthetic_load(query.percent, query.timestamp)
        .await?;
    Ok(Json(id))
}

/// Launch a container; the optional body is the environment mapping
#[utoipa::path(
    post,
    path = "/docker/run",
    tag = "containers",
    params(RunRequest),
    request_body(
        content = HashMap<String, String>,
        description = "Environment for the container, may be empty"
    ),
    responses(
        (status = 201, description = "Container started", body = RunResponse),
        (status = 400, description = "Invalid image or environment", body = ErrorResponse),
        (status = 500, description = "Runtime rejected the launch", body = ErrorResponse),
        (status = 502, description = "Waited job printed no single JSON document", body = ErrorResponse),
        (status = 503, description = "Container runtime unreachable", body = ErrorResponse)
    )
)]
async fn run_container(
    State(state): State<Arc<AppState>>,
    query: Result<Query<RunRequest>, QueryRejection>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<RunResponse>)> {
    let Query(request) = query?;
    validate_image(&request.image)?;
    let environment = parse_environment(&body)?;

    let response = state.agent.launch_job(request.into_spec(environment)).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Reject empty images and values that docker would parse as a flag
fn validate_image(image: &str) -> ApiResult<()> {
    if image.trim().is_empty() {
        return Err(ApiError::BadRequest("image must not be empty".to_string()));
    }
    if image.starts_with('-') {
        return Err(ApiError::BadRequest(format!(
            "invalid image reference {:?}",
            image
        )));
    }
    Ok(())
}

/// Empty body means no environment
fn parse_environment(body: &[u8]) -> ApiResult<HashMap<String, String>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(HashMap::new());
    }
    serde_json::from_slice(body).map_err(|e| {
        ApiError::BadRequest(format!(
            "body must be a JSON object of string values: {}",
            e
        ))
    })
}

#[utoipa::path(
    get,
    path = "/docker/containers",
    tag = "containers",
    responses(
        (status = 200, description = "Every container, running or stopped", body = Vec<Job>),
        (status = 503, description = "Container runtime unreachable", body = ErrorResponse)
    )
)]
async fn list_containers(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Job>>> {
    Ok(Json(state.agent.list_jobs().await?))
}

#[utoipa::path(
    delete,
    path = "/docker/containers/all",
    tag = "containers",
    responses(
        (status = 204, description = "Every container stopped and removed"),
        (status = 500, description = "Some containers could not be reclaimed", body = ErrorResponse),
        (status = 503, description = "Container runtime unreachable", body = ErrorResponse)
    )
)]
async fn reclaim_containers(State(state): State<Arc<AppState>>) -> ApiResult<StatusCode> {
    state.agent.reclaim_all().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
#[utoipa::path(
    get,
    path = "/healthz",
    tag = "operations",
    responses(
        (status = 200, description = "Healthy or degraded"),
        (status = 503, description = "Unhealthy")
    )
)]
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.agent.health().health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
#[utoipa::path(
    get,
    path = "/readyz",
    tag = "operations",
    responses(
        (status = 200, description = "Ready"),
        (status = 503, description = "Not ready")
    )
)]
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.agent.health().readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "operations",
    responses((status = 200, description = "Prometheus text exposition", content_type = "text/plain"))
)]
async fn metrics() -> ApiResult<impl IntoResponse> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ApiError::Internal(format!("failed to encode metrics: {}", e)))?;

    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    ))
}

/// OpenAPI document served at `/api/openapi.json`
#[derive(OpenApi)]
#[openapi(
    info(title = "Grid agent API", description = "Capacity reporting and container jobs of a grid worker"),
    paths(
        get_load,
        put_load,
        run_container,
        list_containers,
        reclaim_containers,
        healthz,
        readyz,
        metrics
    ),
    components(schemas(
        LoadReport,
        GpuLoadReport,
        GpuLoadSource,
        RunResponse,
        Job,
        JobStatus,
        ReclaimFailure,
        ReclaimStage,
        ErrorResponse
    )),
    tags(
        (name = "capacity", description = "Host capacity and synthetic load"),
        (name = "containers", description = "Container jobs"),
        (name = "operations", description = "Health and metrics")
    )
)]
pub struct ApiDoc;

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/server/load", get(get_load).put(put_load))
        .route("/docker/run", post(run_container))
        .route("/docker/containers", get(list_containers))
        .route("/docker/containers/all", delete(reclaim_containers))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
        .merge(SwaggerUi::new("/api/swagger").url("/api/openapi.json", ApiDoc::openapi()))
}

/// Start the API server, returning once `shutdown` resolves and in-flight requests finish
pub async fn serve<F>(port: u16, state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_lib::models::ReclaimReport;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                AgentError::TelemetryUnavailable("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                AgentError::RuntimeUnreachable("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (AgentError::ContainerNotFound("x".into()), StatusCode::NOT_FOUND),
            (
                AgentError::PartialReclamation(ReclaimReport::default()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status_code(), expected);
        }
    }

    #[test]
    fn test_validate_image() {
        assert!(validate_image("busybox").is_ok());
        assert!(validate_image("registry.local:5000/grid/job:1.2").is_ok());
        assert!(validate_image("").is_err());
        assert!(validate_image("--privileged").is_err());
        assert!(validate_image("-v=/:/host").is_err());
    }

    #[test]
    fn test_parse_environment() {
        assert!(parse_environment(b"").unwrap().is_empty());
        assert!(parse_environment(b" \n").unwrap().is_empty());
        assert_eq!(parse_environment(br#"{"A": "1"}"#).unwrap()["A"], "1");
        assert!(parse_environment(br#"{"A": 1}"#).is_err());
        assert!(parse_environment(b"[]").is_err());
    }
}
