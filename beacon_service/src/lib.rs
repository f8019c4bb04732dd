pub mod common;
pub mod middleware;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use beacon_core::AggregatorState;
use beacon_metrics::{render_registry, MetricsAggregator, StatsSnapshot};
use common::{fixture_samples, ApiError, MessageResponse, Sample};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

#[derive(Clone)]
pub struct AppState {
    pub metrics: Option<Arc<MetricsAggregator>>,
    pub registry: Option<prometheus::Registry>,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            metrics: None,
            registry: None,
            request_timeout,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsAggregator>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_registry(mut self, registry: prometheus::Registry) -> Self {
        self.registry = Some(registry);
        self
    }
}

#[derive(Debug, Serialize)]
pub struct PipelineStatus {
    pub state: AggregatorState,
    pub sink: String,
    pub stats: StatsSnapshot,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/healthcheck", get(healthcheck))
        .route("/api/v1/samples/:id", get(get_sample))
        .route("/debug/pipeline", get(pipeline_status))
        .route("/metrics", get(prometheus_metrics))
        .layer(TimeoutLayer::new(state.request_timeout))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::track_metrics,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves until `shutdown` resolves, then lets in-flight requests finish.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!("Starting HTTP service on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("HTTP service stopped");
    Ok(())
}

async fn healthcheck() -> Json<MessageResponse> {
    Json(MessageResponse::healthy())
}

async fn get_sample(Path(id): Path<String>) -> Result<Json<Sample>, ApiError> {
    if id.parse::<u64>().is_err() {
        return Err(ApiError::BadRequest("Invalid sample ID".to_string()));
    }

    fixture_samples()
        .into_iter()
        .find(|sample| sample.id == id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("sample {} not found", id)))
}

async fn pipeline_status(State(state): State<AppState>) -> Result<Json<PipelineStatus>, ApiError> {
    let metrics = state
        .metrics
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("metrics are disabled".to_string()))?;

    Ok(Json(PipelineStatus {
        state: metrics.state(),
        sink: metrics.sink_name().to_string(),
        stats: metrics.stats(),
    }))
}

async fn prometheus_metrics(State(state): State<AppState>) -> Result<Response, ApiError> {
    let registry = state
        .registry
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("prometheus sink is not configured".to_string()))?;

    let body = render_registry(registry).map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body).into_response())
}
