use crate::AppState;
use axum::body::HttpBody;
use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;

/// Records request count, duration, response size and errors for every
/// request, and holds an in-flight guard while the handler runs.
pub async fn track_metrics(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(metrics) = state.metrics.clone() else {
        return next.run(request).await;
    };

    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());

    let _in_flight = metrics.in_flight().enter();
    let started = Instant::now();

    let response = next.run(request).await;

    let response_size = response.body().size_hint().exact().unwrap_or(0);
    metrics.record_http(
        &method,
        &path,
        response.status().as_u16(),
        started.elapsed(),
        response_size,
    );

    response
}
