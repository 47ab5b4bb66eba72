use axum::{extract::State, http::StatusCode, http::header, response::Response};
use prometheus::{Encoder, TextEncoder};
use tracing::error;

use super::HttpState;

/// Run one scrape cycle and render it in the text exposition format
pub async fn metrics_handler(
    State(state): State<HttpState>,
) -> Result<Response<String>, StatusCode> {
    let encoder = TextEncoder::new();
    let metric_families = state.exporter.collect_all().await;

    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer).map_err(|e| {
        error!(error = %e, "Failed to encode metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let response = String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, encoder.format_type())
        .body(response)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
