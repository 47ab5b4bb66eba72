pub mod health;
pub mod metrics;

use crate::error::{ExporterError, Result};
use crate::exporter::Exporter;
use axum::response::Html;
use axum::{Router, routing::get};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// HTTP server state shared across all handlers
#[derive(Clone)]
pub struct HttpState {
    pub exporter: Arc<Exporter>,
    pub metrics_path: String,
    pub service_start_time: std::time::Instant,
}

impl HttpState {
    pub fn new(exporter: Arc<Exporter>, metrics_path: impl Into<String>) -> Self {
        Self {
            exporter,
            metrics_path: metrics_path.into(),
            service_start_time: std::time::Instant::now(),
        }
    }
}

/// Create the HTTP router with all endpoints
pub fn create_router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(landing_handler))
        .route("/health", get(health::health_handler))
        .route(&state.metrics_path, get(metrics::metrics_handler))
        .with_state(state)
}

async fn landing_handler(
    axum::extract::State(state): axum::extract::State<HttpState>,
) -> Html<String> {
    Html(format!(
        "<html><head><title>Ceph Exporter</title></head><body>\
         <h1>Ceph Exporter</h1><p><a href=\"{0}\">{0}</a></p></body></html>",
        state.metrics_path
    ))
}

/// Run the HTTP server until `shutdown` resolves
pub async fn run_http_server<F>(addr: SocketAddr, state: HttpState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ExporterError::Network(format!("Failed to bind HTTP server: {e}")))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ExporterError::Network(format!("HTTP server error: {e}")))?;

    info!("HTTP server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExporterConfig;
    use crate::testing::FakeConn;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn state(path: &str) -> HttpState {
        let exporter =
            Exporter::new(Arc::new(FakeConn::new()), ExporterConfig::default()).unwrap();
        HttpState::new(Arc::new(exporter), path)
    }

    #[tokio::test]
    async fn test_landing_page_links_metrics_path() {
        let response = create_router(state("/custom"))
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&body).contains("href=\"/custom\""));
    }

    #[tokio::test]
    async fn test_metrics_served_on_configured_path() {
        let router = create_router(state("/custom"));

        let response = router
            .clone()
            .oneshot(Request::builder().uri("/custom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
