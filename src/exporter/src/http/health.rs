use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};

use super::HttpState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub checks: HealthChecks,
}

/// What the last scrape cycle learned about the cluster
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthChecks {
    pub cluster_version: Option<String>,
    pub rbd_mirror: bool,
}

/// Liveness of the exporter itself; cluster trouble is reported through metrics
pub async fn health_handler(State(state): State<HttpState>) -> (StatusCode, Json<HealthResponse>) {
    let uptime = state.service_start_time.elapsed().as_secs();
    let cluster = state.exporter.cluster_state();

    let response = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        checks: HealthChecks {
            cluster_version: cluster.version.map(|v| v.to_string()),
            rbd_mirror: cluster.rbd_mirror,
        },
    };

    (StatusCode::OK, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExporterConfig;
    use crate::exporter::Exporter;
    use crate::testing::{FakeConn, fixtures};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_health_reports_detected_version() {
        let conn =
            FakeConn::new().with_json("version", fixtures::version(fixtures::VERSION_PACIFIC));
        let exporter = Arc::new(Exporter::new(Arc::new(conn), ExporterConfig::default()).unwrap());
        let state = HttpState::new(Arc::clone(&exporter), "/metrics");

        let (status, Json(before)) = health_handler(State(state.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(before.status, "healthy");
        assert!(before.checks.cluster_version.is_none());

        exporter.collect_all().await;

        let (_, Json(after)) = health_handler(State(state)).await;
        assert!(after.checks.cluster_version.is_some_and(|v| v.starts_with("16.2")));
        assert!(!after.checks.rbd_mirror);
    }
}
