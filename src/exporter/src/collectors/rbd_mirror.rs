use async_trait::async_trait;
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, Registry};
use serde::Deserialize;

use super::{Collector, ScrapeContext, Subsystem};
use crate::conn::{CliCommand, Tool};
use crate::error::Result;
use crate::metrics::{create_registry, gauge_vec, set};
use crate::version::Version;

#[derive(Debug, Deserialize)]
struct MirrorPoolStatus {
    summary: MirrorSummary,
}

#[derive(Debug, Deserialize)]
struct MirrorSummary {
    #[serde(default)]
    health: String,
    #[serde(default)]
    daemon_health: String,
    #[serde(default)]
    image_health: String,
}

/// 0 OK, 1 WARNING, 2 ERROR, 3 anything else
fn mirror_health(status: &str) -> f64 {
    match status {
        "OK" => 0.0,
        "WARNING" => 1.0,
        "ERROR" => 2.0,
        _ => 3.0,
    }
}

/// Mirroring health from `rbd mirror pool status`.
///
/// Only runs once rbd-mirror daemons are detected in the service map.
pub struct RbdMirrorCollector {
    registry: Registry,
    pool_status: GaugeVec,
    daemon_status: GaugeVec,
    image_status: GaugeVec,
}

impl RbdMirrorCollector {
    pub fn new(cluster: &str) -> Result<Self> {
        let r = create_registry(cluster)?;

        Ok(Self {
            pool_status: gauge_vec(
                &r,
                "rbd_mirror_pool_status",
                "Mirroring health: 0 OK, 1 WARNING, 2 ERROR, 3 unknown",
                &[],
            )?,
            daemon_status: gauge_vec(
                &r,
                "rbd_mirror_pool_daemon_status",
                "Mirror daemon health: 0 OK, 1 WARNING, 2 ERROR, 3 unknown",
                &[],
            )?,
            image_status: gauge_vec(
                &r,
                "rbd_mirror_pool_image_status",
                "Mirrored image health: 0 OK, 1 WARNING, 2 ERROR, 3 unknown",
                &[],
            )?,
            registry: r,
        })
    }
}

#[async_trait]
impl Collector for RbdMirrorCollector {
    fn name(&self) -> &'static str {
        "rbd_mirror"
    }

    fn subsystem(&self) -> Option<Subsystem> {
        Some(Subsystem::RbdMirror)
    }

    async fn collect(&self, ctx: &ScrapeContext<'_>) -> Result<Vec<MetricFamily>> {
        let status: MirrorPoolStatus = ctx
            .background_json(
                CliCommand::new(Tool::Rbd, ["mirror", "pool", "status", "--format", "json"]),
                "rbd mirror pool status",
            )
            .await?;
        let summary = status.summary;

        set(&self.pool_status, mirror_health(&summary.health));

        // Split daemon and image health only exist from Octopus
        if ctx.at_least(&Version::OCTOPUS) {
            set(&self.daemon_status, mirror_health(&summary.daemon_health));
            set(&self.image_status, mirror_health(&summary.image_health));
        } else {
            self.daemon_status.reset();
            self.image_status.reset();
        }

        Ok(self.registry.gather())
    }
}
