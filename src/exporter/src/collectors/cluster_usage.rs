use async_trait::async_trait;
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, Registry};
use serde::Deserialize;

use super::{Collector, ScrapeContext};
use crate::conn::AdminCommand;
use crate::error::Result;
use crate::metrics::{create_registry, gauge_vec, set};
use crate::schema::RawClusterStats;

#[derive(Debug, Deserialize)]
struct DfReport {
    #[serde(default)]
    stats: RawClusterStats,
    #[serde(default)]
    pools: Vec<DfPool>,
}

#[derive(Debug, Deserialize)]
struct DfPool {
    #[serde(default)]
    stats: DfPoolObjects,
}

#[derive(Debug, Default, Deserialize)]
struct DfPoolObjects {
    #[serde(default)]
    objects: f64,
}

/// Cluster-wide capacity from `df`
pub struct ClusterUsageCollector {
    registry: Registry,
    capacity: GaugeVec,
    used: GaugeVec,
    available: GaugeVec,
    objects: GaugeVec,
}

impl ClusterUsageCollector {
    pub fn new(cluster: &str) -> Result<Self> {
        let registry = create_registry(cluster)?;

        Ok(Self {
            capacity: gauge_vec(
                &registry,
                "cluster_capacity_bytes",
                "Total capacity of the cluster",
                &[],
            )?,
            used: gauge_vec(
                &registry,
                "cluster_used_bytes",
                "Raw capacity in use",
                &[],
            )?,
            available: gauge_vec(
                &registry,
                "cluster_available_bytes",
                "Raw capacity still available",
                &[],
            )?,
            objects: gauge_vec(
                &registry,
                "cluster_objects",
                "Number of objects across all pools",
                &[],
            )?,
            registry,
        })
    }
}

#[async_trait]
impl Collector for ClusterUsageCollector {
    fn name(&self) -> &'static str {
        "cluster_usage"
    }

    async fn collect(&self, ctx: &ScrapeContext<'_>) -> Result<Vec<MetricFamily>> {
        let report: DfReport = ctx.admin_json(AdminCommand::new("df"), "df").await?;

        set(&self.capacity, report.stats.total_bytes);
        set(&self.used, report.stats.used_bytes(ctx.version));
        set(&self.available, report.stats.total_avail_bytes);
        set(
            &self.objects,
            report.pools.iter().map(|p| p.stats.objects).sum(),
        );

        Ok(self.registry.gather())
    }
}
