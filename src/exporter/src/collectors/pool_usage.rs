use async_trait::async_trait;
use prometheus::proto::MetricFamily;
use prometheus::{CounterVec, GaugeVec, Registry};
use serde::Deserialize;

use super::{Collector, ScrapeContext};
use crate::conn::AdminCommand;
use crate::error::Result;
use crate::metrics::{counter_vec, create_registry, gauge_vec, set_counter};
use crate::schema::{PoolStatsShape, RawPoolStats};

#[derive(Debug, Deserialize)]
struct DfDetail {
    #[serde(default)]
    pools: Vec<DfDetailPool>,
}

#[derive(Debug, Deserialize)]
struct DfDetailPool {
    name: String,
    #[serde(default)]
    stats: RawPoolStats,
}

/// Per-pool usage and IO counters from `df detail`
pub struct PoolUsageCollector {
    registry: Registry,
    used_bytes: GaugeVec,
    raw_used_bytes: GaugeVec,
    available_bytes: GaugeVec,
    percent_used: GaugeVec,
    objects: GaugeVec,
    dirty_objects: GaugeVec,
    quota_max_bytes: GaugeVec,
    quota_max_objects: GaugeVec,
    read: CounterVec,
    read_bytes: CounterVec,
    write: CounterVec,
    write_bytes: CounterVec,
}

impl PoolUsageCollector {
    pub fn new(cluster: &str) -> Result<Self> {
        let registry = create_registry(cluster)?;
        let pool = &["pool"];

        Ok(Self {
            used_bytes: gauge_vec(&registry, "pool_used_bytes", "Logical bytes stored in the pool", pool)?,
            raw_used_bytes: gauge_vec(
                &registry,
                "pool_raw_used_bytes",
                "Raw bytes consumed by the pool including replication",
                pool,
            )?,
            available_bytes: gauge_vec(
                &registry,
                "pool_available_bytes",
                "Bytes that can still be written to the pool",
                pool,
            )?,
            percent_used: gauge_vec(&registry, "pool_percent_used", "Fraction of the pool in use", pool)?,
            objects: gauge_vec(&registry, "pool_objects_total", "Objects in the pool", pool)?,
            dirty_objects: gauge_vec(
                &registry,
                "pool_dirty_objects_total",
                "Dirty objects in a cache-tier pool",
                pool,
            )?,
            quota_max_bytes: gauge_vec(&registry, "pool_quota_max_bytes", "Byte quota of the pool", pool)?,
            quota_max_objects: gauge_vec(
                &registry,
                "pool_quota_max_objects",
                "Object quota of the pool",
                pool,
            )?,
            read: counter_vec(&registry, "pool_read_total", "Read operations on the pool", pool)?,
            read_bytes: counter_vec(&registry, "pool_read_bytes_total", "Bytes read from the pool", pool)?,
            write: counter_vec(&registry, "pool_write_total", "Write operations on the pool", pool)?,
            write_bytes: counter_vec(
                &registry,
                "pool_write_bytes_total",
                "Bytes written to the pool",
                pool,
            )?,
            registry,
        })
    }

    fn reset(&self) {
        for gauge in [
            &self.used_bytes,
            &self.raw_used_bytes,
            &self.available_bytes,
            &self.percent_used,
            &self.objects,
            &self.dirty_objects,
            &self.quota_max_bytes,
            &self.quota_max_objects,
        ] {
            gauge.reset();
        }
        for counter in [&self.read, &self.read_bytes, &self.write, &self.write_bytes] {
            counter.reset();
        }
    }
}

#[async_trait]
impl Collector for PoolUsageCollector {
    fn name(&self) -> &'static str {
        "pool_usage"
    }

    async fn collect(&self, ctx: &ScrapeContext<'_>) -> Result<Vec<MetricFamily>> {
        let report: DfDetail = ctx
            .admin_json(AdminCommand::new("df").with_arg("detail", "detail"), "df detail")
            .await?;
        let shape = PoolStatsShape::for_version(ctx.version);

        self.reset();

        for pool in &report.pools {
            let usage = shape.usage(&pool.stats);
            let labels = &[pool.name.as_str()];

            self.used_bytes.with_label_values(labels).set(usage.stored_bytes);
            self.raw_used_bytes.with_label_values(labels).set(usage.raw_used_bytes);
            self.available_bytes.with_label_values(labels).set(usage.available_bytes);
            self.percent_used.with_label_values(labels).set(usage.percent_used);
            self.objects.with_label_values(labels).set(usage.objects);
            self.dirty_objects.with_label_values(labels).set(usage.dirty_objects);
            self.quota_max_bytes.with_label_values(labels).set(usage.quota_bytes);
            self.quota_max_objects.with_label_values(labels).set(usage.quota_objects);

            set_counter(&self.read, labels, usage.read_ops);
            set_counter(&self.read_bytes, labels, usage.read_bytes);
            set_counter(&self.write, labels, usage.write_ops);
            set_counter(&self.write_bytes, labels, usage.write_bytes);
        }

        Ok(self.registry.gather())
    }
}
