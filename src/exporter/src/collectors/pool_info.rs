use async_trait::async_trait;
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, Registry};
use serde::Deserialize;

use super::{Collector, ScrapeContext};
use crate::conn::AdminCommand;
use crate::error::Result;
use crate::metrics::{create_registry, gauge_vec};

#[derive(Debug, Deserialize)]
struct PoolDetail {
    pool_name: String,
    #[serde(rename = "type", default)]
    kind: u32,
    #[serde(default)]
    size: f64,
    #[serde(default)]
    min_size: f64,
    #[serde(default)]
    pg_num: f64,
    #[serde(default)]
    pg_placement_num: f64,
    #[serde(default, alias = "crush_ruleset")]
    crush_rule: i64,
    #[serde(default)]
    erasure_code_profile: String,
}

impl PoolDetail {
    fn type_name(&self) -> &'static str {
        match self.kind {
            1 => "replicated",
            3 => "erasure",
            _ => "unknown",
        }
    }
}

/// Pool configuration from `osd pool ls detail`
pub struct PoolInfoCollector {
    registry: Registry,
    size: GaugeVec,
    min_size: GaugeVec,
    pg_num: GaugeVec,
    pgp_num: GaugeVec,
    info: GaugeVec,
}

impl PoolInfoCollector {
    pub fn new(cluster: &str) -> Result<Self> {
        let registry = create_registry(cluster)?;

        Ok(Self {
            size: gauge_vec(&registry, "pool_size", "Replica count of the pool", &["pool"])?,
            min_size: gauge_vec(
                &registry,
                "pool_min_size",
                "Replicas required to serve IO",
                &["pool"],
            )?,
            pg_num: gauge_vec(&registry, "pool_pg_num", "Placement groups of the pool", &["pool"])?,
            pgp_num: gauge_vec(
                &registry,
                "pool_pgp_num",
                "Placement groups used for placement",
                &["pool"],
            )?,
            info: gauge_vec(
                &registry,
                "pool_info",
                "Pool metadata, always 1",
                &["pool", "type", "profile", "rule"],
            )?,
            registry,
        })
    }
}

#[async_trait]
impl Collector for PoolInfoCollector {
    fn name(&self) -> &'static str {
        "pool_info"
    }

    async fn collect(&self, ctx: &ScrapeContext<'_>) -> Result<Vec<MetricFamily>> {
        let pools: Vec<PoolDetail> = ctx
            .admin_json(
                AdminCommand::new("osd pool ls").with_arg("detail", "detail"),
                "osd pool ls detail",
            )
            .await?;

        for gauge in [&self.size, &self.min_size, &self.pg_num, &self.pgp_num, &self.info] {
            gauge.reset();
        }

        for pool in &pools {
            let name = pool.pool_name.as_str();
            self.size.with_label_values(&[name]).set(pool.size);
            self.min_size.with_label_values(&[name]).set(pool.min_size);
            self.pg_num.with_label_values(&[name]).set(pool.pg_num);
            self.pgp_num.with_label_values(&[name]).set(pool.pg_placement_num);

            let rule = pool.crush_rule.to_string();
            self.info
                .with_label_values(&[
                    name,
                    pool.type_name(),
                    pool.erasure_code_profile.as_str(),
                    rule.as_str(),
                ])
                .set(1.0);
        }

        Ok(self.registry.gather())
    }
}
