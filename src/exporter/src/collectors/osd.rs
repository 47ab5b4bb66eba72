//! Per-OSD capacity, latency, state and scrub activity.

use async_trait::async_trait;
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, Registry};
use serde::Deserialize;
use tracing::warn;

use super::{Collector, ScrapeContext};
use crate::conn::AdminCommand;
use crate::error::Result;
use crate::metrics::{create_registry, gauge_vec, set};
use crate::schema::OsdPerfShape;
use crate::topology::{OSD_LABELS, Topology};
use crate::tracker::ScrubState;

const KIB: f64 = 1024.0;

#[derive(Debug, Deserialize)]
struct OsdDf {
    #[serde(default)]
    nodes: Vec<OsdDfNode>,
    #[serde(default)]
    summary: OsdDfSummary,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OsdDfNode {
    id: i64,
    crush_weight: f64,
    depth: f64,
    reweight: f64,
    kb: f64,
    kb_used: f64,
    kb_avail: f64,
    utilization: f64,
    var: f64,
    pgs: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OsdDfSummary {
    total_kb: f64,
    total_kb_used: f64,
    total_kb_avail: f64,
    average_utilization: f64,
}

#[derive(Debug, Deserialize)]
struct OsdDump {
    #[serde(default)]
    full_ratio: f64,
    #[serde(default)]
    nearfull_ratio: f64,
    #[serde(default)]
    backfillfull_ratio: f64,
    #[serde(default)]
    osds: Vec<OsdDumpEntry>,
    #[serde(default)]
    pg_upmap_items: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct OsdDumpEntry {
    osd: i64,
    #[serde(default)]
    up: f64,
    #[serde(rename = "in", default)]
    is_in: f64,
}

/// OSD metrics from `osd df`, `osd perf`, `osd dump` and `pg dump`
pub struct OsdCollector {
    registry: Registry,
    crush_weight: GaugeVec,
    depth: GaugeVec,
    reweight: GaugeVec,
    bytes: GaugeVec,
    used_bytes: GaugeVec,
    avail_bytes: GaugeVec,
    utilization: GaugeVec,
    variance: GaugeVec,
    pgs: GaugeVec,
    total_bytes: GaugeVec,
    total_used_bytes: GaugeVec,
    total_avail_bytes: GaugeVec,
    average_utilization: GaugeVec,
    commit_latency: GaugeVec,
    apply_latency: GaugeVec,
    up: GaugeVec,
    is_in: GaugeVec,
    full_ratio: GaugeVec,
    nearfull_ratio: GaugeVec,
    backfillfull_ratio: GaugeVec,
    pg_upmap_items: GaugeVec,
    scrub_state: GaugeVec,
}

impl OsdCollector {
    pub fn new(cluster: &str) -> Result<Self> {
        let r = create_registry(cluster)?;
        let osd = &OSD_LABELS;

        Ok(Self {
            crush_weight: gauge_vec(&r, "osd_crush_weight", "CRUSH weight of the OSD", osd)?,
            depth: gauge_vec(&r, "osd_depth", "Depth of the OSD in the CRUSH tree", osd)?,
            reweight: gauge_vec(&r, "osd_reweight", "Override weight of the OSD", osd)?,
            bytes: gauge_vec(&r, "osd_bytes", "Capacity of the OSD", osd)?,
            used_bytes: gauge_vec(&r, "osd_used_bytes", "Bytes used on the OSD", osd)?,
            avail_bytes: gauge_vec(&r, "osd_avail_bytes", "Bytes available on the OSD", osd)?,
            utilization: gauge_vec(&r, "osd_utilization", "Percent of the OSD in use", osd)?,
            variance: gauge_vec(
                &r,
                "osd_variance",
                "Utilization relative to the cluster average",
                osd,
            )?,
            pgs: gauge_vec(&r, "osd_pgs", "Placement groups on the OSD", osd)?,
            total_bytes: gauge_vec(&r, "osd_total_bytes", "Capacity of all OSDs", &[])?,
            total_used_bytes: gauge_vec(&r, "osd_total_used_bytes", "Bytes used on all OSDs", &[])?,
            total_avail_bytes: gauge_vec(
                &r,
                "osd_total_avail_bytes",
                "Bytes available on all OSDs",
                &[],
            )?,
            average_utilization: gauge_vec(
                &r,
                "osd_average_utilization",
                "Average OSD utilization in percent",
                &[],
            )?,
            commit_latency: gauge_vec(
                &r,
                "osd_perf_commit_latency_seconds",
                "Commit latency of the OSD",
                osd,
            )?,
            apply_latency: gauge_vec(
                &r,
                "osd_perf_apply_latency_seconds",
                "Apply latency of the OSD",
                osd,
            )?,
            up: gauge_vec(&r, "osd_up", "Whether the OSD is up", osd)?,
            is_in: gauge_vec(&r, "osd_in", "Whether the OSD is in", osd)?,
            full_ratio: gauge_vec(&r, "osd_full_ratio", "Ratio at which OSDs are full", &[])?,
            nearfull_ratio: gauge_vec(
                &r,
                "osd_near_full_ratio",
                "Ratio at which OSDs are nearly full",
                &[],
            )?,
            backfillfull_ratio: gauge_vec(
                &r,
                "osd_backfill_full_ratio",
                "Ratio at which OSDs refuse backfill",
                &[],
            )?,
            pg_upmap_items: gauge_vec(
                &r,
                "pg_upmap_items_total",
                "Explicit PG mapping exceptions",
                &[],
            )?,
            scrub_state: gauge_vec(
                &r,
                "osd_scrub_state",
                "Scrub state of the OSD: 0 idle, 1 scrubbing, 2 deep scrubbing",
                osd,
            )?,
            registry: r,
        })
    }

    fn per_osd(&self) -> [&GaugeVec; 14] {
        [
            &self.crush_weight,
            &self.depth,
            &self.reweight,
            &self.bytes,
            &self.used_bytes,
            &self.avail_bytes,
            &self.utilization,
            &self.variance,
            &self.pgs,
            &self.commit_latency,
            &self.apply_latency,
            &self.up,
            &self.is_in,
            &self.scrub_state,
        ]
    }

    fn record_df(&self, topology: &Topology, df: &OsdDf) {
        for node in &df.nodes {
            let labels = topology.labels(node.id);
            let values = labels.values();

            self.crush_weight.with_label_values(&values).set(node.crush_weight);
            self.depth.with_label_values(&values).set(node.depth);
            self.reweight.with_label_values(&values).set(node.reweight);
            self.bytes.with_label_values(&values).set(node.kb * KIB);
            self.used_bytes.with_label_values(&values).set(node.kb_used * KIB);
            self.avail_bytes.with_label_values(&values).set(node.kb_avail * KIB);
            self.utilization.with_label_values(&values).set(node.utilization);
            self.variance.with_label_values(&values).set(node.var);
            self.pgs.with_label_values(&values).set(node.pgs);
        }

        set(&self.total_bytes, df.summary.total_kb * KIB);
        set(&self.total_used_bytes, df.summary.total_kb_used * KIB);
        set(&self.total_avail_bytes, df.summary.total_kb_avail * KIB);
        set(&self.average_utilization, df.summary.average_utilization);
    }

    fn record_dump(&self, topology: &Topology, dump: &OsdDump) {
        for entry in &dump.osds {
            let labels = topology.labels(entry.osd);
            let values = labels.values();
            self.up.with_label_values(&values).set(entry.up);
            self.is_in.with_label_values(&values).set(entry.is_in);
        }

        set(&self.full_ratio, dump.full_ratio);
        set(&self.nearfull_ratio, dump.nearfull_ratio);
        set(&self.backfillfull_ratio, dump.backfillfull_ratio);
        set(&self.pg_upmap_items, dump.pg_upmap_items.len() as f64);
    }

    /// Derive per-OSD scrub state from the acting sets of scrubbing PGs
    async fn record_scrubs(&self, ctx: &ScrapeContext<'_>, known: &[i64]) -> Result<()> {
        let pgs = ctx.pg_briefs().await?;

        let cache = &ctx.trackers.scrub;
        cache.reset_all_to_idle();
        for &osd in known {
            cache.mark(osd, ScrubState::Idle);
        }
        for pg in pgs {
            if let Some(state) = ScrubState::from_pg_state(&pg.state) {
                for &osd in &pg.acting {
                    cache.mark(osd, state);
                }
            }
        }

        for (osd, state) in cache.snapshot() {
            let labels = ctx.topology.labels(osd);
            self.scrub_state
                .with_label_values(&labels.values())
                .set(state.as_f64());
        }
        Ok(())
    }
}

#[async_trait]
impl Collector for OsdCollector {
    fn name(&self) -> &'static str {
        "osd"
    }

    async fn collect(&self, ctx: &ScrapeContext<'_>) -> Result<Vec<MetricFamily>> {
        let (df, perf, dump) = tokio::join!(
            ctx.admin_json::<OsdDf>(AdminCommand::new("osd df"), "osd df"),
            ctx.admin(AdminCommand::new("osd perf")),
            ctx.admin_json::<OsdDump>(AdminCommand::new("osd dump"), "osd dump"),
        );
        let df = df?;
        let perf = OsdPerfShape::for_version(ctx.version).decode(&perf?.data)?;
        let dump = dump?;

        for gauge in self.per_osd() {
            gauge.reset();
        }

        self.record_df(ctx.topology, &df);
        self.record_dump(ctx.topology, &dump);

        for info in &perf {
            let labels = ctx.topology.labels(info.id);
            let values = labels.values();
            self.commit_latency
                .with_label_values(&values)
                .set(info.perf_stats.commit_latency_ms / 1000.0);
            self.apply_latency
                .with_label_values(&values)
                .set(info.perf_stats.apply_latency_ms / 1000.0);
        }

        let known: Vec<i64> = dump.osds.iter().map(|o| o.osd).collect();
        if let Err(e) = self.record_scrubs(ctx, &known).await {
            warn!(error = %e, "Failed to list PGs, skipping OSD scrub state");
        }

        Ok(self.registry.gather())
    }
}
