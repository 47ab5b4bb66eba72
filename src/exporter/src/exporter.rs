//! The scrape cycle.
//!
//! One cycle runs at a time: version, optional subsystem detection, topology,
//! then every foreground collector concurrently, then whatever the background
//! loops have published, then the exporter's own metrics. A failing step
//! never aborts the cycle.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use prometheus::proto::MetricFamily;
use serde::Deserialize;
use tokio::sync::{Mutex, OnceCell, watch};
use tracing::{debug, info, warn};

use crate::background::{BackgroundSlot, ClusterState, Schedule};
use crate::collectors::{self, Collector, ScrapeContext, Subsystem};
use crate::config::ExporterConfig;
use crate::conn::{AdminCommand, Conn};
use crate::error::Result;
use crate::metrics::ExporterMetrics;
use crate::topology::{OsdTree, Topology, TopologyCache};
use crate::tracker::Trackers;
use crate::version::Version;

#[derive(Debug, Deserialize)]
struct VersionReply {
    version: String,
}

#[derive(Debug, Deserialize)]
struct ServiceDump {
    #[serde(default)]
    services: BTreeMap<String, ServiceEntry>,
}

#[derive(Debug, Deserialize)]
struct ServiceEntry {
    #[serde(default)]
    daemons: BTreeMap<String, serde_json::Value>,
}

impl ServiceDump {
    /// Whether a service has at least one daemon. `daemons` also carries a
    /// `summary` entry that is not a daemon.
    fn has_daemons(&self, service: &str) -> bool {
        self.services
            .get(service)
            .is_some_and(|s| s.daemons.keys().any(|k| k != "summary"))
    }
}

/// State that lives across cycles, guarded as a whole
#[derive(Default)]
struct ScrapeState {
    topology: TopologyCache,
    trackers: Trackers,
    rbd_mirror_active: bool,
    slots: Vec<BackgroundSlot>,
}

pub struct Exporter {
    conn: Arc<dyn Conn>,
    config: ExporterConfig,
    foreground: Vec<Arc<dyn Collector>>,
    metrics: ExporterMetrics,
    state: Mutex<ScrapeState>,
    cluster: watch::Sender<ClusterState>,
}

impl Exporter {
    /// Build every configured collector and start the background loops.
    ///
    /// Must be called from within a Tokio runtime when any collector runs in
    /// background mode.
    pub fn new(conn: Arc<dyn Conn>, config: ExporterConfig) -> Result<Self> {
        let metrics = ExporterMetrics::new(&config.cluster)?;
        let (cluster, cluster_rx) = watch::channel(ClusterState::default());

        let mut foreground = collectors::core_collectors(&config.cluster)?;
        let mut slots = Vec::new();

        let schedule = Schedule {
            interval: config.background_interval,
            buffer: config.background_buffer,
            admin_timeout: config.admin_timeout,
            background_timeout: config.background_timeout,
        };

        for (collector, mode) in collectors::optional_collectors(&config)? {
            if mode == common::config::CollectorMode::Background {
                info!(collector = collector.name(), "Starting background collector");
                slots.push(BackgroundSlot::spawn(
                    collector,
                    Arc::clone(&conn),
                    cluster_rx.clone(),
                    schedule,
                ));
            } else {
                foreground.push(collector);
            }
        }

        Ok(Self {
            conn,
            config,
            foreground,
            metrics,
            state: Mutex::new(ScrapeState {
                slots,
                ..ScrapeState::default()
            }),
            cluster,
        })
    }

    /// Facts learned by the most recent cycle
    pub fn cluster_state(&self) -> ClusterState {
        self.cluster.borrow().clone()
    }

    /// Run one full scrape cycle and return every family it produced
    pub async fn collect_all(&self) -> Vec<MetricFamily> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let cycle_start = Instant::now();

        self.metrics.begin_cycle();

        let bootstrap_topology = Topology::default();
        let bootstrap = self.context(None, &bootstrap_topology, &state.trackers);

        let version = detect_version(&bootstrap).await;

        if self.config.rbd_mirror.is_enabled() {
            match detect_rbd_mirror(&bootstrap).await {
                Ok(active) => state.rbd_mirror_active = active,
                Err(e) => warn!(error = %e, "Failed to detect rbd-mirror, keeping previous state"),
            }
            self.metrics.set_rbd_mirror_up(state.rbd_mirror_active);
        }

        let resolved = resolve_topology(&bootstrap).await;
        drop(bootstrap);

        self.cluster.send_replace(ClusterState {
            version: version.clone(),
            rbd_mirror: state.rbd_mirror_active,
        });

        let topology = state.topology.refresh(resolved);
        let ctx = self.context(version.as_ref(), &topology, &state.trackers);

        let runnable = self
            .foreground
            .iter()
            .filter(|c| is_runnable(c.subsystem(), state.rbd_mirror_active));

        let results = join_all(runnable.map(|collector| {
            let ctx = &ctx;
            async move {
                let started = Instant::now();
                let result = collector.collect(ctx).await;
                (collector.name(), started.elapsed(), result)
            }
        }))
        .await;

        let mut families = Vec::new();
        for (name, elapsed, result) in results {
            match result {
                Ok(collected) => {
                    self.metrics.observe(name, Some(elapsed), true);
                    families.extend(collected);
                }
                Err(e) => {
                    warn!(
                        collector = name,
                        error = %e,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Collector failed"
                    );
                    self.metrics.observe(name, Some(elapsed), false);
                }
            }
        }

        for slot in &mut state.slots {
            if !is_runnable(slot.subsystem(), state.rbd_mirror_active) {
                continue;
            }
            let name = slot.name();
            match slot.drain() {
                Some(latest) => {
                    self.metrics.observe(name, None, true);
                    families.extend(latest.iter().cloned());
                }
                None => self.metrics.observe(name, None, false),
            }
        }

        families.extend(self.metrics.gather());

        debug!(
            families = families.len(),
            elapsed_ms = cycle_start.elapsed().as_millis() as u64,
            "Scrape cycle finished"
        );
        families
    }

    fn context<'a>(
        &'a self,
        version: Option<&'a Version>,
        topology: &'a Topology,
        trackers: &'a Trackers,
    ) -> ScrapeContext<'a> {
        ScrapeContext {
            conn: self.conn.as_ref(),
            version,
            topology,
            trackers,
            admin_timeout: self.config.admin_timeout,
            background_timeout: self.config.background_timeout,
            pg_briefs: OnceCell::new(),
        }
    }
}

fn is_runnable(subsystem: Option<Subsystem>, rbd_mirror_active: bool) -> bool {
    match subsystem {
        None => true,
        Some(Subsystem::RbdMirror) => rbd_mirror_active,
    }
}

/// Cluster version, `None` when it cannot be requested or parsed
async fn detect_version(ctx: &ScrapeContext<'_>) -> Option<Version> {
    let reply = ctx
        .admin_json::<VersionReply>(AdminCommand::new("version"), "version")
        .await
        .and_then(|reply| Version::parse(&reply.version));

    match reply {
        Ok(version) => {
            debug!(%version, release = version.release_name(), "Detected cluster version");
            Some(version)
        }
        Err(e) => {
            warn!(error = %e, "Cluster version unknown, using oldest payload shapes");
            None
        }
    }
}

async fn detect_rbd_mirror(ctx: &ScrapeContext<'_>) -> Result<bool> {
    let dump: ServiceDump = ctx
        .admin_json(AdminCommand::new("service dump"), "service dump")
        .await?;
    Ok(dump.has_daemons("rbd-mirror"))
}

async fn resolve_topology(ctx: &ScrapeContext<'_>) -> Result<Topology> {
    let response = ctx.admin(AdminCommand::new("osd tree")).await?;
    let tree = OsdTree::from_slice(&response.data)?;
    Ok(Topology::from_tree(&tree))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::test_support::sample;
    use crate::testing::{FakeConn, fixtures};
    use common::config::CollectorMode;
    use serde_json::json;

    fn cluster(conn: FakeConn) -> FakeConn {
        conn.with_json("version", fixtures::version(fixtures::VERSION_PACIFIC))
            .with_json("osd tree", fixtures::osd_tree())
            .with_json("df", fixtures::df())
            .with_json("osd pool ls", fixtures::osd_pool_ls_detail())
            .with_json("status", fixtures::status_pacific())
            .with_json("pg dump", fixtures::pg_dump_wrapped())
            .with_json("osd df", fixtures::osd_df())
            .with_json("osd perf", fixtures::osd_perf_nautilus())
            .with_json("osd dump", fixtures::osd_dump())
            .with_json("quorum_status", fixtures::quorum_status())
            .with_json("time-sync-status", fixtures::time_sync_status())
            .with_json("versions", fixtures::versions())
            .with_json("crash ls", fixtures::crash_ls())
    }

    fn success(families: &[MetricFamily], collector: &str) -> Option<f64> {
        sample(
            families,
            "ceph_exporter_collector_success",
            &[("collector", collector)],
        )
    }

    #[tokio::test]
    async fn test_full_cycle() {
        let exporter = Exporter::new(
            Arc::new(cluster(FakeConn::new())),
            ExporterConfig::default(),
        )
        .unwrap();

        let families = exporter.collect_all().await;

        for name in ["cluster_usage", "pool_usage", "pool_info", "health", "osd", "monitors", "crashes"] {
            assert_eq!(success(&families, name), Some(1.0), "{name}");
        }
        assert_eq!(
            sample(&families, "ceph_osd_bytes", &[("osd", "osd.2"), ("host", "node-b")]),
            Some(1024.0 * 1024.0)
        );
        assert_eq!(sample(&families, "ceph_exporter_scrapes_total", &[]), Some(1.0));
        assert_eq!(exporter.cluster_state().version, Some(Version::parse(fixtures::VERSION_PACIFIC).unwrap()));
    }

    #[tokio::test]
    async fn test_pg_listing_is_requested_once_per_cycle() {
        let conn = Arc::new(cluster(FakeConn::new()));
        let exporter = Exporter::new(conn.clone(), ExporterConfig::default()).unwrap();

        for cycle in 1..=2 {
            let families = exporter.collect_all().await;
            // Both consumers of the listing still report
            assert!(sample(&families, "ceph_oldest_inactive_pg", &[]).is_some());
            assert!(sample(&families, "ceph_osd_scrub_state", &[("osd", "osd.0")]).is_some());

            let listings = conn
                .admin_prefixes()
                .iter()
                .filter(|prefix| *prefix == "pg dump")
                .count();
            assert_eq!(listings, cycle);
        }
    }

    #[tokio::test]
    async fn test_failing_collector_is_isolated() {
        let conn = cluster(FakeConn::new()).failing("status");
        let exporter = Exporter::new(Arc::new(conn), ExporterConfig::default()).unwrap();

        let families = exporter.collect_all().await;

        assert_eq!(success(&families, "health"), Some(0.0));
        assert_eq!(success(&families, "cluster_usage"), Some(1.0));
        assert_eq!(sample(&families, "ceph_cluster_capacity_bytes", &[]), Some(3.0e12));
        assert_eq!(sample(&families, "ceph_health_status", &[]), None);
    }

    #[tokio::test]
    async fn test_unknown_version_uses_oldest_shapes() {
        let conn = cluster(FakeConn::new()).failing("version");
        let exporter = Exporter::new(Arc::new(conn), ExporterConfig::default()).unwrap();

        let families = exporter.collect_all().await;

        // Pacific payloads do not decode with the pre-Octopus shapes
        assert_eq!(success(&families, "health"), Some(0.0));
        assert_eq!(exporter.cluster_state().version, None);
        // Pre-Nautilus meaning of total_used_bytes
        assert_eq!(sample(&families, "ceph_cluster_used_bytes", &[]), Some(1.0e12));
    }

    #[tokio::test]
    async fn test_unresolved_topology_gives_empty_placement() {
        let conn = cluster(FakeConn::new()).failing("osd tree");
        let exporter = Exporter::new(Arc::new(conn), ExporterConfig::default()).unwrap();

        let families = exporter.collect_all().await;

        assert_eq!(success(&families, "osd"), Some(1.0));
        assert_eq!(
            sample(&families, "ceph_osd_bytes", &[("osd", "osd.0"), ("host", ""), ("root", "")]),
            Some(1024.0 * 1024.0)
        );
    }

    #[tokio::test]
    async fn test_rbd_mirror_runs_only_once_detected() {
        let mut config = ExporterConfig::default();
        config.rbd_mirror = CollectorMode::Foreground;

        let conn = cluster(FakeConn::new())
            .with_json("service dump", fixtures::service_dump(false))
            .with_background(
                "rbd mirror pool status --format json",
                json!({"summary": {"health": "OK", "daemon_health": "OK", "image_health": "OK"}}),
            );
        let exporter = Exporter::new(Arc::new(conn), config.clone()).unwrap();

        let families = exporter.collect_all().await;
        assert_eq!(sample(&families, "ceph_rbd_mirror_up", &[]), Some(0.0));
        assert_eq!(success(&families, "rbd_mirror"), None);
        assert!(!exporter.cluster_state().rbd_mirror);

        let conn = cluster(FakeConn::new())
            .with_json("service dump", fixtures::service_dump(true))
            .with_background(
                "rbd mirror pool status --format json",
                json!({"summary": {"health": "OK", "daemon_health": "OK", "image_health": "OK"}}),
            );
        let exporter = Exporter::new(Arc::new(conn), config).unwrap();

        let families = exporter.collect_all().await;
        assert_eq!(sample(&families, "ceph_rbd_mirror_up", &[]), Some(1.0));
        assert_eq!(success(&families, "rbd_mirror"), Some(1.0));
        assert_eq!(sample(&families, "ceph_rbd_mirror_pool_status", &[]), Some(0.0));
    }

    #[tokio::test]
    async fn test_detection_failure_keeps_previous_state() {
        let mut config = ExporterConfig::default();
        config.rbd_mirror = CollectorMode::Foreground;

        let conn = cluster(FakeConn::new()).failing("service dump");
        let exporter = Exporter::new(Arc::new(conn), config).unwrap();
        exporter.state.lock().await.rbd_mirror_active = true;

        let families = exporter.collect_all().await;
        assert_eq!(sample(&families, "ceph_rbd_mirror_up", &[]), Some(1.0));
    }

    #[test]
    fn test_service_dump_ignores_summary() {
        let dump: ServiceDump = serde_json::from_value(fixtures::service_dump(false)).unwrap();
        assert!(!dump.has_daemons("rbd-mirror"));
        assert!(dump.has_daemons("rgw"));
        assert!(!dump.has_daemons("mds"));

        let dump: ServiceDump = serde_json::from_value(fixtures::service_dump(true)).unwrap();
        assert!(dump.has_daemons("rbd-mirror"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_results_are_reexported() {
        let mut config = ExporterConfig::default();
        config.rgw = CollectorMode::Background;

        let conn = cluster(FakeConn::new())
            .with_background("radosgw-admin gc list --include-all", fixtures::gc_list())
            .with_background("radosgw-admin reshard list", json!([]));
        let exporter = Exporter::new(Arc::new(conn), config).unwrap();

        // Let the first background tick run
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        for _ in 0..2 {
            let families = exporter.collect_all().await;
            assert_eq!(sample(&families, "ceph_rgw_gc_active_tasks", &[]), Some(1.0));
            assert_eq!(success(&families, "rgw"), Some(1.0));
        }
    }
}
