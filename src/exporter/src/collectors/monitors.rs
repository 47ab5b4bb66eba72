use std::collections::BTreeMap;

use async_trait::async_trait;
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, Registry};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{Collector, ScrapeContext};
use crate::conn::AdminCommand;
use crate::error::Result;
use crate::metrics::{create_registry, gauge_vec, set};
use crate::version::Version;

#[derive(Debug, Deserialize)]
struct QuorumStatus {
    #[serde(default)]
    election_epoch: f64,
    #[serde(default)]
    quorum_names: Vec<String>,
    #[serde(default)]
    monmap: MonMap,
}

#[derive(Debug, Default, Deserialize)]
struct MonMap {
    #[serde(default)]
    mons: Vec<MonEntry>,
}

#[derive(Debug, Deserialize)]
struct MonEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TimeSyncStatus {
    #[serde(default)]
    time_skew_status: BTreeMap<String, ClockSkew>,
}

#[derive(Debug, Deserialize)]
struct ClockSkew {
    #[serde(default)]
    skew: f64,
    #[serde(default)]
    latency: f64,
}

/// `versions` reply: daemon type to version string to daemon count
type DaemonVersions = BTreeMap<String, BTreeMap<String, f64>>;

/// Monitor quorum, clock skew and daemon versions
pub struct MonitorsCollector {
    registry: Registry,
    count: GaugeVec,
    election_epoch: GaugeVec,
    quorum_count: GaugeVec,
    in_quorum: GaugeVec,
    clock_skew: GaugeVec,
    latency: GaugeVec,
    versions: GaugeVec,
}

impl MonitorsCollector {
    pub fn new(cluster: &str) -> Result<Self> {
        let r = create_registry(cluster)?;

        Ok(Self {
            count: gauge_vec(&r, "monitor_count", "Monitors in the monitor map", &[])?,
            election_epoch: gauge_vec(
                &r,
                "monitor_election_epoch",
                "Epoch of the last monitor election",
                &[],
            )?,
            quorum_count: gauge_vec(&r, "monitor_quorum_count", "Monitors in quorum", &[])?,
            in_quorum: gauge_vec(
                &r,
                "monitor_in_quorum",
                "Whether the monitor is part of the quorum",
                &["monitor"],
            )?,
            clock_skew: gauge_vec(
                &r,
                "monitor_clock_skew_seconds",
                "Clock skew of the monitor relative to the leader",
                &["monitor"],
            )?,
            latency: gauge_vec(
                &r,
                "monitor_latency_seconds",
                "Latency from the leader to the monitor",
                &["monitor"],
            )?,
            versions: gauge_vec(
                &r,
                "versions",
                "Daemons running each release",
                &["daemon", "version_tag", "sha1", "release_name"],
            )?,
            registry: r,
        })
    }

    fn record_versions(&self, versions: &DaemonVersions) {
        for (daemon, by_version) in versions.iter().filter(|(d, _)| *d != "overall") {
            for (raw, count) in by_version {
                match Version::parse(raw) {
                    Ok(version) => {
                        let tag = version.to_string();
                        self.versions
                            .with_label_values(&[
                                daemon.as_str(),
                                tag.as_str(),
                                version.commit.as_str(),
                                version.release_name(),
                            ])
                            .add(*count);
                    }
                    Err(e) => debug!(daemon, error = %e, "Skipping unparseable daemon version"),
                }
            }
        }
    }
}

#[async_trait]
impl Collector for MonitorsCollector {
    fn name(&self) -> &'static str {
        "monitors"
    }

    async fn collect(&self, ctx: &ScrapeContext<'_>) -> Result<Vec<MetricFamily>> {
        let (quorum, time_sync, versions) = tokio::join!(
            ctx.admin_json::<QuorumStatus>(AdminCommand::new("quorum_status"), "quorum_status"),
            ctx.admin_json::<TimeSyncStatus>(
                AdminCommand::new("time-sync-status"),
                "time-sync-status"
            ),
            ctx.admin_json::<DaemonVersions>(AdminCommand::new("versions"), "versions"),
        );
        let quorum = quorum?;

        for gauge in [
            &self.count,
            &self.election_epoch,
            &self.quorum_count,
            &self.in_quorum,
            &self.clock_skew,
            &self.latency,
            &self.versions,
        ] {
            gauge.reset();
        }

        set(&self.count, quorum.monmap.mons.len() as f64);
        set(&self.election_epoch, quorum.election_epoch);
        set(&self.quorum_count, quorum.quorum_names.len() as f64);
        for mon in &quorum.monmap.mons {
            let in_quorum = quorum.quorum_names.contains(&mon.name);
            self.in_quorum
                .with_label_values(&[mon.name.as_str()])
                .set(if in_quorum { 1.0 } else { 0.0 });
        }

        match time_sync {
            Ok(status) => {
                for (mon, skew) in &status.time_skew_status {
                    self.clock_skew.with_label_values(&[mon.as_str()]).set(skew.skew);
                    self.latency.with_label_values(&[mon.as_str()]).set(skew.latency);
                }
            }
            Err(e) => warn!(error = %e, "Failed to read monitor clock skew"),
        }

        match versions {
            Ok(versions) => self.record_versions(&versions),
            Err(e) => warn!(error = %e, "Failed to read daemon versions"),
        }

        Ok(self.registry.gather())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::test_support::{count, sample};
    use crate::testing::{FakeConn, ScrapeFixture, fixtures};

    #[tokio::test]
    async fn test_quorum_and_skew() {
        let conn = FakeConn::new()
            .with_json("quorum_status", fixtures::quorum_status())
            .with_json("time-sync-status", fixtures::time_sync_status())
            .with_json("versions", fixtures::versions());
        let fixture = ScrapeFixture::new(Some(Version::PACIFIC));

        let families = MonitorsCollector::new("test")
            .unwrap()
            .collect(&fixture.context(&conn))
            .await
            .unwrap();

        assert_eq!(sample(&families, "ceph_monitor_count", &[]), Some(3.0));
        assert_eq!(sample(&families, "ceph_monitor_quorum_count", &[]), Some(2.0));
        assert_eq!(sample(&families, "ceph_monitor_election_epoch", &[]), Some(24.0));
        assert_eq!(
            sample(&families, "ceph_monitor_in_quorum", &[("monitor", "c")]),
            Some(0.0)
        );
        assert_eq!(
            sample(&families, "ceph_monitor_clock_skew_seconds", &[("monitor", "b")]),
            Some(0.05)
        );
        assert_eq!(count(&families, "ceph_monitor_in_quorum"), 3);
    }

    #[tokio::test]
    async fn test_daemon_versions() {
        let conn = FakeConn::new()
            .with_json("quorum_status", fixtures::quorum_status())
            .with_json("time-sync-status", fixtures::time_sync_status())
            .with_json("versions", fixtures::versions());
        let fixture = ScrapeFixture::new(Some(Version::PACIFIC));

        let families = MonitorsCollector::new("test")
            .unwrap()
            .collect(&fixture.context(&conn))
            .await
            .unwrap();

        assert_eq!(
            sample(
                &families,
                "ceph_versions",
                &[
                    ("daemon", "osd"),
                    ("version_tag", "16.2.11"),
                    ("sha1", "3cf40e2dca667f68c6ce3ff5cd94f01e711af894"),
                    ("release_name", "pacific"),
                ]
            ),
            Some(5.0)
        );
        assert_eq!(
            sample(&families, "ceph_versions", &[("daemon", "osd"), ("version_tag", "16.2.10")]),
            Some(1.0)
        );
        // overall duplicates the per-daemon counts
        assert_eq!(
            sample(&families, "ceph_versions", &[("daemon", "overall")]),
            None
        );
    }

    #[tokio::test]
    async fn test_versions_with_same_labels_are_summed() {
        let versions = serde_json::json!({
            "osd": {
                "ceph version 16.2.11 (3cf40e2dca667f68c6ce3ff5cd94f01e711af894) pacific (stable)": 4,
                "ceph version 16.2.11 (3cf40e2dca667f68c6ce3ff5cd94f01e711af894) pacific (dev)": 2
            }
        });
        let conn = FakeConn::new()
            .with_json("quorum_status", fixtures::quorum_status())
            .with_json("time-sync-status", fixtures::time_sync_status())
            .with_json("versions", versions);
        let fixture = ScrapeFixture::new(None);
        let collector = MonitorsCollector::new("test").unwrap();

        // A second cycle must not carry the first cycle's sum forward
        for _ in 0..2 {
            let families = collector.collect(&fixture.context(&conn)).await.unwrap();
            assert_eq!(
                sample(&families, "ceph_versions", &[("daemon", "osd"), ("version_tag", "16.2.11")]),
                Some(6.0)
            );
        }
    }

    #[tokio::test]
    async fn test_missing_clock_skew_keeps_quorum() {
        let conn = FakeConn::new()
            .with_json("quorum_status", fixtures::quorum_status())
            .failing("time-sync-status")
            .failing("versions");
        let fixture = ScrapeFixture::new(None);

        let families = MonitorsCollector::new("test")
            .unwrap()
            .collect(&fixture.context(&conn))
            .await
            .unwrap();

        assert_eq!(sample(&families, "ceph_monitor_quorum_count", &[]), Some(2.0));
        assert_eq!(count(&families, "ceph_monitor_clock_skew_seconds"), 0);
    }
}
