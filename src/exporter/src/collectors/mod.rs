//! Per-subsystem collectors.
//!
//! A collector issues its requests, decodes the payloads in the shape the
//! cluster version calls for, and republishes them through its own registry.
//! Every per-entity family is reset before it is repopulated so departed
//! entities stop reporting. A failed request or payload fails that collector
//! only.

pub mod cluster_usage;
pub mod crashes;
pub mod health;
pub mod mds;
pub mod monitors;
pub mod osd;
pub mod pool_info;
pub mod pool_usage;
pub mod rbd_mirror;
pub mod rgw;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use prometheus::proto::MetricFamily;
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;

use crate::config::ExporterConfig;
use crate::conn::{AdminCommand, AdminResponse, CliCommand, Conn, ConnError};
use crate::error::{ExporterError, Result};
use crate::schema::{PgBrief, PgDumpShape};
use crate::topology::Topology;
use crate::tracker::Trackers;
use crate::version::{Version, at_least};

pub use cluster_usage::ClusterUsageCollector;
pub use crashes::CrashesCollector;
pub use health::HealthCollector;
pub use mds::MdsCollector;
pub use monitors::MonitorsCollector;
pub use osd::OsdCollector;
pub use pool_info::PoolInfoCollector;
pub use pool_usage::PoolUsageCollector;
pub use rbd_mirror::RbdMirrorCollector;
pub use rgw::RgwCollector;

/// Optional cluster subsystem whose collector only runs once detected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    RbdMirror,
}

/// Everything a collector may use during one scrape cycle
pub struct ScrapeContext<'a> {
    pub conn: &'a dyn Conn,
    /// `None` when the version could not be determined this cycle
    pub version: Option<&'a Version>,
    pub topology: &'a Topology,
    pub trackers: &'a Trackers,
    pub admin_timeout: Duration,
    pub background_timeout: Duration,
    /// `pg dump pgs_brief`, shared by every collector of the cycle
    pub pg_briefs: OnceCell<Vec<PgBrief>>,
}

impl ScrapeContext<'_> {
    pub fn at_least(&self, constraint: &Version) -> bool {
        at_least(self.version, constraint)
    }

    pub async fn admin(&self, command: AdminCommand) -> Result<AdminResponse> {
        let request = command.to_bytes()?;
        match tokio::time::timeout(self.admin_timeout, self.conn.run_admin_command(&request)).await
        {
            Ok(response) => Ok(response?),
            Err(_) => Err(ConnError::Timeout(self.admin_timeout).into()),
        }
    }

    pub async fn admin_json<T: DeserializeOwned>(
        &self,
        command: AdminCommand,
        what: &'static str,
    ) -> Result<T> {
        let response = self.admin(command).await?;
        serde_json::from_slice(&response.data).map_err(ExporterError::parse(what))
    }

    /// The PG listing, requested on first use and reused for the rest of
    /// the cycle. A failed request is retried by the next caller.
    pub async fn pg_briefs(&self) -> Result<&[PgBrief]> {
        let pgs = self
            .pg_briefs
            .get_or_try_init(|| async {
                let response = self
                    .admin(AdminCommand::new("pg dump").with_arg("dumpcontents", vec!["pgs_brief"]))
                    .await?;
                PgDumpShape::for_version(self.version).decode(&response.data)
            })
            .await?;
        Ok(pgs)
    }

    pub async fn background(&self, command: CliCommand) -> Result<Vec<u8>> {
        let request = command.to_bytes()?;
        match tokio::time::timeout(
            self.background_timeout,
            self.conn.run_background_command(&request),
        )
        .await
        {
            Ok(response) => Ok(response?),
            Err(_) => Err(ConnError::Timeout(self.background_timeout).into()),
        }
    }

    pub async fn background_json<T: DeserializeOwned>(
        &self,
        command: CliCommand,
        what: &'static str,
    ) -> Result<T> {
        let data = self.background(command).await?;
        serde_json::from_slice(&data).map_err(ExporterError::parse(what))
    }
}

#[async_trait]
pub trait Collector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Subsystem that must be detected before this collector runs
    fn subsystem(&self) -> Option<Subsystem> {
        None
    }

    async fn collect(&self, ctx: &ScrapeContext<'_>) -> Result<Vec<MetricFamily>>;
}

/// Collectors that run on every scrape
pub fn core_collectors(cluster: &str) -> Result<Vec<Arc<dyn Collector>>> {
    Ok(vec![
        Arc::new(ClusterUsageCollector::new(cluster)?),
        Arc::new(PoolUsageCollector::new(cluster)?),
        Arc::new(PoolInfoCollector::new(cluster)?),
        Arc::new(HealthCollector::new(cluster)?),
        Arc::new(OsdCollector::new(cluster)?),
        Arc::new(MonitorsCollector::new(cluster)?),
        Arc::new(CrashesCollector::new(cluster)?),
    ])
}

/// Optional collectors paired with their configured schedule
pub fn optional_collectors(
    config: &ExporterConfig,
) -> Result<Vec<(Arc<dyn Collector>, common::config::CollectorMode)>> {
    let mut collectors: Vec<(Arc<dyn Collector>, _)> = Vec::new();

    if config.rgw.is_enabled() {
        collectors.push((Arc::new(RgwCollector::new(&config.cluster)?) as _, config.rgw));
    }
    if config.rbd_mirror.is_enabled() {
        collectors.push((
            Arc::new(RbdMirrorCollector::new(&config.cluster)?) as _,
            config.rbd_mirror,
        ));
    }
    if config.mds.is_enabled() {
        collectors.push((
            Arc::new(MdsCollector::new(&config.cluster, config.mds_slow_op_threshold)?) as _,
            config.mds,
        ));
    }

    Ok(collectors)
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Helpers shared by the collector unit tests.

    use std::collections::HashMap;

    use prometheus::proto::MetricFamily;

    /// Look up a sample by family name and a subset of its labels
    pub fn sample(families: &[MetricFamily], name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        let family = families.iter().find(|f| f.get_name() == name)?;
        family
            .get_metric()
            .iter()
            .find(|m| {
                let have: HashMap<&str, &str> = m
                    .get_label()
                    .iter()
                    .map(|l| (l.get_name(), l.get_value()))
                    .collect();
                labels.iter().all(|(k, v)| have.get(k) == Some(v))
            })
            .map(|m| {
                if m.has_counter() {
                    m.get_counter().get_value()
                } else {
                    m.get_gauge().get_value()
                }
            })
    }

    pub fn count(families: &[MetricFamily], name: &str) -> usize {
        families
            .iter()
            .find(|f| f.get_name() == name)
            .map_or(0, |f| f.get_metric().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::MockConn;
    use common::config::CollectorMode;

    fn context<'a>(conn: &'a MockConn, topology: &'a Topology, trackers: &'a Trackers) -> ScrapeContext<'a> {
        ScrapeContext {
            conn,
            version: None,
            topology,
            trackers,
            admin_timeout: Duration::from_millis(50),
            background_timeout: Duration::from_millis(50),
            pg_briefs: OnceCell::new(),
        }
    }

    #[tokio::test]
    async fn test_transport_error_surfaces() {
        let mut conn = MockConn::new();
        conn.expect_run_admin_command().returning(|_| {
            Err(ConnError::Failed {
                command: "ceph status".into(),
                status: "exit status: 1".into(),
                stderr: "connection refused".into(),
            })
        });

        let (topology, trackers) = (Topology::default(), Trackers::default());
        let ctx = context(&conn, &topology, &trackers);

        let err = ctx.admin(AdminCommand::new("status")).await.unwrap_err();
        assert!(matches!(err, ExporterError::Transport(ConnError::Failed { .. })));
    }

    #[tokio::test]
    async fn test_malformed_payload_names_the_request() {
        let mut conn = MockConn::new();
        conn.expect_run_admin_command().returning(|_| {
            Ok(AdminResponse {
                data: b"<html>".to_vec(),
                info: String::new(),
            })
        });

        let (topology, trackers) = (Topology::default(), Trackers::default());
        let ctx = context(&conn, &topology, &trackers);

        let err = ctx
            .admin_json::<serde_json::Value>(AdminCommand::new("df"), "df")
            .await
            .unwrap_err();
        assert!(matches!(err, ExporterError::Parse { what: "df", .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_a_transport_error() {
        struct Stalled;

        #[async_trait]
        impl Conn for Stalled {
            async fn run_admin_command(&self, _: &[u8]) -> std::result::Result<AdminResponse, ConnError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(AdminResponse::default())
            }

            async fn run_background_command(&self, _: &[u8]) -> std::result::Result<Vec<u8>, ConnError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
        }

        let conn = Stalled;
        let (topology, trackers) = (Topology::default(), Trackers::default());
        let ctx = ScrapeContext {
            conn: &conn,
            version: None,
            topology: &topology,
            trackers: &trackers,
            admin_timeout: Duration::from_secs(60),
            background_timeout: Duration::from_secs(180),
            pg_briefs: OnceCell::new(),
        };

        let err = ctx.admin(AdminCommand::new("status")).await.unwrap_err();
        assert!(matches!(
            err,
            ExporterError::Transport(ConnError::Timeout(d)) if d == Duration::from_secs(60)
        ));

        let err = ctx
            .background(CliCommand::new(crate::conn::Tool::Rbd, ["mirror", "pool", "status"]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExporterError::Transport(ConnError::Timeout(d)) if d == Duration::from_secs(180)
        ));
    }

    #[test]
    fn test_optional_collectors_follow_config() {
        let mut config = ExporterConfig::default();
        assert!(optional_collectors(&config).unwrap().is_empty());

        config.rgw = CollectorMode::Background;
        config.rbd_mirror = CollectorMode::Foreground;
        let optional = optional_collectors(&config).unwrap();

        let names: Vec<_> = optional.iter().map(|(c, m)| (c.name(), *m)).collect();
        assert_eq!(
            names,
            vec![
                ("rgw", CollectorMode::Background),
                ("rbd_mirror", CollectorMode::Foreground)
            ]
        );
        assert_eq!(optional[1].0.subsystem(), Some(Subsystem::RbdMirror));
    }

    #[test]
    fn test_core_collector_names_are_unique() {
        let collectors = core_collectors("test").unwrap();
        let mut names: Vec<_> = collectors.iter().map(|c| c.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), collectors.len());
    }
}
