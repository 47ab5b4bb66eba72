//! CephFS metadata server state and slow operations.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, Registry};
use serde::Deserialize;
use tracing::warn;

use super::{Collector, ScrapeContext};
use crate::conn::{AdminCommand, CliCommand, Tool};
use crate::error::Result;
use crate::metrics::{create_registry, gauge_vec};

#[derive(Debug, Deserialize)]
struct FsDump {
    #[serde(default)]
    filesystems: Vec<Filesystem>,
    #[serde(default)]
    standbys: Vec<MdsInfo>,
}

#[derive(Debug, Deserialize)]
struct Filesystem {
    mdsmap: MdsMap,
}

#[derive(Debug, Deserialize)]
struct MdsMap {
    fs_name: String,
    /// Keyed by `gid_<n>`
    #[serde(default)]
    info: BTreeMap<String, MdsInfo>,
}

#[derive(Debug, Deserialize)]
struct MdsInfo {
    name: String,
    #[serde(default = "no_rank")]
    rank: i64,
    state: String,
}

fn no_rank() -> i64 {
    -1
}

#[derive(Debug, Deserialize)]
struct OpsDump {
    #[serde(default)]
    ops: Vec<MdsOp>,
}

#[derive(Debug, Deserialize)]
struct MdsOp {
    #[serde(default)]
    description: String,
    #[serde(default)]
    age: f64,
    #[serde(default)]
    type_data: OpTypeData,
}

#[derive(Debug, Default, Deserialize)]
struct OpTypeData {
    #[serde(default)]
    op_type: String,
}

impl MdsOp {
    /// `type_data.op_type`, or the description up to its argument list
    fn optype(&self) -> &str {
        if !self.type_data.op_type.is_empty() {
            return &self.type_data.op_type;
        }
        self.description
            .split('(')
            .next()
            .unwrap_or_default()
            .trim()
    }
}

/// Count operations at least `threshold` old, per op type
fn slow_ops_by_type(ops: &[MdsOp], threshold: Duration) -> BTreeMap<&str, f64> {
    let threshold = threshold.as_secs_f64();
    let mut counts = BTreeMap::new();
    for op in ops.iter().filter(|op| op.age >= threshold) {
        *counts.entry(op.optype()).or_default() += 1.0;
    }
    counts
}

/// MDS daemon states from `fs dump` and slow ops from each active daemon
pub struct MdsCollector {
    registry: Registry,
    slow_op_threshold: Duration,
    daemon_state: GaugeVec,
    slow_ops: GaugeVec,
}

impl MdsCollector {
    pub fn new(cluster: &str, slow_op_threshold: Duration) -> Result<Self> {
        let r = create_registry(cluster)?;

        Ok(Self {
            slow_op_threshold,
            daemon_state: gauge_vec(
                &r,
                "mds_daemon_state",
                "MDS daemons by state, always 1",
                &["fs", "name", "rank", "state"],
            )?,
            slow_ops: gauge_vec(
                &r,
                "mds_daemon_slow_ops",
                "MDS operations older than the slow op threshold",
                &["fs", "name", "optype"],
            )?,
            registry: r,
        })
    }

    async fn daemon_ops(&self, ctx: &ScrapeContext<'_>, name: &str) -> Result<OpsDump> {
        let target = format!("mds.{name}");
        ctx.background_json(
            CliCommand::new(Tool::Ceph, ["tell", target.as_str(), "ops", "--format", "json"]),
            "mds ops",
        )
        .await
    }
}

#[async_trait]
impl Collector for MdsCollector {
    fn name(&self) -> &'static str {
        "mds"
    }

    async fn collect(&self, ctx: &ScrapeContext<'_>) -> Result<Vec<MetricFamily>> {
        let dump: FsDump = ctx.admin_json(AdminCommand::new("fs dump"), "fs dump").await?;

        let active: Vec<(&str, &str)> = dump
            .filesystems
            .iter()
            .flat_map(|fs| {
                fs.mdsmap
                    .info
                    .values()
                    .filter(|mds| mds.state == "up:active")
                    .map(move |mds| (fs.mdsmap.fs_name.as_str(), mds.name.as_str()))
            })
            .collect();
        let ops = join_all(active.iter().map(|(_, name)| self.daemon_ops(ctx, name))).await;

        self.daemon_state.reset();
        self.slow_ops.reset();

        for fs in &dump.filesystems {
            for mds in fs.mdsmap.info.values() {
                let rank = mds.rank.to_string();
                self.daemon_state
                    .with_label_values(&[
                        fs.mdsmap.fs_name.as_str(),
                        mds.name.as_str(),
                        rank.as_str(),
                        mds.state.as_str(),
                    ])
                    .set(1.0);
            }
        }
        for mds in &dump.standbys {
            let rank = mds.rank.to_string();
            self.daemon_state
                .with_label_values(&["", mds.name.as_str(), rank.as_str(), mds.state.as_str()])
                .set(1.0);
        }

        for ((fs, name), result) in active.iter().zip(ops) {
            match result {
                Ok(daemon) => {
                    for (optype, count) in slow_ops_by_type(&daemon.ops, self.slow_op_threshold) {
                        self.slow_ops.with_label_values(&[*fs, *name, optype]).set(count);
                    }
                }
                Err(e) => warn!(mds = *name, error = %e, "Failed to read MDS ops"),
            }
        }

        Ok(self.registry.gather())
    }
}
