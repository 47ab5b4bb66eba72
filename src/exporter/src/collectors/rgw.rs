//! RADOS gateway garbage collection and resharding backlog.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, Registry};
use serde::Deserialize;
use tracing::warn;

use super::{Collector, ScrapeContext};
use crate::conn::{CliCommand, Tool};
use crate::error::Result;
use crate::metrics::{create_registry, gauge_vec, set};

#[derive(Debug, Deserialize)]
struct GcTask {
    #[serde(default)]
    time: String,
    #[serde(default)]
    objs: Vec<serde_json::Value>,
}

impl GcTask {
    /// When the task becomes eligible for processing.
    ///
    /// The gateway prints `YYYY-MM-DD HH:MM:SS.<fraction>`; only the whole
    /// seconds are read. `None` when the time cannot be parsed.
    fn expires_at(&self) -> Option<DateTime<Utc>> {
        let seconds = self.time.split('.').next()?;
        NaiveDateTime::parse_from_str(seconds, "%Y-%m-%d %H:%M:%S")
            .ok()
            .map(|t| t.and_utc())
    }
}

/// Tasks and objects waiting for collection, split by expiry
#[derive(Debug, Default, PartialEq)]
struct GcBacklog {
    active_tasks: f64,
    active_objects: f64,
    pending_tasks: f64,
    pending_objects: f64,
}

impl GcBacklog {
    /// A task past its expiry, or with an unreadable time, is active
    fn classify(tasks: &[GcTask], now: DateTime<Utc>) -> Self {
        let mut backlog = Self::default();
        for task in tasks {
            let objects = task.objs.len() as f64;
            if task.expires_at().is_none_or(|at| at <= now) {
                backlog.active_tasks += 1.0;
                backlog.active_objects += objects;
            } else {
                backlog.pending_tasks += 1.0;
                backlog.pending_objects += objects;
            }
        }
        backlog
    }
}

pub struct RgwCollector {
    registry: Registry,
    active_tasks: GaugeVec,
    active_objects: GaugeVec,
    pending_tasks: GaugeVec,
    pending_objects: GaugeVec,
    reshard_queue: GaugeVec,
}

impl RgwCollector {
    pub fn new(cluster: &str) -> Result<Self> {
        let r = create_registry(cluster)?;

        Ok(Self {
            active_tasks: gauge_vec(
                &r,
                "rgw_gc_active_tasks",
                "Garbage collection tasks ready to run",
                &[],
            )?,
            active_objects: gauge_vec(
                &r,
                "rgw_gc_active_objects",
                "Objects in garbage collection tasks ready to run",
                &[],
            )?,
            pending_tasks: gauge_vec(
                &r,
                "rgw_gc_pending_tasks",
                "Garbage collection tasks not yet expired",
                &[],
            )?,
            pending_objects: gauge_vec(
                &r,
                "rgw_gc_pending_objects",
                "Objects in garbage collection tasks not yet expired",
                &[],
            )?,
            reshard_queue: gauge_vec(
                &r,
                "rgw_reshard_queue_length",
                "Buckets waiting to be resharded",
                &[],
            )?,
            registry: r,
        })
    }
}

#[async_trait]
impl Collector for RgwCollector {
    fn name(&self) -> &'static str {
        "rgw"
    }

    async fn collect(&self, ctx: &ScrapeContext<'_>) -> Result<Vec<MetricFamily>> {
        let (tasks, reshard) = tokio::join!(
            ctx.background_json::<Vec<GcTask>>(
                CliCommand::new(Tool::RadosgwAdmin, ["gc", "list", "--include-all"]),
                "gc list",
            ),
            ctx.background_json::<Vec<serde_json::Value>>(
                CliCommand::new(Tool::RadosgwAdmin, ["reshard", "list"]),
                "reshard list",
            ),
        );
        let tasks = tasks?;

        let backlog = GcBacklog::classify(&tasks, Utc::now());
        set(&self.active_tasks, backlog.active_tasks);
        set(&self.active_objects, backlog.active_objects);
        set(&self.pending_tasks, backlog.pending_tasks);
        set(&self.pending_objects, backlog.pending_objects);

        match reshard {
            Ok(queue) => set(&self.reshard_queue, queue.len() as f64),
            Err(e) => {
                self.reshard_queue.reset();
                warn!(error = %e, "Failed to list the reshard queue");
            }
        }

        Ok(self.registry.gather())
    }
}
