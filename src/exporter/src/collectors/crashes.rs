use std::collections::BTreeMap;

use async_trait::async_trait;
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, Registry};
use serde::Deserialize;

use super::{Collector, ScrapeContext};
use crate::conn::AdminCommand;
use crate::error::Result;
use crate::metrics::{create_registry, gauge_vec};

#[derive(Debug, Deserialize)]
struct CrashReport {
    entity_name: String,
    /// Archive timestamp, absent or null while the report is new
    #[serde(default)]
    archived: Option<String>,
}

impl CrashReport {
    fn status(&self) -> &'static str {
        match self.archived.as_deref() {
            Some(ts) if !ts.is_empty() => "archived",
            _ => "new",
        }
    }
}

/// Crash reports per daemon from `crash ls`
pub struct CrashesCollector {
    registry: Registry,
    reports: GaugeVec,
}

impl CrashesCollector {
    pub fn new(cluster: &str) -> Result<Self> {
        let registry = create_registry(cluster)?;

        Ok(Self {
            reports: gauge_vec(
                &registry,
                "crash_reports",
                "Crash reports per daemon",
                &["entity", "status"],
            )?,
            registry,
        })
    }
}

#[async_trait]
impl Collector for CrashesCollector {
    fn name(&self) -> &'static str {
        "crashes"
    }

    async fn collect(&self, ctx: &ScrapeContext<'_>) -> Result<Vec<MetricFamily>> {
        let reports: Vec<CrashReport> = ctx
            .admin_json(AdminCommand::new("crash ls"), "crash ls")
            .await?;

        let mut counts: BTreeMap<(&str, &str), f64> = BTreeMap::new();
        for report in &reports {
            *counts
                .entry((report.entity_name.as_str(), report.status()))
                .or_default() += 1.0;
        }

        self.reports.reset();
        for ((entity, status), count) in counts {
            self.reports.with_label_values(&[entity, status]).set(count);
        }

        Ok(self.registry.gather())
    }
}
