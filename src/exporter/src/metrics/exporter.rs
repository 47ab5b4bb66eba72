use std::time::Duration;

use prometheus::proto::MetricFamily;
use prometheus::{CounterVec, GaugeVec, Registry};

use super::{counter_vec, create_registry, gauge_vec, set};
use crate::error::Result;

/// Metrics describing the exporter's own scrape cycles
pub struct ExporterMetrics {
    registry: Registry,
    pub collector_duration: GaugeVec,
    pub collector_success: GaugeVec,
    pub scrapes: CounterVec,
    pub rbd_mirror_up: GaugeVec,
}

impl ExporterMetrics {
    pub fn new(cluster: &str) -> Result<Self> {
        let registry = create_registry(cluster)?;

        let collector_duration = gauge_vec(
            &registry,
            "exporter_collector_duration_seconds",
            "Time spent in a collector during the last scrape",
            &["collector"],
        )?;
        let collector_success = gauge_vec(
            &registry,
            "exporter_collector_success",
            "Whether a collector produced metrics during the last scrape",
            &["collector"],
        )?;
        let scrapes = counter_vec(
            &registry,
            "exporter_scrapes_total",
            "Number of scrape cycles run",
            &[],
        )?;
        let rbd_mirror_up = gauge_vec(
            &registry,
            "rbd_mirror_up",
            "Whether rbd-mirror daemons were detected in the cluster",
            &[],
        )?;

        #[cfg(target_os = "linux")]
        registry
            .register(Box::new(
                prometheus::process_collector::ProcessCollector::for_self(),
            ))
            .map_err(|e| {
                crate::error::ExporterError::Initialization(format!(
                    "Failed to register process metrics: {e}"
                ))
            })?;

        Ok(Self {
            registry,
            collector_duration,
            collector_success,
            scrapes,
            rbd_mirror_up,
        })
    }

    /// Forget the previous cycle's per-collector samples
    pub fn begin_cycle(&self) {
        self.collector_duration.reset();
        self.collector_success.reset();
        self.rbd_mirror_up.reset();
        self.scrapes.with_label_values(&[]).inc();
    }

    pub fn observe(&self, collector: &str, elapsed: Option<Duration>, success: bool) {
        if let Some(elapsed) = elapsed {
            self.collector_duration
                .with_label_values(&[collector])
                .set(elapsed.as_secs_f64());
        }
        self.collector_success
            .with_label_values(&[collector])
            .set(if success { 1.0 } else { 0.0 });
    }

    pub fn set_rbd_mirror_up(&self, up: bool) {
        set(&self.rbd_mirror_up, if up { 1.0 } else { 0.0 });
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(families: &[MetricFamily], name: &str, label: &str) -> Option<f64> {
        families
            .iter()
            .find(|f| f.get_name() == name)?
            .get_metric()
            .iter()
            .find(|m| m.get_label().iter().any(|l| l.get_value() == label))
            .map(|m| m.get_gauge().get_value())
    }

    #[test]
    fn test_cycle_resets_collector_samples() {
        let metrics = ExporterMetrics::new("test").unwrap();

        metrics.begin_cycle();
        metrics.observe("health", Some(Duration::from_millis(250)), true);
        metrics.observe("osd", Some(Duration::from_millis(10)), false);

        let families = metrics.gather();
        assert_eq!(
            value(&families, "ceph_exporter_collector_duration_seconds", "health"),
            Some(0.25)
        );
        assert_eq!(value(&families, "ceph_exporter_collector_success", "osd"), Some(0.0));

        metrics.begin_cycle();
        metrics.observe("health", None, true);

        let families = metrics.gather();
        assert_eq!(value(&families, "ceph_exporter_collector_success", "osd"), None);
        assert_eq!(
            value(&families, "ceph_exporter_collector_duration_seconds", "health"),
            None
        );

        let scrapes = families
            .iter()
            .find(|f| f.get_name() == "ceph_exporter_scrapes_total")
            .unwrap();
        assert_eq!(scrapes.get_metric()[0].get_counter().get_value(), 2.0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_process_metrics_are_namespaced() {
        let metrics = ExporterMetrics::new("test").unwrap();
        assert!(
            metrics
                .gather()
                .iter()
                .any(|f| f.get_name() == "ceph_process_start_time_seconds")
        );
    }
}
