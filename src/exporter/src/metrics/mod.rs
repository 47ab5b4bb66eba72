pub mod exporter;

use std::collections::HashMap;

use prometheus::{CounterVec, GaugeVec, Opts, Registry};

use crate::error::{ExporterError, Result};

pub use exporter::ExporterMetrics;

/// Namespace of every exported series
pub const NAMESPACE: &str = "ceph";

/// Registry that prefixes every family with `ceph_` and stamps the
/// `cluster` label on every series.
pub fn create_registry(cluster: &str) -> Result<Registry> {
    let labels = HashMap::from([("cluster".to_string(), cluster.to_string())]);

    Registry::new_custom(Some(NAMESPACE.to_string()), Some(labels)).map_err(|e| {
        ExporterError::Initialization(format!("Failed to create metrics registry: {e}"))
    })
}

/// Register a gauge family. Label-less families use an empty label list so
/// that a reset removes their sample too.
pub fn gauge_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> Result<GaugeVec> {
    let gauge = GaugeVec::new(Opts::new(name, help), labels).map_err(|e| {
        ExporterError::Initialization(format!("Failed to create {name} metric: {e}"))
    })?;

    registry.register(Box::new(gauge.clone())).map_err(|e| {
        ExporterError::Initialization(format!("Failed to register {name} metric: {e}"))
    })?;

    Ok(gauge)
}

/// Register a counter family mirroring a cumulative value read from the cluster
pub fn counter_vec(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<CounterVec> {
    let counter = CounterVec::new(Opts::new(name, help), labels).map_err(|e| {
        ExporterError::Initialization(format!("Failed to create {name} metric: {e}"))
    })?;

    registry.register(Box::new(counter.clone())).map_err(|e| {
        ExporterError::Initialization(format!("Failed to register {name} metric: {e}"))
    })?;

    Ok(counter)
}

/// Set the single sample of a label-less family
pub fn set(gauge: &GaugeVec, value: f64) {
    gauge.with_label_values(&[]).set(value);
}

/// Replace a counter's value with the cluster's cumulative total.
///
/// Must follow a reset of the family within the same cycle.
pub fn set_counter(counter: &CounterVec, labels: &[&str], value: f64) {
    if value > 0.0 {
        counter.with_label_values(labels).inc_by(value);
    } else {
        counter.with_label_values(labels);
    }
}
