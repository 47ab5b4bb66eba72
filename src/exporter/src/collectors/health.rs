//! Cluster health, placement group states and client IO.

use std::collections::BTreeMap;
use std::time::Instant;

use async_trait::async_trait;
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, Registry};
use serde::Deserialize;
use tracing::warn;

use super::{Collector, ScrapeContext};
use crate::conn::AdminCommand;
use crate::error::Result;
use crate::extract::{self, UnitError};
use crate::metrics::{create_registry, gauge_vec, set};
use crate::schema::{IoRateSource, MgrMapShape, OsdMapShape};

/// Checks that turn a warning into a critical warning
const CRITICAL_CHECKS: &[&str] = &[
    "MON_DOWN",
    "OSD_DOWN",
    "OSD_HOST_DOWN",
    "OSD_ROOT_DOWN",
    "OSD_FULL",
    "OSD_BACKFILLFULL",
    "POOL_FULL",
    "PG_AVAILABILITY",
    "PG_DAMAGED",
    "PG_RECOVERY_FULL",
    "PG_BACKFILL_FULL",
    "MDS_ALL_DOWN",
    "MGR_DOWN",
];

/// Flags always exported, at 0 unless set
const WELL_KNOWN_FLAGS: &[&str] = &[
    "full",
    "pauserd",
    "pausewr",
    "noup",
    "nodown",
    "noin",
    "noout",
    "nobackfill",
    "norecover",
    "norebalance",
    "noscrub",
    "nodeep-scrub",
    "notieragent",
    "nosnaptrim",
];

/// PG state buckets: label, substring matched, substring that excludes a PG.
///
/// `scrubbing` must not count deep scrubs and `snaptrim` must not count
/// `snaptrim_wait`, as both terms are substrings of the other bucket.
const PG_STATE_BUCKETS: &[(&str, &str, Option<&str>)] = &[
    ("active", "active", None),
    ("clean", "clean", None),
    ("degraded", "degraded", None),
    ("undersized", "undersized", None),
    ("stale", "stale", None),
    ("peering", "peering", None),
    ("peered", "peered", None),
    ("down", "down", None),
    ("incomplete", "incomplete", None),
    ("inconsistent", "inconsistent", None),
    ("activating", "activating", None),
    ("creating", "creating", None),
    ("unknown", "unknown", None),
    ("remapped", "remapped", None),
    ("recovering", "recovering", None),
    ("recovery_wait", "recovery_wait", None),
    ("recovery_toofull", "recovery_toofull", None),
    ("recovery_unfound", "recovery_unfound", None),
    ("forced_recovery", "forced_recovery", None),
    ("backfilling", "backfilling", None),
    ("backfill_wait", "backfill_wait", None),
    ("backfill_toofull", "backfill_toofull", None),
    ("backfill_unfound", "backfill_unfound", None),
    ("forced_backfill", "forced_backfill", None),
    ("repair", "repair", None),
    ("scrubbing", "scrubbing", Some("deep")),
    ("deep_scrubbing", "deep", None),
    ("snaptrim", "snaptrim", Some("snaptrim_wait")),
    ("snaptrim_wait", "snaptrim_wait", None),
    ("snaptrim_error", "snaptrim_error", None),
    ("laggy", "laggy", None),
    ("premerge", "premerge", None),
];

/// Count PGs per state bucket from `(composite state, count)` pairs.
///
/// Every bucket is present, zero when no PG matches.
pub fn pg_state_buckets<'a, I>(states: I) -> BTreeMap<&'static str, f64>
where
    I: IntoIterator<Item = (&'a str, f64)> + Clone,
{
    PG_STATE_BUCKETS
        .iter()
        .map(|(label, term, exclude)| {
            let total: f64 = states
                .clone()
                .into_iter()
                .filter(|(state, _)| state.contains(term))
                .filter(|(state, _)| exclude.is_none_or(|e| !state.contains(e)))
                .map(|(_, count)| count)
                .sum();
            (*label, total)
        })
        .collect()
}

/// 0 ok, 1 warn, 2 err
fn health_status_value(status: &str) -> Option<f64> {
    match status {
        "HEALTH_OK" => Some(0.0),
        "HEALTH_WARN" => Some(1.0),
        "HEALTH_ERR" => Some(2.0),
        _ => None,
    }
}

/// 0 ok, 1 soft warn, 2 critical warn, 3 err
fn health_status_interp<'a>(status: &str, checks: impl IntoIterator<Item = &'a str>) -> Option<f64> {
    match status {
        "HEALTH_OK" => Some(0.0),
        "HEALTH_WARN" => {
            let critical = checks.into_iter().any(|name| CRITICAL_CHECKS.contains(&name));
            Some(if critical { 2.0 } else { 1.0 })
        }
        "HEALTH_ERR" => Some(3.0),
        _ => None,
    }
}

#[derive(Debug, Default, Deserialize)]
struct StatusReport {
    #[serde(default)]
    health: HealthReport,
    #[serde(default)]
    pgmap: PgMap,
    #[serde(default)]
    osdmap: serde_json::Value,
    #[serde(default)]
    mgrmap: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct HealthReport {
    #[serde(default)]
    status: String,
    #[serde(default)]
    checks: BTreeMap<String, HealthCheck>,
}

#[derive(Debug, Deserialize)]
struct HealthCheck {
    severity: String,
    #[serde(default)]
    summary: CheckSummary,
}

#[derive(Debug, Default, Deserialize)]
struct CheckSummary {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PgMap {
    pgs_by_state: Vec<PgStateCount>,
    num_pgs: f64,
    read_bytes_sec: f64,
    write_bytes_sec: f64,
    read_op_per_sec: f64,
    write_op_per_sec: f64,
    recovering_bytes_per_sec: f64,
    recovering_keys_per_sec: f64,
    recovering_objects_per_sec: f64,
    flush_bytes_sec: f64,
    evict_bytes_sec: f64,
    promote_op_per_sec: f64,
}

#[derive(Debug, Default, Deserialize)]
struct PgStateCount {
    state_name: String,
    count: f64,
}

/// Client, recovery and cache-tier rates, each possibly absent
#[derive(Debug, Default, PartialEq)]
struct IoRates {
    client_read_bytes: Option<f64>,
    client_write_bytes: Option<f64>,
    client_read_ops: Option<f64>,
    client_write_ops: Option<f64>,
    recovery_bytes: Option<f64>,
    recovery_keys: Option<f64>,
    recovery_objects: Option<f64>,
    cache_flush_bytes: Option<f64>,
    cache_evict_bytes: Option<f64>,
    cache_promote_ops: Option<f64>,
}

impl IoRates {
    fn from_pgmap(pgmap: &PgMap) -> Self {
        Self {
            client_read_bytes: Some(pgmap.read_bytes_sec),
            client_write_bytes: Some(pgmap.write_bytes_sec),
            client_read_ops: Some(pgmap.read_op_per_sec),
            client_write_ops: Some(pgmap.write_op_per_sec),
            recovery_bytes: Some(pgmap.recovering_bytes_per_sec),
            recovery_keys: Some(pgmap.recovering_keys_per_sec),
            recovery_objects: Some(pgmap.recovering_objects_per_sec),
            cache_flush_bytes: Some(pgmap.flush_bytes_sec),
            cache_evict_bytes: Some(pgmap.evict_bytes_sec),
            cache_promote_ops: Some(pgmap.promote_op_per_sec),
        }
    }

    fn from_plain_text(text: &str) -> Self {
        fn unit_checked(metric: &str, rate: std::result::Result<Option<f64>, UnitError>) -> Option<f64> {
            rate.unwrap_or_else(|e| {
                warn!(metric, error = %e, "Skipping rate with unknown unit");
                None
            })
        }

        Self {
            client_read_bytes: unit_checked("client_io_read_bytes", extract::client_read_bytes(text)),
            client_write_bytes: unit_checked(
                "client_io_write_bytes",
                extract::client_write_bytes(text),
            ),
            client_read_ops: extract::client_read_ops(text),
            client_write_ops: extract::client_write_ops(text),
            recovery_bytes: unit_checked("recovery_io_bytes", extract::recovery_bytes(text)),
            recovery_keys: extract::recovery_keys(text),
            recovery_objects: extract::recovery_objects(text),
            cache_flush_bytes: unit_checked("cache_flush_io_bytes", extract::cache_flush_bytes(text)),
            cache_evict_bytes: unit_checked("cache_evict_io_bytes", extract::cache_evict_bytes(text)),
            cache_promote_ops: extract::cache_promote_ops(text),
        }
    }

    fn client_ops(&self) -> Option<f64> {
        match (self.client_read_ops, self.client_write_ops) {
            (None, None) => None,
            (r, w) => Some(r.unwrap_or_default() + w.unwrap_or_default()),
        }
    }
}

/// Signals extracted from health check messages
#[derive(Debug, Default)]
struct CheckSignals {
    conditions: BTreeMap<String, f64>,
    stuck: BTreeMap<String, f64>,
    degraded_objects: Option<f64>,
    misplaced: Option<(f64, f64)>,
    slow_ops: Option<(f64, f64)>,
    mons_down: Option<f64>,
    osds_down: Option<f64>,
    crash_reports: Option<f64>,
    too_many_repairs: Option<f64>,
    flags: Vec<String>,
}

impl CheckSignals {
    fn extract<'a>(messages: impl IntoIterator<Item = &'a str>) -> Self {
        let mut signals = CheckSignals::default();

        for message in messages {
            for pg in extract::pg_conditions(message) {
                let target = if pg.stuck {
                    &mut signals.stuck
                } else {
                    &mut signals.conditions
                };
                *target.entry(pg.condition).or_default() += pg.count;
            }

            if let Some((degraded, _)) = extract::degraded_objects(message) {
                signals.degraded_objects = Some(degraded);
            }
            if let Some(misplaced) = extract::misplaced_objects(message) {
                signals.misplaced = Some(misplaced);
            }
            if let Some(slow) = extract::slow_ops(message) {
                signals.slow_ops = Some(slow);
            }
            if let Some((down, _)) = extract::mons_down(message) {
                signals.mons_down = Some(down);
            }
            if let Some(down) = extract::osds_down(message) {
                signals.osds_down = Some(down);
            }
            if let Some(crashes) = extract::new_crash_reports(message) {
                signals.crash_reports = Some(crashes);
            }
            if let Some(repairs) = extract::too_many_repairs(message) {
                signals.too_many_repairs = Some(repairs);
            }
            if let Some(flags) = extract::osdmap_flags(message) {
                signals.flags.extend(flags);
            }
        }

        signals
    }
}

/// Health, PG state and IO rate metrics from `status` and `pg dump`
pub struct HealthCollector {
    registry: Registry,
    health_status: GaugeVec,
    health_status_interp: GaugeVec,
    health_detail: GaugeVec,
    total_pgs: GaugeVec,
    pg_state: GaugeVec,
    pg_condition: GaugeVec,
    stuck_pgs: GaugeVec,
    degraded_objects: GaugeVec,
    misplaced_objects: GaugeVec,
    misplaced_ratio: GaugeVec,
    slow_ops: GaugeVec,
    slow_ops_oldest: GaugeVec,
    mons_down: GaugeVec,
    health_osds_down: GaugeVec,
    new_crash_reports: GaugeVec,
    too_many_repairs: GaugeVec,
    osd_map_flags: GaugeVec,
    osds: GaugeVec,
    osds_up: GaugeVec,
    osds_in: GaugeVec,
    osds_down: GaugeVec,
    pgs_remapped: GaugeVec,
    mgrs: GaugeVec,
    mgrs_active: GaugeVec,
    client_read_bytes: GaugeVec,
    client_write_bytes: GaugeVec,
    client_read_ops: GaugeVec,
    client_write_ops: GaugeVec,
    client_ops: GaugeVec,
    recovery_bytes: GaugeVec,
    recovery_keys: GaugeVec,
    recovery_objects: GaugeVec,
    cache_flush_bytes: GaugeVec,
    cache_evict_bytes: GaugeVec,
    cache_promote_ops: GaugeVec,
    oldest_inactive_pg: GaugeVec,
}

impl HealthCollector {
    pub fn new(cluster: &str) -> Result<Self> {
        let r = create_registry(cluster)?;

        Ok(Self {
            health_status: gauge_vec(&r, "health_status", "Health status: 0 OK, 1 WARN, 2 ERR", &[])?,
            health_status_interp: gauge_vec(
                &r,
                "health_status_interp",
                "Health status: 0 OK, 1 soft WARN, 2 critical WARN, 3 ERR",
                &[],
            )?,
            health_detail: gauge_vec(
                &r,
                "health_detail",
                "Active health checks, always 1",
                &["name", "severity"],
            )?,
            total_pgs: gauge_vec(&r, "total_pgs", "Number of placement groups", &[])?,
            pg_state: gauge_vec(&r, "pg_state", "Placement groups per state", &["state"])?,
            pg_condition: gauge_vec(
                &r,
                "health_pg_condition",
                "Placement groups reported in a condition by health checks",
                &["condition"],
            )?,
            stuck_pgs: gauge_vec(
                &r,
                "stuck_pgs",
                "Placement groups stuck in a state",
                &["state"],
            )?,
            degraded_objects: gauge_vec(&r, "degraded_objects", "Degraded object copies", &[])?,
            misplaced_objects: gauge_vec(&r, "misplaced_objects", "Misplaced object copies", &[])?,
            misplaced_ratio: gauge_vec(
                &r,
                "misplaced_ratio",
                "Fraction of object copies misplaced",
                &[],
            )?,
            slow_ops: gauge_vec(&r, "slow_ops", "Operations blocked longer than expected", &[])?,
            slow_ops_oldest: gauge_vec(
                &r,
                "slow_ops_oldest_blocked_seconds",
                "Age of the oldest blocked operation",
                &[],
            )?,
            mons_down: gauge_vec(&r, "mons_down", "Monitors out of quorum", &[])?,
            health_osds_down: gauge_vec(
                &r,
                "health_osds_down",
                "OSDs down while still in, as reported by health checks",
                &[],
            )?,
            new_crash_reports: gauge_vec(
                &r,
                "new_crash_reports",
                "Daemons that crashed recently",
                &[],
            )?,
            too_many_repairs: gauge_vec(
                &r,
                "osds_too_many_repair",
                "OSDs with too many repaired reads",
                &[],
            )?,
            osd_map_flags: gauge_vec(&r, "osd_map_flags", "OSD map flags currently set", &["flag"])?,
            osds: gauge_vec(&r, "osds", "Number of OSDs", &[])?,
            osds_up: gauge_vec(&r, "osds_up", "Number of OSDs up", &[])?,
            osds_in: gauge_vec(&r, "osds_in", "Number of OSDs in", &[])?,
            osds_down: gauge_vec(&r, "osds_down", "Number of OSDs down", &[])?,
            pgs_remapped: gauge_vec(&r, "pgs_remapped", "Remapped placement groups", &[])?,
            mgrs: gauge_vec(&r, "mgrs", "Number of managers", &[])?,
            mgrs_active: gauge_vec(&r, "mgrs_active", "Number of active managers", &[])?,
            client_read_bytes: gauge_vec(&r, "client_io_read_bytes", "Client read bytes per second", &[])?,
            client_write_bytes: gauge_vec(
                &r,
                "client_io_write_bytes",
                "Client write bytes per second",
                &[],
            )?,
            client_read_ops: gauge_vec(&r, "client_io_read_ops", "Client read operations per second", &[])?,
            client_write_ops: gauge_vec(
                &r,
                "client_io_write_ops",
                "Client write operations per second",
                &[],
            )?,
            client_ops: gauge_vec(&r, "client_io_ops", "Client operations per second", &[])?,
            recovery_bytes: gauge_vec(&r, "recovery_io_bytes", "Recovery bytes per second", &[])?,
            recovery_keys: gauge_vec(&r, "recovery_io_keys", "Recovery keys per second", &[])?,
            recovery_objects: gauge_vec(&r, "recovery_io_objects", "Recovery objects per second", &[])?,
            cache_flush_bytes: gauge_vec(
                &r,
                "cache_flush_io_bytes",
                "Cache tier flush bytes per second",
                &[],
            )?,
            cache_evict_bytes: gauge_vec(
                &r,
                "cache_evict_io_bytes",
                "Cache tier evict bytes per second",
                &[],
            )?,
            cache_promote_ops: gauge_vec(
                &r,
                "cache_promote_io_ops",
                "Cache tier promotions per second",
                &[],
            )?,
            oldest_inactive_pg: gauge_vec(
                &r,
                "oldest_inactive_pg",
                "Seconds the longest inactive placement group has been inactive",
                &[],
            )?,
            registry: r,
        })
    }

    fn gauges(&self) -> Vec<&GaugeVec> {
        vec![
            &self.health_status,
            &self.health_status_interp,
            &self.health_detail,
            &self.total_pgs,
            &self.pg_state,
            &self.pg_condition,
            &self.stuck_pgs,
            &self.degraded_objects,
            &self.misplaced_objects,
            &self.misplaced_ratio,
            &self.slow_ops,
            &self.slow_ops_oldest,
            &self.mons_down,
            &self.health_osds_down,
            &self.new_crash_reports,
            &self.too_many_repairs,
            &self.osd_map_flags,
            &self.osds,
            &self.osds_up,
            &self.osds_in,
            &self.osds_down,
            &self.pgs_remapped,
            &self.mgrs,
            &self.mgrs_active,
            &self.client_read_bytes,
            &self.client_write_bytes,
            &self.client_read_ops,
            &self.client_write_ops,
            &self.client_ops,
            &self.recovery_bytes,
            &self.recovery_keys,
            &self.recovery_objects,
            &self.cache_flush_bytes,
            &self.cache_evict_bytes,
            &self.cache_promote_ops,
            &self.oldest_inactive_pg,
        ]
    }

    /// Update the inactive tracker from a PG listing
    async fn track_inactive(&self, ctx: &ScrapeContext<'_>) -> Result<f64> {
        let pgs = ctx.pg_briefs().await?;

        let now = Instant::now();
        let tracker = &ctx.trackers.inactive;
        for pg in pgs {
            tracker.observe(&pg.pgid, pg.state.contains("active"), now);
        }
        tracker.retain_observed(pgs.iter().map(|pg| pg.pgid.as_str()));

        Ok(tracker.oldest_age(now).as_secs_f64())
    }

    async fn io_rates(&self, ctx: &ScrapeContext<'_>, pgmap: &PgMap) -> Result<IoRates> {
        match IoRateSource::for_version(ctx.version) {
            IoRateSource::PgMap => Ok(IoRates::from_pgmap(pgmap)),
            IoRateSource::PlainText => {
                let response = ctx.admin(AdminCommand::plain("status")).await?;
                let text = String::from_utf8_lossy(&response.data);
                Ok(IoRates::from_plain_text(&text))
            }
        }
    }
}

fn set_opt(gauge: &GaugeVec, value: Option<f64>) {
    if let Some(value) = value {
        set(gauge, value);
    }
}

#[async_trait]
impl Collector for HealthCollector {
    fn name(&self) -> &'static str {
        "health"
    }

    async fn collect(&self, ctx: &ScrapeContext<'_>) -> Result<Vec<MetricFamily>> {
        let (status, inactive_age) = tokio::join!(
            ctx.admin_json::<StatusReport>(AdminCommand::new("status"), "status"),
            self.track_inactive(ctx),
        );
        let status = status?;

        let osdmap = OsdMapShape::for_version(ctx.version).decode(status.osdmap)?;
        let mgrs = MgrMapShape::for_version(ctx.version).decode(status.mgrmap)?;
        let rates = self.io_rates(ctx, &status.pgmap).await?;

        let checks = &status.health.checks;
        let signals = CheckSignals::extract(checks.values().map(|c| c.summary.message.as_str()));

        for gauge in self.gauges() {
            gauge.reset();
        }

        set_opt(&self.health_status, health_status_value(&status.health.status));
        set_opt(
            &self.health_status_interp,
            health_status_interp(&status.health.status, checks.keys().map(String::as_str)),
        );
        for (name, check) in checks {
            self.health_detail
                .with_label_values(&[name.as_str(), check.severity.as_str()])
                .set(1.0);
        }

        set(&self.total_pgs, status.pgmap.num_pgs);
        let buckets = pg_state_buckets(
            status
                .pgmap
                .pgs_by_state
                .iter()
                .map(|s| (s.state_name.as_str(), s.count)),
        );
        for (state, count) in buckets {
            self.pg_state.with_label_values(&[state]).set(count);
        }

        for (condition, count) in &signals.conditions {
            self.pg_condition
                .with_label_values(&[condition.as_str()])
                .set(*count);
        }
        for (state, count) in &signals.stuck {
            self.stuck_pgs.with_label_values(&[state.as_str()]).set(*count);
        }

        set_opt(&self.degraded_objects, signals.degraded_objects);
        if let Some((misplaced, total)) = signals.misplaced {
            set(&self.misplaced_objects, misplaced);
            if total > 0.0 {
                set(&self.misplaced_ratio, misplaced / total);
            }
        }
        if let Some((count, oldest)) = signals.slow_ops {
            set(&self.slow_ops, count);
            set(&self.slow_ops_oldest, oldest);
        }
        set_opt(&self.mons_down, signals.mons_down);
        set_opt(&self.health_osds_down, signals.osds_down);
        set_opt(&self.new_crash_reports, signals.crash_reports);
        set_opt(&self.too_many_repairs, signals.too_many_repairs);

        for flag in WELL_KNOWN_FLAGS {
            self.osd_map_flags.with_label_values(&[*flag]).set(0.0);
        }
        for flag in &signals.flags {
            self.osd_map_flags.with_label_values(&[flag.as_str()]).set(1.0);
        }

        set(&self.osds, osdmap.num_osds);
        set(&self.osds_up, osdmap.num_up_osds);
        set(&self.osds_in, osdmap.num_in_osds);
        set(&self.osds_down, osdmap.num_osds - osdmap.num_up_osds);
        set(&self.pgs_remapped, osdmap.num_remapped_pgs);
        set(&self.mgrs, mgrs.total);
        set(&self.mgrs_active, mgrs.active);

        set_opt(&self.client_read_bytes, rates.client_read_bytes);
        set_opt(&self.client_write_bytes, rates.client_write_bytes);
        set_opt(&self.client_read_ops, rates.client_read_ops);
        set_opt(&self.client_write_ops, rates.client_write_ops);
        set_opt(&self.client_ops, rates.client_ops());
        set_opt(&self.recovery_bytes, rates.recovery_bytes);
        set_opt(&self.recovery_keys, rates.recovery_keys);
        set_opt(&self.recovery_objects, rates.recovery_objects);
        set_opt(&self.cache_flush_bytes, rates.cache_flush_bytes);
        set_opt(&self.cache_evict_bytes, rates.cache_evict_bytes);
        set_opt(&self.cache_promote_ops, rates.cache_promote_ops);

        match inactive_age {
            Ok(age) => set(&self.oldest_inactive_pg, age),
            Err(e) => warn!(error = %e, "Failed to list PGs, skipping inactive PG age"),
        }

        Ok(self.registry.gather())
    }
}
