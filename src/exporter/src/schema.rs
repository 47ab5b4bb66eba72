//! Payload shapes that changed between releases.
//!
//! Each gate picks a shape from the cluster version alone; payloads are never
//! inspected for which keys happen to be present. An unknown version selects the
//! oldest shape.

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::{ExporterError, Result};
use crate::version::{Version, at_least};

fn decode<T: DeserializeOwned>(what: &'static str, value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value).map_err(ExporterError::parse(what))
}

fn decode_slice<T: DeserializeOwned>(what: &'static str, data: &[u8]) -> Result<T> {
    serde_json::from_slice(data).map_err(ExporterError::parse(what))
}

/// OSD counters of the `status` osdmap block
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OsdMapCounts {
    #[serde(default)]
    pub num_osds: f64,
    #[serde(default)]
    pub num_up_osds: f64,
    #[serde(default)]
    pub num_in_osds: f64,
    #[serde(default)]
    pub num_remapped_pgs: f64,
}

#[derive(Debug, Deserialize)]
struct NestedOsdMap {
    osdmap: OsdMapCounts,
}

/// `osdmap.osdmap.{..}` before Octopus, `osdmap.{..}` from Octopus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsdMapShape {
    Nested,
    Flat,
}

impl OsdMapShape {
    pub fn for_version(version: Option<&Version>) -> Self {
        if at_least(version, &Version::OCTOPUS) {
            OsdMapShape::Flat
        } else {
            OsdMapShape::Nested
        }
    }

    pub fn decode(self, value: serde_json::Value) -> Result<OsdMapCounts> {
        match self {
            OsdMapShape::Nested => decode::<NestedOsdMap>("status osdmap", value).map(|n| n.osdmap),
            OsdMapShape::Flat => decode("status osdmap", value),
        }
    }
}

/// Manager availability derived from the `status` mgrmap block
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MgrCounts {
    pub total: f64,
    pub active: f64,
}

#[derive(Debug, Deserialize)]
struct LegacyMgrMap {
    #[serde(default)]
    active_name: String,
    #[serde(default)]
    available: bool,
    #[serde(default)]
    standbys: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct MgrMapSummary {
    #[serde(default)]
    available: bool,
    #[serde(default)]
    num_standbys: f64,
}

/// Full mgrmap with standby list before Octopus, summary counters from Octopus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MgrMapShape {
    Full,
    Summary,
}

impl MgrMapShape {
    pub fn for_version(version: Option<&Version>) -> Self {
        if at_least(version, &Version::OCTOPUS) {
            MgrMapShape::Summary
        } else {
            MgrMapShape::Full
        }
    }

    pub fn decode(self, value: serde_json::Value) -> Result<MgrCounts> {
        match self {
            MgrMapShape::Full => {
                let map: LegacyMgrMap = decode("status mgrmap", value)?;
                let active = if map.available && !map.active_name.is_empty() {
                    1.0
                } else {
                    0.0
                };
                Ok(MgrCounts {
                    total: active + map.standbys.len() as f64,
                    active,
                })
            }
            MgrMapShape::Summary => {
                let map: MgrMapSummary = decode("status mgrmap", value)?;
                let active = if map.available { 1.0 } else { 0.0 };
                Ok(MgrCounts {
                    total: active + map.num_standbys,
                    active,
                })
            }
        }
    }
}

/// One entry of `pg dump pgs_brief`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PgBrief {
    pub pgid: String,
    pub state: String,
    #[serde(default)]
    pub acting: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct WrappedPgDump {
    #[serde(default)]
    pg_stats: Vec<PgBrief>,
}

/// Bare array before Octopus, `{pg_ready, pg_stats}` from Octopus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgDumpShape {
    Bare,
    Wrapped,
}

impl PgDumpShape {
    pub fn for_version(version: Option<&Version>) -> Self {
        if at_least(version, &Version::OCTOPUS) {
            PgDumpShape::Wrapped
        } else {
            PgDumpShape::Bare
        }
    }

    pub fn decode(self, data: &[u8]) -> Result<Vec<PgBrief>> {
        match self {
            PgDumpShape::Bare => decode_slice("pg dump", data),
            PgDumpShape::Wrapped => {
                decode_slice::<WrappedPgDump>("pg dump", data).map(|d| d.pg_stats)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PerfStats {
    #[serde(default)]
    pub commit_latency_ms: f64,
    #[serde(default)]
    pub apply_latency_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OsdPerfInfo {
    pub id: i64,
    pub perf_stats: PerfStats,
}

#[derive(Debug, Deserialize)]
struct PerfInfos {
    #[serde(default)]
    osd_perf_infos: Vec<OsdPerfInfo>,
}

#[derive(Debug, Deserialize)]
struct WrappedPerfInfos {
    osdstats: PerfInfos,
}

/// `osd_perf_infos` at top level before Nautilus, under `osdstats` from Nautilus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsdPerfShape {
    TopLevel,
    OsdStats,
}

impl OsdPerfShape {
    pub fn for_version(version: Option<&Version>) -> Self {
        if at_least(version, &Version::NAUTILUS) {
            OsdPerfShape::OsdStats
        } else {
            OsdPerfShape::TopLevel
        }
    }

    pub fn decode(self, data: &[u8]) -> Result<Vec<OsdPerfInfo>> {
        match self {
            OsdPerfShape::TopLevel => {
                decode_slice::<PerfInfos>("osd perf", data).map(|p| p.osd_perf_infos)
            }
            OsdPerfShape::OsdStats => decode_slice::<WrappedPerfInfos>("osd perf", data)
                .map(|p| p.osdstats.osd_perf_infos),
        }
    }
}

/// Per-pool usage from `df detail`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolUsage {
    pub stored_bytes: f64,
    pub raw_used_bytes: f64,
    pub available_bytes: f64,
    pub percent_used: f64,
    pub objects: f64,
    pub dirty_objects: f64,
    pub quota_bytes: f64,
    pub quota_objects: f64,
    pub read_ops: f64,
    pub read_bytes: f64,
    pub write_ops: f64,
    pub write_bytes: f64,
}

/// Raw `df` pool stats; which field means what depends on the release
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawPoolStats {
    pub stored: f64,
    pub bytes_used: f64,
    pub raw_bytes_used: f64,
    pub max_avail: f64,
    pub percent_used: f64,
    pub objects: f64,
    pub dirty: f64,
    pub quota_bytes: f64,
    pub quota_objects: f64,
    pub rd: f64,
    pub rd_bytes: f64,
    pub wr: f64,
    pub wr_bytes: f64,
}

/// From Nautilus `stored` is logical usage and `bytes_used` raw usage;
/// before it `bytes_used` is logical and `raw_bytes_used` raw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolStatsShape {
    Legacy,
    StoredSplit,
}

impl PoolStatsShape {
    pub fn for_version(version: Option<&Version>) -> Self {
        if at_least(version, &Version::NAUTILUS) {
            PoolStatsShape::StoredSplit
        } else {
            PoolStatsShape::Legacy
        }
    }

    pub fn usage(self, raw: &RawPoolStats) -> PoolUsage {
        let (stored_bytes, raw_used_bytes) = match self {
            PoolStatsShape::Legacy => (raw.bytes_used, raw.raw_bytes_used),
            PoolStatsShape::StoredSplit => (raw.stored, raw.bytes_used),
        };

        PoolUsage {
            stored_bytes,
            raw_used_bytes,
            available_bytes: raw.max_avail,
            percent_used: raw.percent_used,
            objects: raw.objects,
            dirty_objects: raw.dirty,
            quota_bytes: raw.quota_bytes,
            quota_objects: raw.quota_objects,
            read_ops: raw.rd,
            read_bytes: raw.rd_bytes,
            write_ops: raw.wr,
            write_bytes: raw.wr_bytes,
        }
    }
}

/// Raw `df` cluster totals
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawClusterStats {
    pub total_bytes: f64,
    pub total_used_bytes: f64,
    pub total_used_raw_bytes: f64,
    pub total_avail_bytes: f64,
}

impl RawClusterStats {
    /// Raw bytes consumed; `total_used_bytes` stopped counting overhead in Nautilus.
    pub fn used_bytes(&self, version: Option<&Version>) -> f64 {
        if at_least(version, &Version::NAUTILUS) {
            self.total_used_raw_bytes
        } else {
            self.total_used_bytes
        }
    }
}

/// Where client and recovery IO rates come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoRateSource {
    /// Numeric rates in the JSON pgmap
    PgMap,
    /// Extracted from the plain-text `status` output
    PlainText,
}

impl IoRateSource {
    pub fn for_version(version: Option<&Version>) -> Self {
        if at_least(version, &Version::NAUTILUS) {
            IoRateSource::PgMap
        } else {
            IoRateSource::PlainText
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v(raw: &str) -> Version {
        Version::parse(raw).unwrap()
    }

    #[test]
    fn test_osdmap_shapes_yield_same_counts() {
        let nested = json!({
            "osdmap": {"epoch": 30, "num_osds": 6, "num_up_osds": 5, "num_in_osds": 6,
                       "full": false, "nearfull": false, "num_remapped_pgs": 2}
        });
        let flat = json!({
            "epoch": 30, "num_osds": 6, "num_up_osds": 5, "osd_up_since": 1700000000,
            "num_in_osds": 6, "osd_in_since": 1700000000, "num_remapped_pgs": 2
        });

        let old = OsdMapShape::for_version(Some(&v("14.2.22")));
        let new = OsdMapShape::for_version(Some(&v("16.2.11")));
        assert_eq!(old, OsdMapShape::Nested);
        assert_eq!(new, OsdMapShape::Flat);

        assert_eq!(old.decode(nested).unwrap(), new.decode(flat).unwrap());
    }

    #[test]
    fn test_osdmap_shape_mismatch_is_an_error() {
        // A nested payload read flat decodes to zeros, never to nested values
        let nested = json!({"osdmap": {"num_osds": 6}});
        assert_eq!(
            OsdMapShape::Flat.decode(nested).unwrap(),
            OsdMapCounts::default()
        );
        assert!(OsdMapShape::Nested.decode(json!({"num_osds": 6})).is_err());
    }

    #[test]
    fn test_unknown_version_uses_oldest_shapes() {
        assert_eq!(OsdMapShape::for_version(None), OsdMapShape::Nested);
        assert_eq!(MgrMapShape::for_version(None), MgrMapShape::Full);
        assert_eq!(PgDumpShape::for_version(None), PgDumpShape::Bare);
        assert_eq!(OsdPerfShape::for_version(None), OsdPerfShape::TopLevel);
        assert_eq!(PoolStatsShape::for_version(None), PoolStatsShape::Legacy);
        assert_eq!(IoRateSource::for_version(None), IoRateSource::PlainText);
    }

    #[test]
    fn test_mgrmap_shapes() {
        let full = json!({"active_name": "x", "available": true, "standbys": [{"name": "y"}, {"name": "z"}]});
        assert_eq!(
            MgrMapShape::Full.decode(full).unwrap(),
            MgrCounts {
                total: 3.0,
                active: 1.0
            }
        );

        let summary = json!({"available": false, "num_standbys": 2, "modules": []});
        assert_eq!(
            MgrMapShape::Summary.decode(summary).unwrap(),
            MgrCounts {
                total: 2.0,
                active: 0.0
            }
        );
    }

    #[test]
    fn test_pg_dump_shapes() {
        let bare = br#"[{"pgid": "1.0", "state": "active+clean", "up": [0, 1], "acting": [0, 1], "up_primary": 0, "acting_primary": 0}]"#;
        let wrapped = br#"{"pg_ready": true, "pg_stats": [{"pgid": "1.0", "state": "active+clean", "acting": [0, 1]}]}"#;

        let a = PgDumpShape::Bare.decode(bare).unwrap();
        let b = PgDumpShape::Wrapped.decode(wrapped).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].acting, vec![0, 1]);

        assert!(matches!(
            PgDumpShape::Bare.decode(wrapped),
            Err(ExporterError::Parse { what: "pg dump", .. })
        ));
    }

    #[test]
    fn test_osd_perf_shapes() {
        let old = br#"{"osd_perf_infos": [{"id": 3, "perf_stats": {"commit_latency_ms": 5, "apply_latency_ms": 7}}]}"#;
        let new = br#"{"osdstats": {"osd_perf_infos": [{"id": 3, "perf_stats": {"commit_latency_ms": 5, "apply_latency_ms": 7, "commit_latency_ns": 5000000, "apply_latency_ns": 7000000}}]}}"#;

        assert_eq!(OsdPerfShape::for_version(Some(&v("14.2.0"))), OsdPerfShape::OsdStats);
        assert_eq!(OsdPerfShape::for_version(Some(&v("13.2.10"))), OsdPerfShape::TopLevel);
        assert_eq!(
            OsdPerfShape::TopLevel.decode(old).unwrap(),
            OsdPerfShape::OsdStats.decode(new).unwrap()
        );
    }

    #[test]
    fn test_pool_stats_field_meaning() {
        let raw = RawPoolStats {
            stored: 100.0,
            bytes_used: 300.0,
            raw_bytes_used: 900.0,
            ..RawPoolStats::default()
        };

        let legacy = PoolStatsShape::Legacy.usage(&raw);
        assert_eq!((legacy.stored_bytes, legacy.raw_used_bytes), (300.0, 900.0));

        let split = PoolStatsShape::StoredSplit.usage(&raw);
        assert_eq!((split.stored_bytes, split.raw_used_bytes), (100.0, 300.0));
    }

    #[test]
    fn test_cluster_used_bytes() {
        let raw = RawClusterStats {
            total_used_bytes: 10.0,
            total_used_raw_bytes: 30.0,
            ..RawClusterStats::default()
        };
        assert_eq!(raw.used_bytes(Some(&v("12.2.13"))), 10.0);
        assert_eq!(raw.used_bytes(Some(&v("15.2.0"))), 30.0);
    }
}
