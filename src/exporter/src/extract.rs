//! Extractors for counters embedded in human-readable health messages and
//! plain-text status output.
//!
//! Every extractor is independent: a miss yields `None` and never affects the
//! others.

use once_cell::sync::Lazy;
use regex::Regex;

/// A byte-rate carried a unit outside the known table
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unrecognized rate unit {0:?}")]
pub struct UnitError(pub String);

/// `N pgs <condition>` or `N pgs stuck <condition>` found in a health message
#[derive(Debug, Clone, PartialEq)]
pub struct PgCondition {
    pub condition: String,
    pub stuck: bool,
    pub count: f64,
}

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: Lazy<Regex> = Lazy::new(|| Regex::new($re).expect("valid extractor regex"));
    };
}

pattern!(
    PG_CONDITION,
    r"(\d+) pgs? (stuck )?(not scrubbed in time|not deep-scrubbed in time|[a-z_]+)"
);
pattern!(DEGRADED_OBJECTS, r"(\d+)/(\d+) objects degraded");
pattern!(MISPLACED_OBJECTS, r"(\d+)/(\d+) objects misplaced");
pattern!(SLOW_OPS, r"(\d+) slow ops, oldest one blocked for (\d+) sec");
pattern!(SLOW_REQUESTS, r"(\d+) slow requests are blocked > (\d+) sec");
pattern!(MONS_DOWN, r"(\d+)/(\d+) mons down, quorum");
pattern!(OSDS_DOWN, r"(\d+) osds? down");
pattern!(OSDMAP_FLAGS, r"([a-z_\-]+(?:,[a-z_\-]+)*) flag\(s\) set");
pattern!(CRASH_REPORTS, r"(\d+) daemons? ha(?:ve|s) recently crashed");
pattern!(TOO_MANY_REPAIRS, r"Too many repaired reads on (\d+) OSDs?");

pattern!(CLIENT_READ_BYTES, r"(\d+(?:\.\d+)?) ?([A-Za-z]{0,3}[bB])/s rd");
pattern!(CLIENT_WRITE_BYTES, r"(\d+(?:\.\d+)?) ?([A-Za-z]{0,3}[bB])/s wr");
pattern!(CLIENT_READ_OPS, r"(\d+) op/s rd");
pattern!(CLIENT_WRITE_OPS, r"(\d+) op/s wr");
pattern!(
    RECOVERY_BYTES,
    r"recovery(?: io|:) +(\d+(?:\.\d+)?) ?([A-Za-z]{0,3}[bB])/s"
);
pattern!(RECOVERY_KEYS, r"(\d+) keys/s");
pattern!(RECOVERY_OBJECTS, r"(\d+) objects/s");
pattern!(CACHE_FLUSH_BYTES, r"(\d+(?:\.\d+)?) ?([A-Za-z]{0,3}[bB])/s flush");
pattern!(CACHE_EVICT_BYTES, r"(\d+(?:\.\d+)?) ?([A-Za-z]{0,3}[bB])/s evict");
pattern!(CACHE_PROMOTE_OPS, r"(\d+) op/s promote");

fn number(text: &str) -> Option<f64> {
    text.parse().ok()
}

fn single(re: &Regex, text: &str) -> Option<f64> {
    re.captures(text).and_then(|c| number(&c[1]))
}

fn pair(re: &Regex, text: &str) -> Option<(f64, f64)> {
    let caps = re.captures(text)?;
    Some((number(&caps[1])?, number(&caps[2])?))
}

/// Bytes per unit, powers of 1000
fn unit_multiplier(unit: &str) -> Result<f64, UnitError> {
    match unit.to_ascii_lowercase().as_str() {
        "b" => Ok(1.0),
        "kb" => Ok(1e3),
        "mb" => Ok(1e6),
        "gb" => Ok(1e9),
        _ => Err(UnitError(unit.to_string())),
    }
}

fn byte_rate(re: &Regex, text: &str) -> Result<Option<f64>, UnitError> {
    let Some(caps) = re.captures(text) else {
        return Ok(None);
    };
    let multiplier = unit_multiplier(&caps[2])?;
    Ok(number(&caps[1]).map(|value| value * multiplier))
}

/// Multi-word conditions reported under a single-word name
fn condition_name(raw: &str) -> &str {
    match raw {
        "not scrubbed in time" => "not_scrubbed",
        "not deep-scrubbed in time" => "not_deep_scrubbed",
        other => other,
    }
}

/// Every PG condition counter in a message, e.g.
/// `Reduced data availability: 5 pgs inactive, 2 pgs stuck stale`.
pub fn pg_conditions(text: &str) -> Vec<PgCondition> {
    PG_CONDITION
        .captures_iter(text)
        .filter_map(|caps| {
            Some(PgCondition {
                count: number(&caps[1])?,
                stuck: caps.get(2).is_some(),
                condition: condition_name(&caps[3]).to_string(),
            })
        })
        .collect()
}

/// `A/B objects degraded` as `(A, B)`
pub fn degraded_objects(text: &str) -> Option<(f64, f64)> {
    pair(&DEGRADED_OBJECTS, text)
}

/// `A/B objects misplaced` as `(A, B)`
pub fn misplaced_objects(text: &str) -> Option<(f64, f64)> {
    pair(&MISPLACED_OBJECTS, text)
}

/// Slow operations and the age of the oldest one, in seconds.
///
/// Understands both the `slow ops` wording and the older `slow requests` one.
pub fn slow_ops(text: &str) -> Option<(f64, f64)> {
    pair(&SLOW_OPS, text).or_else(|| pair(&SLOW_REQUESTS, text))
}

/// `N/M mons down, quorum ...` as `(N, M)`
pub fn mons_down(text: &str) -> Option<(f64, f64)> {
    pair(&MONS_DOWN, text)
}

pub fn osds_down(text: &str) -> Option<f64> {
    single(&OSDS_DOWN, text)
}

/// Tokens of a `<a,b,c> flag(s) set` sentence. Unknown flags are returned as-is.
pub fn osdmap_flags(text: &str) -> Option<Vec<String>> {
    OSDMAP_FLAGS
        .captures(text)
        .map(|caps| caps[1].split(',').map(String::from).collect())
}

pub fn new_crash_reports(text: &str) -> Option<f64> {
    single(&CRASH_REPORTS, text)
}

pub fn too_many_repairs(text: &str) -> Option<f64> {
    single(&TOO_MANY_REPAIRS, text)
}

pub fn client_read_bytes(text: &str) -> Result<Option<f64>, UnitError> {
    byte_rate(&CLIENT_READ_BYTES, text)
}

pub fn client_write_bytes(text: &str) -> Result<Option<f64>, UnitError> {
    byte_rate(&CLIENT_WRITE_BYTES, text)
}

pub fn client_read_ops(text: &str) -> Option<f64> {
    single(&CLIENT_READ_OPS, text)
}

pub fn client_write_ops(text: &str) -> Option<f64> {
    single(&CLIENT_WRITE_OPS, text)
}

pub fn recovery_bytes(text: &str) -> Result<Option<f64>, UnitError> {
    byte_rate(&RECOVERY_BYTES, text)
}

pub fn recovery_keys(text: &str) -> Option<f64> {
    single(&RECOVERY_KEYS, text)
}

pub fn recovery_objects(text: &str) -> Option<f64> {
    single(&RECOVERY_OBJECTS, text)
}

pub fn cache_flush_bytes(text: &str) -> Result<Option<f64>, UnitError> {
    byte_rate(&CACHE_FLUSH_BYTES, text)
}

pub fn cache_evict_bytes(text: &str) -> Result<Option<f64>, UnitError> {
    byte_rate(&CACHE_EVICT_BYTES, text)
}

pub fn cache_promote_ops(text: &str) -> Option<f64> {
    single(&CACHE_PROMOTE_OPS, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pg_conditions() {
        let found = pg_conditions(
            "Reduced data availability: 5 pgs inactive, 1 pg peering, 2 pgs stuck stale",
        );

        assert_eq!(
            found,
            vec![
                PgCondition {
                    condition: "inactive".into(),
                    stuck: false,
                    count: 5.0
                },
                PgCondition {
                    condition: "peering".into(),
                    stuck: false,
                    count: 1.0
                },
                PgCondition {
                    condition: "stale".into(),
                    stuck: true,
                    count: 2.0
                },
            ]
        );

        let found = pg_conditions("Possible data damage: 1 pg inconsistent");
        assert_eq!(found[0].condition, "inconsistent");

        assert!(pg_conditions("all OSDs are up").is_empty());
    }

    #[test]
    fn test_scrub_backlog_conditions_stay_apart() {
        let light = pg_conditions("3 pgs not scrubbed in time");
        let deep = pg_conditions("5 pgs not deep-scrubbed in time");

        assert_eq!(
            light,
            vec![PgCondition {
                condition: "not_scrubbed".into(),
                stuck: false,
                count: 3.0
            }]
        );
        assert_eq!(
            deep,
            vec![PgCondition {
                condition: "not_deep_scrubbed".into(),
                stuck: false,
                count: 5.0
            }]
        );
        assert_eq!(pg_conditions("1 pg not deep-scrubbed in time")[0].count, 1.0);
    }

    #[test]
    fn test_object_ratios() {
        let msg = "Degraded data redundancy: 1234/5678 objects degraded (21.733%), 40 pgs degraded";
        assert_eq!(degraded_objects(msg), Some((1234.0, 5678.0)));
        assert_eq!(misplaced_objects(msg), None);

        assert_eq!(
            misplaced_objects("30/300 objects misplaced (10.000%)"),
            Some((30.0, 300.0))
        );
    }

    #[test]
    fn test_slow_ops_both_wordings() {
        assert_eq!(
            slow_ops("42 slow ops, oldest one blocked for 66 sec, daemons [osd.1] have slow ops."),
            Some((42.0, 66.0))
        );
        assert_eq!(
            slow_ops("7 slow requests are blocked > 32 sec"),
            Some((7.0, 32.0))
        );
        assert_eq!(slow_ops("no slow ops"), None);
    }

    #[test]
    fn test_mons_and_osds_down() {
        assert_eq!(
            mons_down("1/3 mons down, quorum a,b"),
            Some((1.0, 3.0))
        );
        assert_eq!(osds_down("2 osds down"), Some(2.0));
        assert_eq!(osds_down("1 osd down"), Some(1.0));
        assert_eq!(osds_down("1 host (2 osds) up"), None);
    }

    #[test]
    fn test_osdmap_flags_open_vocabulary() {
        assert_eq!(
            osdmap_flags("noout,noscrub,nodeep-scrub flag(s) set"),
            Some(vec![
                "noout".to_string(),
                "noscrub".to_string(),
                "nodeep-scrub".to_string()
            ])
        );
        assert_eq!(osdmap_flags("all flags clear"), None);
        // A flag nobody has heard of yet
        assert_eq!(
            osdmap_flags("frobnicate flag(s) set"),
            Some(vec!["frobnicate".to_string()])
        );
    }

    #[test]
    fn test_crashes_and_repairs() {
        assert_eq!(new_crash_reports("2 daemons have recently crashed"), Some(2.0));
        assert_eq!(new_crash_reports("1 daemon has recently crashed"), Some(1.0));
        assert_eq!(
            too_many_repairs("Too many repaired reads on 3 OSDs"),
            Some(3.0)
        );
    }

    #[test]
    fn test_client_io_rates() {
        let line = "client io 1234 kB/s rd, 3 MB/s wr, 25 op/s rd, 71 op/s wr";

        assert_eq!(client_read_bytes(line), Ok(Some(1_234_000.0)));
        assert_eq!(client_write_bytes(line), Ok(Some(3_000_000.0)));
        assert_eq!(client_read_ops(line), Some(25.0));
        assert_eq!(client_write_ops(line), Some(71.0));
    }

    #[test]
    fn test_op_rates_never_match_byte_rates() {
        let line = "client io 25 op/s rd, 71 op/s wr";
        assert_eq!(client_read_bytes(line), Ok(None));
        assert_eq!(client_write_bytes(line), Ok(None));
    }

    #[test]
    fn test_unknown_unit_fails_only_that_metric() {
        let line = "client io 1.5 KiB/s rd, 2 GB/s wr";

        assert_eq!(client_read_bytes(line), Err(UnitError("KiB".to_string())));
        assert_eq!(client_write_bytes(line), Ok(Some(2e9)));
    }

    #[test]
    fn test_recovery_and_cache_rates() {
        let recovery = "recovery io 12 MB/s, 3 keys/s, 4 objects/s";
        assert_eq!(recovery_bytes(recovery), Ok(Some(12e6)));
        assert_eq!(recovery_keys(recovery), Some(3.0));
        assert_eq!(recovery_objects(recovery), Some(4.0));

        let cache = "cache io 1 MB/s flush, 200 kB/s evict, 9 op/s promote";
        assert_eq!(cache_flush_bytes(cache), Ok(Some(1e6)));
        assert_eq!(cache_evict_bytes(cache), Ok(Some(200e3)));
        assert_eq!(cache_promote_ops(cache), Some(9.0));
    }
}
