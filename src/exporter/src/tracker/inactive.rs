use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// First time each currently inactive PG was seen inactive
#[derive(Debug, Default)]
pub struct InactivePgTracker {
    first_seen: Mutex<HashMap<String, Instant>>,
}

impl InactivePgTracker {
    /// Record one PG's state. An active PG is forgotten; an inactive one keeps
    /// the timestamp of its first inactive observation.
    pub fn observe(&self, pgid: &str, active: bool, now: Instant) {
        let mut first_seen = self.first_seen.lock();
        if active {
            first_seen.remove(pgid);
        } else {
            first_seen.entry(pgid.to_string()).or_insert(now);
        }
    }

    /// Forget PGs that were not part of this cycle's listing, e.g. after a
    /// pool was deleted.
    pub fn retain_observed<'a, I>(&self, pgids: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let listed: HashSet<&str> = pgids.into_iter().collect();
        self.first_seen
            .lock()
            .retain(|pgid, _| listed.contains(pgid.as_str()));
    }

    /// Age of the longest inactive PG, zero when none are tracked
    pub fn oldest_age(&self, now: Instant) -> Duration {
        self.first_seen
            .lock()
            .values()
            .min()
            .map(|oldest| now.saturating_duration_since(*oldest))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.first_seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.first_seen.lock().is_empty()
    }
}
