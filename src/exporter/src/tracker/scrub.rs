use std::collections::BTreeMap;

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScrubState {
    #[default]
    Idle,
    Scrubbing,
    DeepScrubbing,
}

impl ScrubState {
    /// Classify a PG state string; `None` when no scrub is running.
    pub fn from_pg_state(state: &str) -> Option<Self> {
        if !state.contains("scrubbing") {
            None
        } else if state.contains("deep") {
            Some(ScrubState::DeepScrubbing)
        } else {
            Some(ScrubState::Scrubbing)
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            ScrubState::Idle => 0.0,
            ScrubState::Scrubbing => 1.0,
            ScrubState::DeepScrubbing => 2.0,
        }
    }
}

/// Last known scrub state per OSD.
///
/// Each cycle calls [`reset_all_to_idle`](Self::reset_all_to_idle), then
/// [`mark`](Self::mark) for every OSD in the acting set of a scrubbing PG,
/// then [`snapshot`](Self::snapshot). OSDs are never removed, so one that
/// stopped scrubbing reports idle instead of disappearing.
#[derive(Debug, Default)]
pub struct ScrubStateCache {
    states: Mutex<BTreeMap<i64, ScrubState>>,
}

impl ScrubStateCache {
    pub fn reset_all_to_idle(&self) {
        for state in self.states.lock().values_mut() {
            *state = ScrubState::Idle;
        }
    }

    /// Record a state; a deeper scrub already marked this cycle is kept.
    pub fn mark(&self, osd: i64, state: ScrubState) {
        let mut states = self.states.lock();
        let entry = states.entry(osd).or_default();
        *entry = (*entry).max(state);
    }

    pub fn snapshot(&self) -> BTreeMap<i64, ScrubState> {
        self.states.lock().clone()
    }
}
