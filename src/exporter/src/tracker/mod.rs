//! State carried across scrape cycles.

pub mod inactive;
pub mod scrub;

pub use inactive::InactivePgTracker;
pub use scrub::{ScrubState, ScrubStateCache};

/// Cross-cycle state owned by the orchestrator and lent to collectors.
///
/// Each tracker is written by exactly one collector per cycle.
#[derive(Debug, Default)]
pub struct Trackers {
    pub scrub: ScrubStateCache,
    pub inactive: InactivePgTracker,
}
