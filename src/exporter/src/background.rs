//! Collectors that run on their own schedule.
//!
//! Slow collectors (gc listings, mirror status, MDS op dumps) would stall a
//! scrape, so in background mode each runs in a spawned loop and publishes
//! into a bounded ring. A full ring evicts its oldest result. The scrape
//! cycle drains the ring without waiting and re-exports the last result when
//! nothing new arrived.

use std::sync::Arc;
use std::time::{Duration, Instant};

use prometheus::proto::MetricFamily;
use tokio::sync::{OnceCell, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::collectors::{Collector, ScrapeContext, Subsystem};
use crate::conn::Conn;
use crate::topology::Topology;
use crate::tracker::Trackers;
use crate::version::Version;

/// Cluster facts published by the scrape cycle for background loops
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterState {
    pub version: Option<Version>,
    pub rbd_mirror: bool,
}

impl ClusterState {
    pub fn is_active(&self, subsystem: Subsystem) -> bool {
        match subsystem {
            Subsystem::RbdMirror => self.rbd_mirror,
        }
    }
}

/// Timing of a background loop
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub interval: Duration,
    pub buffer: usize,
    pub admin_timeout: Duration,
    pub background_timeout: Duration,
}

/// Handle on one background collector loop
pub struct BackgroundSlot {
    name: &'static str,
    subsystem: Option<Subsystem>,
    results: broadcast::Receiver<Vec<MetricFamily>>,
    last: Option<Vec<MetricFamily>>,
    handle: JoinHandle<()>,
}

impl BackgroundSlot {
    /// Start the loop. Must be called from within a Tokio runtime.
    pub fn spawn(
        collector: Arc<dyn Collector>,
        conn: Arc<dyn Conn>,
        cluster: watch::Receiver<ClusterState>,
        schedule: Schedule,
    ) -> Self {
        let (tx, results) = broadcast::channel(schedule.buffer.max(1));
        let name = collector.name();
        let subsystem = collector.subsystem();

        let handle = tokio::spawn(run_loop(collector, conn, cluster, schedule, tx));

        Self {
            name,
            subsystem,
            results,
            last: None,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn subsystem(&self) -> Option<Subsystem> {
        self.subsystem
    }

    /// Take everything published since the last drain, keeping the newest.
    ///
    /// Returns the last known result, which may come from an earlier cycle,
    /// or `None` if the loop has not produced anything yet.
    pub fn drain(&mut self) -> Option<&[MetricFamily]> {
        loop {
            match self.results.try_recv() {
                Ok(families) => self.last = Some(families),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    debug!(collector = self.name, skipped, "Older background results evicted");
                }
                Err(_) => break,
            }
        }
        self.last.as_deref()
    }
}

impl Drop for BackgroundSlot {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run_loop(
    collector: Arc<dyn Collector>,
    conn: Arc<dyn Conn>,
    cluster: watch::Receiver<ClusterState>,
    schedule: Schedule,
    tx: broadcast::Sender<Vec<MetricFamily>>,
) {
    let name = collector.name();
    let topology = Topology::default();
    let trackers = Trackers::default();
    let mut ticker = tokio::time::interval(schedule.interval);

    loop {
        ticker.tick().await;

        let state = cluster.borrow().clone();
        if let Some(subsystem) = collector.subsystem() {
            if !state.is_active(subsystem) {
                debug!(collector = name, "Subsystem not detected, skipping run");
                continue;
            }
        }

        let ctx = ScrapeContext {
            conn: conn.as_ref(),
            version: state.version.as_ref(),
            topology: &topology,
            trackers: &trackers,
            admin_timeout: schedule.admin_timeout,
            background_timeout: schedule.background_timeout,
            pg_briefs: OnceCell::new(),
        };

        let started = Instant::now();
        match collector.collect(&ctx).await {
            Ok(families) => {
                debug!(
                    collector = name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Background collection finished"
                );
                if tx.send(families).is_err() {
                    break;
                }
            }
            Err(e) => warn!(collector = name, error = %e, "Background collection failed"),
        }
    }
}
