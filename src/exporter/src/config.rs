use std::time::Duration;

use common::config::{CollectorMode, Configuration};

/// Runtime settings of the exporter engine
#[derive(Clone, Debug)]
pub struct ExporterConfig {
    /// Value of the `cluster` label
    pub cluster: String,
    pub admin_timeout: Duration,
    pub background_timeout: Duration,
    pub background_interval: Duration,
    pub background_buffer: usize,
    pub rgw: CollectorMode,
    pub rbd_mirror: CollectorMode,
    pub mds: CollectorMode,
    pub mds_slow_op_threshold: Duration,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self::from_common_config(&Configuration::default())
    }
}

impl ExporterConfig {
    pub fn from_common_config(config: &Configuration) -> Self {
        Self {
            cluster: config.cluster.name.clone(),
            admin_timeout: config.scrape.admin_timeout,
            background_timeout: config.scrape.background_timeout,
            background_interval: config.scrape.background_interval,
            // A zero-capacity channel cannot be built
            background_buffer: config.scrape.background_buffer.max(1),
            rgw: config.collectors.rgw,
            rbd_mirror: config.collectors.rbd_mirror,
            mds: config.collectors.mds,
            mds_slow_op_threshold: config.collectors.mds_slow_op_threshold,
        }
    }

    pub fn any_background(&self) -> bool {
        [self.rgw, self.rbd_mirror, self.mds].contains(&CollectorMode::Background)
    }
}
