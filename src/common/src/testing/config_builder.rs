//! Test configuration builder for creating test setups quickly.

use std::time::Duration;

use crate::config::{CollectorMode, Configuration};

/// Builder for creating test configurations.
///
/// Provides a fluent API for creating configurations suitable for testing,
/// with short timeouts so a stuck fake transport fails a test quickly.
///
/// # Example
///
/// ```rust,ignore
/// use common::testing::TestConfigBuilder;
///
/// let config = TestConfigBuilder::new()
///     .with_cluster("test")
///     .with_rbd_mirror(CollectorMode::Foreground)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct TestConfigBuilder {
    config: Configuration,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestConfigBuilder {
    /// Create a new test configuration builder.
    ///
    /// The default configuration uses:
    /// - Cluster label `test`
    /// - Loopback listen address on an ephemeral port
    /// - One second admin and background timeouts
    /// - All optional collectors disabled
    pub fn new() -> Self {
        let mut config = Configuration::default();
        config.cluster.name = "test".to_string();
        config.server.listen_addr = "127.0.0.1:0".to_string();
        config.scrape.admin_timeout = Duration::from_secs(1);
        config.scrape.background_timeout = Duration::from_secs(1);
        config.scrape.background_interval = Duration::from_millis(50);
        Self { config }
    }

    /// Set the `cluster` label.
    pub fn with_cluster(mut self, name: &str) -> Self {
        self.config.cluster.name = name.to_string();
        self
    }

    /// Set the admin command timeout.
    pub fn with_admin_timeout(mut self, timeout: Duration) -> Self {
        self.config.scrape.admin_timeout = timeout;
        self
    }

    /// Set the interval between background collector runs.
    pub fn with_background_interval(mut self, interval: Duration) -> Self {
        self.config.scrape.background_interval = interval;
        self
    }

    /// Schedule the rgw collector.
    pub fn with_rgw(mut self, mode: CollectorMode) -> Self {
        self.config.collectors.rgw = mode;
        self
    }

    /// Schedule the rbd-mirror collector.
    pub fn with_rbd_mirror(mut self, mode: CollectorMode) -> Self {
        self.config.collectors.rbd_mirror = mode;
        self
    }

    /// Schedule the mds collector.
    pub fn with_mds(mut self, mode: CollectorMode) -> Self {
        self.config.collectors.mds = mode;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Configuration {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_builder() {
        let config = TestConfigBuilder::new().build();
        assert_eq!(config.cluster.name, "test");
        assert_eq!(config.server.listen_addr, "127.0.0.1:0");
        assert_eq!(config.scrape.admin_timeout, Duration::from_secs(1));
        assert!(!config.collectors.rgw.is_enabled());
    }

    #[test]
    fn test_optional_collectors() {
        let config = TestConfigBuilder::new()
            .with_rgw(CollectorMode::Background)
            .with_rbd_mirror(CollectorMode::Foreground)
            .with_mds(CollectorMode::Foreground)
            .build();

        assert_eq!(config.collectors.rgw, CollectorMode::Background);
        assert_eq!(config.collectors.rbd_mirror, CollectorMode::Foreground);
        assert_eq!(config.collectors.mds, CollectorMode::Foreground);
    }

    #[test]
    fn test_custom_timeouts() {
        let config = TestConfigBuilder::new()
            .with_cluster("lab")
            .with_admin_timeout(Duration::from_millis(250))
            .with_background_interval(Duration::from_secs(5))
            .build();

        assert_eq!(config.cluster.name, "lab");
        assert_eq!(config.scrape.admin_timeout, Duration::from_millis(250));
        assert_eq!(config.scrape.background_interval, Duration::from_secs(5));
    }
}
