use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "ceph-exporter.toml";

/// Prefix for environment overrides, e.g. `CEPH_EXPORTER__CLUSTER__NAME`
pub const ENV_PREFIX: &str = "CEPH_EXPORTER__";

/// How an optional collector is scheduled
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CollectorMode {
    /// Never registered
    #[default]
    Disabled,
    /// Runs inline with every scrape
    Foreground,
    /// Runs on its own timer; scrapes export the last result
    Background,
}

impl CollectorMode {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, CollectorMode::Disabled)
    }
}

impl std::fmt::Display for CollectorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CollectorMode::Disabled => "disabled",
            CollectorMode::Foreground => "foreground",
            CollectorMode::Background => "background",
        };
        write!(f, "{s}")
    }
}

/// Identity of the polled cluster and how to reach it
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Value of the `cluster` label carried by every exported series
    pub name: String,
    /// Client id used to authenticate (`--id`)
    pub user: String,
    /// Path to the cluster configuration file (`--conf`)
    pub config_path: PathBuf,
    /// Administrative CLI binary
    pub ceph_binary: String,
    /// Object gateway admin binary, used by the rgw collector
    pub rgw_admin_binary: String,
    /// Block device binary, used by the rbd-mirror collector
    pub rbd_binary: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: "ceph".to_string(),
            user: "admin".to_string(),
            config_path: PathBuf::from("/etc/ceph/ceph.conf"),
            ceph_binary: "ceph".to_string(),
            rgw_admin_binary: "radosgw-admin".to_string(),
            rbd_binary: "rbd".to_string(),
        }
    }
}

/// HTTP scrape endpoint
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub metrics_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9128".to_string(),
            metrics_path: "/metrics".to_string(),
        }
    }
}

/// Timeouts and background scheduling for outbound calls
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Upper bound for a single administrative command
    #[serde(with = "humantime_serde")]
    pub admin_timeout: Duration,
    /// Upper bound for a single CLI subprocess (gc listings, mirror status, mds ops)
    #[serde(with = "humantime_serde")]
    pub background_timeout: Duration,
    /// Interval between two runs of a background collector
    #[serde(with = "humantime_serde")]
    pub background_interval: Duration,
    /// Capacity of the buffer a background collector publishes into
    pub background_buffer: usize,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            admin_timeout: Duration::from_secs(60),
            background_timeout: Duration::from_secs(180),
            background_interval: Duration::from_secs(300),
            background_buffer: 4,
        }
    }
}

/// Scheduling of the optional collectors
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CollectorsConfig {
    pub rgw: CollectorMode,
    pub rbd_mirror: CollectorMode,
    pub mds: CollectorMode,
    /// In-flight MDS operations older than this count as slow
    #[serde(with = "humantime_serde")]
    pub mds_slow_op_threshold: Duration,
}

impl Default for CollectorsConfig {
    fn default() -> Self {
        Self {
            rgw: CollectorMode::Disabled,
            rbd_mirror: CollectorMode::Disabled,
            mds: CollectorMode::Disabled,
            mds_slow_op_threshold: Duration::from_secs(30),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Configuration {
    /// Cluster identity and credentials
    pub cluster: ClusterConfig,
    /// Scrape endpoint
    pub server: ServerConfig,
    /// Outbound call budgets
    pub scrape: ScrapeConfig,
    /// Optional collectors
    pub collectors: CollectorsConfig,
}

impl Configuration {
    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Configuration::default()))
    }

    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config = Self::figment()
            .merge(Toml::file(DEFAULT_CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        let config = Self::figment()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_configuration() {
        let config = Configuration::default();

        assert_eq!(config.cluster.name, "ceph");
        assert_eq!(config.cluster.user, "admin");
        assert_eq!(config.server.listen_addr, "0.0.0.0:9128");
        assert_eq!(config.scrape.admin_timeout, Duration::from_secs(60));
        assert_eq!(config.scrape.background_timeout, Duration::from_secs(180));

        // Optional collectors are opt-in
        assert_eq!(config.collectors.rgw, CollectorMode::Disabled);
        assert_eq!(config.collectors.rbd_mirror, CollectorMode::Disabled);
        assert_eq!(config.collectors.mds, CollectorMode::Disabled);
    }

    #[test]
    fn test_configless_operation() {
        Jail::expect_with(|_jail| {
            let config = Configuration::load().map_err(|e| *e)?;
            assert_eq!(config.cluster.name, "ceph");
            assert_eq!(config.server.metrics_path, "/metrics");
            Ok(())
        });
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"
[cluster]
name = "prod-east"
user = "exporter"

[scrape]
admin_timeout = "90s"

[collectors]
rgw = "background"
rbd_mirror = "foreground"
"#,
            )?;

            let config = Configuration::load().map_err(|e| *e)?;
            assert_eq!(config.cluster.name, "prod-east");
            assert_eq!(config.cluster.user, "exporter");
            // Untouched keys keep their defaults
            assert_eq!(config.cluster.ceph_binary, "ceph");
            assert_eq!(config.scrape.admin_timeout, Duration::from_secs(90));
            assert_eq!(config.collectors.rgw, CollectorMode::Background);
            assert_eq!(config.collectors.rbd_mirror, CollectorMode::Foreground);
            assert_eq!(config.collectors.mds, CollectorMode::Disabled);
            Ok(())
        });
    }

    #[test]
    fn test_env_var_override() {
        Jail::expect_with(|jail| {
            jail.set_env("CEPH_EXPORTER__CLUSTER__NAME", "staging");
            jail.set_env("CEPH_EXPORTER__COLLECTORS__MDS", "background");
            jail.set_env("CEPH_EXPORTER__SCRAPE__BACKGROUND_INTERVAL", "2m");

            let config = Configuration::load().map_err(|e| *e)?;
            assert_eq!(config.cluster.name, "staging");
            assert_eq!(config.collectors.mds, CollectorMode::Background);
            assert_eq!(
                config.scrape.background_interval,
                Duration::from_secs(120)
            );
            Ok(())
        });
    }

    #[test]
    fn test_load_from_explicit_path() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "custom.toml",
                r#"
[server]
listen_addr = "127.0.0.1:9999"
"#,
            )?;

            let config =
                Configuration::load_from_path(Path::new("custom.toml")).map_err(|e| *e)?;
            assert_eq!(config.server.listen_addr, "127.0.0.1:9999");
            Ok(())
        });
    }

    #[test]
    fn test_unknown_collector_mode_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"
[collectors]
rgw = "sometimes"
"#,
            )?;

            assert!(Configuration::load().is_err());
            Ok(())
        });
    }
}
