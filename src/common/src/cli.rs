use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Common CLI arguments shared across all binaries
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, help = "Enable quiet mode (minimal output)")]
    pub quiet: bool,
}

/// Common subcommands available for all services
#[derive(Subcommand, Debug, Clone, Default)]
pub enum CommonCommands {
    /// Start the service (default behavior)
    #[default]
    Start,
    /// Show current configuration and exit
    Config {
        #[arg(long, help = "Show configuration in JSON format")]
        json: bool,
    },
    /// Validate configuration and exit
    Validate,
    /// Show version information and exit
    Version,
}

/// Utility functions for CLI operations
pub mod utils {
    use super::*;
    use crate::config::Configuration;
    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    /// Log level implied by the verbosity flags
    pub fn log_level(args: &CommonArgs) -> &'static str {
        if args.quiet {
            "warn"
        } else if args.verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// Initialize logging based on CLI arguments. `RUST_LOG` wins when set.
    pub fn init_logging(args: &CommonArgs) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(log_level(args)));

        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(config_path: Option<&PathBuf>) -> Result<Configuration> {
        match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Configuration::load_from_path(path).context("Failed to load configuration")
            }
            None => Configuration::load().context("Failed to load configuration"),
        }
    }

    /// Display configuration in human-readable or JSON format
    pub fn display_config(config: &Configuration, json: bool) -> Result<()> {
        if json {
            let json = serde_json::to_string_pretty(config)
                .context("Failed to serialize configuration to JSON")?;
            println!("{json}");
        } else {
            println!("Ceph Exporter Configuration:");
            println!("============================");
            println!("Cluster label: {}", config.cluster.name);
            println!("Client id: {}", config.cluster.user);
            println!("Cluster config: {}", config.cluster.config_path.display());
            println!("Listen address: {}", config.server.listen_addr);
            println!("Metrics path: {}", config.server.metrics_path);
            println!("Admin timeout: {:?}", config.scrape.admin_timeout);
            println!("Background timeout: {:?}", config.scrape.background_timeout);
            println!("Background interval: {:?}", config.scrape.background_interval);
            println!("RGW collector: {}", config.collectors.rgw);
            println!("RBD mirror collector: {}", config.collectors.rbd_mirror);
            println!("MDS collector: {}", config.collectors.mds);
        }
        Ok(())
    }

    /// Validate configuration and report any issues
    pub fn validate_config(config: &Configuration) -> Result<()> {
        log::info!("Validating configuration...");

        if config.cluster.name.is_empty() {
            anyhow::bail!("Cluster name cannot be empty");
        }

        if config.cluster.ceph_binary.is_empty() {
            anyhow::bail!("Ceph binary cannot be empty");
        }

        if config.collectors.rgw.is_enabled() && config.cluster.rgw_admin_binary.is_empty() {
            anyhow::bail!("radosgw-admin binary cannot be empty when the rgw collector is enabled");
        }

        if config.collectors.rbd_mirror.is_enabled() && config.cluster.rbd_binary.is_empty() {
            anyhow::bail!("rbd binary cannot be empty when the rbd-mirror collector is enabled");
        }

        if !config.server.metrics_path.starts_with('/') {
            anyhow::bail!("Metrics path must start with '/'");
        }

        if config.scrape.admin_timeout.is_zero() || config.scrape.background_timeout.is_zero() {
            anyhow::bail!("Command timeouts must be greater than zero");
        }

        if config.scrape.background_interval.is_zero() {
            anyhow::bail!("Background interval must be greater than zero");
        }

        if config.scrape.background_buffer == 0 {
            anyhow::bail!("Background buffer must hold at least one result");
        }

        log::info!("Configuration validation passed");
        Ok(())
    }

    /// Handle common CLI commands that don't require starting services
    pub async fn handle_common_command(
        command: &CommonCommands,
        config: &Configuration,
    ) -> Result<bool> {
        match command {
            CommonCommands::Config { json } => {
                display_config(config, *json)?;
                Ok(true) // Command handled, don't start service
            }
            CommonCommands::Validate => {
                validate_config(config)?;
                Ok(true)
            }
            CommonCommands::Version => {
                println!("{}", version_info());
                Ok(true)
            }
            CommonCommands::Start => Ok(false),
        }
    }

    /// Standard version information
    pub fn version_info() -> String {
        format!(
            "{} {} ({})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_RUST_VERSION")
        )
    }
}
