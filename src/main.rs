use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::cli::{CommonArgs, CommonCommands, utils};
use exporter::http::{HttpState, run_http_server};
use exporter::{CliConn, Exporter, ExporterConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "ceph-exporter")]
#[command(about = "Prometheus exporter for Ceph cluster health, capacity and daemon state")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Option<ExporterCommands>,

    #[arg(long, help = "Address to serve metrics on, overrides the configuration")]
    listen_addr: Option<String>,

    #[arg(long, help = "Value of the cluster label, overrides the configuration")]
    cluster: Option<String>,
}

#[derive(Subcommand)]
enum ExporterCommands {
    #[command(flatten)]
    Common(CommonCommands),
}

impl Default for ExporterCommands {
    fn default() -> Self {
        Self::Common(CommonCommands::Start)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on CLI arguments
    utils::init_logging(&cli.common);

    // Load application configuration
    let mut config = utils::load_config(cli.common.config.as_ref())?;
    if let Some(addr) = cli.listen_addr {
        config.server.listen_addr = addr;
    }
    if let Some(cluster) = cli.cluster {
        config.cluster.name = cluster;
    }

    // Handle common commands that don't require starting the service
    let command = cli.command.unwrap_or_default();
    let ExporterCommands::Common(ref common_cmd) = command;
    if utils::handle_common_command(common_cmd, &config).await? {
        return Ok(()); // Command handled, exit early
    }

    utils::validate_config(&config)?;

    let addr: SocketAddr = config
        .server
        .listen_addr
        .parse()
        .with_context(|| format!("Invalid listen address: {}", config.server.listen_addr))?;

    log::info!("Loaded configuration:");
    log::info!("  Cluster: {}", config.cluster.name);
    log::info!("  Client id: {}", config.cluster.user);
    log::info!(
        "  Optional collectors: rgw={} rbd_mirror={} mds={}",
        config.collectors.rgw,
        config.collectors.rbd_mirror,
        config.collectors.mds
    );

    let conn = Arc::new(CliConn::new(&config.cluster));
    let exporter = Exporter::new(conn, ExporterConfig::from_common_config(&config))
        .context("Failed to register collectors")?;

    let state = HttpState::new(Arc::new(exporter), config.server.metrics_path.clone());

    info!("Starting Ceph exporter");

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!("Failed to listen for ctrl+c signal: {}", e),
        }
    };

    match run_http_server(addr, state, shutdown).await {
        Ok(()) => {
            info!("Ceph exporter stopped");
            Ok(())
        }
        Err(e) => {
            error!("Ceph exporter failed: {}", e);
            Err(e.into())
        }
    }
}
