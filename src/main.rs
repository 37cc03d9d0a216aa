//! VpnGw Operator - converges VpnGw resources into tunnel gateway StatefulSets

use std::sync::Arc;

use clap::{Parser, Subcommand};
use kube::{Client, CustomResourceExt};

use vpngw::config::ControllerConfig;
use vpngw::controller_runner::build_vpn_gw_controller;
use vpngw::crd::VpnGw;
use vpngw::metrics::ReconcileMetrics;
use vpngw::telemetry::{init_telemetry, TelemetryConfig};

/// VpnGw operator - runs SSL and IPsec VPN gateways from VpnGw resources
#[derive(Parser, Debug)]
#[command(name = "vpngw-operator", version, about, long_about = None)]
struct Cli {
    /// Generate the CRD manifest and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    Controller(ControllerConfig),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&VpnGw::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    init_telemetry(TelemetryConfig::default())
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    let config = match cli.command {
        Some(Commands::Controller(config)) => config,
        None => ControllerConfig::from_env(),
    };

    run_controller(config).await
}

/// Run the VpnGw controller until a shutdown signal arrives
async fn run_controller(config: ControllerConfig) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    tracing::info!(
        namespace = config.namespace.as_deref().unwrap_or("*"),
        retry_delay_secs = config.retry_delay_secs,
        "Starting VpnGw controller"
    );

    let metrics = Arc::new(ReconcileMetrics::new());
    build_vpn_gw_controller(client, &config, metrics.clone()).await;

    tracing::info!(
        dispatched = metrics.dispatched(),
        failed = metrics.failed(),
        "VpnGw controller shut down"
    );
    Ok(())
}
