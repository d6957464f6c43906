//! Simulator entry point.
//!
//! Loads a VDFile, builds the stream device, and serves two sockets: the
//! instrument protocol over TCP and the administration API over HTTP.
//! Logging goes through `tracing` with RUST_LOG-style filtering.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vdsim::api;
use vdsim::device::StreamDevice;
use vdsim::server::StreamServer;
use vdsim::vdfile::VdFile;

#[derive(Parser)]
#[command(name = "vdsim", about = "Virtual instrument simulator", version)]
struct Cli {
    /// Path to the virtual device configuration file
    vdfile: PathBuf,

    /// Listen address for the instrument stream
    #[arg(long, default_value = "127.0.0.1:9999")]
    listen: String,

    /// Listen address for the HTTP administration API
    #[arg(long, default_value = "127.0.0.1:8000")]
    admin: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let vdfile = VdFile::from_path(&cli.vdfile)?;
    let device = Arc::new(StreamDevice::new(vdfile));
    info!("device configured:\n{}", device.command_summary());

    let admin_addr: SocketAddr = cli
        .admin
        .parse()
        .with_context(|| format!("invalid admin address {}", cli.admin))?;
    let _admin = api::start_admin_server(admin_addr, device.clone())
        .await
        .context("failed to start admin API")?;

    let triggered = device
        .take_triggered()
        .context("trigger channel already claimed")?;
    let server = StreamServer::bind(&cli.listen, device, triggered).await?;
    server.run().await
}
