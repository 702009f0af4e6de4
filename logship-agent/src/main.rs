mod agent_metrics;
mod args_parse;
mod service_configuration;

use std::{fs::read_to_string, net::SocketAddr, path::Path, path::PathBuf, sync::Arc};

use crate::{
    agent_metrics::init_metrics,
    args_parse::Args,
    service_configuration::{LoadConfiguration, ServiceConfiguration},
};

use anyhow::{Context, Result};
use clap::Parser;
use logship_core::{RemoteTransport, SamplePayload};
use logship_storage::{DurableQueue, FsQueue, LogShipper, ObjectStoreTransport, Signals};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging, RUST_LOG wins over the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    // Load the configuration from the specified YAML file
    let config_content = read_to_string(Path::new(&args.config_file))
        .context(format!("Failed to read config file: {}", args.config_file))?;
    let load_config: LoadConfiguration = serde_yaml::from_str(&config_content)
        .context(format!("Failed to parse config file: {}", args.config_file))?;
    let mut service_config: ServiceConfiguration = load_config.try_into()?;

    // Command-line args override the config file
    if let Some(storage_root) = args.storage_root {
        service_config.storage_root = PathBuf::from(storage_root);
    }
    if let Some(write_count) = args.write_count {
        service_config.write_count = write_count;
    }
    if let Some(prom_exporter) = args.prom_exporter {
        let prom_address: SocketAddr = prom_exporter.parse().context(format!(
            "Failed to parse into Socket address: {}",
            prom_exporter
        ))?;
        service_config.prom_exporter = Some(prom_address);
    }

    init_metrics(service_config.prom_exporter)?;

    let queue: Arc<dyn DurableQueue> = Arc::new(
        FsQueue::under_root(&service_config.storage_root)
            .await
            .context("Failed to open the local log queue")?,
    );
    let transport: Arc<dyn RemoteTransport> = Arc::new(
        ObjectStoreTransport::new(service_config.backend.clone())
            .context("Failed to build the remote transport")?
            .with_chunk_size(service_config.chunk_size),
    );

    // The dependency check runs concurrently; the uploader waits for its verdict
    let signals = Signals::new();
    signals.set_can_send(service_config.send_enabled);
    {
        let transport = transport.clone();
        let signals = signals.clone();
        tokio::spawn(async move {
            let status = transport.probe().await;
            if !status.is_available() {
                warn!(target = "agent", provider = transport.provider(), "remote store unreachable, log files stay queued for the next run");
            }
            signals.report_dependency(status);
        });
    }

    let shipper = LogShipper::initialize(
        service_config.uploader.clone(),
        queue,
        transport.clone(),
        signals,
    )
    .await
    .context("Failed to initialize the log shipper")?;

    let recovery = shipper.recovery();
    info!(
        target = "agent",
        storage_root = %service_config.storage_root.display(),
        provider = transport.provider(),
        restored = recovery.restored,
        skipped = recovery.skipped,
        "logship agent started"
    );

    for _ in 0..service_config.write_count {
        match shipper.write(&SamplePayload::random()).await {
            Ok(item) => info!(target = "agent", item = %item, "sample record written"),
            Err(e) => warn!(target = "agent", error = %e, "sample record not written"),
        }
    }

    info!(target = "agent", "running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for the shutdown signal")?;

    info!(target = "agent", "shutting down");
    if let Err(e) = shipper.destroy().await {
        error!(target = "agent", error = %e, "log shipper did not stop cleanly");
        return Err(e.into());
    }
    Ok(())
}
