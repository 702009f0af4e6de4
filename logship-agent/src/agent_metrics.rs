use anyhow::{Context, Result};
use logship_storage::shipper_metrics::{Metric, COUNTERS, GAUGES, HISTOGRAMS};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Installs the Prometheus recorder (when an address is given) and describes every
/// pipeline metric so they show up before the first sample.
pub(crate) fn init_metrics(prom_addr: Option<SocketAddr>) -> Result<()> {
    if let Some(addr) = prom_addr {
        info!(target = "agent", %addr, "initializing metrics exporter");
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus recorder")?;
    }

    for metric in COUNTERS {
        register_counter(metric)
    }

    for metric in GAUGES {
        register_gauge(metric)
    }

    for metric in HISTOGRAMS {
        register_histogram(metric)
    }
    Ok(())
}

fn register_counter(metric: &Metric) {
    metrics::describe_counter!(metric.name, metric.description);
    let _counter = metrics::counter!(metric.name);
}

fn register_gauge(metric: &Metric) {
    metrics::describe_gauge!(metric.name, metric.description);
    let _gauge = metrics::gauge!(metric.name);
}

fn register_histogram(metric: &Metric) {
    metrics::describe_histogram!(metric.name, metric.description);
    let _histogram = metrics::histogram!(metric.name);
}
