use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "logship-agent")]
#[command(about = "Writes sample log records to the local queue and ships them to remote storage")]
#[command(version)]
pub(crate) struct Args {
    #[arg(long, help = "Path to the YAML config file")]
    pub(crate) config_file: String,

    #[arg(
        long,
        help = "Application storage root, the queue lives in <root>/LogFiles (overrides storage_root)"
    )]
    pub(crate) storage_root: Option<String>,

    #[arg(
        long,
        help = "Number of sample records written at startup (overrides write_count)"
    )]
    pub(crate) write_count: Option<u64>,

    #[arg(
        long,
        help = "Prometheus exporter http address, e.g. 0.0.0.0:9040 (overrides prom_exporter)"
    )]
    pub(crate) prom_exporter: Option<String>,
}
