// Centralized metric name constants for the shipping pipeline (queue + uploader).
// The agent registers descriptions and installs the exporter.

#[derive(Debug, Clone, Copy)]
pub struct Metric {
    pub name: &'static str,
    pub description: &'static str,
}

// Queue metrics
pub const QUEUE_RECORDS_WRITTEN_TOTAL: Metric = Metric {
    name: "logship_queue_records_written_total",
    description: "Total number of log records persisted to the local queue (backend)",
};

pub const QUEUE_BYTES_WRITTEN_TOTAL: Metric = Metric {
    name: "logship_queue_bytes_written_total",
    description: "Total compressed bytes persisted to the local queue (backend)",
};

pub const QUEUE_RECOVERED_TOTAL: Metric = Metric {
    name: "logship_queue_recovered_total",
    description: "Deferred log files handled by startup recovery (result={restored,skipped,discarded_partial})",
};

pub const QUEUE_READY_ITEMS: Metric = Metric {
    name: "logship_queue_ready_items",
    description: "Ready log files observed by the last uploader cycle",
};

// Upload metrics
pub const UPLOAD_TOTAL: Metric = Metric {
    name: "logship_upload_total",
    description: "Total number of finished uploads (provider, result={success,failure,cancelled})",
};

pub const UPLOAD_BYTES_TOTAL: Metric = Metric {
    name: "logship_upload_bytes_total",
    description: "Total bytes reported transferred by successful uploads (provider)",
};

pub const UPLOAD_LATENCY_MS: Metric = Metric {
    name: "logship_upload_latency_ms",
    description: "Latency of one upload from dispatch to completion (provider)",
};

pub const COUNTERS: &[Metric] = &[
    QUEUE_RECORDS_WRITTEN_TOTAL,
    QUEUE_BYTES_WRITTEN_TOTAL,
    QUEUE_RECOVERED_TOTAL,
    UPLOAD_TOTAL,
    UPLOAD_BYTES_TOTAL,
];

pub const GAUGES: &[Metric] = &[QUEUE_READY_ITEMS];

pub const HISTOGRAMS: &[Metric] = &[UPLOAD_LATENCY_MS];
