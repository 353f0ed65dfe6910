use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total store mutations. Labels: op.
pub const OPS_TOTAL: &str = "roombook_ops_total";

/// Counter: bookings rejected because the slot was taken.
pub const CONFLICTS_TOTAL: &str = "roombook_conflicts_total";

/// Counter: failed login attempts.
pub const AUTH_FAILURES_TOTAL: &str = "roombook_auth_failures_total";

/// Counter: backup rows dropped during restore (validation or duplicate id).
pub const IMPORT_SKIPPED_TOTAL: &str = "roombook_import_skipped_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "roombook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "roombook_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
