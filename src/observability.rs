use std::net::SocketAddr;

// ── RED metrics (operation-driven) ──────────────────────────────

/// Counter: orchestrated mutations started. Labels: op.
pub const MUTATIONS_TOTAL: &str = "dortoir_mutations_total";

/// Histogram: mutation latency in seconds. Labels: op.
pub const MUTATION_DURATION_SECONDS: &str = "dortoir_mutation_duration_seconds";

/// Histogram: writes per committed batch.
pub const BATCH_WRITES: &str = "dortoir_batch_writes";

// ── Repair sweep ────────────────────────────────────────────────

/// Counter: repair sweeps run to completion.
pub const SWEEPS_TOTAL: &str = "dortoir_sweeps_total";

/// Counter: sweeps skipped because one was already in flight.
pub const SWEEPS_SKIPPED_TOTAL: &str = "dortoir_sweeps_skipped_total";

/// Counter: room documents patched back into consistency.
pub const ROOMS_PATCHED_TOTAL: &str = "dortoir_rooms_patched_total";

/// Counter: farm aggregate caches recomputed by the sweep.
pub const FARMS_PATCHED_TOTAL: &str = "dortoir_farms_patched_total";

/// Counter: workers forced inactive by the status self-heal.
pub const STATUS_FIXES_TOTAL: &str = "dortoir_status_fixes_total";

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

/// Env-filtered fmt subscriber for embedding binaries and tests. Safe to
/// call more than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
