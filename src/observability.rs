use std::net::SocketAddr;

// ── Booking metrics (request-driven) ────────────────────────────

/// Counter: bookings confirmed.
pub const BOOKINGS_CREATED_TOTAL: &str = "courtside_bookings_created_total";

/// Counter: bookings cancelled.
pub const BOOKINGS_CANCELLED_TOTAL: &str = "courtside_bookings_cancelled_total";

/// Counter: bookings moved to a new range.
pub const BOOKINGS_RESCHEDULED_TOTAL: &str = "courtside_bookings_rescheduled_total";

/// Counter: create/reschedule requests rejected by the conflict guard.
pub const BOOKING_CONFLICTS_TOTAL: &str = "courtside_booking_conflicts_total";

/// Counter: per-unit free-slot computations.
pub const AVAILABILITY_QUERIES_TOTAL: &str = "courtside_availability_queries_total";

/// Histogram: per-unit free-slot computation latency in seconds, store reads included.
pub const AVAILABILITY_DURATION_SECONDS: &str = "courtside_availability_duration_seconds";

/// Counter: boundary requests rejected for a missing/invalid credential or role. Labels: reason.
pub const AUTH_FAILURES_TOTAL: &str = "courtside_auth_failures_total";

// ── Store metrics (resource utilization) ────────────────────────

/// Counter: store calls that hit the deadline. Labels: op.
pub const STORE_TIMEOUTS_TOTAL: &str = "courtside_store_timeouts_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "courtside_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "courtside_wal_flush_batch_size";

/// Counter: WAL compactions run.
pub const WAL_COMPACTIONS_TOTAL: &str = "courtside_wal_compactions_total";

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
