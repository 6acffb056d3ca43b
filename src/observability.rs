use std::net::SocketAddr;

use crate::engine::ValidationError;

// ── Booking path ────────────────────────────────────────────────

/// Counter: candidates run through the validation pipeline. Labels: outcome.
pub const VALIDATIONS_TOTAL: &str = "tablewise_validations_total";

/// Histogram: pipeline duration in seconds, excluding store reads.
pub const VALIDATION_DURATION_SECONDS: &str = "tablewise_validation_duration_seconds";

/// Counter: reservation writes accepted by the store. Labels: op.
pub const RESERVATIONS_WRITTEN_TOTAL: &str = "tablewise_reservations_written_total";

/// Counter: best-effort adjustment writes that failed after a booking.
pub const ADJUSTMENT_WRITE_FAILURES_TOTAL: &str = "tablewise_adjustment_write_failures_total";

// ── Resources ───────────────────────────────────────────────────

/// Gauge: venues with a loaded ledger.
pub const VENUES_ACTIVE: &str = "tablewise_venues_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "tablewise_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (changes per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "tablewise_wal_flush_batch_size";

/// Counter: WAL compactions. Labels: status.
pub const COMPACTIONS_TOTAL: &str = "tablewise_compactions_total";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Install the fmt subscriber. Later calls are ignored.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt::try_init();
}

/// Short label of a pipeline outcome for metrics.
pub fn outcome_label(outcome: &Result<(), ValidationError>) -> &'static str {
    let Err(e) = outcome else { return "accepted" };
    match e {
        ValidationError::MissingGuestName => "missing_guest_name",
        ValidationError::InvalidGuestCount => "invalid_guest_count",
        ValidationError::CapacityExceeded { .. } => "capacity_exceeded",
        ValidationError::TableConflict(c) => match c.kind {
            crate::engine::ConflictKind::SameDay => "conflict_same_day",
            crate::engine::ConflictKind::Spillover => "conflict_spillover",
            crate::engine::ConflictKind::NextDay => "conflict_next_day",
        },
        ValidationError::EventWindowViolation { .. } => "event_window_violation",
        ValidationError::MissingReservationCode => "missing_reservation_code",
        ValidationError::InvalidAdjustment { .. } => "invalid_adjustment",
    }
}
