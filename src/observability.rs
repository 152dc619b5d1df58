use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::engine::EngineError;

/// Install the Prometheus exporter on `port`. No port, no exporter; the
/// `metrics` macros are then no-ops.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

// ── Request metrics ─────────────────────────────────────────────

/// Counter: slots newly inserted by publish calls.
pub const SLOTS_PUBLISHED_TOTAL: &str = "slotbook_slots_published_total";

/// Counter: reservation attempts. Labels: outcome.
pub const RESERVATIONS_TOTAL: &str = "slotbook_reservations_total";

/// Counter: confirmation attempts. Labels: outcome.
pub const CONFIRMATIONS_TOTAL: &str = "slotbook_confirmations_total";

// ── Storage metrics ─────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (records per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotbook_wal_flush_batch_size";

/// Counter: completed WAL compactions.
pub const WAL_COMPACTIONS_TOTAL: &str = "slotbook_wal_compactions_total";

/// Map an engine result to a short `outcome` label.
pub fn outcome_label<T>(result: &Result<T, EngineError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(EngineError::InvalidTimeRange(_)) => "invalid_time_range",
        Err(EngineError::ProviderNotFound(_)) => "provider_not_found",
        Err(EngineError::ClientNotFound(_)) => "client_not_found",
        Err(EngineError::InvalidAvailabilityId(_)) => "invalid_availability_id",
        Err(EngineError::LeadTimeViolation { .. }) => "lead_time_violation",
        Err(EngineError::SlotUnavailable { .. }) => "slot_unavailable",
        Err(EngineError::NotFoundOrExpired(_)) => "not_found_or_expired",
        Err(EngineError::NoneFound) => "none_found",
        Err(EngineError::LimitExceeded(_)) => "limit_exceeded",
        Err(EngineError::Persistence(_)) => "persistence_error",
    }
}
