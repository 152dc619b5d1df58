use ulid::Ulid;

use crate::model::Ms;
use crate::slicer::{InvalidTimeRange, SliceError};
use crate::store::StoreError;

/// Every outcome the engine reports to the request layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    InvalidTimeRange(InvalidTimeRange),
    ProviderNotFound(Ulid),
    ClientNotFound(Ulid),
    InvalidAvailabilityId(Ulid),
    LeadTimeViolation { start_time: Ms, now: Ms },
    /// Lost the race for this slot. Retry against a different slot.
    SlotUnavailable { provider_id: Ulid, start_time: Ms },
    NotFoundOrExpired(Ulid),
    /// A date filter matched no published slots at all.
    NoneFound,
    LimitExceeded(&'static str),
    Persistence(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidTimeRange(e) => write!(f, "{e}"),
            EngineError::ProviderNotFound(id) => write!(f, "provider not found: {id}"),
            EngineError::ClientNotFound(id) => write!(f, "client not found: {id}"),
            EngineError::InvalidAvailabilityId(id) => write!(f, "invalid availability id: {id}"),
            EngineError::LeadTimeViolation { start_time, now } => write!(
                f,
                "reservations must be made at least the lead time in advance (slot {start_time}, now {now})"
            ),
            EngineError::SlotUnavailable {
                provider_id,
                start_time,
            } => write!(f, "time slot {start_time} of provider {provider_id} not available"),
            EngineError::NotFoundOrExpired(id) => {
                write!(f, "appointment {id} not found or may have expired")
            }
            EngineError::NoneFound => write!(f, "no slots found for that filter"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Persistence(e) => write!(f, "persistence error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<SliceError> for EngineError {
    fn from(e: SliceError) -> Self {
        match e {
            SliceError::InvalidTimeRange(e) => EngineError::InvalidTimeRange(e),
            SliceError::TooManySlots { .. } => {
                EngineError::LimitExceeded("too many slots in one publish")
            }
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ProviderNotFound(id) => EngineError::ProviderNotFound(id),
            StoreError::ClientNotFound(id) => EngineError::ClientNotFound(id),
            StoreError::SlotUnavailable {
                provider_id,
                start_time,
            } => EngineError::SlotUnavailable {
                provider_id,
                start_time,
            },
            StoreError::NotFoundOrExpired(id) => EngineError::NotFoundOrExpired(id),
            StoreError::LimitExceeded(msg) => EngineError::LimitExceeded(msg),
            StoreError::WalError(e) => EngineError::Persistence(e),
        }
    }
}
