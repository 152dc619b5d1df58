use ulid::Ulid;

use crate::model::Ms;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    ProviderNotFound(Ulid),
    ClientNotFound(Ulid),
    /// No slot at that instant, or an active appointment already blocks it.
    SlotUnavailable { provider_id: Ulid, start_time: Ms },
    /// Unknown id, not held, or hold window elapsed. Deliberately indistinguishable.
    NotFoundOrExpired(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::ProviderNotFound(id) => write!(f, "provider not found: {id}"),
            StoreError::ClientNotFound(id) => write!(f, "client not found: {id}"),
            StoreError::SlotUnavailable {
                provider_id,
                start_time,
            } => write!(f, "slot {start_time} of provider {provider_id} is not available"),
            StoreError::NotFoundOrExpired(id) => {
                write!(f, "appointment {id} not found or hold expired")
            }
            StoreError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            StoreError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}
