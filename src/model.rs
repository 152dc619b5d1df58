use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds (UTC). The only time type.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;
pub const HOUR_MS: Ms = 60 * MINUTE_MS;
pub const DAY_MS: Ms = 24 * HOUR_MS;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }
}

/// Slot granularity and hold lifetime shared by the store and the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotPolicy {
    pub interval_ms: Ms,
    pub hold_window_ms: Ms,
}

impl Default for SlotPolicy {
    fn default() -> Self {
        Self {
            interval_ms: 15 * MINUTE_MS,
            hold_window_ms: 30 * MINUTE_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub id: Ulid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: Ulid,
    pub name: String,
}

/// A single bookable instant of one provider. Never mutated once published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    pub id: Ulid,
    pub provider_id: Ulid,
    pub start_time: Ms,
    pub end_time: Ms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentStatus {
    Held,
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    pub client_id: Ulid,
    pub provider_id: Ulid,
    pub start_time: Ms,
    pub end_time: Ms,
    pub status: AppointmentStatus,
    pub created_at: Ms,
    pub updated_at: Ms,
}

impl Appointment {
    /// Whether this appointment currently blocks its slot.
    ///
    /// Confirmed appointments block forever. Held ones block while
    /// `now - created_at < hold_window_ms`; after that they are inert history.
    pub fn is_active(&self, now: Ms, hold_window_ms: Ms) -> bool {
        match self.status {
            AppointmentStatus::Confirmed => true,
            AppointmentStatus::Held => now - self.created_at < hold_window_ms,
        }
    }

    pub fn hold_expires_at(&self, hold_window_ms: Ms) -> Ms {
        self.created_at + hold_window_ms
    }
}

/// Booking status of one `(provider_id, start_time)` at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Available,
    Held { appointment_id: Ulid, expires_at: Ms },
    Confirmed { appointment_id: Ulid },
}

impl SlotState {
    /// Derive the state from the appointment history of a single slot.
    /// Nothing is stored: expiry falls out of comparing timestamps to `now`.
    pub fn resolve(history: &[Appointment], now: Ms, hold_window_ms: Ms) -> Self {
        for appt in history.iter().rev() {
            if !appt.is_active(now, hold_window_ms) {
                continue;
            }
            return match appt.status {
                AppointmentStatus::Confirmed => SlotState::Confirmed {
                    appointment_id: appt.id,
                },
                AppointmentStatus::Held => SlotState::Held {
                    appointment_id: appt.id,
                    expires_at: appt.hold_expires_at(hold_window_ms),
                },
            };
        }
        SlotState::Available
    }

    pub fn is_available(&self) -> bool {
        matches!(self, SlotState::Available)
    }
}

/// The WAL record format. Flat, one variant per durable mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ProviderRegistered {
        provider: Provider,
    },
    ClientRegistered {
        client: Client,
    },
    /// One record per publish call, so a batch is durable all-or-nothing.
    AvailabilityPublished {
        provider_id: Ulid,
        slots: Vec<AvailabilitySlot>,
    },
    AppointmentHeld {
        appointment: Appointment,
    },
    AppointmentConfirmed {
        id: Ulid,
        provider_id: Ulid,
        start_time: Ms,
        at: Ms,
    },
}

/// Result of an availability query, before the caller decides how to report
/// an empty answer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SlotListing {
    /// Published slots matching the filters, blocked or not.
    pub matched: usize,
    /// The subset not blocked by an active appointment.
    pub available: Vec<AvailabilitySlot>,
}
