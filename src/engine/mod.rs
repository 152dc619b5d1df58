mod error;

pub use error::EngineError;

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, warn};
use ulid::Ulid;

use crate::clock::Clock;
use crate::config::Config;
use crate::model::*;
use crate::observability::{self, CONFIRMATIONS_TOTAL, RESERVATIONS_TOTAL, SLOTS_PUBLISHED_TOTAL};
use crate::slicer;
use crate::store::Store;

/// `[date 00:00, date+1 00:00)` in UTC, the zone slots are stored in.
pub fn day_span(date: NaiveDate) -> Option<Span> {
    let start = date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis();
    Some(Span::new(start, start + DAY_MS))
}

/// Public operations of the reservation system: publish, list, reserve, confirm.
///
/// Business rules that need the current time read the injected clock once per
/// call. Mutual exclusion lives entirely in [`Store`].
pub struct ReservationEngine {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    lead_time_ms: Ms,
}

impl ReservationEngine {
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>, lead_time_ms: Ms) -> Self {
        Self {
            store,
            clock,
            lead_time_ms,
        }
    }

    /// Open the store under `config.data_dir` and build an engine on it.
    pub fn open(config: &Config, clock: Arc<dyn Clock>) -> std::io::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let store = Arc::new(Store::open(config.wal_path(), config.policy())?);
        Ok(Self::new(store, clock, config.lead_time_ms))
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn policy(&self) -> SlotPolicy {
        self.store.policy()
    }

    // ── Registry ─────────────────────────────────────────────

    pub async fn register_provider(&self, name: impl Into<String>) -> Result<Provider, EngineError> {
        Ok(self.store.create_provider(name.into()).await?)
    }

    pub async fn register_client(&self, name: impl Into<String>) -> Result<Client, EngineError> {
        Ok(self.store.create_client(name.into()).await?)
    }

    pub async fn get_provider(&self, id: &Ulid) -> Option<Provider> {
        self.store.get_provider(id).await
    }

    pub fn get_client(&self, id: &Ulid) -> Option<Client> {
        self.store.get_client(id)
    }

    // ── Availability ─────────────────────────────────────────

    pub fn generate_slots(&self, start: Ms, end: Ms) -> Result<Vec<Ms>, EngineError> {
        Ok(slicer::generate_slots(start, end, self.policy().interval_ms)?)
    }

    /// Slice `[start, end]` with the configured interval and publish the result.
    /// Returns the number of newly inserted slots.
    pub async fn publish_availability(
        &self,
        provider_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<usize, EngineError> {
        let slots = self.generate_slots(start, end)?;
        self.publish_slots(provider_id, &slots).await
    }

    /// Publish explicit slot start instants. Already-published instants are skipped.
    pub async fn publish_slots(&self, provider_id: Ulid, slots: &[Ms]) -> Result<usize, EngineError> {
        let inserted = self.store.publish(provider_id, slots).await.inspect_err(|e| {
            warn!(%provider_id, "publish failed: {e}");
        })?;
        metrics::counter!(SLOTS_PUBLISHED_TOTAL).increment(inserted as u64);
        info!(%provider_id, requested = slots.len(), inserted, "availability published");
        Ok(inserted)
    }

    /// Slots not blocked by an active appointment right now.
    ///
    /// With a date filter, a day without any published slot reports
    /// `NoneFound`; a day whose slots are all taken is an empty success.
    pub async fn list_available_appointments(
        &self,
        provider_id: Option<Ulid>,
        date: Option<NaiveDate>,
    ) -> Result<Vec<AvailabilitySlot>, EngineError> {
        let window = match date {
            Some(d) => Some(day_span(d).ok_or(EngineError::LimitExceeded("date out of range"))?),
            None => None,
        };
        let now = self.clock.now_ms();
        let listing = self.store.list_available(provider_id, window, now).await;
        if date.is_some() && listing.matched == 0 {
            return Err(EngineError::NoneFound);
        }
        Ok(listing.available)
    }

    // ── Reservations ─────────────────────────────────────────

    /// Place a hold on `slot_id` for `client_id`.
    ///
    /// The lead-time rule is checked first against a single clock reading; the
    /// availability check and insert then happen atomically in the store.
    pub async fn reserve_appointment(
        &self,
        client_id: Ulid,
        provider_id: Ulid,
        slot_id: Ulid,
    ) -> Result<Appointment, EngineError> {
        let result = self.reserve_inner(client_id, provider_id, slot_id).await;
        metrics::counter!(RESERVATIONS_TOTAL, "outcome" => observability::outcome_label(&result))
            .increment(1);
        result
    }

    async fn reserve_inner(
        &self,
        client_id: Ulid,
        provider_id: Ulid,
        slot_id: Ulid,
    ) -> Result<Appointment, EngineError> {
        let slot = self
            .store
            .get_slot(&slot_id)
            .await
            .filter(|s| s.provider_id == provider_id)
            .ok_or(EngineError::InvalidAvailabilityId(slot_id))?;

        let now = self.clock.now_ms();
        if slot.start_time - now < self.lead_time_ms {
            return Err(EngineError::LeadTimeViolation {
                start_time: slot.start_time,
                now,
            });
        }

        match self
            .store
            .try_reserve(client_id, provider_id, slot.start_time, now)
            .await
        {
            Ok(appt) => Ok(appt),
            Err(e) => {
                info!(%client_id, %provider_id, %slot_id, "reservation rejected: {e}");
                Err(e.into())
            }
        }
    }

    /// Confirm a hold. Unknown ids and lapsed holds are both `NotFoundOrExpired`.
    pub async fn confirm_appointment(&self, appointment_id: Ulid) -> Result<Appointment, EngineError> {
        let now = self.clock.now_ms();
        let result = self
            .store
            .confirm(appointment_id, now)
            .await
            .map_err(EngineError::from);
        metrics::counter!(CONFIRMATIONS_TOTAL, "outcome" => observability::outcome_label(&result))
            .increment(1);
        result
    }

    pub async fn get_appointment(&self, appointment_id: &Ulid) -> Option<Appointment> {
        self.store.get_appointment(appointment_id).await
    }

    /// Current booking state of a slot, or `None` for an unknown slot.
    pub async fn slot_state(&self, slot_id: &Ulid) -> Option<SlotState> {
        let slot = self.store.get_slot(slot_id).await?;
        self.store
            .slot_state(&slot.provider_id, slot.start_time, self.clock.now_ms())
            .await
    }
}
