use tracing::{debug, info};
use ulid::Ulid;

use crate::model::*;

use super::{Store, StoreError};

impl Store {
    /// Atomically check that `(provider_id, start_time)` is available at `now`
    /// and record a new Held appointment for `client_id`.
    ///
    /// The partition write lock is held from the availability check until the
    /// hold is durable and applied. A missing slot and an active appointment
    /// both report `SlotUnavailable`.
    pub async fn try_reserve(
        &self,
        client_id: Ulid,
        provider_id: Ulid,
        start_time: Ms,
        now: Ms,
    ) -> Result<Appointment, StoreError> {
        if !self.client_exists(&client_id) {
            return Err(StoreError::ClientNotFound(client_id));
        }
        let unavailable = StoreError::SlotUnavailable {
            provider_id,
            start_time,
        };
        let _gate = self.compaction_gate.read().await;
        let ps = self.partition(&provider_id).ok_or(unavailable.clone())?;
        let mut guard = ps.write().await;

        let Some(slot) = guard.slots.get(&start_time) else {
            return Err(unavailable);
        };
        let end_time = slot.end_time;
        let state = guard.slot_state(start_time, now, self.policy().hold_window_ms);
        if !state.is_available() {
            debug!(%provider_id, start_time, ?state, "reserve conflict");
            return Err(unavailable);
        }

        let appointment = Appointment {
            id: Ulid::new(),
            client_id,
            provider_id,
            start_time,
            end_time,
            status: AppointmentStatus::Held,
            created_at: now,
            updated_at: now,
        };
        let event = Event::AppointmentHeld {
            appointment: appointment.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        info!(appointment_id = %appointment.id, %client_id, %provider_id, start_time, "hold placed");
        Ok(appointment)
    }

    /// Finalize a Held appointment still inside its hold window at `now`.
    /// Check and update happen under one partition write lock.
    pub async fn confirm(&self, appointment_id: Ulid, now: Ms) -> Result<Appointment, StoreError> {
        let missing = StoreError::NotFoundOrExpired(appointment_id);
        let (provider_id, start_time) = match self.appointment_index.get(&appointment_id) {
            Some(entry) => *entry.value(),
            None => return Err(missing),
        };
        let _gate = self.compaction_gate.read().await;
        let ps = self.partition(&provider_id).ok_or(missing.clone())?;
        let mut guard = ps.write().await;

        let hold = self.policy().hold_window_ms;
        let confirmable = guard
            .history(start_time)
            .iter()
            .find(|a| a.id == appointment_id)
            .is_some_and(|a| a.status == AppointmentStatus::Held && a.is_active(now, hold));
        if !confirmable {
            debug!(%appointment_id, now, "confirm rejected");
            return Err(missing);
        }

        let event = Event::AppointmentConfirmed {
            id: appointment_id,
            provider_id,
            start_time,
            at: now,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        info!(%appointment_id, %provider_id, start_time, "appointment confirmed");
        guard
            .history(start_time)
            .iter()
            .find(|a| a.id == appointment_id)
            .cloned()
            .ok_or(missing)
    }

    pub async fn get_appointment(&self, appointment_id: &Ulid) -> Option<Appointment> {
        let (provider_id, start_time) = *self.appointment_index.get(appointment_id)?.value();
        let ps = self.partition(&provider_id)?;
        let guard = ps.read().await;
        guard
            .history(start_time)
            .iter()
            .find(|a| a.id == *appointment_id)
            .cloned()
    }

    /// Every appointment ever made against the provider, expired holds included,
    /// ordered by start time then creation.
    pub async fn appointments_for_provider(&self, provider_id: &Ulid) -> Vec<Appointment> {
        let Some(ps) = self.partition(provider_id) else {
            return Vec::new();
        };
        let guard = ps.read().await;
        guard.appointments.values().flatten().cloned().collect()
    }

    pub async fn slot_state(&self, provider_id: &Ulid, start_time: Ms, now: Ms) -> Option<SlotState> {
        let ps = self.partition(provider_id)?;
        let guard = ps.read().await;
        guard
            .slots
            .contains_key(&start_time)
            .then(|| guard.slot_state(start_time, now, self.policy().hold_window_ms))
    }
}
