use std::collections::BTreeSet;

use tracing::debug;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{SharedProviderState, Store, StoreError};

fn validate_instant(t: Ms) -> Result<(), StoreError> {
    if !(MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS).contains(&t) {
        return Err(StoreError::LimitExceeded("timestamp out of range"));
    }
    Ok(())
}

impl Store {
    /// Persist one slot per start instant for `provider_id`.
    ///
    /// Instants already published, or repeated within `starts`, are skipped.
    /// The new slots go to the WAL as a single record, so the call is
    /// all-or-nothing. Returns how many slots were newly inserted.
    pub async fn publish(&self, provider_id: Ulid, starts: &[Ms]) -> Result<usize, StoreError> {
        if starts.len() > MAX_SLOTS_PER_PUBLISH {
            return Err(StoreError::LimitExceeded("too many slots in one publish"));
        }
        for &t in starts {
            validate_instant(t)?;
            validate_instant(t + self.policy().interval_ms)?;
        }
        let _gate = self.compaction_gate.read().await;
        let ps = self
            .partition(&provider_id)
            .ok_or(StoreError::ProviderNotFound(provider_id))?;
        let mut guard = ps.write().await;

        let interval = self.policy().interval_ms;
        let fresh: BTreeSet<Ms> = starts
            .iter()
            .copied()
            .filter(|t| !guard.slots.contains_key(t))
            .collect();
        if fresh.is_empty() {
            debug!(%provider_id, requested = starts.len(), "publish: all slots already present");
            return Ok(0);
        }
        if guard.slots.len() + fresh.len() > MAX_SLOTS_PER_PROVIDER {
            return Err(StoreError::LimitExceeded("too many slots on provider"));
        }

        let slots: Vec<AvailabilitySlot> = fresh
            .into_iter()
            .map(|start_time| AvailabilitySlot {
                id: Ulid::new(),
                provider_id,
                start_time,
                end_time: start_time + interval,
            })
            .collect();
        let inserted = slots.len();
        let event = Event::AvailabilityPublished { provider_id, slots };
        self.persist_and_apply(&mut guard, &event).await?;
        debug!(%provider_id, inserted, skipped = starts.len() - inserted, "publish");
        Ok(inserted)
    }

    pub async fn get_slot(&self, slot_id: &Ulid) -> Option<AvailabilitySlot> {
        let (provider_id, start_time) = *self.slot_index.get(slot_id)?.value();
        let ps = self.partition(&provider_id)?;
        let guard = ps.read().await;
        guard.slots.get(&start_time).cloned()
    }

    /// Slots matching the filters that no active appointment blocks at `now`,
    /// ordered by `(start_time, provider_id)`.
    pub async fn list_available(
        &self,
        provider_id: Option<Ulid>,
        window: Option<Span>,
        now: Ms,
    ) -> SlotListing {
        let partitions: Vec<SharedProviderState> = match provider_id {
            Some(pid) => self.partition(&pid).into_iter().collect(),
            None => self.partitions(),
        };
        let hold = self.policy().hold_window_ms;
        let (lo, hi) = window.map_or((Ms::MIN, Ms::MAX), |w| (w.start, w.end));

        let mut listing = SlotListing::default();
        if lo >= hi {
            return listing;
        }
        for ps in partitions {
            let guard = ps.read().await;
            for (start, slot) in guard.slots.range(lo..hi) {
                listing.matched += 1;
                if guard.slot_state(*start, now, hold).is_available() {
                    listing.available.push(slot.clone());
                }
            }
        }
        listing
            .available
            .sort_by(|a, b| (a.start_time, a.provider_id).cmp(&(b.start_time, b.provider_id)));
        listing
    }

    pub async fn slots_for_provider(&self, provider_id: &Ulid) -> Vec<AvailabilitySlot> {
        let Some(ps) = self.partition(provider_id) else {
            return Vec::new();
        };
        let guard = ps.read().await;
        guard.slots.values().cloned().collect()
    }
}
