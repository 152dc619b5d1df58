use tokio::sync::oneshot;
use tracing::info;

use crate::limits::MAX_SLOTS_PER_PUBLISH;
use crate::model::*;

use super::{Store, StoreError, WalCommand};

impl Store {
    /// Rewrite the WAL as the minimal record set that reproduces current state.
    ///
    /// Each partition is snapshotted under its read lock; appointments come out
    /// as `AppointmentHeld` with their original timestamps, followed by
    /// `AppointmentConfirmed` when they were confirmed.
    pub async fn compact_wal(&self) -> Result<(), StoreError> {
        // Drains in-flight mutations; nothing new reaches the WAL until the swap is done.
        let _gate = self.compaction_gate.write().await;
        let mut events: Vec<Event> = self
            .clients
            .iter()
            .map(|e| Event::ClientRegistered {
                client: e.value().clone(),
            })
            .collect();

        for ps in self.partitions() {
            let guard = ps.read().await;
            let provider_id = guard.provider.id;
            events.push(Event::ProviderRegistered {
                provider: guard.provider.clone(),
            });
            // Chunked like a publish call so each record stays within the size cap.
            let slots: Vec<AvailabilitySlot> = guard.slots.values().cloned().collect();
            for chunk in slots.chunks(MAX_SLOTS_PER_PUBLISH) {
                events.push(Event::AvailabilityPublished {
                    provider_id,
                    slots: chunk.to_vec(),
                });
            }
            for appt in guard.appointments.values().flatten() {
                let held = Appointment {
                    status: AppointmentStatus::Held,
                    updated_at: appt.created_at,
                    ..appt.clone()
                };
                events.push(Event::AppointmentHeld { appointment: held });
                if appt.status == AppointmentStatus::Confirmed {
                    events.push(Event::AppointmentConfirmed {
                        id: appt.id,
                        provider_id,
                        start_time: appt.start_time,
                        at: appt.updated_at,
                    });
                }
            }
        }

        let records = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| StoreError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::WalError(e.to_string()))?;

        metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
        info!(records, "WAL compacted");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
