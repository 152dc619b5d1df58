mod compaction;
mod error;
mod ledger;
mod registry;
mod reservations;
#[cfg(test)]
mod tests;

pub use error::StoreError;

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{error, info, warn};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

pub type SharedProviderState = Arc<RwLock<ProviderState>>;

/// One provider's partition: its published calendar plus every appointment
/// ever made against it.
#[derive(Debug, Clone)]
pub struct ProviderState {
    pub provider: Provider,
    /// Keyed by `start_time`; the map key is the `(provider_id, start_time)` uniqueness.
    pub slots: BTreeMap<Ms, AvailabilitySlot>,
    /// Appointment history per `start_time`, in creation order.
    pub appointments: BTreeMap<Ms, Vec<Appointment>>,
}

impl ProviderState {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            slots: BTreeMap::new(),
            appointments: BTreeMap::new(),
        }
    }

    pub fn history(&self, start_time: Ms) -> &[Appointment] {
        self.appointments
            .get(&start_time)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn slot_state(&self, start_time: Ms, now: Ms, hold_window_ms: Ms) -> SlotState {
        SlotState::resolve(self.history(start_time), now, hold_window_ms)
    }
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Owns the WAL. Appends that arrive while a flush is pending share one fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut wal, cmd);
            continue;
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        for (_, tx) in batch {
            let r = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = tx.send(r);
        }

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

/// Every caller in a batch gets the same answer, so a failed batch leaves
/// none of its records behind.
fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event))
        .and_then(|()| wal.flush_sync());
    if result.is_err() {
        let _ = wal
            .rollback()
            .inspect_err(|e| error!("WAL rollback after failed batch failed: {e}"));
    }
    result
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// Durable, partitioned store behind the reservation engine.
///
/// Every mutation holds its provider partition's write lock across the
/// check, the WAL append and the in-memory apply, so check-and-set on a
/// `(provider_id, start_time)` is a single atomic step for all callers.
pub struct Store {
    pub(super) providers: DashMap<Ulid, SharedProviderState>,
    pub(super) clients: DashMap<Ulid, Client>,
    /// slot id → (provider id, start time)
    pub(super) slot_index: DashMap<Ulid, (Ulid, Ms)>,
    /// appointment id → (provider id, start time)
    pub(super) appointment_index: DashMap<Ulid, (Ulid, Ms)>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Mutations hold it shared for their whole duration, compaction holds it
    /// exclusively. Always acquired before any partition lock.
    pub(super) compaction_gate: RwLock<()>,
    policy: SlotPolicy,
}

/// Indexes updated alongside a partition.
struct Indexes<'a> {
    slots: &'a DashMap<Ulid, (Ulid, Ms)>,
    appointments: &'a DashMap<Ulid, (Ulid, Ms)>,
}

/// Apply a partition-scoped event. Caller holds the partition's write lock.
fn apply_to_provider(ps: &mut ProviderState, event: &Event, idx: &Indexes<'_>) {
    match event {
        Event::AvailabilityPublished { slots, .. } => {
            for slot in slots {
                idx.slots.insert(slot.id, (slot.provider_id, slot.start_time));
                ps.slots.insert(slot.start_time, slot.clone());
            }
        }
        Event::AppointmentHeld { appointment } => {
            idx.appointments.insert(
                appointment.id,
                (appointment.provider_id, appointment.start_time),
            );
            ps.appointments
                .entry(appointment.start_time)
                .or_default()
                .push(appointment.clone());
        }
        Event::AppointmentConfirmed {
            id, start_time, at, ..
        } => {
            if let Some(appt) = ps
                .appointments
                .get_mut(start_time)
                .and_then(|history| history.iter_mut().find(|a| a.id == *id))
            {
                appt.status = AppointmentStatus::Confirmed;
                appt.updated_at = *at;
            }
        }
        // Registrations are handled at the map level.
        Event::ProviderRegistered { .. } | Event::ClientRegistered { .. } => {}
    }
}

/// Partition an event belongs to, if any.
fn event_provider_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::AvailabilityPublished { provider_id, .. }
        | Event::AppointmentConfirmed { provider_id, .. } => Some(*provider_id),
        Event::AppointmentHeld { appointment } => Some(appointment.provider_id),
        Event::ProviderRegistered { .. } | Event::ClientRegistered { .. } => None,
    }
}

impl Store {
    /// Open the store at `wal_path`, replaying any existing log.
    /// Must be called inside a tokio runtime: it spawns the WAL writer task.
    pub fn open(wal_path: PathBuf, policy: SlotPolicy) -> io::Result<Self> {
        let replay = Wal::replay(&wal_path)?;
        if replay.torn_tail {
            warn!(
                valid_len = replay.valid_len,
                "truncating torn record at the tail of {}",
                wal_path.display()
            );
            Wal::truncate(&wal_path, replay.valid_len)?;
        }
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = Self {
            providers: DashMap::new(),
            clients: DashMap::new(),
            slot_index: DashMap::new(),
            appointment_index: DashMap::new(),
            wal_tx,
            compaction_gate: RwLock::new(()),
            policy,
        };

        // Rebuild partitions unshared, then publish them into the map.
        let mut partitions: HashMap<Ulid, ProviderState> = HashMap::new();
        let idx = store.indexes();
        for event in &replay.events {
            match event {
                Event::ProviderRegistered { provider } => {
                    partitions.insert(provider.id, ProviderState::new(provider.clone()));
                }
                Event::ClientRegistered { client } => {
                    store.clients.insert(client.id, client.clone());
                }
                other => match event_provider_id(other).and_then(|pid| partitions.get_mut(&pid)) {
                    Some(ps) => apply_to_provider(ps, other, &idx),
                    None => warn!("replay: skipping event for unknown provider"),
                },
            }
        }
        for (id, ps) in partitions {
            store.providers.insert(id, Arc::new(RwLock::new(ps)));
        }

        info!(
            events = replay.events.len(),
            providers = store.providers.len(),
            clients = store.clients.len(),
            "store opened from {}",
            wal_path.display()
        );
        Ok(store)
    }

    pub fn policy(&self) -> SlotPolicy {
        self.policy
    }

    fn indexes(&self) -> Indexes<'_> {
        Indexes {
            slots: &self.slot_index,
            appointments: &self.appointment_index,
        }
    }

    /// Hand an event to the group-commit writer and wait until it is fsynced.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::WalError(e.to_string()))
    }

    /// WAL-append then apply, under the caller's partition lock.
    pub(super) async fn persist_and_apply(
        &self,
        ps: &mut ProviderState,
        event: &Event,
    ) -> Result<(), StoreError> {
        self.wal_append(event).await?;
        apply_to_provider(ps, event, &self.indexes());
        Ok(())
    }

    pub(super) fn partition(&self, provider_id: &Ulid) -> Option<SharedProviderState> {
        self.providers.get(provider_id).map(|e| e.value().clone())
    }

    /// Snapshot of all partitions. Clones the `Arc`s so no map shard stays
    /// locked across an await.
    pub(super) fn partitions(&self) -> Vec<SharedProviderState> {
        self.providers.iter().map(|e| e.value().clone()).collect()
    }
}
