use super::*;

const M: Ms = MINUTE_MS;
const H: Ms = HOUR_MS;
const I: Ms = 15 * M; // default interval
// 2030-01-01T00:00:00Z
const BASE: Ms = 1_893_456_000_000;

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("slotbook_test_store");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn open(name: &str) -> Store {
    Store::open(test_wal_path(name), SlotPolicy::default()).unwrap()
}

async fn provider_with_slots(store: &Store, starts: &[Ms]) -> Ulid {
    let provider = store.create_provider("Dr. Ada".into()).await.unwrap();
    store.publish(provider.id, starts).await.unwrap();
    provider.id
}

// ── Registry ─────────────────────────────────────────────

#[tokio::test]
async fn register_and_lookup() {
    let store = open("register.wal");
    let provider = store.create_provider("Dr. Ada".into()).await.unwrap();
    let client = store.create_client("Grace".into()).await.unwrap();

    assert!(store.provider_exists(&provider.id));
    assert!(store.client_exists(&client.id));
    assert_eq!(store.get_provider(&provider.id).await, Some(provider));
    assert_eq!(store.get_client(&client.id), Some(client));
    assert!(!store.provider_exists(&Ulid::new()));
}

#[tokio::test]
async fn name_too_long_rejected() {
    let store = open("long_name.wal");
    let result = store
        .create_provider("x".repeat(crate::limits::MAX_NAME_LEN + 1))
        .await;
    assert!(matches!(result, Err(StoreError::LimitExceeded(_))));
}

// ── Availability Ledger ──────────────────────────────────

#[tokio::test]
async fn publish_unknown_provider_fails() {
    let store = open("publish_unknown.wal");
    let missing = Ulid::new();
    let result = store.publish(missing, &[BASE]).await;
    assert_eq!(result, Err(StoreError::ProviderNotFound(missing)));
}

#[tokio::test]
async fn publish_computes_end_from_interval() {
    let store = open("publish_end.wal");
    let pid = provider_with_slots(&store, &[BASE, BASE + I]).await;

    let slots = store.slots_for_provider(&pid).await;
    assert_eq!(slots.len(), 2);
    assert_eq!(slots[0].start_time, BASE);
    assert_eq!(slots[0].end_time, BASE + I);
    assert_eq!(slots[1].end_time, BASE + 2 * I);
}

#[tokio::test]
async fn publish_is_idempotent() {
    let store = open("publish_idempotent.wal");
    let provider = store.create_provider("Dr. Ada".into()).await.unwrap();
    let starts: Vec<Ms> = (0..8).map(|i| BASE + i * I).collect();

    assert_eq!(store.publish(provider.id, &starts).await.unwrap(), 8);
    assert_eq!(store.publish(provider.id, &starts).await.unwrap(), 0);
    assert_eq!(store.slots_for_provider(&provider.id).await.len(), 8);
}

#[tokio::test]
async fn publish_overlapping_window_only_adds_new_instants() {
    let store = open("publish_overlap.wal");
    let pid = provider_with_slots(&store, &[BASE, BASE + I, BASE + 2 * I]).await;
    let original = store.slots_for_provider(&pid).await;

    let inserted = store
        .publish(pid, &[BASE + 2 * I, BASE + 3 * I, BASE + 3 * I])
        .await
        .unwrap();
    assert_eq!(inserted, 1);

    let slots = store.slots_for_provider(&pid).await;
    assert_eq!(slots.len(), 4);
    // Existing slots keep their ids.
    assert_eq!(&slots[..3], &original[..]);
}

#[tokio::test]
async fn publish_batch_too_large_rejected_without_side_effects() {
    let store = open("publish_too_large.wal");
    let provider = store.create_provider("Dr. Ada".into()).await.unwrap();
    let starts: Vec<Ms> = (0..=crate::limits::MAX_SLOTS_PER_PUBLISH as Ms)
        .map(|i| BASE + i * I)
        .collect();

    let result = store.publish(provider.id, &starts).await;
    assert!(matches!(result, Err(StoreError::LimitExceeded(_))));
    assert!(store.slots_for_provider(&provider.id).await.is_empty());
}

#[tokio::test]
async fn publish_rejects_out_of_range_timestamp() {
    let store = open("publish_range.wal");
    let provider = store.create_provider("Dr. Ada".into()).await.unwrap();
    let result = store.publish(provider.id, &[BASE, -1]).await;
    assert!(matches!(result, Err(StoreError::LimitExceeded(_))));
    assert!(store.slots_for_provider(&provider.id).await.is_empty());
}

#[tokio::test]
async fn get_slot_by_id() {
    let store = open("get_slot.wal");
    let pid = provider_with_slots(&store, &[BASE]).await;
    let slot = store.slots_for_provider(&pid).await.remove(0);

    assert_eq!(store.get_slot(&slot.id).await, Some(slot));
    assert_eq!(store.get_slot(&Ulid::new()).await, None);
}

#[tokio::test]
async fn list_available_filters_by_provider_and_window() {
    let store = open("list_filters.wal");
    let a = provider_with_slots(&store, &[BASE, BASE + I, BASE + 25 * H]).await;
    let b = provider_with_slots(&store, &[BASE + I]).await;

    let all = store.list_available(None, None, BASE).await;
    assert_eq!(all.matched, 4);
    assert_eq!(all.available.len(), 4);
    // Ordered by start, then provider.
    assert_eq!(all.available[0].start_time, BASE);
    assert_eq!(all.available[1].start_time, BASE + I);
    assert_eq!(all.available[2].start_time, BASE + I);
    assert_eq!(all.available[3].start_time, BASE + 25 * H);

    let only_b = store.list_available(Some(b), None, BASE).await;
    assert_eq!(only_b.available.len(), 1);
    assert_eq!(only_b.available[0].provider_id, b);

    let first_day = Span::new(BASE, BASE + DAY_MS);
    let a_day = store.list_available(Some(a), Some(first_day), BASE).await;
    assert_eq!(a_day.matched, 2);

    let unknown = store.list_available(Some(Ulid::new()), None, BASE).await;
    assert_eq!(unknown, SlotListing::default());
}

#[tokio::test]
async fn list_available_hides_active_appointments() {
    let store = open("list_hides_active.wal");
    let pid = provider_with_slots(&store, &[BASE, BASE + I, BASE + 2 * I]).await;
    let client = store.create_client("Grace".into()).await.unwrap();
    let now = BASE - 2 * DAY_MS;

    let held = store.try_reserve(client.id, pid, BASE, now).await.unwrap();
    let confirmed = store.try_reserve(client.id, pid, BASE + I, now).await.unwrap();
    store.confirm(confirmed.id, now).await.unwrap();

    let listing = store.list_available(Some(pid), None, now).await;
    assert_eq!(listing.matched, 3);
    assert_eq!(listing.available.len(), 1);
    assert_eq!(listing.available[0].start_time, BASE + 2 * I);

    // Once the hold lapses its slot is listed again; the confirmed one is not.
    let later = now + 30 * M;
    let listing = store.list_available(Some(pid), None, later).await;
    let starts: Vec<Ms> = listing.available.iter().map(|s| s.start_time).collect();
    assert_eq!(starts, vec![held.start_time, BASE + 2 * I]);
}

// ── Reservation State Machine ────────────────────────────

#[tokio::test]
async fn reserve_creates_held_appointment() {
    let store = open("reserve_held.wal");
    let pid = provider_with_slots(&store, &[BASE]).await;
    let client = store.create_client("Grace".into()).await.unwrap();
    let now = BASE - 2 * DAY_MS;

    let appt = store.try_reserve(client.id, pid, BASE, now).await.unwrap();
    assert_eq!(appt.status, AppointmentStatus::Held);
    assert_eq!(appt.client_id, client.id);
    assert_eq!(appt.provider_id, pid);
    assert_eq!(appt.end_time, BASE + I);
    assert_eq!(appt.created_at, now);
    assert_eq!(appt.updated_at, now);
    assert_eq!(
        store.slot_state(&pid, BASE, now).await,
        Some(SlotState::Held {
            appointment_id: appt.id,
            expires_at: now + 30 * M,
        })
    );
}

#[tokio::test]
async fn reserve_held_slot_is_unavailable() {
    let store = open("reserve_twice.wal");
    let pid = provider_with_slots(&store, &[BASE]).await;
    let a = store.create_client("Grace".into()).await.unwrap();
    let b = store.create_client("Linus".into()).await.unwrap();
    let now = BASE - 2 * DAY_MS;

    store.try_reserve(a.id, pid, BASE, now).await.unwrap();
    let second = store.try_reserve(b.id, pid, BASE, now + 29 * M).await;
    assert_eq!(
        second,
        Err(StoreError::SlotUnavailable {
            provider_id: pid,
            start_time: BASE
        })
    );
    assert_eq!(store.appointments_for_provider(&pid).await.len(), 1);
}

#[tokio::test]
async fn reserve_unpublished_instant_is_unavailable() {
    let store = open("reserve_unpublished.wal");
    let pid = provider_with_slots(&store, &[BASE]).await;
    let client = store.create_client("Grace".into()).await.unwrap();

    let result = store.try_reserve(client.id, pid, BASE + I, 0).await;
    assert!(matches!(result, Err(StoreError::SlotUnavailable { .. })));
    let result = store.try_reserve(client.id, Ulid::new(), BASE, 0).await;
    assert!(matches!(result, Err(StoreError::SlotUnavailable { .. })));
}

#[tokio::test]
async fn reserve_unknown_client_fails() {
    let store = open("reserve_unknown_client.wal");
    let pid = provider_with_slots(&store, &[BASE]).await;
    let ghost = Ulid::new();
    let result = store.try_reserve(ghost, pid, BASE, 0).await;
    assert_eq!(result, Err(StoreError::ClientNotFound(ghost)));
}

#[tokio::test]
async fn expired_hold_frees_the_slot_for_another_client() {
    let store = open("expired_hold.wal");
    let pid = provider_with_slots(&store, &[BASE]).await;
    let a = store.create_client("Grace".into()).await.unwrap();
    let b = store.create_client("Linus".into()).await.unwrap();
    let now = BASE - 2 * DAY_MS;

    let first = store.try_reserve(a.id, pid, BASE, now).await.unwrap();
    let second = store.try_reserve(b.id, pid, BASE, now + 30 * M).await.unwrap();
    assert_ne!(first.id, second.id);

    // The lapsed hold stays as history.
    let history = store.appointments_for_provider(&pid).await;
    assert_eq!(history, vec![first, second]);
}

#[tokio::test]
async fn confirm_within_window() {
    let store = open("confirm_ok.wal");
    let pid = provider_with_slots(&store, &[BASE]).await;
    let client = store.create_client("Grace".into()).await.unwrap();
    let now = BASE - 2 * DAY_MS;

    let held = store.try_reserve(client.id, pid, BASE, now).await.unwrap();
    let confirmed = store.confirm(held.id, now + 29 * M).await.unwrap();
    assert_eq!(confirmed.status, AppointmentStatus::Confirmed);
    assert_eq!(confirmed.created_at, now);
    assert_eq!(confirmed.updated_at, now + 29 * M);

    // Confirmed blocks forever.
    assert_eq!(
        store.slot_state(&pid, BASE, now + 10 * DAY_MS).await,
        Some(SlotState::Confirmed {
            appointment_id: held.id
        })
    );
}

#[tokio::test]
async fn confirm_after_window_is_not_found_or_expired() {
    let store = open("confirm_expired.wal");
    let pid = provider_with_slots(&store, &[BASE]).await;
    let client = store.create_client("Grace".into()).await.unwrap();
    let now = BASE - 2 * DAY_MS;

    let held = store.try_reserve(client.id, pid, BASE, now).await.unwrap();
    let result = store.confirm(held.id, now + 30 * M).await;
    assert_eq!(result, Err(StoreError::NotFoundOrExpired(held.id)));
    assert_eq!(
        store.get_appointment(&held.id).await.unwrap().status,
        AppointmentStatus::Held
    );
}

#[tokio::test]
async fn confirm_twice_is_not_found_or_expired() {
    let store = open("confirm_twice.wal");
    let pid = provider_with_slots(&store, &[BASE]).await;
    let client = store.create_client("Grace".into()).await.unwrap();

    let held = store.try_reserve(client.id, pid, BASE, 0).await.unwrap();
    store.confirm(held.id, 1).await.unwrap();
    assert_eq!(
        store.confirm(held.id, 2).await,
        Err(StoreError::NotFoundOrExpired(held.id))
    );
}

#[tokio::test]
async fn confirm_unknown_id_is_not_found_or_expired() {
    let store = open("confirm_unknown.wal");
    let id = Ulid::new();
    assert_eq!(store.confirm(id, 0).await, Err(StoreError::NotFoundOrExpired(id)));
}

#[tokio::test]
async fn stale_hold_cannot_be_confirmed_after_slot_was_retaken() {
    let store = open("confirm_stale.wal");
    let pid = provider_with_slots(&store, &[BASE]).await;
    let a = store.create_client("Grace".into()).await.unwrap();
    let b = store.create_client("Linus".into()).await.unwrap();

    let stale = store.try_reserve(a.id, pid, BASE, 0).await.unwrap();
    let fresh = store.try_reserve(b.id, pid, BASE, 31 * M).await.unwrap();

    assert!(store.confirm(stale.id, 32 * M).await.is_err());
    store.confirm(fresh.id, 32 * M).await.unwrap();
}

// ── Concurrency ──────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reservations_have_one_winner() {
    let store = Arc::new(open("concurrent_reserve.wal"));
    let pid = provider_with_slots(&store, &[BASE]).await;
    let mut clients = Vec::new();
    for i in 0..10 {
        clients.push(store.create_client(format!("C{i}")).await.unwrap().id);
    }

    let mut handles = Vec::new();
    for cid in clients {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.try_reserve(cid, pid, BASE, 0).await
        }));
    }

    let mut won = 0;
    let mut lost = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => won += 1,
            Err(StoreError::SlotUnavailable { .. }) => lost += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!((won, lost), (1, 9));
    assert_eq!(store.appointments_for_provider(&pid).await.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_publish_of_same_window_inserts_once() {
    let store = Arc::new(open("concurrent_publish.wal"));
    let provider = store.create_provider("Dr. Ada".into()).await.unwrap();
    let starts: Vec<Ms> = (0..16).map(|i| BASE + i * I).collect();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let starts = starts.clone();
        handles.push(tokio::spawn(async move {
            store.publish(provider.id, &starts).await
        }));
    }
    let mut total = 0;
    for h in handles {
        total += h.await.unwrap().unwrap();
    }
    assert_eq!(total, 16);
    assert_eq!(store.slots_for_provider(&provider.id).await.len(), 16);
}

// ── Durability ───────────────────────────────────────────

#[tokio::test]
async fn replay_restores_state() {
    let path = test_wal_path("replay_restores.wal");
    let (pid, held, confirmed) = {
        let store = Store::open(path.clone(), SlotPolicy::default()).unwrap();
        let pid = provider_with_slots(&store, &[BASE, BASE + I]).await;
        let client = store.create_client("Grace".into()).await.unwrap();
        let held = store.try_reserve(client.id, pid, BASE, 0).await.unwrap();
        let other = store.try_reserve(client.id, pid, BASE + I, 0).await.unwrap();
        let confirmed = store.confirm(other.id, 5 * M).await.unwrap();
        (pid, held, confirmed)
    };

    let store = Store::open(path, SlotPolicy::default()).unwrap();
    assert_eq!(store.slots_for_provider(&pid).await.len(), 2);
    assert_eq!(store.get_appointment(&held.id).await, Some(held.clone()));
    assert_eq!(store.get_appointment(&confirmed.id).await, Some(confirmed));
    assert_eq!(store.appointments_for_provider(&pid).await.len(), 2);

    // The held appointment still blocks within its window after a restart.
    let client = store.get_client(&held.client_id).unwrap();
    assert!(store.try_reserve(client.id, pid, BASE, 10 * M).await.is_err());
}

#[tokio::test]
async fn compaction_preserves_state_and_resets_counter() {
    let path = test_wal_path("compact_preserves.wal");
    let store = Store::open(path.clone(), SlotPolicy::default()).unwrap();
    let pid = provider_with_slots(&store, &[BASE]).await;
    // Republishing appends nothing.
    store.publish(pid, &[BASE]).await.unwrap();
    let client = store.create_client("Grace".into()).await.unwrap();
    let held = store.try_reserve(client.id, pid, BASE, 0).await.unwrap();
    let confirmed = store.confirm(held.id, M).await.unwrap();
    assert_eq!(store.wal_appends_since_compact().await, 5);

    store.compact_wal().await.unwrap();
    assert_eq!(store.wal_appends_since_compact().await, 0);

    drop(store);
    let store = Store::open(path, SlotPolicy::default()).unwrap();
    assert_eq!(store.get_appointment(&held.id).await, Some(confirmed));
    assert_eq!(store.slots_for_provider(&pid).await.len(), 1);
    assert!(store.client_exists(&client.id));
}

#[tokio::test]
async fn group_commit_under_concurrent_registration() {
    let path = test_wal_path("group_commit.wal");
    let store = Arc::new(Store::open(path.clone(), SlotPolicy::default()).unwrap());

    let mut handles = Vec::new();
    for i in 0..20 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.create_client(format!("C{i}")).await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }
    assert_eq!(store.clients.len(), 20);

    let reopened = Store::open(path, SlotPolicy::default()).unwrap();
    assert_eq!(reopened.clients.len(), 20);
}

#[tokio::test]
async fn writes_after_torn_tail_recovery_survive_the_next_restart() {
    let path = test_wal_path("torn_tail_restart.wal");
    let provider = {
        let store = Store::open(path.clone(), SlotPolicy::default()).unwrap();
        store.create_provider("Dr. Ada".into()).await.unwrap()
    };
    {
        use std::io::Write;
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(&[0xFF; 6]).unwrap();
    }

    let client = {
        let store = Store::open(path.clone(), SlotPolicy::default()).unwrap();
        assert!(store.provider_exists(&provider.id));
        let client = store.create_client("Grace".into()).await.unwrap();
        store.publish(provider.id, &[BASE]).await.unwrap();
        client
    };

    let store = Store::open(path.clone(), SlotPolicy::default()).unwrap();
    assert!(store.client_exists(&client.id));
    assert_eq!(store.slots_for_provider(&provider.id).await.len(), 1);
    assert!(!Wal::replay(&path).unwrap().torn_tail);
}

#[tokio::test]
async fn failed_batch_leaves_no_records_behind() {
    let path = test_wal_path("failed_batch.wal");
    let mut wal = Wal::open(&path).unwrap();
    let committed = Event::ClientRegistered {
        client: Client {
            id: Ulid::new(),
            name: "Grace".into(),
        },
    };
    wal.append_buffered(&committed).unwrap();
    wal.flush_sync().unwrap();

    let mut batch: Vec<(Event, oneshot::Sender<io::Result<()>>)> = Vec::new();
    for i in 0..300 {
        let event = Event::ClientRegistered {
            client: Client {
                id: Ulid::new(),
                name: format!("C{i}"),
            },
        };
        batch.push((event, oneshot::channel().0));
    }
    // Cannot be encoded, so the batch fails after earlier records hit the file.
    let oversized = Event::ProviderRegistered {
        provider: Provider {
            id: Ulid::new(),
            name: "x".repeat(crate::wal::MAX_RECORD_BYTES),
        },
    };
    batch.push((oversized, oneshot::channel().0));

    assert!(flush_batch(&mut wal, &batch).is_err());
    assert_eq!(wal.appends_since_compact(), 1);

    let later = Event::ClientRegistered {
        client: Client {
            id: Ulid::new(),
            name: "Linus".into(),
        },
    };
    wal.append_buffered(&later).unwrap();
    wal.flush_sync().unwrap();
    drop(wal);

    let replay = Wal::replay(&path).unwrap();
    assert_eq!(replay.events, vec![committed, later]);
    assert!(!replay.torn_tail);
}

#[tokio::test]
async fn compaction_splits_large_calendars_into_bounded_records() {
    let path = test_wal_path("compact_chunks.wal");
    let store = Store::open(path.clone(), SlotPolicy::default()).unwrap();
    let provider = store.create_provider("Dr. Ada".into()).await.unwrap();
    let n = crate::limits::MAX_SLOTS_PER_PUBLISH as Ms;
    for batch in 0..3 {
        let starts: Vec<Ms> = (0..n).map(|i| BASE + (batch * n + i) * I).collect();
        store.publish(provider.id, &starts).await.unwrap();
    }
    store.publish(provider.id, &[BASE + 3 * n * I]).await.unwrap();

    store.compact_wal().await.unwrap();

    let published: Vec<usize> = Wal::replay(&path)
        .unwrap()
        .events
        .iter()
        .filter_map(|e| match e {
            Event::AvailabilityPublished { slots, .. } => Some(slots.len()),
            _ => None,
        })
        .collect();
    assert_eq!(published, vec![n as usize, n as usize, n as usize, 1]);

    drop(store);
    let store = Store::open(path, SlotPolicy::default()).unwrap();
    assert_eq!(
        store.slots_for_provider(&provider.id).await.len(),
        3 * n as usize + 1
    );
}
