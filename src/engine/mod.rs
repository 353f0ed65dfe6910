mod availability;
mod backup;
mod error;
mod mutations;
mod queries;

pub use availability::{find_conflict, free_windows, is_available, merge_overlapping, subtract_intervals};
pub use backup::{BackupData, ImportReport};
pub use error::EngineError;
pub use mutations::{BookingPatch, NewBooking, NewRoom, RoomPatch};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

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

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
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
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The booking store. Durable state lives in the WAL; the maps here are the
/// replayed materialization. All writes go append-then-apply: an operation
/// returns only after its event is fsynced.
pub struct Engine {
    rooms: DashMap<String, Room>,
    bookings: DashMap<String, Booking>,
    /// Index: room id → booking ids. Entries survive room deletion so
    /// orphaned bookings stay queryable by room.
    room_bookings: DashMap<String, Vec<String>>,
    recurrences: DashMap<String, RecurrenceRule>,
    users: DashMap<String, User>,
    /// Index: username → user id.
    usernames: DashMap<String, String>,
    /// One async mutex per room id, created lazily and never removed. The
    /// conflict-check-then-write sequence holds this, which is the only
    /// mutual exclusion the store needs (reads are snapshots).
    room_locks: DashMap<String, Arc<Mutex<()>>>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
}

impl Engine {
    /// Open the store at `wal_path`, replaying any existing log.
    pub fn open(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let replayed = events.len();
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            rooms: DashMap::new(),
            bookings: DashMap::new(),
            room_bookings: DashMap::new(),
            recurrences: DashMap::new(),
            users: DashMap::new(),
            usernames: DashMap::new(),
            room_locks: DashMap::new(),
            wal_tx,
            notify: Arc::new(NotifyHub::new()),
        };

        for event in &events {
            engine.apply_event(event);
        }
        tracing::info!(path = %wal_path.display(), events = replayed, "store opened");

        Ok(engine)
    }

    /// Apply a committed event to the in-memory maps. Used by both replay
    /// and the live write path, so the two can never diverge.
    fn apply_event(&self, event: &Event) {
        match event {
            Event::RoomAdded { id, name, capacity, building, floor, equipment }
            | Event::RoomUpdated { id, name, capacity, building, floor, equipment } => {
                self.rooms.insert(
                    id.clone(),
                    Room {
                        id: id.clone(),
                        name: name.clone(),
                        capacity: *capacity,
                        building: building.clone(),
                        floor: *floor,
                        equipment: split_equipment(equipment),
                    },
                );
            }
            Event::RoomDeleted { id } => {
                // Bookings referencing the room are deliberately left alone.
                self.rooms.remove(id);
            }
            Event::BookingAdded {
                id, room_id, title, span, booked_by, status, description, created_at,
                recurrence_id,
            } => {
                self.bookings.insert(
                    id.clone(),
                    Booking {
                        id: id.clone(),
                        room_id: room_id.clone(),
                        title: title.clone(),
                        span: *span,
                        booked_by: booked_by.clone(),
                        status: *status,
                        description: description.clone(),
                        created_at: *created_at,
                        recurrence_id: recurrence_id.clone(),
                    },
                );
                self.room_bookings
                    .entry(room_id.clone())
                    .or_default()
                    .push(id.clone());
            }
            Event::BookingUpdated {
                id, room_id, title, span, booked_by, status, description, created_at,
                recurrence_id,
            } => {
                let old_room = self.bookings.get(id).map(|b| b.room_id.clone());
                if let Some(old_room) = old_room
                    && old_room != *room_id
                {
                    if let Some(mut ids) = self.room_bookings.get_mut(&old_room) {
                        ids.retain(|b| b != id);
                    }
                    self.room_bookings
                        .entry(room_id.clone())
                        .or_default()
                        .push(id.clone());
                }
                self.bookings.insert(
                    id.clone(),
                    Booking {
                        id: id.clone(),
                        room_id: room_id.clone(),
                        title: title.clone(),
                        span: *span,
                        booked_by: booked_by.clone(),
                        status: *status,
                        description: description.clone(),
                        created_at: *created_at,
                        recurrence_id: recurrence_id.clone(),
                    },
                );
            }
            Event::BookingDeleted { id } => {
                if let Some((_, booking)) = self.bookings.remove(id)
                    && let Some(mut ids) = self.room_bookings.get_mut(&booking.room_id)
                {
                    ids.retain(|b| b != id);
                }
            }
            Event::RecurrenceAdded { id, rule, created_at } => {
                self.recurrences.insert(
                    id.clone(),
                    RecurrenceRule {
                        id: id.clone(),
                        rule: rule.clone(),
                        created_at: *created_at,
                    },
                );
            }
            Event::UserAdded { id, username, password_hash, role, created_at } => {
                self.users.insert(
                    id.clone(),
                    User {
                        id: id.clone(),
                        username: username.clone(),
                        password_hash: password_hash.clone(),
                        role: *role,
                        created_at: *created_at,
                    },
                );
                self.usernames.insert(username.clone(), id.clone());
            }
            Event::StoreCleared => {
                self.rooms.clear();
                self.bookings.clear();
                self.room_bookings.clear();
            }
        }
    }

    /// Write an event to the WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append + apply + notify in one call.
    pub(super) async fn persist_and_apply(&self, event: Event) -> Result<(), EngineError> {
        self.wal_append(&event).await?;
        self.apply_event(&event);
        if let Some(room_id) = event.room_id() {
            self.notify.send(room_id, &event);
        }
        Ok(())
    }

    /// Lock guarding check-then-write sequences for one room. Lazily
    /// created; survives room deletion on purpose.
    pub(super) fn room_lock(&self, room_id: &str) -> Arc<Mutex<()>> {
        self.room_locks
            .entry(room_id.to_string())
            .or_default()
            .clone()
    }

    pub(super) fn gen_id() -> String {
        ulid::Ulid::new().to_string()
    }
}

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}
