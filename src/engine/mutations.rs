use tokio::sync::oneshot;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::availability::find_conflict;
use super::{now_ms, Engine, EngineError, WalCommand};

#[derive(Debug, Clone, Default)]
pub struct NewRoom {
    /// Caller-supplied id; generated when absent.
    pub id: Option<String>,
    pub name: String,
    pub capacity: u32,
    pub building: Option<String>,
    /// Defaults to 1.
    pub floor: Option<i32>,
    pub equipment: Vec<String>,
}

/// Partial room update. `None` fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct RoomPatch {
    pub name: Option<String>,
    pub capacity: Option<u32>,
    pub building: Option<String>,
    pub floor: Option<i32>,
    pub equipment: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct NewBooking {
    pub id: Option<String>,
    pub room_id: String,
    pub title: String,
    pub start: Ms,
    pub end: Ms,
    pub booked_by: String,
    /// Defaults to confirmed.
    pub status: Option<BookingStatus>,
    pub description: Option<String>,
    pub recurrence_id: Option<String>,
}

/// Partial booking update. `None` fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct BookingPatch {
    pub room_id: Option<String>,
    pub title: Option<String>,
    pub start: Option<Ms>,
    pub end: Option<Ms>,
    pub booked_by: Option<String>,
    pub status: Option<BookingStatus>,
    pub description: Option<String>,
    pub recurrence_id: Option<String>,
}

fn validate_times(start: Ms, end: Ms) -> Result<(), EngineError> {
    if end <= start {
        return Err(EngineError::Validation(
            "end time must be after start time".into(),
        ));
    }
    if !(MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS).contains(&start)
        || !(MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS).contains(&end)
    {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if end - start > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("booking span too wide"));
    }
    Ok(())
}

fn require(field: &str, value: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::Validation(format!("{field} is required")));
    }
    Ok(())
}

pub(super) fn validate_room_fields(name: &str, equipment: &[String]) -> Result<(), EngineError> {
    require("name", name)?;
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("room name too long"));
    }
    if equipment.len() > MAX_EQUIPMENT_TAGS {
        return Err(EngineError::LimitExceeded("too many equipment tags"));
    }
    // Tags are flattened comma-delimited on disk; a comma inside a tag would
    // not round-trip.
    if equipment.iter().any(|t| t.contains(',')) {
        return Err(EngineError::Validation(
            "equipment tags must not contain commas".into(),
        ));
    }
    Ok(())
}

pub(super) fn validate_booking_fields(
    room_id: &str,
    title: &str,
    booked_by: &str,
    start: Ms,
    end: Ms,
    description: Option<&str>,
) -> Result<(), EngineError> {
    require("room id", room_id)?;
    require("title", title)?;
    require("booked by", booked_by)?;
    if title.len() > MAX_TITLE_LEN {
        return Err(EngineError::LimitExceeded("title too long"));
    }
    if description.is_some_and(|d| d.len() > MAX_DESCRIPTION_LEN) {
        return Err(EngineError::LimitExceeded("description too long"));
    }
    validate_times(start, end)
}

impl Engine {
    // ── Rooms ────────────────────────────────────────────────

    pub async fn add_room(&self, new: NewRoom) -> Result<String, EngineError> {
        validate_room_fields(&new.name, &new.equipment)?;
        let id = match new.id {
            Some(id) => {
                require("id", &id)?;
                id
            }
            None => Self::gen_id(),
        };
        if self.rooms.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::RoomAdded {
            id: id.clone(),
            name: new.name,
            capacity: new.capacity,
            building: new.building,
            floor: new.floor.unwrap_or(1),
            equipment: join_equipment(&new.equipment),
        };
        self.persist_and_apply(event).await?;
        metrics::counter!(observability::OPS_TOTAL, "op" => "add_room").increment(1);
        Ok(id)
    }

    pub async fn update_room(&self, id: &str, patch: RoomPatch) -> Result<Room, EngineError> {
        let current = self
            .rooms
            .get(id)
            .map(|r| r.clone())
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;

        let merged = Room {
            id: current.id,
            name: patch.name.unwrap_or(current.name),
            capacity: patch.capacity.unwrap_or(current.capacity),
            building: patch.building.or(current.building),
            floor: patch.floor.unwrap_or(current.floor),
            equipment: patch.equipment.unwrap_or(current.equipment),
        };
        validate_room_fields(&merged.name, &merged.equipment)?;

        let event = Event::RoomUpdated {
            id: merged.id.clone(),
            name: merged.name.clone(),
            capacity: merged.capacity,
            building: merged.building.clone(),
            floor: merged.floor,
            equipment: join_equipment(&merged.equipment),
        };
        self.persist_and_apply(event).await?;
        metrics::counter!(observability::OPS_TOTAL, "op" => "update_room").increment(1);
        Ok(merged)
    }

    /// Remove a room. Bookings referencing it are left in place (orphaned,
    /// still retrievable) — deletion never cascades.
    pub async fn delete_room(&self, id: &str) -> Result<(), EngineError> {
        if !self.rooms.contains_key(id) {
            return Err(EngineError::NotFound(id.to_string()));
        }
        let event = Event::RoomDeleted { id: id.to_string() };
        self.persist_and_apply(event).await?;
        metrics::counter!(observability::OPS_TOTAL, "op" => "delete_room").increment(1);
        Ok(())
    }

    // ── Bookings ─────────────────────────────────────────────

    /// Create a booking, rejecting it if the slot is taken. The conflict
    /// check and the WAL write happen under the room's lock, so no other
    /// writer can slip a conflicting booking in between.
    pub async fn create_booking(&self, new: NewBooking) -> Result<String, EngineError> {
        validate_booking_fields(
            &new.room_id,
            &new.title,
            &new.booked_by,
            new.start,
            new.end,
            new.description.as_deref(),
        )?;
        let id = match new.id {
            Some(id) => {
                require("id", &id)?;
                id
            }
            None => Self::gen_id(),
        };

        let lock = self.room_lock(&new.room_id);
        let _guard = lock.lock().await;

        if self.bookings.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let span = Span::new(new.start, new.end);
        let existing = self.bookings_for_room(&new.room_id);
        if let Some(hit) = find_conflict(&existing, &span, None) {
            metrics::counter!(observability::CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::Conflict {
                booking_id: hit.id.clone(),
            });
        }

        let event = Event::BookingAdded {
            id: id.clone(),
            room_id: new.room_id,
            title: new.title,
            span,
            booked_by: new.booked_by,
            status: new.status.unwrap_or(BookingStatus::Confirmed),
            description: new.description,
            created_at: now_ms(),
            recurrence_id: new.recurrence_id,
        };
        self.persist_and_apply(event).await?;
        metrics::counter!(observability::OPS_TOTAL, "op" => "create_booking").increment(1);
        Ok(id)
    }

    /// Merge a partial update over a booking. Touching start/end/room re-runs
    /// the availability check with the booking itself excluded; status
    /// changes go through the transition guard. Either everything persists
    /// or nothing does.
    pub async fn update_booking(
        &self,
        id: &str,
        patch: BookingPatch,
    ) -> Result<Booking, EngineError> {
        let current = self
            .bookings
            .get(id)
            .map(|b| b.clone())
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;

        if let Some(to) = patch.status
            && !current.status.can_transition_to(to)
        {
            return Err(EngineError::InvalidTransition {
                from: current.status,
                to,
            });
        }

        let start = patch.start.unwrap_or(current.span.start);
        let end = patch.end.unwrap_or(current.span.end);
        let room_id = patch.room_id.unwrap_or_else(|| current.room_id.clone());
        let title = patch.title.unwrap_or_else(|| current.title.clone());
        let booked_by = patch.booked_by.unwrap_or_else(|| current.booked_by.clone());
        let description = patch.description.or_else(|| current.description.clone());
        let recurrence_id = patch.recurrence_id.or_else(|| current.recurrence_id.clone());
        let status = patch.status.unwrap_or(current.status);

        validate_booking_fields(&room_id, &title, &booked_by, start, end, description.as_deref())?;
        let span = Span::new(start, end);

        // Only time or room changes can introduce a conflict.
        let needs_check = span != current.span || room_id != current.room_id;
        let _guard = if needs_check {
            let guard = self.room_lock(&room_id).lock_owned().await;
            let existing = self.bookings_for_room(&room_id);
            if let Some(hit) = find_conflict(&existing, &span, Some(id)) {
                metrics::counter!(observability::CONFLICTS_TOTAL).increment(1);
                return Err(EngineError::Conflict {
                    booking_id: hit.id.clone(),
                });
            }
            Some(guard)
        } else {
            None
        };

        let merged = Booking {
            id: current.id.clone(),
            room_id,
            title,
            span,
            booked_by,
            status,
            description,
            created_at: current.created_at, // immutable
            recurrence_id,
        };
        let event = Event::BookingUpdated {
            id: merged.id.clone(),
            room_id: merged.room_id.clone(),
            title: merged.title.clone(),
            span: merged.span,
            booked_by: merged.booked_by.clone(),
            status: merged.status,
            description: merged.description.clone(),
            created_at: merged.created_at,
            recurrence_id: merged.recurrence_id.clone(),
        };
        self.persist_and_apply(event).await?;
        metrics::counter!(observability::OPS_TOTAL, "op" => "update_booking").increment(1);
        Ok(merged)
    }

    /// Drag/resize path: change only the interval, all-or-nothing.
    pub async fn move_or_resize(
        &self,
        id: &str,
        new_start: Ms,
        new_end: Ms,
    ) -> Result<Booking, EngineError> {
        self.update_booking(
            id,
            BookingPatch {
                start: Some(new_start),
                end: Some(new_end),
                ..BookingPatch::default()
            },
        )
        .await
    }

    pub async fn delete_booking(&self, id: &str) -> Result<(), EngineError> {
        let room_id = self
            .bookings
            .get(id)
            .map(|b| b.room_id.clone())
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        let event = Event::BookingDeleted { id: id.to_string() };
        self.persist_and_apply(event.clone()).await?;
        // BookingDeleted carries no room id; fan out by hand.
        self.notify.send(&room_id, &event);
        metrics::counter!(observability::OPS_TOTAL, "op" => "delete_booking").increment(1);
        Ok(())
    }

    // ── Recurrences ──────────────────────────────────────────

    /// Store a serialized recurrence rule verbatim. Parsing happens at
    /// expansion time and fails soft there.
    pub async fn add_recurrence(&self, rule: &str) -> Result<String, EngineError> {
        require("rule", rule)?;
        if rule.len() > MAX_RULE_LEN {
            return Err(EngineError::LimitExceeded("rule too long"));
        }
        let id = Self::gen_id();
        let event = Event::RecurrenceAdded {
            id: id.clone(),
            rule: rule.to_string(),
            created_at: now_ms(),
        };
        self.persist_and_apply(event).await?;
        Ok(id)
    }

    // ── Users ────────────────────────────────────────────────

    /// Store a user row. Hashing is the auth collaborator's job; the engine
    /// only persists the hash.
    pub async fn add_user(
        &self,
        username: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<String, EngineError> {
        require("username", username)?;
        require("password hash", password_hash)?;
        if username.len() > MAX_USERNAME_LEN {
            return Err(EngineError::LimitExceeded("username too long"));
        }
        if self.usernames.contains_key(username) {
            return Err(EngineError::AlreadyExists(username.to_string()));
        }
        let id = Self::gen_id();
        let event = Event::UserAdded {
            id: id.clone(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            role,
            created_at: now_ms(),
        };
        self.persist_and_apply(event).await?;
        Ok(id)
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Minimal event set that recreates the current state.
    pub(super) fn snapshot_events(&self) -> Vec<Event> {
        let mut events = Vec::new();
        for room in self.rooms.iter() {
            events.push(Event::RoomAdded {
                id: room.id.clone(),
                name: room.name.clone(),
                capacity: room.capacity,
                building: room.building.clone(),
                floor: room.floor,
                equipment: join_equipment(&room.equipment),
            });
        }
        for rec in self.recurrences.iter() {
            events.push(Event::RecurrenceAdded {
                id: rec.id.clone(),
                rule: rec.rule.clone(),
                created_at: rec.created_at,
            });
        }
        for user in self.users.iter() {
            events.push(Event::UserAdded {
                id: user.id.clone(),
                username: user.username.clone(),
                password_hash: user.password_hash.clone(),
                role: user.role,
                created_at: user.created_at,
            });
        }
        for b in self.bookings.iter() {
            events.push(Event::BookingAdded {
                id: b.id.clone(),
                room_id: b.room_id.clone(),
                title: b.title.clone(),
                span: b.span,
                booked_by: b.booked_by.clone(),
                status: b.status,
                description: b.description.clone(),
                created_at: b.created_at,
                recurrence_id: b.recurrence_id.clone(),
            });
        }
        events
    }

    /// Rewrite the WAL with only the events needed to recreate the current
    /// state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let events = self.snapshot_events();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
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
