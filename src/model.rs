use serde::{Deserialize, Serialize};

/// Unix milliseconds — the only time type.
pub type Ms = i64;

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

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Overlap test: a booking ending exactly when another starts does not
    /// overlap it.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// Lifecycle state of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Pending,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Pending => "pending",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Allowed transitions: pending may confirm or cancel, confirmed may
    /// cancel, cancelled is terminal. Self-transitions are no-ops.
    pub fn can_transition_to(&self, to: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, to),
            (Confirmed, Confirmed)
                | (Pending, Pending)
                | (Cancelled, Cancelled)
                | (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Cancelled)
        )
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub capacity: u32,
    pub building: Option<String>,
    pub floor: i32,
    pub equipment: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    /// Not a hard foreign key: a booking may outlive (or predate) its room.
    pub room_id: String,
    pub title: String,
    pub span: Span,
    pub booked_by: String,
    pub status: BookingStatus,
    pub description: Option<String>,
    /// Set once at creation, never merged over.
    pub created_at: Ms,
    pub recurrence_id: Option<String>,
}

impl Booking {
    /// Cancelled bookings do not occupy their slot.
    pub fn blocks_room(&self) -> bool {
        self.status != BookingStatus::Cancelled
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub id: String,
    /// Serialized rule text, stored verbatim. Expansion parses lazily and
    /// fails soft on garbage.
    pub rule: String,
    pub created_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: Ms,
}

// ── Equipment flattening ─────────────────────────────────────────
//
// Equipment lists persist as one comma-delimited string per room. Empty
// segments are dropped on the way back so `""` round-trips to `[]`.

pub fn join_equipment(tags: &[String]) -> String {
    tags.join(",")
}

pub fn split_equipment(flat: &str) -> Vec<String> {
    flat.split(',')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// The event types — flat, no nesting. This is the WAL record format.
///
/// Update events carry the full merged record, not a diff, so replay never
/// has to re-run merge logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomAdded {
        id: String,
        name: String,
        capacity: u32,
        building: Option<String>,
        floor: i32,
        /// Flattened equipment string (see `join_equipment`).
        equipment: String,
    },
    RoomUpdated {
        id: String,
        name: String,
        capacity: u32,
        building: Option<String>,
        floor: i32,
        equipment: String,
    },
    RoomDeleted {
        id: String,
    },
    BookingAdded {
        id: String,
        room_id: String,
        title: String,
        span: Span,
        booked_by: String,
        status: BookingStatus,
        description: Option<String>,
        created_at: Ms,
        recurrence_id: Option<String>,
    },
    BookingUpdated {
        id: String,
        room_id: String,
        title: String,
        span: Span,
        booked_by: String,
        status: BookingStatus,
        description: Option<String>,
        created_at: Ms,
        recurrence_id: Option<String>,
    },
    BookingDeleted {
        id: String,
    },
    RecurrenceAdded {
        id: String,
        rule: String,
        created_at: Ms,
    },
    UserAdded {
        id: String,
        username: String,
        password_hash: String,
        role: Role,
        created_at: Ms,
    },
    /// Import boundary: wipes rooms and bookings, preserves recurrences and
    /// users.
    StoreCleared,
}

impl Event {
    /// Room this event is scoped to, for change notification fan-out.
    pub fn room_id(&self) -> Option<&str> {
        match self {
            Event::RoomAdded { id, .. }
            | Event::RoomUpdated { id, .. }
            | Event::RoomDeleted { id } => Some(id),
            Event::BookingAdded { room_id, .. } | Event::BookingUpdated { room_id, .. } => {
                Some(room_id)
            }
            Event::BookingDeleted { .. }
            | Event::RecurrenceAdded { .. }
            | Event::UserAdded { .. }
            | Event::StoreCleared => None,
        }
    }
}
