use crate::model::*;

use super::availability::{self, free_windows};
use super::Engine;

impl Engine {
    // ── Rooms ────────────────────────────────────────────────

    pub fn get_room(&self, id: &str) -> Option<Room> {
        self.rooms.get(id).map(|r| r.clone())
    }

    pub fn list_rooms(&self) -> Vec<Room> {
        let mut rooms: Vec<Room> = self.rooms.iter().map(|r| r.clone()).collect();
        rooms.sort_by(|a, b| a.name.cmp(&b.name));
        rooms
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    // ── Bookings ─────────────────────────────────────────────

    pub fn get_booking(&self, id: &str) -> Option<Booking> {
        self.bookings.get(id).map(|b| b.clone())
    }

    pub fn list_bookings(&self) -> Vec<Booking> {
        let mut bookings: Vec<Booking> = self.bookings.iter().map(|b| b.clone()).collect();
        bookings.sort_by_key(|b| b.span.start);
        bookings
    }

    /// All bookings for a room, sorted by start. Works for deleted rooms too
    /// (orphaned bookings keep their room id).
    pub fn bookings_for_room(&self, room_id: &str) -> Vec<Booking> {
        let ids = match self.room_bookings.get(room_id) {
            Some(ids) => ids.clone(),
            None => return Vec::new(),
        };
        let mut bookings: Vec<Booking> = ids
            .iter()
            .filter_map(|id| self.bookings.get(id).map(|b| b.clone()))
            .collect();
        bookings.sort_by_key(|b| b.span.start);
        bookings
    }

    /// The availability predicate over a snapshot of the room's bookings.
    /// Half-open: an interval starting exactly when another ends is free.
    /// Authoritative rejection happens under the room lock in the write
    /// path; this query is for UI pre-checks.
    pub fn is_room_available(
        &self,
        room_id: &str,
        start: Ms,
        end: Ms,
        exclude_booking_id: Option<&str>,
    ) -> bool {
        if end <= start {
            return false;
        }
        let existing = self.bookings_for_room(room_id);
        availability::is_available(&existing, &Span::new(start, end), exclude_booking_id)
    }

    /// Free slots for a room within a window, cancelled bookings ignored.
    pub fn room_free_windows(&self, room_id: &str, window: Span) -> Vec<Span> {
        let existing = self.bookings_for_room(room_id);
        free_windows(&existing, &window)
    }

    // ── Recurrences / users ──────────────────────────────────

    pub fn get_recurrence(&self, id: &str) -> Option<RecurrenceRule> {
        self.recurrences.get(id).map(|r| r.clone())
    }

    pub fn get_user_by_username(&self, username: &str) -> Option<User> {
        let id = self.usernames.get(username)?.clone();
        self.users.get(&id).map(|u| u.clone())
    }
}
