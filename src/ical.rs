//! iCalendar (RFC 5545) export.
//!
//! One VEVENT per booking, CRLF-terminated, UTC timestamps. Pure string
//! building; callers decide where the bytes go.

use chrono::{TimeZone, Utc};

use crate::model::{Booking, BookingStatus, Ms, Room};

#[derive(Debug, Clone)]
pub struct IcalOptions {
    /// Domain suffix for UID and ORGANIZER mailto addresses.
    pub domain: String,
    pub prod_id: String,
}

impl Default for IcalOptions {
    fn default() -> Self {
        Self {
            domain: "roombook.local".into(),
            prod_id: "-//roombook//calendar export//EN".into(),
        }
    }
}

/// TEXT escaping per RFC 5545 §3.3.11.
fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            other => out.push(other),
        }
    }
    out
}

/// `YYYYMMDDTHHMMSSZ`. Out-of-range input clamps to the epoch; booking
/// timestamps are validated upstream so this is a formatting backstop.
fn format_utc(ms: Ms) -> String {
    let dt = Utc
        .timestamp_millis_opt(ms)
        .single()
        .unwrap_or(chrono::DateTime::UNIX_EPOCH);
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

fn status_line(status: BookingStatus) -> &'static str {
    match status {
        BookingStatus::Confirmed => "CONFIRMED",
        BookingStatus::Pending => "TENTATIVE",
        BookingStatus::Cancelled => "CANCELLED",
    }
}

/// Render bookings as a VCALENDAR document. `rooms` supplies LOCATION names;
/// bookings whose room is gone simply omit the property. `now` stamps
/// DTSTAMP so output is reproducible in tests.
pub fn export_ical(bookings: &[Booking], rooms: &[Room], now: Ms, opts: &IcalOptions) -> String {
    let mut out = String::new();
    let mut push = |line: &str| {
        out.push_str(line);
        out.push_str("\r\n");
    };

    push("BEGIN:VCALENDAR");
    push("VERSION:2.0");
    push(&format!("PRODID:{}", opts.prod_id));
    push("CALSCALE:GREGORIAN");

    let dtstamp = format_utc(now);
    for booking in bookings {
        push("BEGIN:VEVENT");
        push(&format!("UID:{}@{}", booking.id, opts.domain));
        push(&format!("DTSTAMP:{dtstamp}"));
        push(&format!("DTSTART:{}", format_utc(booking.span.start)));
        push(&format!("DTEND:{}", format_utc(booking.span.end)));
        push(&format!("SUMMARY:{}", escape_text(&booking.title)));
        if let Some(desc) = &booking.description {
            push(&format!("DESCRIPTION:{}", escape_text(desc)));
        }
        if let Some(room) = rooms.iter().find(|r| r.id == booking.room_id) {
            push(&format!("LOCATION:{}", escape_text(&room.name)));
        }
        push(&format!(
            "ORGANIZER;CN={}:mailto:{}@{}",
            escape_text(&booking.booked_by),
            booking.booked_by.replace([' ', '@'], "."),
            opts.domain
        ));
        push(&format!("STATUS:{}", status_line(booking.status)));
        push("END:VEVENT");
    }

    push("END:VCALENDAR");
    out
}
