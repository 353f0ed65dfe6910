use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::model::*;
use crate::observability;

use super::mutations::{validate_booking_fields, validate_room_fields};
use super::{now_ms, Engine, EngineError};

/// Portable snapshot of rooms and bookings. Serializable, so callers can
/// round-trip it through JSON for backup files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupData {
    pub rooms: Vec<Room>,
    pub bookings: Vec<Booking>,
    pub exported_at: Ms,
}

/// Outcome of a restore. `skipped` counts rows that failed validation or
/// collided on id — reported, not silently dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportReport {
    pub rooms_imported: usize,
    pub bookings_imported: usize,
    pub skipped: usize,
}

impl Engine {
    pub fn export_all(&self) -> BackupData {
        BackupData {
            rooms: self.list_rooms(),
            bookings: self.list_bookings(),
            exported_at: now_ms(),
        }
    }

    /// Destructive restore: clears all rooms and bookings, then reloads from
    /// `data`. Recurrences and users are untouched. Restored bookings skip
    /// the conflict check — a backup is reproduced verbatim, overlaps
    /// included. Rows failing validation are skipped and counted.
    ///
    /// Assumes no concurrent writers, matching the single-logical-writer
    /// model of the embedding application.
    pub async fn import_all(&self, data: BackupData) -> Result<ImportReport, EngineError> {
        self.persist_and_apply(Event::StoreCleared).await?;

        let mut report = ImportReport::default();

        for room in data.rooms {
            if let Err(e) = validate_room_fields(&room.name, &room.equipment) {
                warn!(room = %room.id, error = %e, "import: skipping room");
                metrics::counter!(observability::IMPORT_SKIPPED_TOTAL).increment(1);
                report.skipped += 1;
                continue;
            }
            let id = if room.id.trim().is_empty() {
                Self::gen_id()
            } else {
                room.id
            };
            if self.rooms.contains_key(&id) {
                warn!(room = %id, "import: skipping duplicate room id");
                metrics::counter!(observability::IMPORT_SKIPPED_TOTAL).increment(1);
                report.skipped += 1;
                continue;
            }
            self.persist_and_apply(Event::RoomAdded {
                id,
                name: room.name,
                capacity: room.capacity,
                building: room.building,
                floor: room.floor,
                equipment: join_equipment(&room.equipment),
            })
            .await?;
            report.rooms_imported += 1;
        }

        for booking in data.bookings {
            if let Err(e) = validate_booking_fields(
                &booking.room_id,
                &booking.title,
                &booking.booked_by,
                booking.span.start,
                booking.span.end,
                booking.description.as_deref(),
            ) {
                warn!(booking = %booking.id, error = %e, "import: skipping booking");
                metrics::counter!(observability::IMPORT_SKIPPED_TOTAL).increment(1);
                report.skipped += 1;
                continue;
            }
            let id = if booking.id.trim().is_empty() {
                Self::gen_id()
            } else {
                booking.id
            };
            if self.bookings.contains_key(&id) {
                warn!(booking = %id, "import: skipping duplicate booking id");
                metrics::counter!(observability::IMPORT_SKIPPED_TOTAL).increment(1);
                report.skipped += 1;
                continue;
            }
            self.persist_and_apply(Event::BookingAdded {
                id,
                room_id: booking.room_id,
                title: booking.title,
                span: booking.span,
                booked_by: booking.booked_by,
                status: booking.status,
                description: booking.description,
                created_at: booking.created_at,
                recurrence_id: booking.recurrence_id,
            })
            .await?;
            report.bookings_imported += 1;
        }

        info!(
            rooms = report.rooms_imported,
            bookings = report.bookings_imported,
            skipped = report.skipped,
            "import finished"
        );
        Ok(report)
    }
}
