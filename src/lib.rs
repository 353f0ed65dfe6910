//! Room booking core: a WAL-backed store of rooms and bookings, a conflict
//! checker over half-open intervals, and a recurrence expander. Designed to
//! embed in a desktop scheduling application; this crate is the whole data
//! layer, the UI stays elsewhere.

pub mod auth;
pub mod compactor;
pub mod engine;
pub mod ical;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod recurrence;
pub mod wal;
