use crate::model::BookingStatus;

#[derive(Debug)]
pub enum EngineError {
    /// Caller sent a missing or malformed field; the message names it.
    Validation(String),
    /// Referenced id does not exist.
    NotFound(String),
    /// Caller-supplied id is already taken.
    AlreadyExists(String),
    /// The candidate interval overlaps an active booking on the same room.
    Conflict { booking_id: String },
    /// Status change outside the allowed transition relation.
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "validation failed: {msg}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::Conflict { booking_id } => {
                write!(f, "conflicts with booking: {booking_id}")
            }
            EngineError::InvalidTransition { from, to } => {
                write!(f, "invalid status transition: {from} -> {to}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
