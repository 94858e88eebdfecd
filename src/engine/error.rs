use ulid::Ulid;

use crate::model::{format_ms, Ms, TimeRange};
use crate::store::StoreError;

#[derive(Debug)]
pub enum EngineError {
    /// `start >= end` at construction.
    InvalidRange { start: Ms, end: Ms },
    /// Non-positive minimum slot duration.
    InvalidDuration(Ms),
    /// The requested range overlaps an existing confirmed booking.
    SlotConflict { booking_id: Ulid, range: TimeRange },
    NotFound { entity: &'static str, id: Ulid },
    UnitInactive(Ulid),
    FacilityInactive(Ulid),
    /// The booking is cancelled; no transition leaves that state.
    BookingCancelled(Ulid),
    Invalid { field: &'static str, reason: String },
    LimitExceeded(&'static str),
    Store(StoreError),
}

impl EngineError {
    pub(crate) fn not_found(entity: &'static str, id: Ulid) -> Self {
        EngineError::NotFound { entity, id }
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        EngineError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidRange { start, end } => write!(
                f,
                "invalid time range: start {} must be before end {}",
                format_ms(*start),
                format_ms(*end)
            ),
            EngineError::InvalidDuration(ms) => {
                write!(f, "invalid duration: {ms}ms, must be positive")
            }
            EngineError::SlotConflict { booking_id, range } => {
                write!(f, "slot unavailable: overlaps with booking {booking_id} {range}")
            }
            EngineError::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            EngineError::UnitInactive(id) => write!(f, "resource unit {id} is inactive"),
            EngineError::FacilityInactive(id) => write!(f, "facility {id} is inactive"),
            EngineError::BookingCancelled(id) => write!(f, "booking {id} is cancelled"),
            EngineError::Invalid { field, reason } => write!(f, "invalid {field}: {reason}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Store(e) => write!(f, "store failure: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Store(e)
    }
}
