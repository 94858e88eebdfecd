//! The persistence seam. The engine only ever talks to a [`Store`]; filtering by
//! equality, status and range overlap is the store's job.

mod local;

pub use local::LocalStore;

use async_trait::async_trait;
use ulid::Ulid;

use crate::model::*;

#[derive(Debug)]
pub enum StoreError {
    Io(String),
    /// The call did not finish within the caller's deadline.
    Timeout,
    /// The store's writer is gone.
    Closed,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "I/O error: {e}"),
            StoreError::Timeout => write!(f, "timed out"),
            StoreError::Closed => write!(f, "store closed"),
        }
    }
}

impl std::error::Error for StoreError {}

#[async_trait]
pub trait Store: Send + Sync {
    // ── Catalog ──────────────────────────────────────────────

    async fn list_facilities(&self) -> Result<Vec<Facility>, StoreError>;

    async fn get_facility(&self, id: Ulid) -> Result<Option<Facility>, StoreError>;

    async fn insert_facility(&self, facility: Facility) -> Result<(), StoreError>;

    async fn list_units(&self, facility_id: Ulid) -> Result<Vec<ResourceUnit>, StoreError>;

    /// Active units whose facility is active and of the given kind.
    async fn list_active_units_by_kind(&self, kind: &str) -> Result<Vec<ResourceUnit>, StoreError>;

    async fn get_unit(&self, id: Ulid) -> Result<Option<ResourceUnit>, StoreError>;

    async fn insert_unit(&self, unit: ResourceUnit) -> Result<(), StoreError>;

    /// Returns false if no such unit.
    async fn set_unit_active(&self, id: Ulid, active: bool) -> Result<bool, StoreError>;

    // ── Occupancy ────────────────────────────────────────────

    /// Non-cancelled bookings of `unit_id` overlapping `window`.
    async fn list_occupancy(&self, unit_id: Ulid, window: TimeRange) -> Result<Vec<Booking>, StoreError>;

    /// Blackouts scoped to `unit_id` or to `facility_id` that overlap `window`.
    async fn list_blackouts(
        &self,
        facility_id: Ulid,
        unit_id: Ulid,
        window: TimeRange,
    ) -> Result<Vec<Blackout>, StoreError>;

    // ── Bookings ─────────────────────────────────────────────

    async fn insert_booking(&self, booking: Booking) -> Result<Booking, StoreError>;

    async fn get_booking(&self, id: Ulid) -> Result<Option<Booking>, StoreError>;

    async fn list_bookings_by_user(&self, user_id: &str) -> Result<Vec<Booking>, StoreError>;

    /// Bookings of any status on units of facilities of `kind` overlapping `window`.
    async fn list_bookings_by_kind(&self, kind: &str, window: TimeRange) -> Result<Vec<Booking>, StoreError>;

    /// Returns false if no such booking.
    async fn update_booking_time(&self, id: Ulid, range: TimeRange) -> Result<bool, StoreError>;

    /// Returns false if no such booking.
    async fn cancel_booking(&self, id: Ulid) -> Result<bool, StoreError>;

    // ── Admin data ───────────────────────────────────────────

    async fn insert_blackout(&self, blackout: Blackout) -> Result<(), StoreError>;

    async fn insert_pricing_rule(&self, rule: PricingRule) -> Result<(), StoreError>;

    async fn list_pricing_rules(&self, facility_kind: &str) -> Result<Vec<PricingRule>, StoreError>;
}
