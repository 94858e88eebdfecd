use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::EngineError;

/// Unix milliseconds, UTC. The only instant type.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;
pub const HOUR_MS: Ms = 60 * MINUTE_MS;
pub const DAY_MS: Ms = 24 * HOUR_MS;

/// Half-open range `[start, end)` with `start < end`.
///
/// Ordering is by `start`, then `end`, which is the order every sweep in the
/// engine expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRange")]
pub struct TimeRange {
    start: Ms,
    end: Ms,
}

#[derive(Deserialize)]
struct RawRange {
    start: Ms,
    end: Ms,
}

impl TryFrom<RawRange> for TimeRange {
    type Error = EngineError;

    fn try_from(raw: RawRange) -> Result<Self, Self::Error> {
        TimeRange::new(raw.start, raw.end)
    }
}

impl TimeRange {
    pub fn new(start: Ms, end: Ms) -> Result<Self, EngineError> {
        if start >= end {
            return Err(EngineError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// For bounds that are ordered by construction (day arithmetic, clamping).
    pub(crate) fn from_bounds(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "TimeRange start must be before end");
        Self { start, end }
    }

    pub fn start(&self) -> Ms {
        self.start
    }

    pub fn end(&self) -> Ms {
        self.end
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    /// The part of `self` inside `bounds`, if any.
    pub fn clamp_to(&self, bounds: &TimeRange) -> Option<TimeRange> {
        let start = self.start.max(bounds.start);
        let end = self.end.min(bounds.end);
        (start < end).then(|| TimeRange::from_bounds(start, end))
    }

    /// Whole UTC days touched by this range: `[floor_day(start), ceil_day(end))`.
    pub fn covering_days(&self) -> TimeRange {
        let start = self.start - self.start.rem_euclid(DAY_MS);
        let rem = self.end.rem_euclid(DAY_MS);
        let end = if rem == 0 { self.end } else { self.end - rem + DAY_MS };
        TimeRange::from_bounds(start, end)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} - {})", format_ms(self.start), format_ms(self.end))
    }
}

/// RFC 3339 rendering of an instant; falls back to raw milliseconds when out of chrono's range.
pub fn format_ms(ms: Ms) -> String {
    match DateTime::<Utc>::from_timestamp_millis(ms) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, true),
        None => ms.to_string(),
    }
}

pub fn day_start(day: NaiveDate) -> Ms {
    day.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}

/// `[00:00, 24:00)` of `day` in UTC.
pub fn day_range(day: NaiveDate) -> TimeRange {
    let start = day_start(day);
    TimeRange::from_bounds(start, start + DAY_MS)
}

// ── Catalog ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facility {
    pub id: Ulid,
    pub name: String,
    /// Facility type, e.g. "badminton".
    pub kind: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUnit {
    pub id: Ulid,
    pub facility_id: Ulid,
    pub label: String,
    pub active: bool,
}

// ── Bookings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub unit_id: Ulid,
    pub user_id: String,
    pub range: TimeRange,
    pub status: BookingStatus,
    pub price_cents: i64,
    pub notes: Option<String>,
}

impl Booking {
    pub fn is_active(&self) -> bool {
        self.status == BookingStatus::Confirmed
    }
}

// ── Admin-declared data ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlackoutScope {
    Facility(Ulid),
    Unit(Ulid),
}

impl BlackoutScope {
    /// Whether this blackout removes availability from `unit_id` of `facility_id`.
    pub fn applies_to(&self, facility_id: Ulid, unit_id: Ulid) -> bool {
        match *self {
            BlackoutScope::Facility(id) => id == facility_id,
            BlackoutScope::Unit(id) => id == unit_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blackout {
    pub id: Ulid,
    pub scope: BlackoutScope,
    pub range: TimeRange,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRule {
    pub id: Ulid,
    pub facility_kind: String,
    /// 0 = Sunday .. 6 = Saturday.
    pub day_of_week: u8,
    pub start_hour: u8,
    pub end_hour: u8,
    pub price_per_hour_cents: i64,
}

/// A pricing rule before it is assigned an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPricingRule {
    pub facility_kind: String,
    pub day_of_week: u8,
    pub start_hour: u8,
    pub end_hour: u8,
    pub price_per_hour_cents: i64,
}

/// Free slots of one unit for one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitAvailability {
    pub unit_id: Ulid,
    pub label: String,
    pub free: Vec<TimeRange>,
}

/// WAL record format. Flat, one variant per state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    FacilityCreated(Facility),
    UnitCreated(ResourceUnit),
    UnitActivity {
        id: Ulid,
        active: bool,
    },
    BookingConfirmed(Booking),
    BookingRescheduled {
        id: Ulid,
        range: TimeRange,
    },
    BookingCancelled {
        id: Ulid,
    },
    BlackoutAdded(Blackout),
    PricingRuleAdded(PricingRule),
}
