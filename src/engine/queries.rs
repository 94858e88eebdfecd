use std::time::Instant;

use chrono::NaiveDate;
use futures::future::try_join_all;
use ulid::Ulid;

use crate::model::*;
use crate::observability::{AVAILABILITY_DURATION_SECONDS, AVAILABILITY_QUERIES_TOTAL};

use super::availability::compute_free_slots;
use super::{Engine, EngineError};

impl Engine {
    pub async fn list_facilities(&self) -> Result<Vec<Facility>, EngineError> {
        self.call("list_facilities", self.store.list_facilities()).await
    }

    pub async fn get_facility(&self, id: Ulid) -> Result<Facility, EngineError> {
        self.require_facility(id).await
    }

    pub async fn list_units(&self, facility_id: Ulid) -> Result<Vec<ResourceUnit>, EngineError> {
        self.require_facility(facility_id).await?;
        self.call("list_units", self.store.list_units(facility_id)).await
    }

    /// The bookable window of `day` under the engine's opening hours.
    pub fn opening_window(&self, day: NaiveDate) -> TimeRange {
        self.opening.window_for(day)
    }

    /// Free slots of one unit on `day` that are at least `min_duration_ms` long.
    pub async fn unit_free_slots(
        &self,
        unit_id: Ulid,
        day: NaiveDate,
        min_duration_ms: Ms,
    ) -> Result<Vec<TimeRange>, EngineError> {
        if min_duration_ms <= 0 {
            return Err(EngineError::InvalidDuration(min_duration_ms));
        }
        let unit = self.require_bookable_unit(unit_id).await?;
        self.free_slots_for(&unit, day, min_duration_ms).await
    }

    /// Free slots of every active unit of an active facility of `kind`. Units are queried concurrently.
    pub async fn availability_by_kind(
        &self,
        kind: &str,
        day: NaiveDate,
        min_duration_ms: Ms,
    ) -> Result<Vec<UnitAvailability>, EngineError> {
        if min_duration_ms <= 0 {
            return Err(EngineError::InvalidDuration(min_duration_ms));
        }
        let units = self
            .call("list_active_units_by_kind", self.store.list_active_units_by_kind(kind))
            .await?;

        let mut result = try_join_all(units.into_iter().map(|unit| async move {
            let free = self.free_slots_for(&unit, day, min_duration_ms).await?;
            Ok::<_, EngineError>(UnitAvailability {
                unit_id: unit.id,
                label: unit.label,
                free,
            })
        }))
        .await?;
        result.sort_by(|a, b| a.label.cmp(&b.label).then(a.unit_id.cmp(&b.unit_id)));
        Ok(result)
    }

    /// Opening window minus bookings and blackouts for the day.
    async fn free_slots_for(
        &self,
        unit: &ResourceUnit,
        day: NaiveDate,
        min_duration_ms: Ms,
    ) -> Result<Vec<TimeRange>, EngineError> {
        let started = Instant::now();
        let whole_day = day_range(day);
        let window = self.opening.window_for(day);

        let (bookings, blackouts) = tokio::try_join!(
            self.call("list_occupancy", self.store.list_occupancy(unit.id, whole_day)),
            self.call(
                "list_blackouts",
                self.store.list_blackouts(unit.facility_id, unit.id, whole_day)
            ),
        )?;

        let occupied: Vec<TimeRange> = bookings
            .iter()
            .map(|b| b.range)
            .chain(blackouts.iter().map(|b| b.range))
            .collect();
        let free = compute_free_slots(&window, &occupied, min_duration_ms)?;

        metrics::counter!(AVAILABILITY_QUERIES_TOTAL).increment(1);
        metrics::histogram!(AVAILABILITY_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        tracing::debug!(
            "unit {} on {day}: {} bookings, {} blackouts, {} free slots",
            unit.id,
            bookings.len(),
            blackouts.len(),
            free.len()
        );
        Ok(free)
    }

    pub async fn get_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        self.require_booking(id).await
    }

    pub async fn bookings_for_user(&self, user_id: &str) -> Result<Vec<Booking>, EngineError> {
        self.call("list_bookings_by_user", self.store.list_bookings_by_user(user_id))
            .await
    }

    pub async fn pricing_rules(&self, facility_kind: &str) -> Result<Vec<PricingRule>, EngineError> {
        self.call("list_pricing_rules", self.store.list_pricing_rules(facility_kind))
            .await
    }

    /// Every booking, cancelled included, on units of facilities of `kind` that overlaps `day`.
    pub async fn admin_bookings(&self, kind: &str, day: NaiveDate) -> Result<Vec<Booking>, EngineError> {
        self.call(
            "list_bookings_by_kind",
            self.store.list_bookings_by_kind(kind, day_range(day)),
        )
        .await
    }
}
