use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{
    BOOKINGS_CANCELLED_TOTAL, BOOKINGS_CREATED_TOTAL, BOOKINGS_RESCHEDULED_TOTAL,
    BOOKING_CONFLICTS_TOTAL,
};

use super::conflict::{check_no_conflict, validate_range, validate_text};
use super::{Engine, EngineError};

// TODO: derive the price from the stored PricingRule rows once per-hour rate
// resolution (overlapping rules, partial hours) is decided.
fn quote_price(_unit: &ResourceUnit, _range: &TimeRange) -> i64 {
    0
}

fn normalize_notes(notes: Option<String>) -> Result<Option<String>, EngineError> {
    match notes {
        Some(n) if n.trim().is_empty() => Ok(None),
        Some(n) if n.len() > MAX_NOTES_LEN => Err(EngineError::invalid(
            "notes",
            format!("{} bytes exceeds the {MAX_NOTES_LEN} byte limit", n.len()),
        )),
        other => Ok(other),
    }
}

impl Engine {
    // ── Catalog ──────────────────────────────────────────────

    pub async fn create_facility(&self, name: &str, kind: &str) -> Result<Facility, EngineError> {
        validate_text("name", name, MAX_NAME_LEN)?;
        validate_text("kind", kind, MAX_LABEL_LEN)?;

        let facility = Facility {
            id: Ulid::new(),
            name: name.to_string(),
            kind: kind.to_string(),
            active: true,
        };
        self.call("insert_facility", self.store.insert_facility(facility.clone()))
            .await?;
        tracing::info!("created facility {} ({})", facility.id, facility.kind);
        Ok(facility)
    }

    pub async fn create_unit(&self, facility_id: Ulid, label: &str) -> Result<ResourceUnit, EngineError> {
        validate_text("label", label, MAX_LABEL_LEN)?;
        self.require_facility(facility_id).await?;

        let unit = ResourceUnit {
            id: Ulid::new(),
            facility_id,
            label: label.to_string(),
            active: true,
        };
        self.call("insert_unit", self.store.insert_unit(unit.clone())).await?;
        tracing::info!("created unit {} in facility {facility_id}", unit.id);
        Ok(unit)
    }

    /// Ordered with booking writes on the unit by its lock.
    pub async fn set_unit_active(&self, unit_id: Ulid, active: bool) -> Result<ResourceUnit, EngineError> {
        let guard = self.lock_unit(unit_id).await;
        let found = self
            .commit("set_unit_active", guard, move |store| async move {
                store.set_unit_active(unit_id, active).await
            })
            .await?;
        if !found {
            return Err(EngineError::not_found("resource unit", unit_id));
        }
        tracing::info!("unit {unit_id} active={active}");
        self.require_unit(unit_id).await
    }

    // ── Bookings ─────────────────────────────────────────────

    pub async fn create_booking(
        &self,
        unit_id: Ulid,
        user_id: &str,
        range: TimeRange,
        notes: Option<String>,
    ) -> Result<Booking, EngineError> {
        validate_range(&range, MAX_BOOKING_DURATION_MS)?;
        validate_text("user_id", user_id, MAX_SUBJECT_LEN)?;
        let notes = normalize_notes(notes)?;

        let guard = self.lock_unit(unit_id).await;
        let unit = self.require_bookable_unit(unit_id).await?;
        let existing = self
            .call("list_occupancy", self.store.list_occupancy(unit_id, range.covering_days()))
            .await?;
        if let Err(e) = check_no_conflict(&existing, &range, None) {
            metrics::counter!(BOOKING_CONFLICTS_TOTAL).increment(1);
            tracing::warn!("rejected booking on unit {unit_id} for {range}: {e}");
            return Err(e);
        }

        let booking = Booking {
            id: Ulid::new(),
            unit_id,
            user_id: user_id.to_string(),
            range,
            status: BookingStatus::Confirmed,
            price_cents: quote_price(&unit, &range),
            notes,
        };
        let booking = self
            .commit("insert_booking", guard, move |store| async move {
                store.insert_booking(booking).await
            })
            .await?;

        metrics::counter!(BOOKINGS_CREATED_TOTAL).increment(1);
        tracing::info!("booking {} confirmed on unit {unit_id} for {range}", booking.id);
        Ok(booking)
    }

    /// Confirmed → cancelled. There is no way back.
    pub async fn cancel_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        let unit_id = self.require_booking(id).await?.unit_id;

        let guard = self.lock_unit(unit_id).await;
        let mut booking = self.require_booking(id).await?;
        if !booking.is_active() {
            return Err(EngineError::BookingCancelled(id));
        }
        let found = self
            .commit("cancel_booking", guard, move |store| async move {
                store.cancel_booking(id).await
            })
            .await?;
        if !found {
            return Err(EngineError::not_found("booking", id));
        }
        booking.status = BookingStatus::Cancelled;

        metrics::counter!(BOOKINGS_CANCELLED_TOTAL).increment(1);
        tracing::info!("booking {id} cancelled");
        Ok(booking)
    }

    /// Move a confirmed booking to `range`, checked against every other booking on its unit.
    pub async fn reschedule_booking(&self, id: Ulid, range: TimeRange) -> Result<Booking, EngineError> {
        validate_range(&range, MAX_BOOKING_DURATION_MS)?;
        let unit_id = self.require_booking(id).await?.unit_id;

        let guard = self.lock_unit(unit_id).await;
        let mut booking = self.require_booking(id).await?;
        if !booking.is_active() {
            return Err(EngineError::BookingCancelled(id));
        }
        self.require_bookable_unit(unit_id).await?;

        let existing = self
            .call("list_occupancy", self.store.list_occupancy(unit_id, range.covering_days()))
            .await?;
        if let Err(e) = check_no_conflict(&existing, &range, Some(id)) {
            metrics::counter!(BOOKING_CONFLICTS_TOTAL).increment(1);
            tracing::warn!("rejected reschedule of {id} to {range}: {e}");
            return Err(e);
        }
        let found = self
            .commit("update_booking_time", guard, move |store| async move {
                store.update_booking_time(id, range).await
            })
            .await?;
        if !found {
            return Err(EngineError::not_found("booking", id));
        }

        let previous = booking.range;
        booking.range = range;
        metrics::counter!(BOOKINGS_RESCHEDULED_TOTAL).increment(1);
        tracing::info!("booking {id} moved from {previous} to {range}");
        Ok(booking)
    }

    // ── Admin data ───────────────────────────────────────────

    pub async fn add_blackout(
        &self,
        scope: BlackoutScope,
        range: TimeRange,
        reason: &str,
    ) -> Result<Blackout, EngineError> {
        validate_range(&range, MAX_BLACKOUT_DURATION_MS)?;
        validate_text("reason", reason, MAX_REASON_LEN)?;
        match scope {
            BlackoutScope::Facility(id) => {
                self.require_facility(id).await?;
            }
            BlackoutScope::Unit(id) => {
                self.require_unit(id).await?;
            }
        }

        let blackout = Blackout {
            id: Ulid::new(),
            scope,
            range,
            reason: reason.to_string(),
        };
        self.call("insert_blackout", self.store.insert_blackout(blackout.clone()))
            .await?;
        tracing::info!("blackout {} added for {:?} over {range}", blackout.id, scope);
        Ok(blackout)
    }

    /// Stored for later use; bookings are not priced from it.
    pub async fn add_pricing_rule(&self, rule: NewPricingRule) -> Result<PricingRule, EngineError> {
        validate_text("facility_kind", &rule.facility_kind, MAX_LABEL_LEN)?;
        if rule.day_of_week > 6 {
            return Err(EngineError::invalid(
                "day_of_week",
                format!("{} is not in 0 (Sunday) ..= 6 (Saturday)", rule.day_of_week),
            ));
        }
        if rule.end_hour > 24 {
            return Err(EngineError::invalid(
                "end_hour",
                format!("{} is past the end of the day", rule.end_hour),
            ));
        }
        if rule.start_hour >= rule.end_hour {
            return Err(EngineError::invalid(
                "start_hour",
                format!("{} must be before end_hour {}", rule.start_hour, rule.end_hour),
            ));
        }
        if rule.price_per_hour_cents < 0 {
            return Err(EngineError::invalid(
                "price_per_hour_cents",
                format!("{} is negative", rule.price_per_hour_cents),
            ));
        }

        let rule = PricingRule {
            id: Ulid::new(),
            facility_kind: rule.facility_kind,
            day_of_week: rule.day_of_week,
            start_hour: rule.start_hour,
            end_hour: rule.end_hour,
            price_per_hour_cents: rule.price_per_hour_cents,
        };
        self.call("insert_pricing_rule", self.store.insert_pricing_rule(rule.clone()))
            .await?;
        tracing::info!("pricing rule {} added for {}", rule.id, rule.facility_kind);
        Ok(rule)
    }
}
