use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn validate_range(range: &TimeRange, max_duration: Ms) -> Result<(), EngineError> {
    if range.start() < MIN_VALID_TIMESTAMP_MS || range.end() > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if range.duration_ms() > max_duration {
        return Err(EngineError::LimitExceeded("range too wide"));
    }
    Ok(())
}

pub(crate) fn validate_text(
    field: &'static str,
    value: &str,
    max_len: usize,
) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::invalid(field, "must not be empty"));
    }
    if value.len() > max_len {
        return Err(EngineError::invalid(
            field,
            format!("{} bytes exceeds the {max_len} byte limit", value.len()),
        ));
    }
    Ok(())
}

/// Fail with `SlotConflict` if `candidate` overlaps any confirmed booking other than `exclude`.
///
/// When several bookings collide, the earliest one is reported.
pub(crate) fn check_no_conflict(
    existing: &[Booking],
    candidate: &TimeRange,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    let blocking = existing
        .iter()
        .filter(|b| b.is_active() && Some(b.id) != exclude)
        .filter(|b| b.range.overlaps(candidate))
        .min_by_key(|b| b.range);

    match blocking {
        Some(b) => Err(EngineError::SlotConflict {
            booking_id: b.id,
            range: b.range,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Ms = HOUR_MS;
    const M: Ms = MINUTE_MS;

    fn r(start: Ms, end: Ms) -> TimeRange {
        TimeRange::new(start, end).unwrap()
    }

    fn booking(range: TimeRange, status: BookingStatus) -> Booking {
        Booking {
            id: Ulid::new(),
            unit_id: Ulid::nil(),
            user_id: "u".into(),
            range,
            status,
            price_cents: 0,
            notes: None,
        }
    }

    #[test]
    fn touching_at_boundary_is_not_a_conflict() {
        let existing = vec![booking(r(9 * H, 10 * H), BookingStatus::Confirmed)];
        assert!(check_no_conflict(&existing, &r(10 * H, 11 * H), None).is_ok());
        assert!(check_no_conflict(&existing, &r(8 * H, 9 * H), None).is_ok());
    }

    #[test]
    fn partial_overlap_reports_the_blocking_booking() {
        let blocker = booking(r(10 * H + 30 * M, 11 * H + 30 * M), BookingStatus::Confirmed);
        let existing = vec![blocker.clone()];
        let err = check_no_conflict(&existing, &r(10 * H, 11 * H), None).unwrap_err();
        match err {
            EngineError::SlotConflict { booking_id, range } => {
                assert_eq!(booking_id, blocker.id);
                assert_eq!(range, blocker.range);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn earliest_collision_is_reported() {
        let late = booking(r(11 * H, 12 * H), BookingStatus::Confirmed);
        let early = booking(r(9 * H, 10 * H + 30 * M), BookingStatus::Confirmed);
        let existing = vec![late, early.clone()];
        let err = check_no_conflict(&existing, &r(10 * H, 12 * H), None).unwrap_err();
        assert!(matches!(err, EngineError::SlotConflict { booking_id, .. } if booking_id == early.id));
    }

    #[test]
    fn cancelled_bookings_never_conflict() {
        let existing = vec![booking(r(9 * H, 10 * H), BookingStatus::Cancelled)];
        assert!(check_no_conflict(&existing, &r(9 * H, 10 * H), None).is_ok());
    }

    #[test]
    fn excluded_booking_is_skipped() {
        let own = booking(r(9 * H, 10 * H), BookingStatus::Confirmed);
        let existing = vec![own.clone()];
        assert!(check_no_conflict(&existing, &r(9 * H + 30 * M, 10 * H + 30 * M), Some(own.id)).is_ok());
        assert!(check_no_conflict(&existing, &r(9 * H + 30 * M, 10 * H + 30 * M), None).is_err());
    }

    #[test]
    fn identical_range_conflicts() {
        let existing = vec![booking(r(9 * H, 10 * H), BookingStatus::Confirmed)];
        assert!(check_no_conflict(&existing, &r(9 * H, 10 * H), None).is_err());
    }

    #[test]
    fn conflict_message_is_actionable() {
        let blocker = booking(r(10 * H, 11 * H), BookingStatus::Confirmed);
        let err = check_no_conflict(&[blocker.clone()], &r(10 * H, 11 * H), None).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains(&blocker.id.to_string()));
        assert!(msg.contains("1970-01-01T10:00:00Z"));
    }

    #[test]
    fn validate_range_limits() {
        assert!(validate_range(&r(0, H), MAX_BOOKING_DURATION_MS).is_ok());
        assert!(matches!(
            validate_range(&r(-H, 0), MAX_BOOKING_DURATION_MS),
            Err(EngineError::LimitExceeded("timestamp out of range"))
        ));
        assert!(matches!(
            validate_range(&r(0, MAX_BOOKING_DURATION_MS + 1), MAX_BOOKING_DURATION_MS),
            Err(EngineError::LimitExceeded("range too wide"))
        ));
        assert!(validate_range(&r(0, MAX_BOOKING_DURATION_MS), MAX_BOOKING_DURATION_MS).is_ok());
    }

    #[test]
    fn validate_text_names_the_field() {
        assert!(validate_text("label", "Court A", MAX_LABEL_LEN).is_ok());
        assert!(matches!(
            validate_text("label", "  ", MAX_LABEL_LEN),
            Err(EngineError::Invalid { field: "label", .. })
        ));
        let long = "x".repeat(MAX_LABEL_LEN + 1);
        assert!(matches!(
            validate_text("label", &long, MAX_LABEL_LEN),
            Err(EngineError::Invalid { field: "label", .. })
        ));
    }
}
