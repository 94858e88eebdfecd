use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use courtside::api::{
    Api, ApiError, AvailabilityQuery, BlackoutRequest, BookingRequest, RescheduleRequest,
};
use courtside::auth::{AuthError, Principal, Role, StaticTokens};
use courtside::engine::{Engine, EngineError};
use courtside::model::*;
use courtside::store::LocalStore;

const ADMIN: Option<&str> = Some("Bearer admin-token");
const ALICE: Option<&str> = Some("Bearer alice-token");
const BOB: Option<&str> = Some("Bearer bob-token");

fn tokens() -> StaticTokens {
    let entry = |token: &str, subject: &str, role: Role| {
        (
            token.to_string(),
            Principal {
                subject: subject.to_string(),
                role,
            },
        )
    };
    StaticTokens::new([
        entry("admin-token", "staff-1", Role::Admin),
        entry("alice-token", "alice", Role::Member),
        entry("bob-token", "bob", Role::Member),
    ])
}

fn api_over(store: LocalStore) -> Api {
    let engine = Arc::new(Engine::new(Arc::new(store)));
    Api::new(engine, Arc::new(tokens()))
}

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("courtside_test_api");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 7).unwrap()
}

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    day().and_hms_opt(hour, minute, 0).unwrap().and_utc()
}

fn ms(t: DateTime<Utc>) -> Ms {
    t.timestamp_millis()
}

fn booking(unit_id: ulid::Ulid, start: DateTime<Utc>, end: DateTime<Utc>) -> BookingRequest {
    BookingRequest {
        unit_id,
        start,
        end,
        notes: None,
    }
}

/// Facility "Badminton Court 1" with "Court A", created by the admin.
async fn seeded(api: &Api) -> (Facility, ResourceUnit) {
    let facility = api
        .create_facility(ADMIN, "Badminton Court 1", "badminton")
        .await
        .unwrap();
    let unit = api.create_unit(ADMIN, facility.id, "Court A").await.unwrap();
    (facility, unit)
}

fn is_forbidden<T: std::fmt::Debug>(result: &Result<T, ApiError>) -> bool {
    matches!(result, Err(ApiError::Auth(AuthError::Forbidden)))
}

#[tokio::test]
async fn catalog_and_availability_are_public() {
    let api = api_over(LocalStore::in_memory());
    let (facility, unit) = seeded(&api).await;

    assert_eq!(api.list_facilities().await.unwrap(), vec![facility.clone()]);
    assert_eq!(api.get_facility(facility.id).await.unwrap(), facility);
    assert_eq!(api.list_units(facility.id).await.unwrap(), vec![unit.clone()]);

    let query = AvailabilityQuery {
        facility_kind: "badminton".into(),
        date: day(),
        duration_minutes: 60,
    };
    let availability = api.availability(&query).await.unwrap();
    assert_eq!(availability.len(), 1);
    assert_eq!(availability[0].unit_id, unit.id);
    assert_eq!(
        availability[0].free,
        vec![TimeRange::new(ms(at(8, 0)), ms(at(22, 0))).unwrap()]
    );
}

#[tokio::test]
async fn admin_operations_require_admin() {
    let api = api_over(LocalStore::in_memory());
    let (facility, unit) = seeded(&api).await;

    assert!(is_forbidden(&api.create_facility(ALICE, "Squash", "squash").await));
    assert!(is_forbidden(&api.create_unit(ALICE, facility.id, "Court B").await));
    assert!(is_forbidden(&api.set_unit_active(ALICE, unit.id, false).await));
    assert!(is_forbidden(&api.admin_bookings(ALICE, "badminton", day()).await));
    let rule = NewPricingRule {
        facility_kind: "badminton".into(),
        day_of_week: 6,
        start_hour: 8,
        end_hour: 12,
        price_per_hour_cents: 1200,
    };
    assert!(is_forbidden(&api.add_pricing_rule(BOB, rule.clone()).await));
    assert!(matches!(
        api.create_facility(None, "Squash", "squash").await,
        Err(ApiError::Auth(AuthError::MissingToken))
    ));

    assert!(is_forbidden(&api.pricing_rules(ALICE, "badminton").await));

    let stored = api.add_pricing_rule(ADMIN, rule).await.unwrap();
    assert_eq!(api.pricing_rules(ADMIN, "badminton").await.unwrap(), vec![stored]);
    let unit = api.set_unit_active(ADMIN, unit.id, false).await.unwrap();
    assert!(!unit.active);
}

#[tokio::test]
async fn booking_lifecycle_with_owner_checks() {
    let api = api_over(LocalStore::in_memory());
    let (_, unit) = seeded(&api).await;

    assert!(matches!(
        api.create_booking(None, booking(unit.id, at(10, 0), at(11, 0))).await,
        Err(ApiError::Auth(AuthError::MissingToken))
    ));

    let mine = api
        .create_booking(ALICE, booking(unit.id, at(10, 0), at(11, 0)))
        .await
        .unwrap();
    assert_eq!(mine.user_id, "alice");
    assert_eq!(mine.status, BookingStatus::Confirmed);

    // Bob sees a conflict naming Alice's booking, and cannot touch it.
    let err = api
        .create_booking(BOB, booking(unit.id, at(10, 30), at(11, 30)))
        .await
        .unwrap_err();
    match &err {
        ApiError::Engine(EngineError::SlotConflict { booking_id, .. }) => {
            assert_eq!(*booking_id, mine.id)
        }
        other => panic!("expected conflict, got {other}"),
    }
    assert!(err.to_string().starts_with("slot unavailable: overlaps with booking"));
    assert!(is_forbidden(&api.get_booking(BOB, mine.id).await));
    assert!(is_forbidden(&api.cancel_booking(BOB, mine.id).await));
    assert!(is_forbidden(
        &api.reschedule_booking(
            BOB,
            mine.id,
            RescheduleRequest {
                start: at(12, 0),
                end: at(13, 0)
            }
        )
        .await
    ));

    assert_eq!(api.get_booking(ALICE, mine.id).await.unwrap().id, mine.id);
    assert_eq!(api.get_booking(ADMIN, mine.id).await.unwrap().id, mine.id);

    let moved = api
        .reschedule_booking(
            ALICE,
            mine.id,
            RescheduleRequest {
                start: at(10, 30),
                end: at(11, 30),
            },
        )
        .await
        .unwrap();
    assert_eq!(moved.range.start(), ms(at(10, 30)));

    api.create_booking(BOB, booking(unit.id, at(11, 30), at(12, 30)))
        .await
        .unwrap();
    assert_eq!(api.my_bookings(ALICE).await.unwrap().len(), 1);
    assert_eq!(api.my_bookings(BOB).await.unwrap().len(), 1);

    // Admin may cancel anyone's booking; cancelling twice fails.
    let cancelled = api.cancel_booking(ADMIN, mine.id).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert!(matches!(
        api.cancel_booking(ALICE, mine.id).await,
        Err(ApiError::Engine(EngineError::BookingCancelled(_)))
    ));

    let all = api.admin_bookings(ADMIN, "badminton", day()).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn blackouts_shape_availability() {
    let api = api_over(LocalStore::in_memory());
    let (facility, unit) = seeded(&api).await;

    api.add_blackout(
        ADMIN,
        BlackoutRequest {
            scope: BlackoutScope::Facility(facility.id),
            start: at(12, 0),
            end: at(14, 0),
            reason: "maintenance".into(),
        },
    )
    .await
    .unwrap();
    assert!(is_forbidden(
        &api.add_blackout(
            ALICE,
            BlackoutRequest {
                scope: BlackoutScope::Unit(unit.id),
                start: at(8, 0),
                end: at(9, 0),
                reason: "mine".into(),
            },
        )
        .await
    ));

    let free = api.unit_availability(unit.id, day(), 90).await.unwrap();
    let expected: Vec<TimeRange> = [(at(8, 0), at(12, 0)), (at(14, 0), at(22, 0))]
        .into_iter()
        .map(|(s, e)| TimeRange::new(ms(s), ms(e)).unwrap())
        .collect();
    assert_eq!(free, expected);

    assert!(matches!(
        api.unit_availability(unit.id, day(), -30).await,
        Err(ApiError::Engine(EngineError::InvalidDuration(_)))
    ));
}

#[tokio::test]
async fn state_survives_restart() {
    let path = test_wal_path("restart.wal");
    let (unit_id, booking_id) = {
        let api = api_over(LocalStore::open(&path).unwrap());
        let (_, unit) = seeded(&api).await;
        let b = api
            .create_booking(ALICE, booking(unit.id, at(18, 0), at(19, 0)))
            .await
            .unwrap();
        (unit.id, b.id)
    };

    let api = api_over(LocalStore::open(&path).unwrap());
    assert_eq!(api.list_facilities().await.unwrap().len(), 1);
    assert_eq!(api.get_booking(ALICE, booking_id).await.unwrap().unit_id, unit_id);
    assert!(matches!(
        api.create_booking(BOB, booking(unit_id, at(18, 30), at(19, 30))).await,
        Err(ApiError::Engine(EngineError::SlotConflict { .. }))
    ));
}
