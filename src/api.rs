//! The role-gated boundary. Every call names its credential requirement up front:
//! public, authenticated (with an owner check where a booking is involved), or admin.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use ulid::Ulid;

use crate::auth::{AuthError, IdentityProvider, Permission, Principal};
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability::AUTH_FAILURES_TOTAL;

#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),
    Engine(EngineError),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Auth(e) => write!(f, "{e}"),
            ApiError::Engine(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApiError::Auth(e) => Some(e),
            ApiError::Engine(e) => Some(e),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError::Auth(e)
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError::Engine(e)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityQuery {
    pub facility_kind: String,
    pub date: NaiveDate,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub unit_id: Ulid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescheduleRequest {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlackoutRequest {
    pub scope: BlackoutScope,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub reason: String,
}

fn range_between(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<TimeRange, EngineError> {
    TimeRange::new(start.timestamp_millis(), end.timestamp_millis())
}

fn minutes_to_ms(minutes: i64) -> Ms {
    minutes.saturating_mul(MINUTE_MS)
}

pub struct Api {
    engine: Arc<Engine>,
    identity: Arc<dyn IdentityProvider>,
}

impl Api {
    pub fn new(engine: Arc<Engine>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { engine, identity }
    }

    /// Resolve a raw `Authorization` value (`Bearer <token>`) to a principal.
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<Principal, ApiError> {
        let token = authorization
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let result = match token {
            Some(token) => self.identity.verify(token).await,
            None => Err(AuthError::MissingToken),
        };
        result.map_err(|e| self.rejected(e))
    }

    async fn authorize(
        &self,
        authorization: Option<&str>,
        permission: Permission<'_>,
    ) -> Result<Principal, ApiError> {
        let principal = self.authenticate(authorization).await?;
        principal.authorize(permission).map_err(|e| {
            tracing::warn!("{} denied {:?}", principal.subject, permission);
            self.rejected(e)
        })?;
        Ok(principal)
    }

    fn rejected(&self, e: AuthError) -> ApiError {
        metrics::counter!(AUTH_FAILURES_TOTAL, "reason" => e.label()).increment(1);
        ApiError::Auth(e)
    }

    /// The booking, provided the caller owns it or is an admin.
    async fn owned_booking(&self, authorization: Option<&str>, id: Ulid) -> Result<Booking, ApiError> {
        let principal = self.authenticate(authorization).await?;
        let booking = self.engine.get_booking(id).await?;
        principal
            .authorize(Permission::Owner(&booking.user_id))
            .map_err(|e| {
                tracing::warn!("{} denied access to booking {id}", principal.subject);
                self.rejected(e)
            })?;
        Ok(booking)
    }

    // ── Public ───────────────────────────────────────────────

    pub async fn list_facilities(&self) -> Result<Vec<Facility>, ApiError> {
        Ok(self.engine.list_facilities().await?)
    }

    pub async fn get_facility(&self, id: Ulid) -> Result<Facility, ApiError> {
        Ok(self.engine.get_facility(id).await?)
    }

    pub async fn list_units(&self, facility_id: Ulid) -> Result<Vec<ResourceUnit>, ApiError> {
        Ok(self.engine.list_units(facility_id).await?)
    }

    pub async fn availability(&self, query: &AvailabilityQuery) -> Result<Vec<UnitAvailability>, ApiError> {
        Ok(self
            .engine
            .availability_by_kind(&query.facility_kind, query.date, minutes_to_ms(query.duration_minutes))
            .await?)
    }

    pub async fn unit_availability(
        &self,
        unit_id: Ulid,
        date: NaiveDate,
        duration_minutes: i64,
    ) -> Result<Vec<TimeRange>, ApiError> {
        Ok(self
            .engine
            .unit_free_slots(unit_id, date, minutes_to_ms(duration_minutes))
            .await?)
    }

    // ── Authenticated ────────────────────────────────────────

    pub async fn me(&self, authorization: Option<&str>) -> Result<Principal, ApiError> {
        self.authenticate(authorization).await
    }

    pub async fn create_booking(
        &self,
        authorization: Option<&str>,
        request: BookingRequest,
    ) -> Result<Booking, ApiError> {
        let principal = self.authenticate(authorization).await?;
        let range = range_between(request.start, request.end)?;
        Ok(self
            .engine
            .create_booking(request.unit_id, &principal.subject, range, request.notes)
            .await?)
    }

    pub async fn get_booking(&self, authorization: Option<&str>, id: Ulid) -> Result<Booking, ApiError> {
        self.owned_booking(authorization, id).await
    }

    pub async fn my_bookings(&self, authorization: Option<&str>) -> Result<Vec<Booking>, ApiError> {
        let principal = self.authenticate(authorization).await?;
        Ok(self.engine.bookings_for_user(&principal.subject).await?)
    }

    pub async fn cancel_booking(&self, authorization: Option<&str>, id: Ulid) -> Result<Booking, ApiError> {
        self.owned_booking(authorization, id).await?;
        Ok(self.engine.cancel_booking(id).await?)
    }

    pub async fn reschedule_booking(
        &self,
        authorization: Option<&str>,
        id: Ulid,
        request: RescheduleRequest,
    ) -> Result<Booking, ApiError> {
        let range = range_between(request.start, request.end)?;
        self.owned_booking(authorization, id).await?;
        Ok(self.engine.reschedule_booking(id, range).await?)
    }

    // ── Admin ────────────────────────────────────────────────

    pub async fn create_facility(
        &self,
        authorization: Option<&str>,
        name: &str,
        kind: &str,
    ) -> Result<Facility, ApiError> {
        self.authorize(authorization, Permission::Admin).await?;
        Ok(self.engine.create_facility(name, kind).await?)
    }

    pub async fn create_unit(
        &self,
        authorization: Option<&str>,
        facility_id: Ulid,
        label: &str,
    ) -> Result<ResourceUnit, ApiError> {
        self.authorize(authorization, Permission::Admin).await?;
        Ok(self.engine.create_unit(facility_id, label).await?)
    }

    pub async fn set_unit_active(
        &self,
        authorization: Option<&str>,
        unit_id: Ulid,
        active: bool,
    ) -> Result<ResourceUnit, ApiError> {
        self.authorize(authorization, Permission::Admin).await?;
        Ok(self.engine.set_unit_active(unit_id, active).await?)
    }

    pub async fn add_pricing_rule(
        &self,
        authorization: Option<&str>,
        rule: NewPricingRule,
    ) -> Result<PricingRule, ApiError> {
        self.authorize(authorization, Permission::Admin).await?;
        Ok(self.engine.add_pricing_rule(rule).await?)
    }

    pub async fn pricing_rules(
        &self,
        authorization: Option<&str>,
        facility_kind: &str,
    ) -> Result<Vec<PricingRule>, ApiError> {
        self.authorize(authorization, Permission::Admin).await?;
        Ok(self.engine.pricing_rules(facility_kind).await?)
    }

    pub async fn add_blackout(
        &self,
        authorization: Option<&str>,
        request: BlackoutRequest,
    ) -> Result<Blackout, ApiError> {
        self.authorize(authorization, Permission::Admin).await?;
        let range = range_between(request.start, request.end)?;
        Ok(self.engine.add_blackout(request.scope, range, &request.reason).await?)
    }

    pub async fn admin_bookings(
        &self,
        authorization: Option<&str>,
        facility_kind: &str,
        date: NaiveDate,
    ) -> Result<Vec<Booking>, ApiError> {
        self.authorize(authorization, Permission::Admin).await?;
        Ok(self.engine.admin_bookings(facility_kind, date).await?)
    }
}
