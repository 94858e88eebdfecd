mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;

pub use availability::{compute_free_slots, FixedHours, OpeningPolicy};
pub use error::EngineError;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use ulid::Ulid;

use crate::model::*;
use crate::observability::STORE_TIMEOUTS_TOTAL;
use crate::store::{Store, StoreError};

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// The booking service: availability over a [`Store`], plus the conflict guard.
///
/// Every create, reschedule and cancel runs its read-check-write sequence while
/// holding its unit's mutex, so two requests for one unit never interleave.
/// Queries take no locks.
pub struct Engine {
    store: Arc<dyn Store>,
    opening: Arc<dyn OpeningPolicy>,
    unit_locks: DashMap<Ulid, Arc<Mutex<()>>>,
    store_timeout: Duration,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            opening: Arc::new(FixedHours::default()),
            unit_locks: DashMap::new(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_opening_policy(mut self, policy: impl OpeningPolicy + 'static) -> Self {
        self.opening = Arc::new(policy);
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Run one store call under the configured deadline.
    pub(super) async fn call<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, EngineError> {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(result) => result.map_err(EngineError::from),
            Err(_) => {
                metrics::counter!(STORE_TIMEOUTS_TOTAL, "op" => op).increment(1);
                tracing::warn!("store call {op} timed out after {:?}", self.store_timeout);
                Err(EngineError::Store(StoreError::Timeout))
            }
        }
    }

    /// Run a write on its own task, holding `guard` until the write settles.
    /// A caller that hits the deadline gets `Timeout`; the unit stays locked
    /// until the store has either committed or failed the write.
    pub(super) async fn commit<T, F, Fut>(
        &self,
        op: &'static str,
        guard: OwnedMutexGuard<()>,
        write: F,
    ) -> Result<T, EngineError>
    where
        F: FnOnce(Arc<dyn Store>) -> Fut,
        Fut: Future<Output = Result<T, StoreError>> + Send + 'static,
        T: Send + 'static,
    {
        let write = write(self.store.clone());
        let task = tokio::spawn(async move {
            let result = write.await;
            drop(guard);
            result
        });
        self.call(op, async move {
            task.await
                .map_err(|e| StoreError::Io(format!("{op} task failed: {e}")))?
        })
        .await
    }

    /// Serialization point for every write on `unit_id`.
    pub(super) async fn lock_unit(&self, unit_id: Ulid) -> OwnedMutexGuard<()> {
        let lock = self.unit_locks.entry(unit_id).or_default().clone();
        lock.lock_owned().await
    }

    pub(super) async fn require_unit(&self, unit_id: Ulid) -> Result<ResourceUnit, EngineError> {
        self.call("get_unit", self.store.get_unit(unit_id))
            .await?
            .ok_or(EngineError::not_found("resource unit", unit_id))
    }

    pub(super) async fn require_facility(&self, facility_id: Ulid) -> Result<Facility, EngineError> {
        self.call("get_facility", self.store.get_facility(facility_id))
            .await?
            .ok_or(EngineError::not_found("facility", facility_id))
    }

    /// The unit, provided it and its facility are both active.
    pub(super) async fn require_bookable_unit(&self, unit_id: Ulid) -> Result<ResourceUnit, EngineError> {
        let unit = self.require_unit(unit_id).await?;
        if !unit.active {
            return Err(EngineError::UnitInactive(unit_id));
        }
        let facility = self.require_facility(unit.facility_id).await?;
        if !facility.active {
            return Err(EngineError::FacilityInactive(facility.id));
        }
        Ok(unit)
    }

    pub(super) async fn require_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        self.call("get_booking", self.store.get_booking(id))
            .await?
            .ok_or(EngineError::not_found("booking", id))
    }
}
