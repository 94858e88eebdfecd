use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use ulid::Ulid;

use crate::model::*;
use crate::observability::{WAL_FLUSH_BATCH_SIZE, WAL_FLUSH_DURATION_SECONDS};
use crate::wal::Wal;

use super::{Store, StoreError};

// ── Group-commit WAL writer ──────────────────────────────

type Pending = (Event, oneshot::Sender<io::Result<()>>);

enum Control {
    /// Rewrite the log from a snapshot; replies with the number of events kept.
    Compact {
        response: oneshot::Sender<io::Result<usize>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

enum WalCommand {
    Append(Pending),
    Control(Control),
}

/// Owns the WAL and is the only writer of `state`. Each wakeup takes the first
/// append plus everything already queued behind it and commits them with a
/// single fsync, then applies them. A control command closes the batch and
/// runs after it.
async fn wal_writer_loop(mut wal: Wal<Event>, state: Arc<State>, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let mut batch = match cmd {
            WalCommand::Append(pending) => vec![pending],
            WalCommand::Control(control) => {
                run_control(&mut wal, &state, control);
                continue;
            }
        };

        let mut deferred = None;
        while let Ok(cmd) = rx.try_recv() {
            match cmd {
                WalCommand::Append(pending) => batch.push(pending),
                WalCommand::Control(control) => {
                    deferred = Some(control);
                    break;
                }
            }
        }

        commit_batch(&mut wal, &state, batch);
        if let Some(control) = deferred {
            run_control(&mut wal, &state, control);
        }
    }
}

fn commit_batch(wal: &mut Wal<Event>, state: &State, batch: Vec<Pending>) {
    metrics::histogram!(WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    let (events, responders): (Vec<Event>, Vec<_>) = batch.into_iter().unzip();
    let result = wal.append_batch(&events);
    metrics::histogram!(WAL_FLUSH_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

    match &result {
        Ok(()) => events.iter().for_each(|event| state.apply(event)),
        Err(e) => tracing::error!("WAL commit of {} events failed: {e}", events.len()),
    }
    for tx in responders {
        let reply = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(reply);
    }
}

fn run_control(wal: &mut Wal<Event>, state: &State, control: Control) {
    match control {
        Control::Compact { response } => {
            let events = state.snapshot();
            let _ = response.send(wal.compact(&events).map(|()| events.len()));
        }
        Control::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
    }
}

// ── Per-unit booking index ───────────────────────────────

/// Confirmed bookings of one unit, sorted by range.
#[derive(Debug, Default)]
struct UnitLedger {
    entries: Vec<(TimeRange, Ulid)>,
}

impl UnitLedger {
    fn insert(&mut self, range: TimeRange, id: Ulid) {
        let pos = self.entries.partition_point(|(r, _)| *r < range);
        self.entries.insert(pos, (range, id));
    }

    fn remove(&mut self, id: Ulid) -> Option<TimeRange> {
        let pos = self.entries.iter().position(|(_, b)| *b == id)?;
        Some(self.entries.remove(pos).0)
    }

    /// Ids of entries overlapping `query`. Entries starting at or after `query.end` are skipped by binary search.
    fn overlapping(&self, query: &TimeRange) -> Vec<Ulid> {
        let right_bound = self.entries.partition_point(|(r, _)| r.start() < query.end());
        self.entries[..right_bound]
            .iter()
            .filter(|(r, _)| r.end() > query.start())
            .map(|(_, id)| *id)
            .collect()
    }
}

// ── Store ────────────────────────────────────────────────

#[derive(Default)]
struct State {
    facilities: DashMap<Ulid, Facility>,
    units: DashMap<Ulid, ResourceUnit>,
    bookings: DashMap<Ulid, Booking>,
    ledgers: DashMap<Ulid, UnitLedger>,
    blackouts: DashMap<Ulid, Blackout>,
    pricing_rules: DashMap<Ulid, PricingRule>,
}

impl State {
    fn apply(&self, event: &Event) {
        match event {
            Event::FacilityCreated(facility) => {
                self.facilities.insert(facility.id, facility.clone());
            }
            Event::UnitCreated(unit) => {
                self.ledgers.entry(unit.id).or_default();
                self.units.insert(unit.id, unit.clone());
            }
            Event::UnitActivity { id, active } => {
                if let Some(mut unit) = self.units.get_mut(id) {
                    unit.active = *active;
                }
            }
            Event::BookingConfirmed(booking) => {
                if booking.is_active() {
                    self.ledgers
                        .entry(booking.unit_id)
                        .or_default()
                        .insert(booking.range, booking.id);
                }
                self.bookings.insert(booking.id, booking.clone());
            }
            Event::BookingRescheduled { id, range } => {
                let Some(mut booking) = self.bookings.get_mut(id) else { return };
                booking.range = *range;
                let (unit_id, active) = (booking.unit_id, booking.is_active());
                drop(booking);
                if active {
                    let mut ledger = self.ledgers.entry(unit_id).or_default();
                    ledger.remove(*id);
                    ledger.insert(*range, *id);
                }
            }
            Event::BookingCancelled { id } => {
                let Some(mut booking) = self.bookings.get_mut(id) else { return };
                booking.status = BookingStatus::Cancelled;
                let unit_id = booking.unit_id;
                drop(booking);
                if let Some(mut ledger) = self.ledgers.get_mut(&unit_id) {
                    ledger.remove(*id);
                }
            }
            Event::BlackoutAdded(blackout) => {
                self.blackouts.insert(blackout.id, blackout.clone());
            }
            Event::PricingRuleAdded(rule) => {
                self.pricing_rules.insert(rule.id, rule.clone());
            }
        }
    }

    /// Events that recreate the current state, parents before children.
    fn snapshot(&self) -> Vec<Event> {
        fn sorted<T: Clone>(map: &DashMap<Ulid, T>) -> Vec<T> {
            let mut entries: Vec<(Ulid, T)> =
                map.iter().map(|e| (*e.key(), e.value().clone())).collect();
            entries.sort_by_key(|(id, _)| *id);
            entries.into_iter().map(|(_, v)| v).collect()
        }

        let mut events = Vec::new();
        events.extend(sorted(&self.facilities).into_iter().map(Event::FacilityCreated));
        events.extend(sorted(&self.units).into_iter().map(Event::UnitCreated));
        events.extend(sorted(&self.bookings).into_iter().map(Event::BookingConfirmed));
        events.extend(sorted(&self.blackouts).into_iter().map(Event::BlackoutAdded));
        events.extend(sorted(&self.pricing_rules).into_iter().map(Event::PricingRuleAdded));
        events
    }

    fn facility_kind_matches(&self, facility_id: &Ulid, kind: &str, require_active: bool) -> bool {
        self.facilities
            .get(facility_id)
            .is_some_and(|f| f.kind == kind && (f.active || !require_active))
    }
}

/// In-process store: DashMap state, made durable by an optional WAL.
///
/// With a WAL, state changes only on the writer task, once the event is on disk.
pub struct LocalStore {
    state: Arc<State>,
    wal_tx: Option<mpsc::Sender<WalCommand>>,
}

impl LocalStore {
    /// A store with no durability.
    pub fn in_memory() -> Self {
        Self {
            state: Arc::new(State::default()),
            wal_tx: None,
        }
    }

    /// Replay the WAL at `path` and start its writer. Must run inside a Tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let events = Wal::<Event>::replay(path)?;
        let state = Arc::new(State::default());
        for event in &events {
            state.apply(event);
        }
        tracing::info!("replayed {} events from {}", events.len(), path.display());

        let wal = Wal::open(path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, state.clone(), wal_rx));
        Ok(Self {
            state,
            wal_tx: Some(wal_tx),
        })
    }

    /// Make `event` durable, then visible. Once the writer has the event,
    /// dropping this future does not stop it from committing.
    async fn persist(&self, event: Event) -> Result<(), StoreError> {
        let Some(wal_tx) = &self.wal_tx else {
            self.state.apply(&event);
            return Ok(());
        };
        let (tx, rx) = oneshot::channel();
        wal_tx
            .send(WalCommand::Append((event, tx)))
            .await
            .map_err(|_| StoreError::Closed)?;
        rx.await
            .map_err(|_| StoreError::Closed)?
            .map_err(|e| StoreError::Io(e.to_string()))
    }

    async fn control<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Control) -> Result<Option<T>, StoreError> {
        let Some(wal_tx) = &self.wal_tx else { return Ok(None) };
        let (tx, rx) = oneshot::channel();
        wal_tx
            .send(WalCommand::Control(make(tx)))
            .await
            .map_err(|_| StoreError::Closed)?;
        rx.await.map(Some).map_err(|_| StoreError::Closed)
    }

    /// Rewrite the WAL with only the events needed to recreate the current state.
    /// No-op for an in-memory store.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let Some(result) = self.control(|response| Control::Compact { response }).await? else {
            return Ok(());
        };
        let count = result.map_err(|e| StoreError::Io(e.to_string()))?;
        tracing::info!("compacted WAL to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        self.control(|response| Control::AppendsSinceCompact { response })
            .await
            .ok()
            .flatten()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Store for LocalStore {
    async fn list_facilities(&self) -> Result<Vec<Facility>, StoreError> {
        let mut out: Vec<Facility> =
            self.state.facilities.iter().map(|e| e.value().clone()).collect();
        out.sort_by_key(|f| f.id);
        Ok(out)
    }

    async fn get_facility(&self, id: Ulid) -> Result<Option<Facility>, StoreError> {
        Ok(self.state.facilities.get(&id).map(|e| e.value().clone()))
    }

    async fn insert_facility(&self, facility: Facility) -> Result<(), StoreError> {
        self.persist(Event::FacilityCreated(facility)).await
    }

    async fn list_units(&self, facility_id: Ulid) -> Result<Vec<ResourceUnit>, StoreError> {
        let mut out: Vec<ResourceUnit> = self
            .state
            .units
            .iter()
            .filter(|e| e.facility_id == facility_id)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|u| u.id);
        Ok(out)
    }

    async fn list_active_units_by_kind(&self, kind: &str) -> Result<Vec<ResourceUnit>, StoreError> {
        let mut out: Vec<ResourceUnit> = self
            .state
            .units
            .iter()
            .filter(|e| e.active)
            .map(|e| e.value().clone())
            .collect();
        out.retain(|u| self.state.facility_kind_matches(&u.facility_id, kind, true));
        out.sort_by_key(|u| u.id);
        Ok(out)
    }

    async fn get_unit(&self, id: Ulid) -> Result<Option<ResourceUnit>, StoreError> {
        Ok(self.state.units.get(&id).map(|e| e.value().clone()))
    }

    async fn insert_unit(&self, unit: ResourceUnit) -> Result<(), StoreError> {
        self.persist(Event::UnitCreated(unit)).await
    }

    async fn set_unit_active(&self, id: Ulid, active: bool) -> Result<bool, StoreError> {
        if !self.state.units.contains_key(&id) {
            return Ok(false);
        }
        self.persist(Event::UnitActivity { id, active }).await?;
        Ok(true)
    }

    async fn list_occupancy(&self, unit_id: Ulid, window: TimeRange) -> Result<Vec<Booking>, StoreError> {
        let ids = match self.state.ledgers.get(&unit_id) {
            Some(ledger) => ledger.overlapping(&window),
            None => return Ok(Vec::new()),
        };
        Ok(ids
            .iter()
            .filter_map(|id| self.state.bookings.get(id).map(|b| b.value().clone()))
            .filter(Booking::is_active)
            .collect())
    }

    async fn list_blackouts(
        &self,
        facility_id: Ulid,
        unit_id: Ulid,
        window: TimeRange,
    ) -> Result<Vec<Blackout>, StoreError> {
        let mut out: Vec<Blackout> = self
            .state
            .blackouts
            .iter()
            .filter(|e| e.scope.applies_to(facility_id, unit_id) && e.range.overlaps(&window))
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|b| b.range);
        Ok(out)
    }

    async fn insert_booking(&self, booking: Booking) -> Result<Booking, StoreError> {
        self.persist(Event::BookingConfirmed(booking.clone())).await?;
        Ok(booking)
    }

    async fn get_booking(&self, id: Ulid) -> Result<Option<Booking>, StoreError> {
        Ok(self.state.bookings.get(&id).map(|e| e.value().clone()))
    }

    async fn list_bookings_by_user(&self, user_id: &str) -> Result<Vec<Booking>, StoreError> {
        let mut out: Vec<Booking> = self
            .state
            .bookings
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|b| (b.range, b.id));
        Ok(out)
    }

    async fn list_bookings_by_kind(&self, kind: &str, window: TimeRange) -> Result<Vec<Booking>, StoreError> {
        let unit_ids: Vec<Ulid> = self
            .state
            .units
            .iter()
            .filter(|e| self.state.facility_kind_matches(&e.facility_id, kind, false))
            .map(|e| e.id)
            .collect();
        let mut out: Vec<Booking> = self
            .state
            .bookings
            .iter()
            .filter(|e| unit_ids.contains(&e.unit_id) && e.range.overlaps(&window))
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|b| (b.range, b.id));
        Ok(out)
    }

    async fn update_booking_time(&self, id: Ulid, range: TimeRange) -> Result<bool, StoreError> {
        if !self.state.bookings.contains_key(&id) {
            return Ok(false);
        }
        self.persist(Event::BookingRescheduled { id, range }).await?;
        Ok(true)
    }

    async fn cancel_booking(&self, id: Ulid) -> Result<bool, StoreError> {
        if !self.state.bookings.contains_key(&id) {
            return Ok(false);
        }
        self.persist(Event::BookingCancelled { id }).await?;
        Ok(true)
    }

    async fn insert_blackout(&self, blackout: Blackout) -> Result<(), StoreError> {
        self.persist(Event::BlackoutAdded(blackout)).await
    }

    async fn insert_pricing_rule(&self, rule: PricingRule) -> Result<(), StoreError> {
        self.persist(Event::PricingRuleAdded(rule)).await
    }

    async fn list_pricing_rules(&self, facility_kind: &str) -> Result<Vec<PricingRule>, StoreError> {
        let mut out: Vec<PricingRule> = self
            .state
            .pricing_rules
            .iter()
            .filter(|e| e.facility_kind == facility_kind)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|r| (r.day_of_week, r.start_hour, r.id));
        Ok(out)
    }
}
