//! # Record feed
//!
//! The in-memory record list of the selected period. Two sources change it:
//!
//! - push snapshots from the live query, which replace the list, and
//! - optimistic local events (create, delete, pin) applied right after the
//!   corresponding mutation succeeds.
//!
//! Both go through one reducer, [`apply_event`], which keys records by id so
//! a record seen through both sources appears exactly once whatever order
//! they arrive in.
//!
//! The feed owns exactly one live subscription. Switching periods drops the
//! old subscription before opening the new one, and every subscription
//! captures a generation number so late callbacks from an older one are
//! ignored.
//!
//! Every change of the visible list bumps a [`watch`] counter so a reader
//! (the SSE endpoint) knows when to render the feed again.

use shared::{FinancialRecord, MonthSummary, Period, SortMode};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info};

use super::aggregation;
use super::errors::StoreError;
use super::record_service::RecordService;
use super::sorting;
use crate::storage::{Connection, RecordQuery, Subscription};

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Authoritative list from the live query
    Snapshot(Vec<FinancialRecord>),
    /// A record this client just created
    Created(FinancialRecord),
    /// A record this client just deleted
    Removed(String),
    PinChanged { id: String, pinned: bool },
}

/// Apply one event to a record list
pub fn apply_event(records: &mut Vec<FinancialRecord>, event: FeedEvent) {
    match event {
        FeedEvent::Snapshot(snapshot) => *records = dedup_by_id(snapshot),
        FeedEvent::Created(record) => match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.insert(0, record),
        },
        FeedEvent::Removed(id) => records.retain(|r| r.id != id),
        FeedEvent::PinChanged { id, pinned } => {
            if let Some(record) = records.iter_mut().find(|r| r.id == id) {
                record.pinned = pinned;
            }
        }
    }
}

/// Keep the first position of every id with the content of its last copy
fn dedup_by_id(records: Vec<FinancialRecord>) -> Vec<FinancialRecord> {
    let mut unique: Vec<FinancialRecord> = Vec::with_capacity(records.len());
    for record in records {
        match unique.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => unique.push(record),
        }
    }
    unique
}

#[derive(Debug)]
struct FeedState {
    generation: u64,
    period: Period,
    records: Vec<FinancialRecord>,
}

fn lock(state: &Mutex<FeedState>) -> MutexGuard<'_, FeedState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Apply a pushed snapshot unless it belongs to an older subscription
fn deliver_snapshot(state: &Mutex<FeedState>, generation: u64, records: Vec<FinancialRecord>) -> bool {
    let mut state = lock(state);
    if state.generation != generation {
        debug!("Ignoring snapshot of generation {} (current {})", generation, state.generation);
        return false;
    }
    apply_event(&mut state.records, FeedEvent::Snapshot(records));
    true
}

pub struct RecordFeed<C: Connection> {
    service: RecordService<C>,
    owner_id: String,
    state: Arc<Mutex<FeedState>>,
    subscription: Option<Subscription>,
    changes: Arc<watch::Sender<u64>>,
}

fn bump(changes: &watch::Sender<u64>) {
    changes.send_modify(|version| *version = version.wrapping_add(1));
}

impl<C: Connection> RecordFeed<C> {
    /// Open a feed for `owner_id` on `period`
    pub async fn open(service: RecordService<C>, owner_id: impl Into<String>, period: Period) -> Result<Self, StoreError> {
        let mut feed = Self {
            service,
            owner_id: owner_id.into(),
            state: Arc::new(Mutex::new(FeedState {
                generation: 0,
                period,
                records: Vec::new(),
            })),
            subscription: None,
            changes: Arc::new(watch::channel(0).0),
        };
        feed.select_period(period).await?;
        Ok(feed)
    }

    /// Switch to another period. The old subscription is gone before the
    /// new one is established.
    pub async fn select_period(&mut self, period: Period) -> Result<(), StoreError> {
        if let Some(old) = self.subscription.take() {
            old.unsubscribe();
        }

        let generation = {
            let mut state = lock(&self.state);
            state.generation += 1;
            state.period = period;
            state.records.clear();
            state.generation
        };
        bump(&self.changes);

        let state = Arc::clone(&self.state);
        let changes = Arc::clone(&self.changes);
        let subscription = self
            .service
            .subscribe(RecordQuery::period(self.owner_id.clone(), period), move |records| {
                if deliver_snapshot(&state, generation, records) {
                    bump(&changes);
                }
            })
            .await?;

        info!("Feed of {} now follows {} (generation {})", self.owner_id, period, generation);
        self.subscription = Some(subscription);
        Ok(())
    }

    /// Apply an optimistic local event. Created records of another period
    /// are ignored.
    pub fn apply(&self, event: FeedEvent) {
        {
            let mut state = lock(&self.state);
            if let FeedEvent::Created(record) = &event {
                if record.period() != state.period || record.owner_id != self.owner_id {
                    return;
                }
            }
            apply_event(&mut state.records, event);
        }
        bump(&self.changes);
    }

    /// Tear down the live subscription
    pub fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
            info!("Feed of {} closed", self.owner_id);
            bump(&self.changes);
        }
    }

    /// Receiver that is marked changed whenever the visible list changes or
    /// the feed is closed
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    pub fn is_live(&self) -> bool {
        self.subscription.as_ref().is_some_and(Subscription::is_active)
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn period(&self) -> Period {
        lock(&self.state).period
    }

    /// Records in live-query order (newest `created_at` first)
    pub fn records(&self) -> Vec<FinancialRecord> {
        lock(&self.state).records.clone()
    }

    pub fn sorted(&self, mode: SortMode) -> Vec<FinancialRecord> {
        sorting::sort_records(&lock(&self.state).records, mode)
    }

    pub fn pinned(&self) -> Vec<FinancialRecord> {
        sorting::pinned(&lock(&self.state).records)
    }

    pub fn summary(&self) -> MonthSummary {
        let state = lock(&self.state);
        aggregation::month_summary(&state.records, state.period)
    }
}
