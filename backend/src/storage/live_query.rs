//! # Live queries
//!
//! Registry of record listeners shared by every repository of one
//! connection. After each committed write the repository hands the full
//! record set to [`ListenerRegistry::notify`]; each listener whose matching
//! set changed receives the new set, ordered by `created_at` descending.
//!
//! Callbacks run outside the registry lock, so a callback may drop its own
//! or another [`Subscription`] without deadlocking.

use shared::FinancialRecord;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::debug;

use super::traits::{RecordListener, RecordQuery};

type SharedListener = Arc<dyn Fn(Vec<FinancialRecord>) + Send + Sync>;

struct Listener {
    query: RecordQuery,
    callback: SharedListener,
    last_delivered: Vec<FinancialRecord>,
}

#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<u64, Listener>>,
}

impl ListenerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a listener and deliver `all_records` filtered by `query` as
    /// its first snapshot
    pub fn register(
        self: &Arc<Self>,
        query: RecordQuery,
        listener: RecordListener,
        all_records: &[FinancialRecord],
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let snapshot = matching(&query, all_records);
        let callback: SharedListener = Arc::from(listener);

        self.lock().insert(
            id,
            Listener {
                query: query.clone(),
                callback: Arc::clone(&callback),
                last_delivered: snapshot.clone(),
            },
        );
        debug!("Listener {} registered for {:?}, {} records", id, query, snapshot.len());
        callback(snapshot);

        Subscription {
            id,
            registry: Arc::downgrade(self),
            active: true,
        }
    }

    /// Deliver fresh snapshots to every listener whose matching set changed
    pub fn notify(&self, all_records: &[FinancialRecord]) {
        let mut deliveries: Vec<(u64, SharedListener, Vec<FinancialRecord>)> = Vec::new();
        {
            let mut listeners = self.lock();
            for (id, listener) in listeners.iter_mut() {
                let snapshot = matching(&listener.query, all_records);
                if snapshot != listener.last_delivered {
                    listener.last_delivered = snapshot.clone();
                    deliveries.push((*id, Arc::clone(&listener.callback), snapshot));
                }
            }
        }

        for (id, callback, snapshot) in deliveries {
            debug!("Delivering {} records to listener {}", snapshot.len(), id);
            callback(snapshot);
        }
    }

    pub fn active_listener_count(&self) -> usize {
        self.lock().len()
    }

    fn remove(&self, id: u64) {
        if self.lock().remove(&id).is_some() {
            debug!("Listener {} unsubscribed", id);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Listener>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Records matching `query`, newest `created_at` first
fn matching(query: &RecordQuery, all_records: &[FinancialRecord]) -> Vec<FinancialRecord> {
    let mut records: Vec<FinancialRecord> = all_records.iter().filter(|r| query.matches(r)).cloned().collect();
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    records
}

/// Handle of a registered live query. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    registry: Weak<ListenerRegistry>,
    active: bool,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active && self.registry.strong_count() > 0
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use shared::{Period, RecordKind};

    fn record(id: &str, owner: &str, month: u32, secs: u32) -> FinancialRecord {
        FinancialRecord {
            id: id.to_string(),
            owner_id: owner.to_string(),
            kind: RecordKind::Expense,
            label: "Lunch".to_string(),
            amount: 50_000,
            occurred_on: NaiveDate::from_ymd_opt(2024, month + 1, 3).unwrap(),
            month,
            year: 2024,
            pinned: false,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, secs).unwrap(),
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<Vec<String>>>>, RecordListener) {
        let calls: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let listener: RecordListener = Box::new(move |records: Vec<FinancialRecord>| {
            sink.lock().unwrap().push(records.into_iter().map(|r| r.id).collect());
        });
        (calls, listener)
    }

    #[test]
    fn test_register_delivers_initial_snapshot_newest_first() {
        let registry = ListenerRegistry::new();
        let all = vec![record("a", "u1", 5, 1), record("b", "u1", 5, 2), record("c", "u2", 5, 3)];
        let (calls, listener) = recorder();

        let _sub = registry.register(RecordQuery::period("u1", Period::new(5, 2024).unwrap()), listener, &all);

        assert_eq!(*calls.lock().unwrap(), vec![vec!["b".to_string(), "a".to_string()]]);
        assert_eq!(registry.active_listener_count(), 1);
    }

    #[test]
    fn test_notify_only_when_matching_set_changes() {
        let registry = ListenerRegistry::new();
        let mut all = vec![record("a", "u1", 5, 1)];
        let (calls, listener) = recorder();
        let _sub = registry.register(RecordQuery::period("u1", Period::new(5, 2024).unwrap()), listener, &all);

        // Write in another month: no delivery
        all.push(record("b", "u1", 6, 2));
        registry.notify(&all);
        assert_eq!(calls.lock().unwrap().len(), 1);

        all.push(record("c", "u1", 5, 3));
        registry.notify(&all);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1], vec!["c".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_drop_and_unsubscribe_remove_listener() {
        let registry = ListenerRegistry::new();
        let (_, first) = recorder();
        let (calls, second) = recorder();
        let query = RecordQuery::year("u1", 2024);

        let sub = registry.register(query.clone(), first, &[]);
        let other = registry.register(query, second, &[]);
        assert_eq!(registry.active_listener_count(), 2);

        drop(sub);
        assert_eq!(registry.active_listener_count(), 1);
        other.unsubscribe();
        assert_eq!(registry.active_listener_count(), 0);

        registry.notify(&[record("a", "u1", 0, 1)]);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_callback_may_unsubscribe_itself() {
        let registry = ListenerRegistry::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let slot_in_callback = Arc::clone(&slot);
        let listener: RecordListener = Box::new(move |records: Vec<FinancialRecord>| {
            if !records.is_empty() {
                slot_in_callback.lock().unwrap().take();
            }
        });

        let sub = registry.register(RecordQuery::year("u1", 2024), listener, &[]);
        *slot.lock().unwrap() = Some(sub);

        registry.notify(&[record("a", "u1", 0, 1)]);
        assert_eq!(registry.active_listener_count(), 0);
    }
}
