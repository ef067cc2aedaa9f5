//! Record service domain logic.
//!
//! The only component that talks to record storage. Creates are validated
//! synchronously before any storage call; storage failures surface as
//! [`StoreError`] and are never retried here.

use shared::{CreateRecordRequest, FinancialRecord, Period};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::errors::{RecordError, StoreError};
use super::validation::RecordValidator;
use crate::storage::{Connection, NewRecord, RecordQuery, RecordStorage, Subscription};

/// Result of a delete; both outcomes count as success for the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

#[derive(Clone)]
pub struct RecordService<C: Connection> {
    record_repository: C::RecordRepository,
    validator: RecordValidator,
}

impl<C: Connection> RecordService<C> {
    pub fn new(connection: Arc<C>) -> Self {
        Self {
            record_repository: connection.create_record_repository(),
            validator: RecordValidator::new(),
        }
    }

    pub fn validator(&self) -> &RecordValidator {
        &self.validator
    }

    /// Validate and persist a new record for `owner_id` in `active_period`
    pub async fn create(
        &self,
        owner_id: &str,
        active_period: Period,
        request: &CreateRecordRequest,
    ) -> Result<FinancialRecord, RecordError> {
        let valid = self.validator.validate(request, active_period).map_err(|e| {
            info!("Rejected {} for {}: {}", request.kind, owner_id, e);
            e
        })?;

        let new_record = NewRecord {
            owner_id: owner_id.to_string(),
            kind: valid.kind,
            label: valid.label,
            amount: valid.amount,
            occurred_on: valid.occurred_on,
            period: valid.period,
        };

        let record = self.record_repository.insert_record(new_record).await.map_err(|e| {
            error!("Failed to store {} for {}: {:#}", request.kind, owner_id, e);
            StoreError::write(e)
        })?;

        info!("Created {} {} ({}) in {}", record.kind, record.id, record.amount, active_period);
        Ok(record)
    }

    /// Delete a record. Deleting an id that is already gone is not an error.
    pub async fn delete(&self, record_id: &str) -> Result<DeleteOutcome, StoreError> {
        let deleted = self.record_repository.delete_record(record_id).await.map_err(|e| {
            error!("Failed to delete record {}: {:#}", record_id, e);
            StoreError::write(e)
        })?;

        if deleted {
            info!("Deleted record {}", record_id);
            Ok(DeleteOutcome::Deleted)
        } else {
            warn!("Record {} was already deleted", record_id);
            Ok(DeleteOutcome::NotFound)
        }
    }

    pub async fn set_pinned(&self, record_id: &str, pinned: bool) -> Result<(), StoreError> {
        let found = self
            .record_repository
            .set_pinned(record_id, pinned)
            .await
            .map_err(|e| {
                error!("Failed to update pin of {}: {:#}", record_id, e);
                StoreError::write(e)
            })?;

        if !found {
            return Err(StoreError::WriteFailed(format!("record {} no longer exists", record_id)));
        }
        info!("Record {} pinned = {}", record_id, pinned);
        Ok(())
    }

    /// Start a live query. `on_change` fires with the current snapshot right
    /// away and again whenever the matching set changes, until the returned
    /// subscription is dropped or unsubscribed.
    pub async fn subscribe<F>(&self, query: RecordQuery, on_change: F) -> Result<Subscription, StoreError>
    where
        F: Fn(Vec<FinancialRecord>) + Send + Sync + 'static,
    {
        self.record_repository
            .watch(query.clone(), Box::new(on_change))
            .await
            .map_err(|e| {
                error!("Failed to subscribe to {:?}: {:#}", query, e);
                StoreError::read(e)
            })
    }

    pub async fn find(&self, record_id: &str) -> Result<Option<FinancialRecord>, StoreError> {
        self.record_repository.get_record(record_id).await.map_err(|e| {
            error!("Failed to load record {}: {:#}", record_id, e);
            StoreError::read(e)
        })
    }

    /// One-shot snapshot of a query, newest `created_at` first
    pub async fn list(&self, query: &RecordQuery) -> Result<Vec<FinancialRecord>, StoreError> {
        self.record_repository.query_records(query).await.map_err(|e| {
            error!("Failed to load records for {:?}: {:#}", query, e);
            StoreError::read(e)
        })
    }

    /// Delete every record of `owner_id` filed under `period`
    pub async fn delete_period(&self, owner_id: &str, period: Period) -> Result<usize, StoreError> {
        let deleted = self
            .record_repository
            .delete_records(&RecordQuery::period(owner_id, period))
            .await
            .map_err(|e| {
                error!("Failed to clear {} for {}: {:#}", period, owner_id, e);
                StoreError::write(e)
            })?;
        info!("Cleared {} records of {} for {}", deleted, period, owner_id);
        Ok(deleted)
    }
}
