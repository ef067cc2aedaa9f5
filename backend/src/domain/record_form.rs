//! Record form submission.
//!
//! One form instance per record kind. A form allows at most one create in
//! flight: the "submitting" flag is taken atomically before validation and
//! released by a guard on every exit path.

use shared::{CreateRecordRequest, FinancialRecord, Notification, Period, RecordKind, DEFAULT_DISMISS_MS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

use super::errors::{error_notification, FormError};
use super::record_service::RecordService;
use crate::storage::Connection;

/// Releases the submitting flag when dropped
struct SubmitPermit<'a> {
    flag: &'a AtomicBool,
}

impl<'a> SubmitPermit<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for SubmitPermit<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct RecordForm<C: Connection> {
    kind: RecordKind,
    service: RecordService<C>,
    submitting: Arc<AtomicBool>,
    notification_ttl_ms: u64,
}

impl<C: Connection> RecordForm<C> {
    pub fn new(kind: RecordKind, service: RecordService<C>) -> Self {
        Self {
            kind,
            service,
            submitting: Arc::new(AtomicBool::new(false)),
            notification_ttl_ms: DEFAULT_DISMISS_MS,
        }
    }

    pub fn with_notification_ttl(mut self, millis: u64) -> Self {
        self.notification_ttl_ms = millis;
        self
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::Acquire)
    }

    /// Submit the form. The request kind is forced to the form's kind.
    pub async fn submit(
        &self,
        owner_id: &str,
        active_period: Period,
        mut request: CreateRecordRequest,
    ) -> Result<FinancialRecord, FormError> {
        let Some(_permit) = SubmitPermit::acquire(&self.submitting) else {
            warn!("Ignoring {} submit for {}: one is already in flight", self.kind, owner_id);
            return Err(FormError::SubmissionInFlight);
        };

        request.kind = self.kind;
        let record = self.service.create(owner_id, active_period, &request).await?;
        Ok(record)
    }

    /// User feedback for the outcome of [`RecordForm::submit`]
    pub fn notification(&self, outcome: &Result<FinancialRecord, FormError>) -> Notification {
        let notification = match outcome {
            Ok(_) => Notification::success(match self.kind {
                RecordKind::Expense => "New expense added!",
                RecordKind::Salary => "Salary for this month added!",
            }),
            Err(err) => error_notification(err),
        };
        notification.with_dismiss_after(self.notification_ttl_ms)
    }
}
