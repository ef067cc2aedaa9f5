//! # REST API for Records
//!
//! Listing, creating and deleting the records of one period, plus
//! single-record delete and pin toggling. Callers only ever touch their own
//! records; successful mutations are pushed into the caller's open feeds
//! right away.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use shared::{
    CreateRecordRequest, CreateRecordResponse, DeletePeriodResponse, DeleteRecordResponse, FinancialRecord,
    Notification, Period, RecordListResponse, SetPinnedRequest, SortMode,
};
use tracing::{error, info, warn};

use super::{form_error_status, notify, store_error_status, CurrentUser};
use crate::domain::errors::error_notification;
use crate::domain::{aggregation, sorting, DeleteOutcome, FeedEvent};
use crate::storage::RecordQuery;
use crate::AppState;

/// Query parameters selecting a period. `month` is zero based; both
/// default to the current period.
#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    pub month: Option<u32>,
    pub year: Option<i32>,
    #[serde(default)]
    pub sort: SortMode,
}

impl PeriodQuery {
    pub(crate) fn period(&self) -> Option<Period> {
        let current = Period::current();
        Period::new(self.month.unwrap_or(current.month), self.year.unwrap_or(current.year))
    }
}

pub(crate) fn invalid_period(state: &AppState, query: &PeriodQuery) -> Response {
    warn!("Rejecting invalid period {:?}", query);
    notify(
        StatusCode::BAD_REQUEST,
        state.dismissible(Notification::error("Please pick a valid month")),
    )
}

/// Sorted list, pinned records and month summary of one period
pub(crate) fn list_response(period: Period, sort: SortMode, records: &[FinancialRecord]) -> RecordListResponse {
    RecordListResponse {
        period,
        sort,
        pinned: sorting::pinned(records),
        summary: aggregation::month_summary(records, period),
        records: sorting::sort_records(records, sort),
    }
}

/// Look up a record and make sure it belongs to the caller. A record that
/// no longer exists is `Ok(None)`.
async fn owned_record(
    state: &AppState,
    caller: &CurrentUser,
    record_id: &str,
) -> Result<Option<FinancialRecord>, Response> {
    match state.record_service.find(record_id).await {
        Ok(Some(record)) => {
            caller.require_owner(state, &record.owner_id)?;
            Ok(Some(record))
        }
        Ok(None) => Ok(None),
        Err(e) => Err(notify(store_error_status(&e), state.dismissible(error_notification(&e)))),
    }
}

/// Records of one period in the requested order, with pinned records and
/// the month summary
pub async fn list_records(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(owner_id): Path<String>,
    Query(query): Query<PeriodQuery>,
) -> impl IntoResponse {
    info!("GET /api/users/{}/records - query: {:?}", owner_id, query);
    if let Err(rejection) = caller.require_owner(&state, &owner_id) {
        return rejection;
    }
    let Some(period) = query.period() else {
        return invalid_period(&state, &query);
    };

    match state.record_service.list(&RecordQuery::period(owner_id.as_str(), period)).await {
        Ok(records) => (StatusCode::OK, Json(list_response(period, query.sort, &records))).into_response(),
        Err(e) => {
            error!("Failed to list records of {}: {}", owner_id, e);
            notify(store_error_status(&e), state.dismissible(error_notification(&e)))
        }
    }
}

/// Create a record through the owner's form for its kind
pub async fn create_record(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(owner_id): Path<String>,
    Query(query): Query<PeriodQuery>,
    Json(request): Json<CreateRecordRequest>,
) -> impl IntoResponse {
    info!("POST /api/users/{}/records - {} {:?}", owner_id, request.kind, request.label);
    if let Err(rejection) = caller.require_owner(&state, &owner_id) {
        return rejection;
    }
    let Some(period) = query.period() else {
        return invalid_period(&state, &query);
    };

    let form = state.record_form(&owner_id, request.kind);
    let outcome = form.submit(&owner_id, period, request).await;
    let notification = form.notification(&outcome);

    match outcome {
        Ok(record) => {
            state.feeds.apply_to_owner(&owner_id, FeedEvent::Created(record.clone())).await;
            (StatusCode::CREATED, Json(CreateRecordResponse { record, notification })).into_response()
        }
        Err(e) => notify(form_error_status(&e), notification),
    }
}

/// Delete every record of the owner in one period
pub async fn delete_period_records(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(owner_id): Path<String>,
    Query(query): Query<PeriodQuery>,
) -> impl IntoResponse {
    info!("DELETE /api/users/{}/records - query: {:?}", owner_id, query);
    if let Err(rejection) = caller.require_owner(&state, &owner_id) {
        return rejection;
    }
    let Some(period) = query.period() else {
        return invalid_period(&state, &query);
    };

    match state.record_service.delete_period(&owner_id, period).await {
        Ok(deleted_count) => {
            let response = DeletePeriodResponse {
                deleted_count,
                notification: state.dismissible(Notification::success(format!(
                    "Deleted {} records of {}",
                    deleted_count, period
                ))),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => notify(store_error_status(&e), state.dismissible(error_notification(&e))),
    }
}

/// Delete one of the caller's records. An id that is already gone still
/// answers 200.
pub async fn delete_record(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(record_id): Path<String>,
) -> impl IntoResponse {
    info!("DELETE /api/records/{} - by {}", record_id, caller.uid);
    if let Err(rejection) = owned_record(&state, &caller, &record_id).await {
        return rejection;
    }

    match state.record_service.delete(&record_id).await {
        Ok(outcome) => {
            if outcome == DeleteOutcome::Deleted {
                state.feeds.apply_to_owner(&caller.uid, FeedEvent::Removed(record_id.clone())).await;
            }
            let response = DeleteRecordResponse {
                deleted: outcome == DeleteOutcome::Deleted,
                notification: state.dismissible(Notification::success("Deleted")),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => notify(store_error_status(&e), state.dismissible(error_notification(&e))),
    }
}

pub async fn set_record_pinned(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(record_id): Path<String>,
    Json(request): Json<SetPinnedRequest>,
) -> impl IntoResponse {
    info!("PUT /api/records/{}/pin - pinned: {} by {}", record_id, request.pinned, caller.uid);
    if let Err(rejection) = owned_record(&state, &caller, &record_id).await {
        return rejection;
    }

    match state.record_service.set_pinned(&record_id, request.pinned).await {
        Ok(()) => {
            let event = FeedEvent::PinChanged {
                id: record_id.clone(),
                pinned: request.pinned,
            };
            state.feeds.apply_to_owner(&caller.uid, event).await;
            let message = if request.pinned { "Pinned" } else { "Unpinned" };
            (StatusCode::OK, Json(state.dismissible(Notification::success(message)))).into_response()
        }
        Err(e) => notify(store_error_status(&e), state.dismissible(error_notification(&e))),
    }
}
