//! # REST API for the Yearly Chart

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{Datelike, Local};
use serde::Deserialize;
use shared::YearChart;
use tracing::{error, info};

use super::{notify, store_error_status, CurrentUser};
use crate::domain::aggregation;
use crate::domain::errors::error_notification;
use crate::storage::RecordQuery;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ChartQuery {
    pub year: Option<i32>,
}

/// Twelve monthly points plus year totals. Defaults to the current year.
pub async fn get_year_chart(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(owner_id): Path<String>,
    Query(query): Query<ChartQuery>,
) -> impl IntoResponse {
    let year = query.year.unwrap_or_else(|| Local::now().year());
    info!("GET /api/users/{}/chart - year {}", owner_id, year);
    if let Err(rejection) = caller.require_owner(&state, &owner_id) {
        return rejection;
    }

    match state.record_service.list(&RecordQuery::year(owner_id.as_str(), year)).await {
        Ok(records) => {
            let chart = YearChart {
                year,
                months: aggregation::monthly_series(&records, year),
                totals: aggregation::year_totals(&records, year),
            };
            (StatusCode::OK, Json(chart)).into_response()
        }
        Err(e) => {
            error!("Failed to build chart of {} for {}: {}", owner_id, year, e);
            notify(store_error_status(&e), state.dismissible(error_notification(&e)))
        }
    }
}
