//! # REST API for Preferences

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use shared::ThemeResponse;
use tracing::{info, warn};

use super::{notify, store_error_status};
use crate::domain::errors::error_notification;
use crate::AppState;

pub async fn get_theme(State(state): State<AppState>) -> impl IntoResponse {
    let theme = state.app_context.lock().await.theme();
    (StatusCode::OK, Json(ThemeResponse { theme }))
}

/// Flip between light and dark and persist the choice
pub async fn toggle_theme(State(state): State<AppState>) -> impl IntoResponse {
    info!("POST /api/preferences/theme/toggle");
    let mut context = state.app_context.lock().await;
    match context.toggle_theme().await {
        Ok(theme) => (StatusCode::OK, Json(ThemeResponse { theme })).into_response(),
        Err(e) => {
            warn!("Theme switched to {:?} but not saved: {}", context.theme(), e);
            notify(store_error_status(&e), state.dismissible(error_notification(&e)))
        }
    }
}
