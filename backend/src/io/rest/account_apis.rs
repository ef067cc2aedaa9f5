//! # REST API for Account Settings
//!
//! Each user gets one [`AccountFlow`](crate::domain::AccountFlow), created
//! from the stored profile on the first intent and kept until sign-out or
//! account deletion. The flow map is only locked to look a flow up; the
//! intent itself runs under the user's own flow lock.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use shared::{AccountIntent, AccountStage, Notification};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{notify, store_error_status, CurrentUser};
use crate::domain::errors::error_notification;
use crate::domain::AccountFlow;
use crate::AppState;

pub async fn handle_account_intent(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(owner_id): Path<String>,
    Json(intent): Json<AccountIntent>,
) -> impl IntoResponse {
    info!("POST /api/users/{}/account - {}", owner_id, intent.name());
    if let Err(rejection) = caller.require_owner(&state, &owner_id) {
        return rejection;
    }

    let flow = match state.account_flow(&caller.uid) {
        Some(flow) => flow,
        None => match state.auth_service.profile(&caller.uid).await {
            Ok(Some(profile)) => state.insert_account_flow(
                &caller.uid,
                AccountFlow::new(state.connection.as_ref(), Arc::clone(&state.identity), profile),
            ),
            Ok(None) => {
                warn!("No profile for {}", caller.uid);
                return notify(
                    StatusCode::NOT_FOUND,
                    state.dismissible(Notification::error("Account not found")),
                );
            }
            Err(e) => {
                error!("Failed to load profile {}: {}", caller.uid, e);
                return notify(store_error_status(&e), state.dismissible(error_notification(&e)));
            }
        },
    };

    let mut response = flow.lock().await.handle(intent).await;
    response.notification = response.notification.map(|n| state.dismissible(n));

    if response.stage == AccountStage::Deleted {
        state.remove_account_flow(&caller.uid);
        state.sessions.revoke_user(&caller.uid);
        state.feeds.close_owner(&caller.uid).await;
        state.app_context.lock().await.sign_out(&caller.uid);
    } else if let Some(profile) = &response.profile {
        let mut context = state.app_context.lock().await;
        if context.current_user().is_some_and(|user| user.id == profile.id) {
            context.set_current_user(Some(profile.clone()));
        }
    }

    (StatusCode::OK, Json(response)).into_response()
}
