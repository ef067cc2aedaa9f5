//! # REST API for Authentication
//!
//! Sign-up, sign-in and sign-out. Passwords are moved straight into the
//! auth service and never logged. Sign-in hands out the bearer token every
//! user-scoped route expects.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use shared::{Notification, SessionResponse, SignInRequest, SignUpRequest};
use tracing::{info, warn};

use super::{account_error_status, notify, CurrentUser};
use crate::domain::errors::error_notification;
use crate::AppState;

pub async fn sign_up(State(state): State<AppState>, Json(request): Json<SignUpRequest>) -> impl IntoResponse {
    info!("POST /api/auth/signup - {}", request.email);
    let SignUpRequest { email, password, display_name } = request;

    match state.auth_service.sign_up(&email, password, &display_name).await {
        Ok(profile) => {
            let message = if profile.approved {
                "Account created! You can sign in now."
            } else {
                "Account created! An admin has to approve it before you can sign in."
            };
            let response = SessionResponse {
                profile: Some(profile),
                token: None,
                notification: state.dismissible(Notification::success(message)),
            };
            (StatusCode::CREATED, Json(response)).into_response()
        }
        Err(e) => {
            warn!("Sign-up of {} failed: {}", email, e);
            notify(account_error_status(&e), state.dismissible(error_notification(&e)))
        }
    }
}

pub async fn sign_in(State(state): State<AppState>, Json(request): Json<SignInRequest>) -> impl IntoResponse {
    info!("POST /api/auth/signin - {}", request.email);
    let SignInRequest { email, password } = request;

    match state.auth_service.sign_in(&email, password).await {
        Ok(profile) => {
            let token = state.sessions.issue(&profile.id);
            state.app_context.lock().await.set_current_user(Some(profile.clone()));
            let response = SessionResponse {
                notification: state.dismissible(Notification::success(format!("Welcome, {}!", profile.display_name))),
                profile: Some(profile),
                token: Some(token),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            warn!("Sign-in of {} failed: {}", email, e);
            notify(account_error_status(&e), state.dismissible(error_notification(&e)))
        }
    }
}

/// End the caller's session and close its record feed. Once the last
/// session of the user is gone the identity is signed out too and any open
/// account settings flow is forgotten.
pub async fn sign_out(State(state): State<AppState>, caller: CurrentUser) -> impl IntoResponse {
    info!("POST /api/auth/signout - {}", caller.uid);

    state.sessions.revoke(&caller.token);
    state.feeds.close_session(&caller.token).await;
    if state.sessions.has_sessions(&caller.uid) {
        return (StatusCode::OK, Json(state.dismissible(Notification::success("Signed out")))).into_response();
    }

    if let Err(e) = state.auth_service.sign_out(&caller.uid).await {
        warn!("Sign-out of {} failed: {}", caller.uid, e);
        return notify(account_error_status(&e), state.dismissible(error_notification(&e)));
    }
    state.remove_account_flow(&caller.uid);
    state.app_context.lock().await.sign_out(&caller.uid);

    (StatusCode::OK, Json(state.dismissible(Notification::success("Signed out")))).into_response()
}
