//! # Caller identity
//!
//! Every user-scoped route takes a [`CurrentUser`], resolved from the
//! `Authorization: Bearer <token>` header issued by sign-in. Requests
//! without a live token never reach the handler.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::Response,
};
use shared::Notification;
use tracing::warn;

use super::notify;
use crate::AppState;

/// The signed-in user behind a request and the token it came with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub uid: String,
    pub token: String,
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            warn!("{} {} without a session token", parts.method, parts.uri.path());
            return Err(notify(
                StatusCode::UNAUTHORIZED,
                state.dismissible(Notification::error("Please sign in")),
            ));
        };

        match state.sessions.resolve(token) {
            Some(uid) => Ok(CurrentUser {
                uid,
                token: token.to_string(),
            }),
            None => {
                warn!("{} {} with an unknown or expired session", parts.method, parts.uri.path());
                Err(notify(
                    StatusCode::UNAUTHORIZED,
                    state.dismissible(Notification::error("Your session has ended. Please sign in again.")),
                ))
            }
        }
    }
}

impl CurrentUser {
    /// Refuse access to data of anybody but the caller
    pub fn require_owner(&self, state: &AppState, owner_id: &str) -> Result<(), Response> {
        if self.uid == owner_id {
            return Ok(());
        }
        warn!("{} tried to access data of {}", self.uid, owner_id);
        Err(notify(
            StatusCode::FORBIDDEN,
            state.dismissible(Notification::error("You can only manage your own account")),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::rest::test_support::{signed_in, test_state};
    use axum::http::Request;

    async fn extract(state: &AppState, authorization: Option<&str>) -> Result<CurrentUser, Response> {
        let mut request = Request::builder().uri("/api/users/x/records");
        if let Some(value) = authorization {
            request = request.header(AUTHORIZATION, value);
        }
        let (mut parts, _) = request.body(()).unwrap().into_parts();
        CurrentUser::from_request_parts(&mut parts, state).await
    }

    #[tokio::test]
    async fn test_bearer_token_resolves_caller() {
        let (_env, state) = test_state().await;
        let (profile, caller) = signed_in(&state, "an@example.com", "An").await;

        let resolved = extract(&state, Some(&format!("Bearer {}", caller.token))).await.unwrap();
        assert_eq!(resolved.uid, profile.id);
        assert_eq!(resolved, caller);
    }

    #[tokio::test]
    async fn test_missing_or_unknown_token_is_unauthorized() {
        let (_env, state) = test_state().await;
        let (_, caller) = signed_in(&state, "an@example.com", "An").await;

        for header in [None, Some("Bearer "), Some("Basic abc"), Some("Bearer nope")] {
            let rejection = extract(&state, header).await.unwrap_err();
            assert_eq!(rejection.status(), StatusCode::UNAUTHORIZED, "{:?}", header);
        }

        state.sessions.revoke(&caller.token);
        let rejection = extract(&state, Some(&format!("Bearer {}", caller.token))).await.unwrap_err();
        assert_eq!(rejection.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_other_owner_is_forbidden() {
        let (_env, state) = test_state().await;
        let (profile, caller) = signed_in(&state, "an@example.com", "An").await;

        assert!(caller.require_owner(&state, &profile.id).is_ok());
        let rejection = caller.require_owner(&state, "someone-else").unwrap_err();
        assert_eq!(rejection.status(), StatusCode::FORBIDDEN);
    }
}
