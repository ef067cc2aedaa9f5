//! # REST API Interface Layer
//!
//! axum handlers, one file per resource. Every failure response carries a
//! JSON [`Notification`] so the client can show it as-is. User-scoped
//! routes identify the caller through [`CurrentUser`].

pub mod account_apis;
pub mod auth_apis;
pub mod chart_apis;
pub mod feed_apis;
pub mod preference_apis;
pub mod record_apis;
pub mod session;

pub use account_apis::*;
pub use auth_apis::*;
pub use chart_apis::*;
pub use feed_apis::*;
pub use preference_apis::*;
pub use record_apis::*;
pub use session::CurrentUser;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use shared::Notification;

use crate::domain::{AccountError, AuthError, FormError, StoreError};

/// Error response with a notification body
pub(crate) fn notify(status: StatusCode, notification: Notification) -> Response {
    (status, Json(notification)).into_response()
}

pub(crate) fn store_error_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::WriteFailed(_) | StoreError::ReadFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn form_error_status(err: &FormError) -> StatusCode {
    match err {
        FormError::Validation(_) => StatusCode::BAD_REQUEST,
        FormError::SubmissionInFlight => StatusCode::CONFLICT,
        FormError::Store(e) => store_error_status(e),
    }
}

pub(crate) fn account_error_status(err: &AccountError) -> StatusCode {
    match err {
        AccountError::Auth(AuthError::WrongPassword) => StatusCode::UNAUTHORIZED,
        AccountError::Auth(AuthError::StaleSession) => StatusCode::UNAUTHORIZED,
        AccountError::Auth(AuthError::NotApproved) => StatusCode::FORBIDDEN,
        AccountError::Auth(AuthError::EmailInUse) => StatusCode::CONFLICT,
        AccountError::Auth(AuthError::Unknown(_)) => StatusCode::BAD_REQUEST,
        AccountError::Store(e) => store_error_status(e),
        AccountError::InvalidTransition { .. } => StatusCode::CONFLICT,
        AccountError::NameMismatch
        | AccountError::PasswordMismatch
        | AccountError::EmptyPassword
        | AccountError::EmptyDisplayName => StatusCode::BAD_REQUEST,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ValidationError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            form_error_status(&FormError::Validation(ValidationError::EmptyLabel)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(form_error_status(&FormError::SubmissionInFlight), StatusCode::CONFLICT);
        assert_eq!(
            account_error_status(&AccountError::Auth(AuthError::NotApproved)),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            account_error_status(&AccountError::Store(StoreError::WriteFailed("disk".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
