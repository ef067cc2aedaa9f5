//! Error taxonomy of the domain layer.
//!
//! Storage internals report `anyhow` errors; services translate them into
//! [`StoreError`] at the gateway. Every error converts into a user-facing
//! [`Notification`] at the boundary and is otherwise dropped: nothing here
//! is retried automatically.

use shared::{Notification, MAX_AMOUNT};
use thiserror::Error;

/// Rejections raised before a record ever reaches storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter a name for the expense")]
    EmptyLabel,
    #[error("Please enter a valid amount greater than 0")]
    InvalidAmount,
    #[error("Amount cannot exceed {}", crate::domain::formatting::format_full(MAX_AMOUNT))]
    AmountTooLarge,
    #[error("The date is not in the selected month")]
    DateOutsidePeriod,
}

/// Failures reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Wrong password")]
    WrongPassword,
    /// The operation needs a recently verified login
    #[error("Please sign in again to continue")]
    StaleSession,
    #[error("This account is waiting for admin approval")]
    NotApproved,
    #[error("An account with this email already exists")]
    EmailInUse,
    #[error("Authentication failed: {0}")]
    Unknown(String),
}

/// Failures of the document store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Could not save changes: {0}")]
    WriteFailed(String),
    #[error("Could not load data: {0}")]
    ReadFailed(String),
}

impl StoreError {
    pub fn write(err: anyhow::Error) -> Self {
        StoreError::WriteFailed(err.to_string())
    }

    pub fn read(err: anyhow::Error) -> Self {
        StoreError::ReadFailed(err.to_string())
    }
}

/// Errors of the record mutation gateway
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors surfaced by a record form
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Already saving, please wait")]
    SubmissionInFlight,
}

impl From<RecordError> for FormError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::Validation(e) => FormError::Validation(e),
            RecordError::Store(e) => FormError::Store(e),
        }
    }
}

/// Errors of the account settings flow
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("The name does not match")]
    NameMismatch,
    #[error("The confirmation does not match the new password")]
    PasswordMismatch,
    #[error("Please fill in both password fields")]
    EmptyPassword,
    #[error("Display name cannot be empty")]
    EmptyDisplayName,
    #[error("Cannot {action} right now")]
    InvalidTransition { action: &'static str },
}

/// Turn any displayable domain error into an error notification
pub fn error_notification(err: &dyn std::error::Error) -> Notification {
    Notification::error(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_too_large_message_names_the_limit() {
        assert_eq!(
            ValidationError::AmountTooLarge.to_string(),
            "Amount cannot exceed 999,999,999,999₫"
        );
    }

    #[test]
    fn test_record_error_flattens_into_form_error() {
        let err: FormError = RecordError::Validation(ValidationError::EmptyLabel).into();
        assert_eq!(err, FormError::Validation(ValidationError::EmptyLabel));
        let notification = error_notification(&err);
        assert!(notification.is_error());
        assert_eq!(notification.message, "Please enter a name for the expense");
    }
}
