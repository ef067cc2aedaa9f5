//! # Domain Module
//!
//! Business logic of the expense tracker, independent of HTTP and of the
//! storage backend.
//!
//! ## Module Organization
//!
//! - **record_service**: the gateway for every record mutation and live query
//! - **record_feed**: in-memory list of the selected period, merging pushed
//!   snapshots with optimistic local changes
//! - **record_form**: expense and salary forms with the one-in-flight guard
//! - **validation**: amount parsing and form validation
//! - **aggregation** / **sorting**: pure computations over record lists
//! - **formatting**: VND amount rendering
//! - **avatar**: avatar glyph table and colour normalisation
//! - **auth_service**: sign-up, sign-in and the approval gate
//! - **account_flow**: account settings state machine
//! - **app_context**: theme preference and the signed-in user
//! - **errors**: the error taxonomy shared by all of the above
//!
//! ## Business Rules
//!
//! - Amounts are whole VND, strictly positive and at most `MAX_AMOUNT`
//! - A record is filed under the period selected when it was created
//! - Expenses need a label; salaries may leave it empty
//! - Validation errors never reach storage
//! - Only approved profiles may sign in

pub mod account_flow;
pub mod aggregation;
pub mod app_context;
pub mod auth_service;
pub mod avatar;
pub mod errors;
pub mod formatting;
pub mod record_feed;
pub mod record_form;
pub mod record_service;
pub mod sorting;
pub mod validation;

pub use account_flow::{AccountFlow, AccountState, DeletionOutcome};
pub use app_context::AppContext;
pub use auth_service::AuthService;
pub use errors::{AccountError, AuthError, FormError, RecordError, StoreError, ValidationError};
pub use record_feed::{FeedEvent, RecordFeed};
pub use record_form::RecordForm;
pub use record_service::{DeleteOutcome, RecordService};
pub use validation::RecordValidator;
