//! # Storage Traits
//!
//! This module defines the storage abstraction traits that allow different
//! storage backends to be used interchangeably in the domain layer.
//!
//! Record, profile and preference repositories report `anyhow` errors; the
//! domain services translate them into `StoreError`. The identity provider
//! speaks `AuthError` directly because its failures (wrong password, stale
//! session) drive the account flow.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::{FinancialRecord, Period, ProfileUpdate, RecordKind, ThemePreference, UserProfile};

use super::live_query::Subscription;
use crate::domain::errors::AuthError;

/// Callback receiving the full matching record set of a live query
pub type RecordListener = Box<dyn Fn(Vec<FinancialRecord>) + Send + Sync>;

/// Filter of a record query: one owner, one year and optionally one month
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordQuery {
    pub owner_id: String,
    pub year: i32,
    pub month: Option<u32>,
}

impl RecordQuery {
    /// Records of a single filing period
    pub fn period(owner_id: impl Into<String>, period: Period) -> Self {
        Self {
            owner_id: owner_id.into(),
            year: period.year,
            month: Some(period.month),
        }
    }

    /// Records of a whole year (chart)
    pub fn year(owner_id: impl Into<String>, year: i32) -> Self {
        Self {
            owner_id: owner_id.into(),
            year,
            month: None,
        }
    }

    pub fn matches(&self, record: &FinancialRecord) -> bool {
        record.owner_id == self.owner_id
            && record.year == self.year
            && self.month.map_or(true, |month| record.month == month)
    }
}

/// A record before the store assigned its id and creation time
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub owner_id: String,
    pub kind: RecordKind,
    pub label: String,
    pub amount: u64,
    pub occurred_on: NaiveDate,
    pub period: Period,
}

/// Persisted application preferences
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub theme: ThemePreference,
}

/// Trait defining the interface for record storage operations
#[async_trait]
pub trait RecordStorage: Send + Sync {
    /// Store a new record, assigning id and `created_at`
    async fn insert_record(&self, record: NewRecord) -> Result<FinancialRecord>;

    /// Retrieve a specific record by ID
    async fn get_record(&self, record_id: &str) -> Result<Option<FinancialRecord>>;

    /// Records matching the query, ordered by `created_at` descending
    async fn query_records(&self, query: &RecordQuery) -> Result<Vec<FinancialRecord>>;

    /// Delete a single record
    /// Returns true if the record was found and deleted, false otherwise
    async fn delete_record(&self, record_id: &str) -> Result<bool>;

    /// Delete every record matching the query
    /// Returns the number of records actually deleted
    async fn delete_records(&self, query: &RecordQuery) -> Result<usize>;

    /// Update the pinned flag of a record
    /// Returns false if the record does not exist
    async fn set_pinned(&self, record_id: &str, pinned: bool) -> Result<bool>;

    /// Register a live query. The listener is called once with the current
    /// snapshot and again after every write that changes the matching set.
    async fn watch(&self, query: RecordQuery, listener: RecordListener) -> Result<Subscription>;
}

/// Trait defining the interface for profile document operations
#[async_trait]
pub trait ProfileStorage: Send + Sync {
    async fn create_profile(&self, profile: &UserProfile) -> Result<()>;

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>>;

    /// Apply the fields that are set in `update`
    /// Returns false if the profile does not exist
    async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<bool>;

    async fn delete_profile(&self, user_id: &str) -> Result<bool>;
}

/// Trait defining the interface for preference storage operations
#[async_trait]
pub trait PreferenceStorage: Send + Sync {
    /// Load preferences, defaults when nothing was saved yet
    async fn load_preferences(&self) -> Result<Preferences>;

    async fn save_preferences(&self, preferences: &Preferences) -> Result<()>;
}

/// Connection trait that acts as a factory for the repositories of one
/// storage backend
pub trait Connection: Send + Sync + Clone + 'static {
    type RecordRepository: RecordStorage + Clone + 'static;
    type ProfileRepository: ProfileStorage + Clone + 'static;
    type PreferenceRepository: PreferenceStorage + Clone + 'static;

    fn create_record_repository(&self) -> Self::RecordRepository;

    fn create_profile_repository(&self) -> Self::ProfileRepository;

    fn create_preference_repository(&self) -> Self::PreferenceRepository;
}

/// Signed-in identity as reported by the identity provider
#[derive(Debug, Clone, PartialEq)]
pub struct AuthIdentity {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

/// Trait defining the interface of the identity provider.
///
/// Passwords are taken by value so callers give them up on every path.
/// `update_password` and `delete_identity` need a login verified within the
/// provider's recent-login window and fail with `AuthError::StaleSession`
/// otherwise.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    async fn sign_up(&self, email: &str, password: String, display_name: &str) -> Result<AuthIdentity, AuthError>;

    async fn sign_in(&self, email: &str, password: String) -> Result<AuthIdentity, AuthError>;

    async fn sign_out(&self, uid: &str) -> Result<(), AuthError>;

    /// Verify the password of an already signed-in user and refresh the
    /// recent-login timestamp
    async fn reauthenticate(&self, uid: &str, password: String) -> Result<(), AuthError>;

    async fn update_password(&self, uid: &str, new_password: String) -> Result<(), AuthError>;

    async fn update_display_name(&self, uid: &str, display_name: &str) -> Result<(), AuthError>;

    async fn delete_identity(&self, uid: &str) -> Result<(), AuthError>;
}
