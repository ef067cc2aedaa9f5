//! # Local identity provider
//!
//! Email + password identities kept in `identities.csv` next to the other
//! data files. Passwords are stored as Argon2id PHC strings and never
//! logged.
//!
//! Session freshness lives in memory: every successful sign-up, sign-in or
//! re-authentication stamps the uid with the current time. Password changes
//! and identity deletion are refused with [`AuthError::StaleSession`] once
//! that stamp is older than the recent-login window.

use anyhow::Result;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use csv::Reader;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

use super::csv::connection::{CsvConnection, IDENTITIES_FILE};
use super::traits::{AuthIdentity, IdentityProvider};
use crate::domain::errors::AuthError;

const HEADER: [&str; 5] = ["uid", "email", "display_name", "password_hash", "created_at"];

#[derive(Debug, Clone)]
struct StoredIdentity {
    uid: String,
    email: String,
    display_name: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl StoredIdentity {
    fn to_identity(&self) -> AuthIdentity {
        AuthIdentity {
            uid: self.uid.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            created_at: self.created_at,
        }
    }
}

#[derive(Clone)]
pub struct LocalIdentityProvider {
    connection: CsvConnection,
    recent_login_window: Duration,
    /// uid -> time of the last verified login
    sessions: Arc<Mutex<HashMap<String, DateTime<Utc>>>>,
}

impl LocalIdentityProvider {
    pub fn new(connection: CsvConnection, recent_login_window: Duration) -> Self {
        Self {
            connection,
            recent_login_window,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn is_signed_in(&self, uid: &str) -> bool {
        self.sessions().contains_key(uid)
    }

    /// Push the last verified login of `uid` out of the recent-login window
    #[cfg(test)]
    pub fn expire_recent_login(&self, uid: &str) {
        let stale = Utc::now() - self.recent_login_window - Duration::seconds(1);
        self.sessions().insert(uid.to_string(), stale);
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_verified(&self, uid: &str) {
        self.sessions().insert(uid.to_string(), Utc::now());
    }

    fn require_recent_login(&self, uid: &str) -> Result<(), AuthError> {
        let verified_at = self.sessions().get(uid).copied();
        match verified_at {
            Some(at) if Utc::now() - at <= self.recent_login_window => Ok(()),
            _ => {
                warn!("Sensitive operation for {} refused: login is not recent", uid);
                Err(AuthError::StaleSession)
            }
        }
    }

    fn read_identities(&self) -> Result<Vec<StoredIdentity>> {
        let file_path = self.connection.ensure_csv_file_exists(IDENTITIES_FILE, &HEADER)?;
        let mut csv_reader = Reader::from_reader(BufReader::new(File::open(&file_path)?));

        let mut identities = Vec::new();
        for result in csv_reader.records() {
            let row = result?;
            let (Some(uid), Some(hash)) = (row.get(0), row.get(3)) else {
                continue;
            };
            if uid.is_empty() || hash.is_empty() {
                continue;
            }
            identities.push(StoredIdentity {
                uid: uid.to_string(),
                email: row.get(1).unwrap_or("").to_string(),
                display_name: row.get(2).unwrap_or("").to_string(),
                password_hash: hash.to_string(),
                created_at: row
                    .get(4)
                    .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
                    .map(|ts| ts.with_timezone(&Utc))
                    .unwrap_or_default(),
            });
        }
        Ok(identities)
    }

    fn write_identities(&self, identities: &[StoredIdentity]) -> Result<()> {
        self.connection.write_csv_atomically(IDENTITIES_FILE, &HEADER, |writer| {
            for identity in identities {
                writer.write_record(&[
                    identity.uid.clone(),
                    identity.email.clone(),
                    identity.display_name.clone(),
                    identity.password_hash.clone(),
                    identity.created_at.to_rfc3339(),
                ])?;
            }
            Ok(())
        })
    }

    fn find_by_uid(&self, uid: &str) -> Result<StoredIdentity, AuthError> {
        self.read_identities()
            .map_err(storage_failure)?
            .into_iter()
            .find(|i| i.uid == uid)
            .ok_or_else(|| AuthError::Unknown("No such user".to_string()))
    }

    /// Read, modify and rewrite the identity of `uid` under the write lock
    async fn modify_identity<F>(&self, uid: &str, modify: F) -> Result<(), AuthError>
    where
        F: FnOnce(&mut StoredIdentity) + Send,
    {
        let _guard = self.connection.lock_writes().await;
        let mut identities = self.read_identities().map_err(storage_failure)?;
        let identity = identities
            .iter_mut()
            .find(|i| i.uid == uid)
            .ok_or_else(|| AuthError::Unknown("No such user".to_string()))?;
        modify(identity);
        self.write_identities(&identities).map_err(storage_failure)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn storage_failure(err: anyhow::Error) -> AuthError {
    AuthError::Unknown(err.to_string())
}

/// Hash a password using Argon2id on the blocking pool. Returns a
/// PHC-format string.
async fn hash_password(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::Unknown(format!("Failed to hash password: {}", e)))
    })
    .await
    .map_err(|e| AuthError::Unknown(format!("Password hashing task failed: {}", e)))?
}

/// Verify a password against a PHC-format hash string on the blocking pool
async fn verify_password(password: String, hash: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || -> Result<bool, AuthError> {
        let parsed_hash =
            PasswordHash::new(&hash).map_err(|e| AuthError::Unknown(format!("Invalid password hash: {}", e)))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    })
    .await
    .map_err(|e| AuthError::Unknown(format!("Password check task failed: {}", e)))?
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn sign_up(&self, email: &str, password: String, display_name: &str) -> Result<AuthIdentity, AuthError> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::Unknown("Email and password are required".to_string()));
        }

        // Hash before taking the write lock so other writers are not held up
        let password_hash = hash_password(password).await?;

        let _guard = self.connection.lock_writes().await;
        let mut identities = self.read_identities().map_err(storage_failure)?;
        if identities.iter().any(|i| i.email == email) {
            return Err(AuthError::EmailInUse);
        }

        let stored = StoredIdentity {
            uid: format!("uid_{}", uuid::Uuid::new_v4().simple()),
            email,
            display_name: display_name.trim().to_string(),
            password_hash,
            created_at: Utc::now(),
        };
        identities.push(stored.clone());
        self.write_identities(&identities).map_err(storage_failure)?;
        self.mark_verified(&stored.uid);

        info!("Created identity {}", stored.uid);
        Ok(stored.to_identity())
    }

    async fn sign_in(&self, email: &str, password: String) -> Result<AuthIdentity, AuthError> {
        let email = normalize_email(email);
        let stored = self
            .read_identities()
            .map_err(storage_failure)?
            .into_iter()
            .find(|i| i.email == email)
            .ok_or_else(|| AuthError::Unknown("No account found for this email".to_string()))?;

        if !verify_password(password, stored.password_hash.clone()).await? {
            warn!("Failed sign-in for {}", stored.uid);
            return Err(AuthError::WrongPassword);
        }
        self.mark_verified(&stored.uid);
        info!("Signed in {}", stored.uid);
        Ok(stored.to_identity())
    }

    async fn sign_out(&self, uid: &str) -> Result<(), AuthError> {
        if self.sessions().remove(uid).is_some() {
            info!("Signed out {}", uid);
        }
        Ok(())
    }

    async fn reauthenticate(&self, uid: &str, password: String) -> Result<(), AuthError> {
        let stored = self.find_by_uid(uid)?;
        if !verify_password(password, stored.password_hash).await? {
            warn!("Re-authentication failed for {}", uid);
            return Err(AuthError::WrongPassword);
        }
        self.mark_verified(uid);
        info!("Re-authenticated {}", uid);
        Ok(())
    }

    async fn update_password(&self, uid: &str, new_password: String) -> Result<(), AuthError> {
        self.require_recent_login(uid)?;
        let password_hash = hash_password(new_password).await?;
        self.modify_identity(uid, move |identity| identity.password_hash = password_hash)
            .await?;
        info!("Password updated for {}", uid);
        Ok(())
    }

    async fn update_display_name(&self, uid: &str, display_name: &str) -> Result<(), AuthError> {
        let display_name = display_name.trim().to_string();
        self.modify_identity(uid, move |identity| identity.display_name = display_name)
            .await?;
        info!("Display name updated for {}", uid);
        Ok(())
    }

    async fn delete_identity(&self, uid: &str) -> Result<(), AuthError> {
        self.require_recent_login(uid)?;

        let _guard = self.connection.lock_writes().await;
        let mut identities = self.read_identities().map_err(storage_failure)?;
        let before = identities.len();
        identities.retain(|i| i.uid != uid);
        if identities.len() == before {
            return Err(AuthError::Unknown("No such user".to_string()));
        }
        self.write_identities(&identities).map_err(storage_failure)?;
        self.sessions().remove(uid);

        info!("Deleted identity {}", uid);
        Ok(())
    }
}
