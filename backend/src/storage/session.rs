//! # Session store
//!
//! Opaque bearer tokens handed out on sign-in. A token maps to the uid it
//! was issued for until it is revoked or outlives the session lifetime.
//! Tokens are kept in memory only, so a restart signs everybody out.

use argon2::password_hash::rand_core::{OsRng, RngCore};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone)]
struct Session {
    uid: String,
    issued_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct SessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issue a new token for `uid`. Earlier tokens of the same user stay valid.
    pub fn issue(&self, uid: &str) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let token = bytes.iter().fold(String::with_capacity(TOKEN_BYTES * 2), |mut hex, byte| {
            let _ = write!(hex, "{:02x}", byte);
            hex
        });

        self.sessions().insert(
            token.clone(),
            Session {
                uid: uid.to_string(),
                issued_at: Utc::now(),
            },
        );
        info!("Issued session for {}", uid);
        token
    }

    /// The uid behind `token`, if the token is known and not expired.
    /// Expired tokens are dropped on the way.
    pub fn resolve(&self, token: &str) -> Option<String> {
        let mut sessions = self.sessions();
        let session = sessions.get(token)?;
        if Utc::now() - session.issued_at > self.ttl {
            debug!("Session of {} expired", session.uid);
            sessions.remove(token);
            return None;
        }
        Some(session.uid.clone())
    }

    /// Forget one token, returning the uid it belonged to
    pub fn revoke(&self, token: &str) -> Option<String> {
        self.sessions().remove(token).map(|session| session.uid)
    }

    /// Forget every token of `uid`, returning the revoked tokens
    pub fn revoke_user(&self, uid: &str) -> Vec<String> {
        let mut sessions = self.sessions();
        let tokens: Vec<String> = sessions
            .iter()
            .filter(|(_, session)| session.uid == uid)
            .map(|(token, _)| token.clone())
            .collect();
        for token in &tokens {
            sessions.remove(token);
        }
        if !tokens.is_empty() {
            info!("Revoked {} sessions of {}", tokens.len(), uid);
        }
        tokens
    }

    pub fn has_sessions(&self, uid: &str) -> bool {
        self.sessions().values().any(|session| session.uid == uid)
    }

    #[cfg(test)]
    pub fn backdate(&self, token: &str, by: Duration) {
        if let Some(session) = self.sessions().get_mut(token) {
            session.issued_at = session.issued_at - by;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issued_token_resolves_to_uid() {
        let store = SessionStore::new(Duration::hours(1));
        let token = store.issue("u1");
        assert_eq!(token.len(), TOKEN_BYTES * 2);
        assert_eq!(store.resolve(&token), Some("u1".to_string()));
        assert_eq!(store.resolve("not-a-token"), None);
    }

    #[test]
    fn test_tokens_are_unique() {
        let store = SessionStore::new(Duration::hours(1));
        assert_ne!(store.issue("u1"), store.issue("u1"));
    }

    #[test]
    fn test_expired_token_is_dropped() {
        let store = SessionStore::new(Duration::minutes(10));
        let token = store.issue("u1");
        store.backdate(&token, Duration::minutes(11));
        assert_eq!(store.resolve(&token), None);
        assert!(!store.has_sessions("u1"));
    }

    #[test]
    fn test_revoke_one_and_all() {
        let store = SessionStore::new(Duration::hours(1));
        let phone = store.issue("u1");
        let laptop = store.issue("u1");
        let other = store.issue("u2");

        assert_eq!(store.revoke(&phone), Some("u1".to_string()));
        assert_eq!(store.revoke(&phone), None);
        assert!(store.has_sessions("u1"));

        assert_eq!(store.revoke_user("u1"), vec![laptop.clone()]);
        assert_eq!(store.resolve(&laptop), None);
        assert!(!store.has_sessions("u1"));
        assert_eq!(store.resolve(&other), Some("u2".to_string()));
    }
}
