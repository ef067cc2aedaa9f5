//! Sign-up, sign-in and sign-out with the admin approval gate.

use chrono::Utc;
use shared::{AvatarGlyph, UserProfile, DEFAULT_AVATAR_COLOR};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::errors::{AccountError, AuthError, StoreError};
use crate::storage::{Connection, IdentityProvider, ProfileStorage};

#[derive(Clone)]
pub struct AuthService<C: Connection, A: IdentityProvider> {
    profile_repository: C::ProfileRepository,
    identity: Arc<A>,
    auto_approve_signups: bool,
}

impl<C: Connection, A: IdentityProvider> AuthService<C, A> {
    pub fn new(connection: &C, identity: Arc<A>, auto_approve_signups: bool) -> Self {
        Self {
            profile_repository: connection.create_profile_repository(),
            identity,
            auto_approve_signups,
        }
    }

    pub fn identity(&self) -> &Arc<A> {
        &self.identity
    }

    /// Create the identity and its profile document, then sign out again so
    /// the user goes through the regular sign-in
    pub async fn sign_up(&self, email: &str, password: String, display_name: &str) -> Result<UserProfile, AccountError> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(AccountError::EmptyDisplayName);
        }

        let identity = self.identity.sign_up(email, password, display_name).await?;
        let profile = UserProfile {
            id: identity.uid.clone(),
            display_name: display_name.to_string(),
            email: identity.email.clone(),
            avatar: AvatarGlyph::default(),
            avatar_color: DEFAULT_AVATAR_COLOR.to_string(),
            approved: self.auto_approve_signups,
            created_at: Utc::now(),
        };

        if let Err(e) = self.profile_repository.create_profile(&profile).await {
            error!("Identity {} created but its profile could not be stored: {:#}", identity.uid, e);
            self.identity.sign_out(&identity.uid).await?;
            return Err(StoreError::write(e).into());
        }

        self.identity.sign_out(&identity.uid).await?;
        info!("Signed up {} (approved: {})", profile.id, profile.approved);
        Ok(profile)
    }

    /// Verify credentials and load the profile. Missing or unapproved
    /// profiles are signed out again.
    pub async fn sign_in(&self, email: &str, password: String) -> Result<UserProfile, AccountError> {
        let identity = self.identity.sign_in(email, password).await?;

        let profile = match self.profile_repository.get_profile(&identity.uid).await {
            Ok(profile) => profile,
            Err(e) => {
                error!("Failed to load profile {}: {:#}", identity.uid, e);
                self.identity.sign_out(&identity.uid).await?;
                return Err(StoreError::read(e).into());
            }
        };

        match profile {
            Some(profile) if profile.approved => {
                info!("{} signed in", profile.id);
                Ok(profile)
            }
            _ => {
                warn!("Sign-in of {} refused: not approved", identity.uid);
                self.identity.sign_out(&identity.uid).await?;
                Err(AuthError::NotApproved.into())
            }
        }
    }

    pub async fn sign_out(&self, uid: &str) -> Result<(), AccountError> {
        self.identity.sign_out(uid).await?;
        Ok(())
    }

    /// Current profile document of a user
    pub async fn profile(&self, uid: &str) -> Result<Option<UserProfile>, StoreError> {
        self.profile_repository.get_profile(uid).await.map_err(StoreError::read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::csv::test_utils::TestEnvironment;
    use crate::storage::{CsvConnection, LocalIdentityProvider};

    fn service(env: &TestEnvironment, auto_approve: bool) -> AuthService<CsvConnection, LocalIdentityProvider> {
        AuthService::new(&env.connection, Arc::new(env.identity_provider()), auto_approve)
    }

    #[tokio::test]
    async fn test_sign_up_creates_profile_and_signs_out() {
        let env = TestEnvironment::new().unwrap();
        let service = service(&env, true);

        let profile = service
            .sign_up("linh@example.com", "secret".to_string(), " Linh ")
            .await
            .unwrap();
        assert_eq!(profile.display_name, "Linh");
        assert_eq!(profile.avatar, AvatarGlyph::User);
        assert!(profile.approved);
        assert!(!service.identity().is_signed_in(&profile.id));
        assert_eq!(service.profile(&profile.id).await.unwrap(), Some(profile.clone()));

        let signed_in = service.sign_in("linh@example.com", "secret".to_string()).await.unwrap();
        assert_eq!(signed_in.id, profile.id);
        assert!(service.identity().is_signed_in(&profile.id));
    }

    #[tokio::test]
    async fn test_sign_up_requires_display_name() {
        let env = TestEnvironment::new().unwrap();
        let service = service(&env, true);
        assert_eq!(
            service.sign_up("a@example.com", "pw".to_string(), "  ").await,
            Err(AccountError::EmptyDisplayName)
        );
    }

    #[tokio::test]
    async fn test_identity_left_without_profile_is_locked_out() {
        let env = TestEnvironment::new().unwrap();
        let service = service(&env, true);
        let profile = service.sign_up("a@example.com", "pw".to_string(), "A").await.unwrap();

        // What a deletion that removed the profile but not the identity leaves behind
        assert!(env.connection.create_profile_repository().delete_profile(&profile.id).await.unwrap());

        assert_eq!(
            service.sign_in("a@example.com", "pw".to_string()).await,
            Err(AccountError::Auth(AuthError::NotApproved))
        );
        assert!(!service.identity().is_signed_in(&profile.id));
        assert_eq!(
            service.sign_up("a@example.com", "pw".to_string(), "A").await,
            Err(AccountError::Auth(AuthError::EmailInUse))
        );
    }

    #[tokio::test]
    async fn test_unapproved_profile_cannot_sign_in() {
        let env = TestEnvironment::new().unwrap();
        let service = service(&env, false);
        let profile = service.sign_up("a@example.com", "pw".to_string(), "A").await.unwrap();
        assert!(!profile.approved);

        assert_eq!(
            service.sign_in("a@example.com", "pw".to_string()).await,
            Err(AccountError::Auth(AuthError::NotApproved))
        );
        assert!(!service.identity().is_signed_in(&profile.id));
    }

    #[tokio::test]
    async fn test_missing_profile_cannot_sign_in() {
        let env = TestEnvironment::new().unwrap();
        let service = service(&env, true);
        let profile = service.sign_up("a@example.com", "pw".to_string(), "A").await.unwrap();
        env.connection.create_profile_repository().delete_profile(&profile.id).await.unwrap();

        assert_eq!(
            service.sign_in("a@example.com", "pw".to_string()).await,
            Err(AccountError::Auth(AuthError::NotApproved))
        );
    }

    #[tokio::test]
    async fn test_wrong_password() {
        let env = TestEnvironment::new().unwrap();
        let service = service(&env, true);
        service.sign_up("a@example.com", "pw".to_string(), "A").await.unwrap();
        assert_eq!(
            service.sign_in("a@example.com", "bad".to_string()).await,
            Err(AccountError::Auth(AuthError::WrongPassword))
        );
    }

    #[tokio::test]
    async fn test_admin_approval_unlocks_sign_in() {
        let env = TestEnvironment::new().unwrap();
        let service = service(&env, false);
        let profile = service.sign_up("a@example.com", "pw".to_string(), "A").await.unwrap();

        // Approval is flipped by an admin directly on the profile document
        let mut approved = profile;
        approved.approved = true;
        let repo = env.connection.create_profile_repository();
        repo.create_profile(&approved).await.unwrap();

        assert!(service.sign_in("a@example.com", "pw".to_string()).await.is_ok());
    }
}
