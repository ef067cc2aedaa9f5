//! # Account settings flow
//!
//! State machine behind the account settings screen of one signed-in user.
//!
//! ```text
//! Idle ──begin_name_edit──▶ EditingName ──save_name──▶ Saving ──▶ Idle
//! Idle ──begin_avatar_edit─▶ EditingAvatar ──save_avatar──▶ Saving ──▶ Idle
//! Idle ──begin_password_change─▶ ChangingPassword(VerifyCurrent)
//!        ──verify_current_password─▶ ChangingPassword(ChooseNew)
//!        ──submit_new_password─▶ Saving ──▶ Idle
//! Idle ──begin_deletion─▶ ConfirmingDeletion ──confirm_deletion─▶ Saving
//!        ├─▶ Deleted
//!        └─ stale login ─▶ Reauthenticating { pending } ──reauthenticate─▶ retry once
//! ```
//!
//! `cancel` returns to `Idle` from every state except `Deleted` and drops a
//! pending action. Passwords are taken by value and dropped on every path;
//! none of them is ever logged.

use shared::{AccountFlowResponse, AccountIntent, AccountStage, AvatarGlyph, Notification, ProfileUpdate, UserProfile};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::avatar;
use super::errors::{error_notification, AccountError, AuthError, StoreError};
use crate::storage::{Connection, IdentityProvider, ProfileStorage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordStep {
    VerifyCurrent,
    ChooseNew,
}

/// What is being written while the flow is `Saving`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavingField {
    DisplayName,
    Avatar,
    Password,
    Deletion,
}

/// Action that failed for lack of a recent login and runs again after a
/// successful re-authentication
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    DeleteAccount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    Idle,
    EditingName,
    EditingAvatar,
    ChangingPassword(PasswordStep),
    ConfirmingDeletion,
    Saving(SavingField),
    Reauthenticating { pending: PendingAction },
    Deleted,
}

impl AccountState {
    pub fn stage(&self) -> AccountStage {
        match self {
            AccountState::Idle => AccountStage::Idle,
            AccountState::EditingName => AccountStage::EditingName,
            AccountState::EditingAvatar => AccountStage::EditingAvatar,
            AccountState::ChangingPassword(PasswordStep::VerifyCurrent) => AccountStage::VerifyCurrentPassword,
            AccountState::ChangingPassword(PasswordStep::ChooseNew) => AccountStage::ChooseNewPassword,
            AccountState::ConfirmingDeletion => AccountStage::ConfirmingDeletion,
            AccountState::Saving(_) => AccountStage::Saving,
            AccountState::Reauthenticating { .. } => AccountStage::Reauthenticating,
            AccountState::Deleted => AccountStage::Deleted,
        }
    }

    /// States from which a new edit may start
    fn can_begin_edit(&self) -> bool {
        matches!(
            self,
            AccountState::Idle
                | AccountState::EditingName
                | AccountState::EditingAvatar
                | AccountState::ChangingPassword(_)
                | AccountState::ConfirmingDeletion
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionOutcome {
    Deleted,
    /// The identity provider wants a fresh login; the flow now waits in
    /// `Reauthenticating`
    ReauthenticationRequired,
}

pub struct AccountFlow<C: Connection, A: IdentityProvider> {
    profile: UserProfile,
    state: AccountState,
    profile_repository: C::ProfileRepository,
    identity: Arc<A>,
}

impl<C: Connection, A: IdentityProvider> AccountFlow<C, A> {
    pub fn new(connection: &C, identity: Arc<A>, profile: UserProfile) -> Self {
        Self {
            profile,
            state: AccountState::Idle,
            profile_repository: connection.create_profile_repository(),
            identity,
        }
    }

    pub fn state(&self) -> AccountState {
        self.state
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    fn uid(&self) -> &str {
        &self.profile.id
    }

    fn begin(&mut self, next: AccountState, action: &'static str) -> Result<(), AccountError> {
        if !self.state.can_begin_edit() {
            return Err(AccountError::InvalidTransition { action });
        }
        info!("Account flow of {}: {:?} -> {:?}", self.profile.id, self.state, next);
        self.state = next;
        Ok(())
    }

    fn expect_state(&self, expected: AccountState, action: &'static str) -> Result<(), AccountError> {
        if self.state == expected {
            Ok(())
        } else {
            warn!("Account flow of {}: cannot {} in {:?}", self.profile.id, action, self.state);
            Err(AccountError::InvalidTransition { action })
        }
    }

    pub fn begin_name_edit(&mut self) -> Result<(), AccountError> {
        self.begin(AccountState::EditingName, "edit the name")
    }

    pub fn begin_avatar_edit(&mut self) -> Result<(), AccountError> {
        self.begin(AccountState::EditingAvatar, "edit the avatar")
    }

    pub fn begin_password_change(&mut self) -> Result<(), AccountError> {
        self.begin(AccountState::ChangingPassword(PasswordStep::VerifyCurrent), "change the password")
    }

    pub fn begin_deletion(&mut self) -> Result<(), AccountError> {
        self.begin(AccountState::ConfirmingDeletion, "delete the account")
    }

    /// Save a new display name on the identity and the profile document
    pub async fn save_name(&mut self, name: &str) -> Result<(), AccountError> {
        self.expect_state(AccountState::EditingName, "save the name")?;
        let name = name.trim();
        if name.is_empty() {
            return Err(AccountError::EmptyDisplayName);
        }

        self.state = AccountState::Saving(SavingField::DisplayName);
        let result = self.write_display_name(name).await;
        self.state = AccountState::Idle;
        result?;

        self.profile.display_name = name.to_string();
        info!("Display name of {} updated", self.profile.id);
        Ok(())
    }

    async fn write_display_name(&self, name: &str) -> Result<(), AccountError> {
        self.identity.update_display_name(self.uid(), name).await?;
        let update = ProfileUpdate {
            display_name: Some(name.to_string()),
            ..Default::default()
        };
        self.update_profile_document(&update).await
    }

    async fn update_profile_document(&self, update: &ProfileUpdate) -> Result<(), AccountError> {
        let found = self
            .profile_repository
            .update_profile(self.uid(), update)
            .await
            .map_err(|e| {
                error!("Failed to update profile {}: {:#}", self.uid(), e);
                StoreError::write(e)
            })?;
        if !found {
            return Err(StoreError::WriteFailed("profile not found".to_string()).into());
        }
        Ok(())
    }

    /// Save avatar kind and colour on the profile document
    pub async fn save_avatar(&mut self, avatar: AvatarGlyph, color: &str) -> Result<(), AccountError> {
        self.expect_state(AccountState::EditingAvatar, "save the avatar")?;
        let color = avatar::normalize_color(color);

        self.state = AccountState::Saving(SavingField::Avatar);
        let update = ProfileUpdate {
            avatar: Some(avatar),
            avatar_color: Some(color.clone()),
            ..Default::default()
        };
        let result = self.update_profile_document(&update).await;
        self.state = AccountState::Idle;
        result?;

        self.profile.avatar = avatar;
        self.profile.avatar_color = color;
        info!("Avatar of {} updated to {}", self.profile.id, avatar.name());
        Ok(())
    }

    /// First password step. A wrong password keeps the flow on this step.
    pub async fn verify_current_password(&mut self, password: String) -> Result<(), AccountError> {
        self.expect_state(
            AccountState::ChangingPassword(PasswordStep::VerifyCurrent),
            "verify the password",
        )?;
        if password.is_empty() {
            return Err(AccountError::EmptyPassword);
        }

        match self.identity.reauthenticate(self.uid(), password).await {
            Ok(()) => {
                self.state = AccountState::ChangingPassword(PasswordStep::ChooseNew);
                Ok(())
            }
            Err(AuthError::WrongPassword) => Err(AuthError::WrongPassword.into()),
            Err(e) => {
                self.state = AccountState::Idle;
                Err(e.into())
            }
        }
    }

    /// Second password step. Empty or mismatched input keeps the flow on
    /// this step and commits nothing.
    pub async fn submit_new_password(&mut self, new_password: String, confirmation: String) -> Result<(), AccountError> {
        self.expect_state(
            AccountState::ChangingPassword(PasswordStep::ChooseNew),
            "set a new password",
        )?;
        if new_password.is_empty() || confirmation.is_empty() {
            return Err(AccountError::EmptyPassword);
        }
        if new_password != confirmation {
            return Err(AccountError::PasswordMismatch);
        }
        drop(confirmation);

        self.state = AccountState::Saving(SavingField::Password);
        let result = self.identity.update_password(self.uid(), new_password).await;
        self.state = AccountState::Idle;
        result?;

        info!("Password of {} changed", self.profile.id);
        Ok(())
    }

    /// The typed name must equal the display name exactly
    pub async fn confirm_deletion(&mut self, typed_name: &str) -> Result<DeletionOutcome, AccountError> {
        self.expect_state(AccountState::ConfirmingDeletion, "confirm the deletion")?;
        if typed_name != self.profile.display_name {
            self.state = AccountState::Idle;
            return Err(AccountError::NameMismatch);
        }
        self.run_deletion(true).await
    }

    /// Delete the profile document, then the identity. A stale login parks
    /// the deletion in `Reauthenticating` when `allow_reauth` is set.
    async fn run_deletion(&mut self, allow_reauth: bool) -> Result<DeletionOutcome, AccountError> {
        self.state = AccountState::Saving(SavingField::Deletion);

        if let Err(e) = self.profile_repository.delete_profile(self.uid()).await {
            error!("Failed to delete profile {}: {:#}", self.uid(), e);
            self.state = AccountState::Idle;
            return Err(StoreError::write(e).into());
        }

        match self.identity.delete_identity(self.uid()).await {
            Ok(()) => {
                self.state = AccountState::Deleted;
                info!("Account {} deleted", self.profile.id);
                Ok(DeletionOutcome::Deleted)
            }
            Err(AuthError::StaleSession) if allow_reauth => {
                self.state = AccountState::Reauthenticating {
                    pending: PendingAction::DeleteAccount,
                };
                info!("Deletion of {} waits for re-authentication", self.profile.id);
                Ok(DeletionOutcome::ReauthenticationRequired)
            }
            Err(e) => {
                error!("Failed to delete identity {}: {}", self.profile.id, e);
                self.state = AccountState::Idle;
                Err(e.into())
            }
        }
    }

    /// Re-verify the password and run the pending action exactly once. On
    /// failure the pending action is discarded and the flow returns to Idle.
    pub async fn reauthenticate(&mut self, password: String) -> Result<DeletionOutcome, AccountError> {
        let AccountState::Reauthenticating { pending } = self.state else {
            return Err(AccountError::InvalidTransition { action: "re-authenticate" });
        };

        if let Err(e) = self.identity.reauthenticate(self.uid(), password).await {
            warn!("Re-authentication of {} failed, dropping {:?}", self.profile.id, pending);
            self.state = AccountState::Idle;
            return Err(e.into());
        }

        match pending {
            PendingAction::DeleteAccount => self.run_deletion(false).await,
        }
    }

    /// Back to Idle, dropping any pending action. `Deleted` stays terminal.
    pub fn cancel(&mut self) {
        if self.state == AccountState::Deleted {
            return;
        }
        if let AccountState::Reauthenticating { pending } = self.state {
            info!("Account flow of {}: discarding {:?}", self.profile.id, pending);
        }
        self.state = AccountState::Idle;
    }

    /// Run one UI intent and describe where the flow ended up
    pub async fn handle(&mut self, intent: AccountIntent) -> AccountFlowResponse {
        info!("Account intent {} for {}", intent.name(), self.profile.id);
        let notification = match intent {
            AccountIntent::BeginNameEdit => self.begin_name_edit().err().map(|e| error_notification(&e)),
            AccountIntent::BeginAvatarEdit => self.begin_avatar_edit().err().map(|e| error_notification(&e)),
            AccountIntent::BeginPasswordChange => self.begin_password_change().err().map(|e| error_notification(&e)),
            AccountIntent::BeginDeletion => self.begin_deletion().err().map(|e| error_notification(&e)),
            AccountIntent::SaveName { name } => {
                Some(outcome_notification(self.save_name(&name).await, "Display name updated!"))
            }
            AccountIntent::SaveAvatar { avatar, avatar_color } => {
                Some(outcome_notification(self.save_avatar(avatar, &avatar_color).await, "Avatar updated!"))
            }
            AccountIntent::VerifyCurrentPassword { password } => {
                Some(outcome_notification(self.verify_current_password(password).await, "Password verified"))
            }
            AccountIntent::SubmitNewPassword { new_password, confirmation } => Some(outcome_notification(
                self.submit_new_password(new_password, confirmation).await,
                "Password changed!",
            )),
            AccountIntent::ConfirmDeletion { typed_name } => {
                Some(deletion_notification(self.confirm_deletion(&typed_name).await))
            }
            AccountIntent::Reauthenticate { password } => Some(deletion_notification(self.reauthenticate(password).await)),
            AccountIntent::Cancel => {
                self.cancel();
                None
            }
        };

        AccountFlowResponse {
            stage: self.state.stage(),
            profile: (self.state != AccountState::Deleted).then(|| self.profile.clone()),
            notification,
        }
    }
}

fn outcome_notification(result: Result<(), AccountError>, success: &str) -> Notification {
    match result {
        Ok(()) => Notification::success(success),
        Err(e) => error_notification(&e),
    }
}

fn deletion_notification(result: Result<DeletionOutcome, AccountError>) -> Notification {
    match result {
        Ok(DeletionOutcome::Deleted) => Notification::success("Your account has been deleted"),
        Ok(DeletionOutcome::ReauthenticationRequired) => {
            Notification::error("Please confirm your password to delete the account")
        }
        Err(e) => error_notification(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::csv::test_utils::TestEnvironment;
    use crate::storage::{CsvConnection, LocalIdentityProvider};
    use chrono::Utc;

    struct Fixture {
        env: TestEnvironment,
        identity: Arc<LocalIdentityProvider>,
        flow: AccountFlow<CsvConnection, LocalIdentityProvider>,
    }

    impl Fixture {
        fn profiles(&self) -> <CsvConnection as Connection>::ProfileRepository {
            self.env.connection.create_profile_repository()
        }
    }

    async fn fixture() -> Fixture {
        fixture_with_window(chrono::Duration::minutes(5)).await
    }

    async fn fixture_with_window(recent_login_window: chrono::Duration) -> Fixture {
        let env = TestEnvironment::new().unwrap();
        let identity = Arc::new(env.identity_provider_with_window(recent_login_window));
        let created = identity
            .sign_up("linh@example.com", "old-secret".to_string(), "Linh")
            .await
            .unwrap();
        let profile = UserProfile {
            id: created.uid.clone(),
            display_name: "Linh".to_string(),
            email: created.email.clone(),
            avatar: AvatarGlyph::User,
            avatar_color: shared::DEFAULT_AVATAR_COLOR.to_string(),
            approved: true,
            created_at: Utc::now(),
        };
        env.connection.create_profile_repository().create_profile(&profile).await.unwrap();
        let flow = AccountFlow::new(&env.connection, Arc::clone(&identity), profile);
        Fixture { env, identity, flow }
    }

    #[tokio::test]
    async fn test_save_name_updates_profile_and_returns_idle() {
        let mut fx = fixture().await;
        fx.flow.begin_name_edit().unwrap();
        assert_eq!(fx.flow.state(), AccountState::EditingName);

        fx.flow.save_name("  Linh Tran ").await.unwrap();
        assert_eq!(fx.flow.state(), AccountState::Idle);
        assert_eq!(fx.flow.profile().display_name, "Linh Tran");

        let stored = fx.profiles().get_profile(&fx.flow.profile().id).await.unwrap().unwrap();
        assert_eq!(stored.display_name, "Linh Tran");
    }

    #[tokio::test]
    async fn test_empty_name_is_rejected() {
        let mut fx = fixture().await;
        fx.flow.begin_name_edit().unwrap();
        assert_eq!(fx.flow.save_name("   ").await, Err(AccountError::EmptyDisplayName));
        assert_eq!(fx.flow.state(), AccountState::EditingName);
    }

    #[tokio::test]
    async fn test_save_avatar() {
        let mut fx = fixture().await;
        fx.flow.begin_avatar_edit().unwrap();
        fx.flow.save_avatar(AvatarGlyph::Cat, "#10B981").await.unwrap();

        let stored = fx.profiles().get_profile(&fx.flow.profile().id).await.unwrap().unwrap();
        assert_eq!(stored.avatar, AvatarGlyph::Cat);
        assert_eq!(stored.avatar_color, "#10B981");
        assert_eq!(fx.flow.state(), AccountState::Idle);
    }

    #[tokio::test]
    async fn test_save_without_begin_is_invalid() {
        let mut fx = fixture().await;
        assert!(matches!(
            fx.flow.save_name("X").await,
            Err(AccountError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_password_change_steps() {
        let mut fx = fixture().await;
        fx.flow.begin_password_change().unwrap();

        assert_eq!(
            fx.flow.verify_current_password("nope".to_string()).await,
            Err(AccountError::Auth(AuthError::WrongPassword))
        );
        assert_eq!(fx.flow.state(), AccountState::ChangingPassword(PasswordStep::VerifyCurrent));

        fx.flow.verify_current_password("old-secret".to_string()).await.unwrap();
        assert_eq!(fx.flow.state(), AccountState::ChangingPassword(PasswordStep::ChooseNew));

        assert_eq!(
            fx.flow.submit_new_password("new-1".to_string(), "new-2".to_string()).await,
            Err(AccountError::PasswordMismatch)
        );
        assert_eq!(
            fx.flow.submit_new_password(String::new(), String::new()).await,
            Err(AccountError::EmptyPassword)
        );
        assert_eq!(fx.flow.state(), AccountState::ChangingPassword(PasswordStep::ChooseNew));
        // Nothing committed yet
        assert!(fx.identity.sign_in("linh@example.com", "old-secret".to_string()).await.is_ok());

        fx.flow.submit_new_password("new-1".to_string(), "new-1".to_string()).await.unwrap();
        assert_eq!(fx.flow.state(), AccountState::Idle);
        assert!(fx.identity.sign_in("linh@example.com", "new-1".to_string()).await.is_ok());
    }

    #[tokio::test]
    async fn test_name_mismatch_cancels_deletion() {
        let mut fx = fixture().await;
        fx.flow.begin_deletion().unwrap();

        assert_eq!(fx.flow.confirm_deletion("linh").await, Err(AccountError::NameMismatch));
        assert_eq!(fx.flow.state(), AccountState::Idle);
        assert!(fx.profiles().get_profile(&fx.flow.profile().id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_deletion_with_recent_login() {
        let mut fx = fixture().await;
        let uid = fx.flow.profile().id.clone();
        fx.flow.begin_deletion().unwrap();

        assert_eq!(fx.flow.confirm_deletion("Linh").await, Ok(DeletionOutcome::Deleted));
        assert_eq!(fx.flow.state(), AccountState::Deleted);
        assert!(fx.profiles().get_profile(&uid).await.unwrap().is_none());

        fx.flow.cancel();
        assert_eq!(fx.flow.state(), AccountState::Deleted);
    }

    #[tokio::test]
    async fn test_stale_deletion_then_successful_reauthentication() {
        let mut fx = fixture().await;
        let uid = fx.flow.profile().id.clone();
        fx.identity.expire_recent_login(&uid);
        fx.flow.begin_deletion().unwrap();

        assert_eq!(
            fx.flow.confirm_deletion("Linh").await,
            Ok(DeletionOutcome::ReauthenticationRequired)
        );
        assert_eq!(
            fx.flow.state(),
            AccountState::Reauthenticating {
                pending: PendingAction::DeleteAccount
            }
        );

        assert_eq!(
            fx.flow.reauthenticate("old-secret".to_string()).await,
            Ok(DeletionOutcome::Deleted)
        );
        assert_eq!(fx.flow.state(), AccountState::Deleted);
        assert!(fx.identity.sign_in("linh@example.com", "old-secret".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_reauthentication_discards_pending_delete() {
        let mut fx = fixture().await;
        let uid = fx.flow.profile().id.clone();
        fx.identity.expire_recent_login(&uid);
        fx.flow.begin_deletion().unwrap();
        fx.flow.confirm_deletion("Linh").await.unwrap();

        assert_eq!(
            fx.flow.reauthenticate("wrong".to_string()).await,
            Err(AccountError::Auth(AuthError::WrongPassword))
        );
        assert_eq!(fx.flow.state(), AccountState::Idle);

        // No pending action left: nothing gets deleted
        assert!(matches!(
            fx.flow.reauthenticate("old-secret".to_string()).await,
            Err(AccountError::InvalidTransition { .. })
        ));
        assert!(fx.identity.sign_in("linh@example.com", "old-secret".to_string()).await.is_ok());
    }

    #[tokio::test]
    async fn test_deletion_is_retried_only_once_after_reauthentication() {
        // A negative window makes every login stale, even one made just now
        let mut fx = fixture_with_window(chrono::Duration::seconds(-1)).await;
        fx.flow.begin_deletion().unwrap();
        assert_eq!(
            fx.flow.confirm_deletion("Linh").await,
            Ok(DeletionOutcome::ReauthenticationRequired)
        );

        assert_eq!(
            fx.flow.reauthenticate("old-secret".to_string()).await,
            Err(AccountError::Auth(AuthError::StaleSession))
        );
        assert_eq!(fx.flow.state(), AccountState::Idle);

        // The pending deletion is gone: no further retry happens
        assert!(matches!(
            fx.flow.reauthenticate("old-secret".to_string()).await,
            Err(AccountError::InvalidTransition { .. })
        ));
        assert_eq!(fx.flow.state(), AccountState::Idle);
        assert!(fx.identity.sign_in("linh@example.com", "old-secret".to_string()).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_drops_pending_action() {
        let mut fx = fixture().await;
        fx.identity.expire_recent_login(&fx.flow.profile().id.clone());
        fx.flow.begin_deletion().unwrap();
        fx.flow.confirm_deletion("Linh").await.unwrap();

        fx.flow.cancel();
        assert_eq!(fx.flow.state(), AccountState::Idle);
        assert!(fx.flow.reauthenticate("old-secret".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn test_handle_maps_intents_to_stage_and_notification() {
        let mut fx = fixture().await;

        let response = fx.flow.handle(AccountIntent::BeginNameEdit).await;
        assert_eq!(response.stage, AccountStage::EditingName);
        assert!(response.notification.is_none());

        let response = fx.flow.handle(AccountIntent::SaveName { name: "Anh".to_string() }).await;
        assert_eq!(response.stage, AccountStage::Idle);
        assert_eq!(response.notification.unwrap().message, "Display name updated!");
        assert_eq!(response.profile.unwrap().display_name, "Anh");

        fx.flow.handle(AccountIntent::BeginDeletion).await;
        let response = fx
            .flow
            .handle(AccountIntent::ConfirmDeletion { typed_name: "Linh".to_string() })
            .await;
        assert_eq!(response.stage, AccountStage::Idle);
        assert!(response.notification.unwrap().is_error());

        let response = fx.flow.handle(AccountIntent::Cancel).await;
        assert_eq!(response.stage, AccountStage::Idle);
    }
}
