//! Application-wide context: theme preference and the signed-in user.
//!
//! Built once at start-up and handed to whoever needs it; there are no
//! globals behind it.

use shared::{ThemePreference, UserProfile};
use tracing::{info, warn};

use super::errors::StoreError;
use crate::storage::{Connection, PreferenceStorage, Preferences};

pub struct AppContext<C: Connection> {
    preference_repository: C::PreferenceRepository,
    theme: ThemePreference,
    current_user: Option<UserProfile>,
}

impl<C: Connection> AppContext<C> {
    /// Read the persisted theme. Unreadable preferences fall back to Light.
    pub async fn init(connection: &C) -> Self {
        let preference_repository = connection.create_preference_repository();
        let theme = match preference_repository.load_preferences().await {
            Ok(preferences) => preferences.theme,
            Err(e) => {
                warn!("Could not load preferences, using defaults: {:#}", e);
                ThemePreference::default()
            }
        };
        info!("Theme: {:?}", theme);

        Self {
            preference_repository,
            theme,
            current_user: None,
        }
    }

    pub fn theme(&self) -> ThemePreference {
        self.theme
    }

    /// Flip the theme and persist it. The new theme stays active even when
    /// saving fails.
    pub async fn toggle_theme(&mut self) -> Result<ThemePreference, StoreError> {
        self.theme = self.theme.toggled();
        self.preference_repository
            .save_preferences(&Preferences { theme: self.theme })
            .await
            .map_err(StoreError::write)?;
        Ok(self.theme)
    }

    pub fn current_user(&self) -> Option<&UserProfile> {
        self.current_user.as_ref()
    }

    pub fn set_current_user(&mut self, profile: Option<UserProfile>) {
        self.current_user = profile;
    }

    /// Forget the signed-in user if it is `uid`
    pub fn sign_out(&mut self, uid: &str) {
        if self.current_user.as_ref().is_some_and(|user| user.id == uid) {
            self.current_user = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::csv::test_utils::TestEnvironment;
    use crate::storage::CsvConnection;
    use chrono::Utc;
    use shared::AvatarGlyph;

    #[tokio::test]
    async fn test_theme_defaults_to_light_and_persists_toggle() {
        let env = TestEnvironment::new().unwrap();
        let mut context: AppContext<CsvConnection> = AppContext::init(&env.connection).await;
        assert_eq!(context.theme(), ThemePreference::Light);

        assert_eq!(context.toggle_theme().await, Ok(ThemePreference::Dark));

        let reloaded: AppContext<CsvConnection> = AppContext::init(&env.connection).await;
        assert_eq!(reloaded.theme(), ThemePreference::Dark);
    }

    #[tokio::test]
    async fn test_current_user() {
        let env = TestEnvironment::new().unwrap();
        let mut context: AppContext<CsvConnection> = AppContext::init(&env.connection).await;
        assert!(context.current_user().is_none());

        context.set_current_user(Some(UserProfile {
            id: "u1".to_string(),
            display_name: "Linh".to_string(),
            email: "linh@example.com".to_string(),
            avatar: AvatarGlyph::Star,
            avatar_color: "#3B82F6".to_string(),
            approved: true,
            created_at: Utc::now(),
        }));
        context.sign_out("someone-else");
        assert_eq!(context.current_user().map(|u| u.id.as_str()), Some("u1"));
        context.sign_out("u1");
        assert!(context.current_user().is_none());
    }
}
