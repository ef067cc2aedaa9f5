//! YAML-backed application preferences (`preferences.yaml`).

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fs;
use tracing::{info, warn};

use super::connection::{CsvConnection, PREFERENCES_FILE};
use crate::storage::traits::{PreferenceStorage, Preferences};

#[derive(Clone)]
pub struct PreferenceRepository {
    connection: CsvConnection,
}

impl PreferenceRepository {
    pub fn new(connection: CsvConnection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl PreferenceStorage for PreferenceRepository {
    async fn load_preferences(&self) -> Result<Preferences> {
        let file_path = self.connection.file_path(PREFERENCES_FILE);
        if !file_path.exists() {
            return Ok(Preferences::default());
        }

        let contents = fs::read_to_string(&file_path)
            .with_context(|| format!("Failed to read {}", file_path.display()))?;
        match serde_yaml::from_str::<Preferences>(&contents) {
            Ok(preferences) => Ok(preferences),
            Err(e) => {
                warn!("Ignoring unreadable {}: {}", PREFERENCES_FILE, e);
                Ok(Preferences::default())
            }
        }
    }

    async fn save_preferences(&self, preferences: &Preferences) -> Result<()> {
        let _guard = self.connection.lock_writes().await;
        let yaml = serde_yaml::to_string(preferences)?;
        self.connection.write_text_atomically(PREFERENCES_FILE, &yaml)?;
        info!("Saved preferences: theme {:?}", preferences.theme);
        Ok(())
    }
}
