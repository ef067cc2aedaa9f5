use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use csv::{Reader, StringRecord};
use shared::{AvatarGlyph, ProfileUpdate, UserProfile, DEFAULT_AVATAR_COLOR};
use std::fs::File;
use std::io::BufReader;
use tracing::{info, warn};

use super::connection::{CsvConnection, PROFILES_FILE};
use crate::storage::traits::ProfileStorage;

const HEADER: [&str; 7] = [
    "id",
    "display_name",
    "email",
    "avatar",
    "avatar_color",
    "approved",
    "created_at",
];

/// CSV-based profile document repository
#[derive(Clone)]
pub struct ProfileRepository {
    connection: CsvConnection,
}

impl ProfileRepository {
    pub fn new(connection: CsvConnection) -> Self {
        Self { connection }
    }

    fn read_profiles(&self) -> Result<Vec<UserProfile>> {
        let file_path = self.connection.ensure_csv_file_exists(PROFILES_FILE, &HEADER)?;
        let file = File::open(&file_path)?;
        let mut csv_reader = Reader::from_reader(BufReader::new(file));

        let mut profiles = Vec::new();
        for result in csv_reader.records() {
            let row = result?;
            match parse_row(&row) {
                Some(profile) => profiles.push(profile),
                None => warn!("Skipping malformed profile row in {}", PROFILES_FILE),
            }
        }
        Ok(profiles)
    }

    fn write_profiles(&self, profiles: &[UserProfile]) -> Result<()> {
        self.connection.write_csv_atomically(PROFILES_FILE, &HEADER, |writer| {
            for profile in profiles {
                writer.write_record(&[
                    profile.id.clone(),
                    profile.display_name.clone(),
                    profile.email.clone(),
                    profile.avatar.name().to_string(),
                    profile.avatar_color.clone(),
                    profile.approved.to_string(),
                    profile.created_at.to_rfc3339(),
                ])?;
            }
            Ok(())
        })
    }
}

fn parse_row(row: &StringRecord) -> Option<UserProfile> {
    let id = row.get(0).filter(|id| !id.is_empty())?.to_string();
    let created_at = row
        .get(6)
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or_default();
    let avatar_color = row
        .get(4)
        .filter(|c| !c.trim().is_empty())
        .unwrap_or(DEFAULT_AVATAR_COLOR)
        .to_string();

    Some(UserProfile {
        id,
        display_name: row.get(1).unwrap_or("").to_string(),
        email: row.get(2).unwrap_or("").to_string(),
        avatar: row.get(3).map(AvatarGlyph::from_name).unwrap_or_default(),
        avatar_color,
        approved: row.get(5).map(|a| a.trim() == "true").unwrap_or(false),
        created_at,
    })
}

#[async_trait]
impl ProfileStorage for ProfileRepository {
    async fn create_profile(&self, profile: &UserProfile) -> Result<()> {
        let _guard = self.connection.lock_writes().await;
        let mut profiles = self.read_profiles()?;
        profiles.retain(|p| p.id != profile.id);
        profiles.push(profile.clone());
        self.write_profiles(&profiles)?;
        info!("Stored profile {}", profile.id);
        Ok(())
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        Ok(self.read_profiles()?.into_iter().find(|p| p.id == user_id))
    }

    async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<bool> {
        let _guard = self.connection.lock_writes().await;
        let mut profiles = self.read_profiles()?;

        let Some(profile) = profiles.iter_mut().find(|p| p.id == user_id) else {
            return Ok(false);
        };
        if let Some(display_name) = &update.display_name {
            profile.display_name = display_name.clone();
        }
        if let Some(avatar) = update.avatar {
            profile.avatar = avatar;
        }
        if let Some(avatar_color) = &update.avatar_color {
            profile.avatar_color = avatar_color.clone();
        }

        self.write_profiles(&profiles)?;
        info!("Updated profile {}", user_id);
        Ok(true)
    }

    async fn delete_profile(&self, user_id: &str) -> Result<bool> {
        let _guard = self.connection.lock_writes().await;
        let mut profiles = self.read_profiles()?;
        let before = profiles.len();
        profiles.retain(|p| p.id != user_id);
        if profiles.len() == before {
            return Ok(false);
        }
        self.write_profiles(&profiles)?;
        info!("Deleted profile {}", user_id);
        Ok(true)
    }
}
