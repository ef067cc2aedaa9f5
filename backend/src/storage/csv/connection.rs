use anyhow::{Context, Result};
use csv::Writer;
use std::fs::{self, File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

use super::preference_repository::PreferenceRepository;
use super::profile_repository::ProfileRepository;
use super::record_repository::RecordRepository;
use crate::storage::live_query::ListenerRegistry;
use crate::storage::traits::Connection;

pub const RECORDS_FILE: &str = "records.csv";
pub const PROFILES_FILE: &str = "profiles.csv";
pub const IDENTITIES_FILE: &str = "identities.csv";
pub const PREFERENCES_FILE: &str = "preferences.yaml";

/// CsvConnection owns the data directory, the write lock that serializes
/// every read-modify-write cycle, and the live-query listener registry
#[derive(Clone)]
pub struct CsvConnection {
    base_directory: PathBuf,
    write_lock: Arc<Mutex<()>>,
    listeners: Arc<ListenerRegistry>,
}

impl CsvConnection {
    /// Create a new CSV connection with a base directory
    pub fn new<P: AsRef<Path>>(base_directory: P) -> Result<Self> {
        let base_path = base_directory.as_ref().to_path_buf();

        if !base_path.exists() {
            fs::create_dir_all(&base_path)
                .with_context(|| format!("Failed to create data directory {}", base_path.display()))?;
            info!("Created data directory {}", base_path.display());
        }

        Ok(Self {
            base_directory: base_path,
            write_lock: Arc::new(Mutex::new(())),
            listeners: ListenerRegistry::new(),
        })
    }

    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    pub fn file_path(&self, file_name: &str) -> PathBuf {
        self.base_directory.join(file_name)
    }

    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    /// Hold this guard for the whole read-modify-write cycle of a file
    pub async fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    /// Ensure a CSV file exists with the given header
    pub fn ensure_csv_file_exists(&self, file_name: &str, header: &[&str]) -> Result<PathBuf> {
        let file_path = self.file_path(file_name);
        if !file_path.exists() {
            let mut writer = Writer::from_path(&file_path)?;
            writer.write_record(header)?;
            writer.flush()?;
        }
        Ok(file_path)
    }

    /// Replace a CSV file atomically: rows go to a temp file which is then
    /// renamed over the original
    pub fn write_csv_atomically<F>(&self, file_name: &str, header: &[&str], write_rows: F) -> Result<()>
    where
        F: FnOnce(&mut Writer<BufWriter<File>>) -> Result<()>,
    {
        let file_path = self.file_path(file_name);
        let temp_path = file_path.with_extension("tmp");

        {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)?;

            let mut csv_writer = Writer::from_writer(BufWriter::new(file));
            csv_writer.write_record(header)?;
            write_rows(&mut csv_writer)?;
            csv_writer.flush()?;
        }

        fs::rename(&temp_path, &file_path)
            .with_context(|| format!("Failed to replace {}", file_path.display()))?;
        Ok(())
    }

    /// Write a text file atomically (temp file + rename)
    pub fn write_text_atomically(&self, file_name: &str, contents: &str) -> Result<()> {
        let file_path = self.file_path(file_name);
        let temp_path = file_path.with_extension("tmp");
        fs::write(&temp_path, contents)?;
        fs::rename(&temp_path, &file_path)
            .with_context(|| format!("Failed to replace {}", file_path.display()))?;
        Ok(())
    }
}

impl Connection for CsvConnection {
    type RecordRepository = RecordRepository;
    type ProfileRepository = ProfileRepository;
    type PreferenceRepository = PreferenceRepository;

    fn create_record_repository(&self) -> Self::RecordRepository {
        RecordRepository::new(self.clone())
    }

    fn create_profile_repository(&self) -> Self::ProfileRepository {
        ProfileRepository::new(self.clone())
    }

    fn create_preference_repository(&self) -> Self::PreferenceRepository {
        PreferenceRepository::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::csv::test_utils::TestEnvironment;

    #[test]
    fn test_new_creates_missing_directory() -> Result<()> {
        let temp = tempfile::TempDir::new()?;
        let nested = temp.path().join("nested").join("data");
        let connection = CsvConnection::new(&nested)?;
        assert!(nested.exists());
        assert_eq!(connection.base_directory(), nested.as_path());
        Ok(())
    }

    #[test]
    fn test_atomic_write_replaces_file_and_leaves_no_temp() -> Result<()> {
        let env = TestEnvironment::new()?;
        let header = ["a", "b"];
        env.connection.ensure_csv_file_exists("sample.csv", &header)?;
        env.connection.write_csv_atomically("sample.csv", &header, |writer| {
            writer.write_record(&["1", "2"])?;
            Ok(())
        })?;

        let contents = fs::read_to_string(env.base_path.join("sample.csv"))?;
        assert_eq!(contents, "a,b\n1,2\n");
        assert!(!env.base_path.join("sample.tmp").exists());
        Ok(())
    }
}
