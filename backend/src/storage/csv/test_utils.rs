//! Test utilities with RAII cleanup: the temporary data directory is
//! removed when the environment is dropped, even if the test panics.

use anyhow::Result;
use chrono::Duration;
use tempfile::TempDir;

use super::connection::CsvConnection;
use crate::storage::identity::LocalIdentityProvider;

/// Temporary directory plus a connection rooted in it
pub struct TestEnvironment {
    pub connection: CsvConnection,
    /// Base directory path for manual inspection if needed
    pub base_path: std::path::PathBuf,
    _temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let connection = CsvConnection::new(temp_dir.path())?;
        Ok(Self {
            connection,
            base_path: temp_dir.path().to_path_buf(),
            _temp_dir: temp_dir,
        })
    }

    /// Identity provider sharing this environment's data directory, with a
    /// five minute recent-login window
    pub fn identity_provider(&self) -> LocalIdentityProvider {
        self.identity_provider_with_window(Duration::minutes(5))
    }

    pub fn identity_provider_with_window(&self, recent_login_window: Duration) -> LocalIdentityProvider {
        LocalIdentityProvider::new(self.connection.clone(), recent_login_window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_cleanup() -> Result<()> {
        let base_path;
        {
            let env = TestEnvironment::new()?;
            base_path = env.base_path.clone();
            assert!(base_path.exists());
        }
        assert!(!base_path.exists());
        Ok(())
    }
}
