//! Stored account credentials.

use serde::{Deserialize, Serialize};
use sonar_core::StoredCredentials;
use std::fs;
use std::path::Path;

/// On-disk form of the reusable login blob.
#[derive(Debug, Serialize, Deserialize)]
pub struct StoredAccount {
    /// Canonical account name
    pub username: String,
    /// Reusable blob, hex encoded
    pub auth_data: String,
}

impl StoredAccount {
    /// Build from credentials handed back by the engine
    #[must_use]
    pub fn from_credentials(credentials: &StoredCredentials) -> Self {
        Self {
            username: credentials.username.clone(),
            auth_data: hex::encode(&credentials.auth_data),
        }
    }

    /// Decode back into engine credentials
    ///
    /// # Errors
    ///
    /// Returns an error if the blob is not valid hex.
    pub fn to_credentials(&self) -> anyhow::Result<StoredCredentials> {
        Ok(StoredCredentials {
            username: self.username.clone(),
            auth_data: hex::decode(&self.auth_data)?,
        })
    }

    /// Load from `path`
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or malformed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!(
                "No stored credentials at {} ({e}); run `sonar login` first",
                path.display()
            )
        })?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Write to `path`, creating parent directories
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}
