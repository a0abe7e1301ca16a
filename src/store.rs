//! Token persistence
//!
//! Stores the current [`TokenState`] as pretty-printed JSON. Writes go to a
//! temporary sibling file that is then renamed over the target, so a reader
//! never sees a half-written token.

use crate::auth::TokenState;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File-backed token storage
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the token file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored token, `None` when nothing has been saved yet
    pub async fn load(&self) -> Result<Option<TokenState>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::store(format!(
                    "Failed to read token file {}: {e}",
                    self.path.display()
                )))
            }
        };

        let state: TokenState = serde_json::from_str(&contents)
            .map_err(|e| Error::store(format!("Failed to parse token file: {e}")))?;

        debug!(path = %self.path.display(), expires_at = %state.expires_at, "loaded token");
        Ok(Some(state))
    }

    /// Persist a token, replacing any previous one
    pub async fn save(&self, state: &TokenState) -> Result<()> {
        let contents = serde_json::to_string_pretty(state)
            .map_err(|e| Error::store(format!("Failed to serialize token: {e}")))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::store(format!("Failed to create token directory: {e}")))?;
        }

        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents)
            .await
            .map_err(|e| Error::store(format!("Failed to write token file: {e}")))?;

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| Error::store(format!("Failed to rename token file: {e}")))?;

        debug!(path = %self.path.display(), "saved token");
        Ok(())
    }

    /// Remove the stored token; a missing file is not an error
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "cleared token");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::store(format!("Failed to remove token file: {e}"))),
        }
    }
}
