//! Plain-text config passthrough
//!
//! The viewer page lets an operator edit the encoder's config file. The relay
//! treats it as opaque text: whole-file read, whole-file overwrite.

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Text file at a fixed path
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the entire file
    pub async fn read(&self) -> Result<String> {
        Ok(tokio::fs::read_to_string(&self.path).await?)
    }

    /// Replace the entire file
    pub async fn write(&self, text: &str) -> Result<()> {
        tokio::fs::write(&self.path, text).await?;
        tracing::info!(path = %self.path.display(), bytes = text.len(), "Config file saved");
        Ok(())
    }
}
