//! Persistence of successful extraction outcomes.
//!
//! Stores are append-only: an outcome is written once, after the provider
//! returned non-empty text, and never updated.

use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Which URL produced the recognised text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlVariant {
    Original,
    Preprocessed,
}

/// The record of one successful extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrAttemptOutcome {
    pub id: Uuid,
    /// The URL the caller asked about.
    pub original_url: String,
    /// The URL whose recognition succeeded.
    pub used_url: String,
    pub variant: UrlVariant,
    pub text: String,
    /// [`crate::ocr::OcrProvider::name`] of the provider that answered.
    pub provider: String,
    pub created_at: DateTime<Utc>,
}

impl OcrAttemptOutcome {
    pub fn new(
        original_url: impl Into<String>,
        used_url: impl Into<String>,
        variant: UrlVariant,
        text: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            original_url: original_url.into(),
            used_url: used_url.into(),
            variant,
            text: text.into(),
            provider: provider.into(),
            created_at: Utc::now(),
        }
    }
}

/// Append-only sink for extraction outcomes.
#[async_trait]
pub trait OutcomeStore: Send + Sync {
    async fn save(&self, outcome: &OcrAttemptOutcome) -> Result<(), StorageError>;
}

/// Keeps outcomes in memory, in save order.
#[derive(Debug, Default)]
pub struct MemoryOutcomeStore {
    outcomes: Mutex<Vec<OcrAttemptOutcome>>,
}

impl MemoryOutcomeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything saved so far.
    pub fn outcomes(&self) -> Vec<OcrAttemptOutcome> {
        self.outcomes
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl OutcomeStore for MemoryOutcomeStore {
    async fn save(&self, outcome: &OcrAttemptOutcome) -> Result<(), StorageError> {
        self.outcomes
            .lock()
            .map_err(|_| StorageError::Backend("outcome store lock poisoned".into()))?
            .push(outcome.clone());
        Ok(())
    }
}

/// Appends one JSON object per line to a file.
#[derive(Debug, Clone)]
pub struct JsonlOutcomeStore {
    path: PathBuf,
}

impl JsonlOutcomeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl OutcomeStore for JsonlOutcomeStore {
    async fn save(&self, outcome: &OcrAttemptOutcome) -> Result<(), StorageError> {
        let mut line =
            serde_json::to_vec(outcome).map_err(|e| StorageError::Backend(e.to_string()))?;
        line.push(b'\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        // One write per record keeps lines whole under O_APPEND.
        file.write_all(&line).await.map_err(|e| self.io_error(e))?;
        file.flush().await.map_err(|e| self.io_error(e))?;
        Ok(())
    }
}
